/*!
 * Structured field bundles.
 *
 * A post's short fields (and, for small posts, its body) are translated in a
 * single call answered with one JSON object. Replies are parsed in two
 * stages: strict JSON decoding first, then a tolerant per-field extractor
 * for replies that are almost JSON (trailing prose, truncated objects,
 * unescaped quotes elsewhere).
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::content::SourceDocument;
use crate::errors::ParseError;
use crate::translation::formatting::ContentKind;

/// A translatable field of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldName {
    Title,
    Excerpt,
    SeoTitle,
    SeoDescription,
    MetaTitle,
    MetaDescription,
    Content,
}

impl FieldName {
    /// Every field, in prompt order
    pub const ALL: [FieldName; 7] = [
        FieldName::Title,
        FieldName::Excerpt,
        FieldName::SeoTitle,
        FieldName::SeoDescription,
        FieldName::MetaTitle,
        FieldName::MetaDescription,
        FieldName::Content,
    ];

    /// JSON key used in prompts and replies
    pub fn key(&self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Excerpt => "excerpt",
            FieldName::SeoTitle => "seo_title",
            FieldName::SeoDescription => "seo_description",
            FieldName::MetaTitle => "meta_title",
            FieldName::MetaDescription => "meta_description",
            FieldName::Content => "content",
        }
    }

    /// Look a field up by its JSON key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|name| name.key() == key)
    }

    /// Kind of text the field holds
    pub fn kind(&self) -> ContentKind {
        match self {
            FieldName::Content => ContentKind::Html,
            _ => ContentKind::Plain,
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Named field values, ordered by `FieldName`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBundle {
    fields: BTreeMap<FieldName, String>,
}

impl FieldBundle {
    /// Collect the non-empty fields of a post.
    ///
    /// The body is included only when `include_body` is set.
    pub fn from_document(post: &SourceDocument, include_body: bool) -> Self {
        let mut bundle = Self::default();
        bundle.set(FieldName::Title, &post.title);
        let optional = [
            (FieldName::Excerpt, &post.excerpt),
            (FieldName::SeoTitle, &post.seo_title),
            (FieldName::SeoDescription, &post.seo_description),
            (FieldName::MetaTitle, &post.meta_title),
            (FieldName::MetaDescription, &post.meta_description),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                bundle.set(name, value);
            }
        }
        if include_body {
            bundle.set(FieldName::Content, &post.content);
        }
        bundle
    }

    /// Set a field; blank values are ignored
    pub fn set(&mut self, name: FieldName, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.insert(name, value);
        }
    }

    /// Value of a field
    pub fn get(&self, name: FieldName) -> Option<&str> {
        self.fields.get(&name).map(String::as_str)
    }

    /// Remove and return a field
    pub fn take(&mut self, name: FieldName) -> Option<String> {
        self.fields.remove(&name)
    }

    /// Whether the field is present
    pub fn contains(&self, name: FieldName) -> bool {
        self.fields.contains_key(&name)
    }

    /// Names of the present fields, in order
    pub fn names(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.fields.keys().copied()
    }

    /// Present fields with their values
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &str)> + '_ {
        self.fields.iter().map(|(name, value)| (*name, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether the bundle carries HTML
    pub fn has_html(&self) -> bool {
        self.names().any(|name| name.kind() == ContentKind::Html)
    }

    /// Fields of `self` that `other` lacks
    pub fn missing_from(&self, other: &FieldBundle) -> Vec<FieldName> {
        self.names().filter(|name| !other.contains(*name)).collect()
    }

    /// JSON object with one string per field
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.key().to_string(), Value::String(value.clone())))
            .collect();
        Value::Object(map)
    }
}

/// Outcome of parsing a reply: whatever could be recovered plus what is still missing
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFields {
    /// Recovered values
    pub fields: FieldBundle,
    /// Expected fields absent from the reply
    pub missing: Vec<FieldName>,
}

impl ParsedFields {
    /// Whether every expected field was recovered
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Outermost `{ ... }` of a reply, tolerating prose and fences around it
fn json_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Strict decoding of a reply into the expected fields.
///
/// Fails unless the reply holds a JSON object in which every expected key
/// maps to a string.
pub fn parse_strict(raw: &str, expected: &[FieldName]) -> Result<FieldBundle, ParseError> {
    let object = json_object_span(raw).ok_or(ParseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(object).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let map = value.as_object().ok_or(ParseError::NoJsonObject)?;

    let mut bundle = FieldBundle::default();
    let mut missing = Vec::new();
    for name in expected {
        match map.get(name.key()).and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => bundle.set(*name, text),
            _ => missing.push(name.key().to_string()),
        }
    }

    if missing.is_empty() {
        Ok(bundle)
    } else {
        Err(ParseError::MissingFields(missing))
    }
}

/// `"key" : "value"` with JSON escapes inside the value
static FIELD_VALUE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([a-z_]+)"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());

/// Tolerant per-field extraction.
///
/// Returns whatever string fields can be found; fails only when none of
/// the expected fields is present.
pub fn extract_tolerant(raw: &str, expected: &[FieldName]) -> Result<ParsedFields, ParseError> {
    let mut fields = FieldBundle::default();

    for caps in FIELD_VALUE_REGEX.captures_iter(raw) {
        let Some(name) = FieldName::from_key(&caps[1]) else {
            continue;
        };
        if !expected.contains(&name) || fields.contains(name) {
            continue;
        }
        let escaped = &caps[2];
        let value = serde_json::from_str::<String>(&format!("\"{}\"", escaped)).unwrap_or_else(|_| escaped.to_string());
        fields.set(name, value);
    }

    if fields.is_empty() {
        return Err(ParseError::MissingFields(expected.iter().map(|n| n.key().to_string()).collect()));
    }

    let missing = expected.iter().copied().filter(|name| !fields.contains(*name)).collect();
    Ok(ParsedFields { fields, missing })
}

/// Two-stage parse: strict first, tolerant on failure
pub fn parse_fields(raw: &str, expected: &[FieldName]) -> Result<ParsedFields, ParseError> {
    match parse_strict(raw, expected) {
        Ok(fields) => Ok(ParsedFields {
            fields,
            missing: Vec::new(),
        }),
        Err(strict_error) => {
            log::debug!("Strict field parse failed ({}), trying tolerant extraction", strict_error);
            extract_tolerant(raw, expected).map_err(|_| strict_error)
        }
    }
}
