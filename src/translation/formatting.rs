/*!
 * Cleanup of raw provider output.
 *
 * Models wrap answers in code fences, leak Markdown emphasis into HTML,
 * echo document wrappers and pad with whitespace. This module strips all of
 * that before a translation is stored.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::translation::prompts::{SOURCE_END, SOURCE_START};

/// What kind of text a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Titles, excerpts and SEO fields
    Plain,
    /// Post bodies and body chunks
    Html,
}

/// Fence lines such as ```html or a bare ```
static FENCE_LINE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*\r?\n?").unwrap());

/// Document-level wrappers the model sometimes adds around a fragment
static DOCUMENT_WRAPPER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?is)<!DOCTYPE[^>]*>").unwrap(),
        Regex::new(r"(?is)<head\b[^>]*>.*?</head\s*>").unwrap(),
        Regex::new(r"(?i)</?html\b[^>]*>").unwrap(),
        Regex::new(r"(?i)</?body\b[^>]*>").unwrap(),
    ]
});

/// Markdown emphasis, bold before italic
static BOLD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*|__([^_\n]+?)__").unwrap());
static ITALIC_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\s](?:[^*\n]*[^*\s])?)\*").unwrap());

/// An HTML tag with its attributes
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Runs of spaces and tabs
static INLINE_SPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\x{00A0}]{2,}").unwrap());

/// Three or more line breaks, possibly with blanks between them
static BLANK_LINES_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*){2,}").unwrap());

/// Any whitespace run
static ANY_SPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Sanitizer for provider responses
pub struct ResponseSanitizer;

impl ResponseSanitizer {
    /// Clean a response according to the kind of field it fills
    pub fn clean(raw: &str, kind: ContentKind) -> String {
        match kind {
            ContentKind::Html => Self::clean_html(raw),
            ContentKind::Plain => Self::clean_plain(raw),
        }
    }

    /// Clean an HTML fragment: unwrap, convert Markdown emphasis, tidy whitespace
    pub fn clean_html(raw: &str) -> String {
        let unwrapped = Self::strip_wrappers(raw);
        let mut result = unwrapped;
        for pattern in DOCUMENT_WRAPPER_PATTERNS.iter() {
            result = pattern.replace_all(&result, "").into_owned();
        }
        let result = Self::markdown_to_html(&result);
        Self::collapse_whitespace(&result)
    }

    /// Clean a plain-text field: unwrap, drop Markdown markers, single-line whitespace
    pub fn clean_plain(raw: &str) -> String {
        let unwrapped = Self::strip_wrappers(raw);
        let without_bold = BOLD_REGEX.replace_all(&unwrapped, |caps: &regex::Captures| {
            caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str()).to_string()
        });
        let without_italic = ITALIC_REGEX.replace_all(&without_bold, "$1");
        ANY_SPACE_REGEX.replace_all(&without_italic, " ").trim().to_string()
    }

    /// Remove code fences, stray backticks and echoed payload markers
    pub fn strip_wrappers(raw: &str) -> String {
        let without_fences = FENCE_LINE_REGEX.replace_all(raw, "");
        without_fences
            .replace('`', "")
            .replace(SOURCE_START, "")
            .replace(SOURCE_END, "")
    }

    /// Convert `**bold**`, `__bold__` and `*italic*` to HTML.
    ///
    /// Only text between tags is rewritten; tags and their attribute values
    /// (URLs, file names) pass through untouched.
    pub fn markdown_to_html(text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut last = 0;
        for tag in TAG_REGEX.find_iter(text) {
            result.push_str(&Self::emphasis_to_html(&text[last..tag.start()]));
            result.push_str(tag.as_str());
            last = tag.end();
        }
        result.push_str(&Self::emphasis_to_html(&text[last..]));
        result
    }

    fn emphasis_to_html(text: &str) -> String {
        let bold = BOLD_REGEX.replace_all(text, |caps: &regex::Captures| {
            let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            format!("<strong>{}</strong>", inner)
        });
        ITALIC_REGEX.replace_all(&bold, "<em>$1</em>").into_owned()
    }

    /// Collapse repeated spaces and blank lines, trim both ends
    pub fn collapse_whitespace(text: &str) -> String {
        let spaces = INLINE_SPACE_REGEX.replace_all(text, " ");
        let lines = BLANK_LINES_REGEX.replace_all(&spaces, "\n\n");
        lines.trim().to_string()
    }
}
