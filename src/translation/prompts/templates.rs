/*!
 * Prompt templates for post translation.
 *
 * Every prompt wraps its payload between `SOURCE_START` and `SOURCE_END`
 * so instructions and content never blur together.
 */

use serde_json::{json, Value};

use crate::translation::fields::FieldBundle;
use crate::translation::formatting::ContentKind;

/// Opening marker of the payload
pub const SOURCE_START: &str = "<<SOURCE>>";

/// Closing marker of the payload
pub const SOURCE_END: &str = "<<END_SOURCE>>";

/// System prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Render the template with the given language names.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

/// Builds the user prompts for one source/target language pair.
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    source_language: String,
    target_language: String,
}

impl TranslationPromptBuilder {
    /// Create a builder from human-readable language names.
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
        }
    }

    /// Prompt for a single piece of text.
    pub fn text_prompt(&self, text: &str, kind: ContentKind) -> String {
        let mut prompt = format!(
            "Translate the text between the markers from {} to {}.\n\
             Return only the translation, without the markers, explanations or code fences.\n",
            self.source_language, self.target_language
        );

        match kind {
            ContentKind::Html => prompt.push_str(
                "The text is an HTML fragment. Keep every tag, attribute and URL unchanged and in place, \
                 translate only the visible text, and do not use Markdown.\n",
            ),
            ContentKind::Plain => prompt.push_str("The text is plain text. Do not add HTML or Markdown.\n"),
        }

        prompt.push_str(SOURCE_START);
        prompt.push('\n');
        prompt.push_str(text);
        prompt.push('\n');
        prompt.push_str(SOURCE_END);
        prompt
    }

    /// Prompt for a bundle of named fields, answered as one JSON object.
    pub fn fields_prompt(&self, bundle: &FieldBundle) -> String {
        let payload = serde_json::to_string_pretty(&bundle.to_json()).unwrap_or_else(|_| "{}".to_string());
        let schema = serde_json::to_string_pretty(&Self::response_schema(bundle)).unwrap_or_else(|_| "{}".to_string());

        let mut prompt = format!(
            "Translate every value of the JSON object between the markers from {} to {}.\n\
             Respond with a single JSON object matching this schema and nothing else:\n{}\n\
             Keep the keys exactly as they are. ",
            self.source_language, self.target_language, schema
        );

        if bundle.has_html() {
            prompt.push_str(
                "The \"content\" value is HTML: keep every tag, attribute and URL unchanged. \
                 All other values are plain text. ",
            );
        } else {
            prompt.push_str("All values are plain text. ");
        }
        prompt.push_str("Do not use Markdown.\n");

        prompt.push_str(SOURCE_START);
        prompt.push('\n');
        prompt.push_str(&payload);
        prompt.push('\n');
        prompt.push_str(SOURCE_END);
        prompt
    }

    /// JSON schema describing the expected reply for a bundle
    pub fn response_schema(bundle: &FieldBundle) -> Value {
        let keys: Vec<&str> = bundle.names().map(|name| name.key()).collect();
        let properties: serde_json::Map<String, Value> = keys
            .iter()
            .map(|key| (key.to_string(), json!({ "type": "string" })))
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": keys,
            "additionalProperties": false
        })
    }
}
