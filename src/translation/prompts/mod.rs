/*!
 * Prompt construction for post translation.
 *
 * This module provides:
 * - The configurable system prompt template
 * - Plain text and HTML fragment prompts
 * - Structured field bundle prompts with an explicit JSON schema
 */

pub mod templates;

// Re-export main types
pub use templates::{PromptTemplate, TranslationPromptBuilder, SOURCE_END, SOURCE_START};
