/*!
 * Translation of blog posts using AI providers.
 *
 * This module contains the content chunker and the translation executor.
 * It is split into several submodules:
 *
 * - `chunker`: Splitting HTML bodies into translation-sized chunks
 * - `core`: Translation service with retry, deadlines and sanitization
 * - `batch`: Sequential and concurrent chunk translation
 * - `concurrency`: Provider pacing and concurrency defaults
 * - `fields`: Structured field bundles and reply parsing
 * - `formatting`: Cleanup of raw provider output
 * - `prompts`: Prompt templates and builders
 */

// Re-export main types for easier usage
pub use self::batch::{ChunkTranslator, PartialTranslation};
pub use self::chunker::{join_chunks, Chunk, ContentChunker};
pub use self::core::{TranslationOptions, TranslationService};
pub use self::fields::{FieldBundle, FieldName, ParsedFields};
pub use self::formatting::{ContentKind, ResponseSanitizer};

// Re-export prompt types
pub use self::prompts::{PromptTemplate, TranslationPromptBuilder};

// Submodules
pub mod batch;
pub mod chunker;
pub mod concurrency;
pub mod core;
pub mod fields;
pub mod formatting;
pub mod prompts;
