/*!
 * # postlingo - translation pipeline for travel blog posts
 *
 * Translates a post (title, excerpt, SEO fields and HTML body) into any
 * number of target languages through an LLM provider, and tracks each
 * (post, language) pair as a persistent job.
 *
 * ## Features
 *
 * - Structure-aware chunking of HTML bodies (headings, paragraphs, sentences)
 * - Translation through various AI providers:
 *   - Ollama (local LLM)
 *   - OpenAI API
 *   - Anthropic API
 * - Bounded retries with exponential backoff, per-call deadlines and pacing
 * - Structured field translation with a tolerant fallback parser
 * - Idempotent, regenerable jobs with unique translated slugs
 * - Synchronous or queued background execution
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `content`: Read access to the source posts
 * - `translation`: AI-powered translation services:
 *   - `translation::chunker`: Splitting bodies into translatable chunks
 *   - `translation::core`: Retry loop and field translation
 *   - `translation::batch`: Ordered chunk translation
 *   - `translation::formatting`: Response sanitization
 *   - `translation::fields`: Field bundles and response parsing
 * - `jobs`: Job orchestration, background worker and deletion
 * - `database`: SQLite job-record store
 * - `slug`: Translated slug generation
 * - `language_utils`: ISO language code utilities
 * - `providers`: Client implementations for various LLM providers:
 *   - `providers::ollama`: Ollama API client
 *   - `providers::openai`: OpenAI API client
 *   - `providers::anthropic`: Anthropic API client
 *   - `providers::mock`: Scriptable provider for tests and dry runs
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod content;
pub mod database;
pub mod errors;
pub mod jobs;
pub mod language_utils;
pub mod providers;
pub mod slug;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use content::{ContentSource, InMemoryContentSource, JsonContentSource, SourceDocument};
pub use database::{JobFilter, JobStatus, Repository, TranslationJob};
pub use errors::{AppError, JobError, ProviderError, TranslationError};
pub use jobs::{DeletionReport, JobOrchestrator, JobView, LanguageOutcome, OutcomeStatus, RequestOptions};
pub use language_utils::{get_language_name, language_codes_match, LanguageCode};
pub use translation::{ContentChunker, TranslationService};
