/*!
 * Database module for persistent storage of translation jobs.
 *
 * This module provides SQLite-based persistence for one job record per
 * post and target language, holding the lifecycle state, the translated
 * fields and the failure details of the last run.
 */

pub mod connection;
pub mod models;
pub mod repository;
pub mod schema;

// Re-export main types
pub use connection::{DatabaseConnection, DatabaseStats};
pub use models::{FailureDetails, JobFilter, JobStatus, SeoFields, TranslatedContent, TranslationJob};
pub use repository::Repository;
