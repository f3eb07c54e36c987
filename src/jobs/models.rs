/*!
 * Job orchestration data models.
 *
 * These types are the orchestrator's request and report shapes. They
 * serialize to camelCase JSON, as printed by the CLI.
 */

use serde::{Deserialize, Serialize};

use crate::database::models::{JobStatus, TranslationJob};

/// Options for a translation request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestOptions {
    /// Translate again even if a completed translation exists
    pub regenerate: bool,
    /// Return right after queuing instead of waiting for the result
    pub background: bool,
}

impl RequestOptions {
    pub fn regenerate() -> Self {
        Self {
            regenerate: true,
            background: false,
        }
    }

    pub fn background() -> Self {
        Self {
            regenerate: false,
            background: true,
        }
    }
}

/// Reported state of one requested language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A completed translation already existed; nothing was done
    Exists,
    /// A run is working on it
    InProgress,
    /// Translated in this request
    Completed,
    /// Could not be translated
    Failed,
}

/// Result for one language of a translation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageOutcome {
    /// The language as requested (normalized when valid)
    pub language: String,
    pub success: bool,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LanguageOutcome {
    /// A completed translation was already stored
    pub fn exists(job: &TranslationJob) -> Self {
        Self {
            language: job.language_code.clone(),
            success: true,
            status: OutcomeStatus::Exists,
            translation_id: Some(job.id.clone()),
            translated_slug: job.translated_slug.clone(),
            error: None,
        }
    }

    /// A run owns the job, either queued now or already in flight
    pub fn in_progress(job: &TranslationJob) -> Self {
        Self {
            language: job.language_code.clone(),
            success: true,
            status: OutcomeStatus::InProgress,
            translation_id: Some(job.id.clone()),
            translated_slug: None,
            error: None,
        }
    }

    /// A newer run took the job over; it reports the final state
    pub fn superseded(language: impl Into<String>, translation_id: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            success: true,
            status: OutcomeStatus::InProgress,
            translation_id: Some(translation_id.into()),
            translated_slug: None,
            error: None,
        }
    }

    /// The job was translated by this request
    pub fn completed(job: &TranslationJob) -> Self {
        Self {
            language: job.language_code.clone(),
            success: true,
            status: OutcomeStatus::Completed,
            translation_id: Some(job.id.clone()),
            translated_slug: job.translated_slug.clone(),
            error: None,
        }
    }

    /// The language failed, with or without a job record
    pub fn failed(language: impl Into<String>, translation_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            success: false,
            status: OutcomeStatus::Failed,
            translation_id,
            translated_slug: None,
            error: Some(error.into()),
        }
    }
}

/// A deleted job, as reported back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedTranslation {
    pub id: String,
    pub post_id: String,
    pub language_code: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_slug: Option<String>,
}

impl From<TranslationJob> for DeletedTranslation {
    fn from(job: TranslationJob) -> Self {
        Self {
            id: job.id,
            post_id: job.post_id,
            language_code: job.language_code,
            status: job.status,
            translated_title: job.translated_title,
            translated_slug: job.translated_slug,
        }
    }
}

/// Result of a deletion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub deleted_count: usize,
    pub deleted_translations: Vec<DeletedTranslation>,
}

impl DeletionReport {
    pub fn from_jobs(jobs: Vec<TranslationJob>) -> Self {
        let deleted_translations: Vec<DeletedTranslation> = jobs.into_iter().map(DeletedTranslation::from).collect();
        Self {
            deleted_count: deleted_translations.len(),
            deleted_translations,
        }
    }
}

/// A job record plus whether its source changed since it was translated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    #[serde(flatten)]
    pub job: TranslationJob,
    /// Only meaningful for completed jobs
    pub is_stale: bool,
}

impl JobView {
    /// Compare the stored fingerprint with the current one of the post
    pub fn new(job: TranslationJob, current_source_hash: Option<&str>) -> Self {
        let is_stale = match (job.status, job.source_hash.as_deref(), current_source_hash) {
            (JobStatus::Completed, Some(stored), Some(current)) => stored != current,
            // Post deleted upstream
            (JobStatus::Completed, Some(_), None) => true,
            _ => false,
        };
        Self { job, is_stale }
    }
}
