/*!
 * Database entity models and DTOs.
 *
 * These structures map directly to the `translations` table and provide
 * type-safe access to persisted translation jobs.
 */

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a translation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, no run has started
    Pending,
    /// A run owns the job
    InProgress,
    /// All fields translated and stored
    Completed,
    /// The last run gave up
    Failed,
}

impl JobStatus {
    /// Whether no run is expected to touch the job anymore
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Translated SEO metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoFields {
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

/// One translation job record: a post in one target language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationJob {
    /// Opaque job ID
    pub id: String,
    pub post_id: String,
    pub language_code: String,
    pub status: JobStatus,
    /// Token of the run that currently owns the job
    pub run_id: Option<String>,
    pub translated_title: Option<String>,
    pub translated_excerpt: Option<String>,
    pub translated_content: Option<String>,
    pub translated_slug: Option<String>,
    #[serde(flatten)]
    pub seo: SeoFields,
    /// Fingerprint of the source fields the translation was made from
    pub source_hash: Option<String>,
    pub error_message: Option<String>,
    pub failed_chunk_index: Option<i64>,
    /// External attempts behind the last failure
    pub attempt_count: i64,
    /// Runs started for this job, reruns included
    pub run_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Fields produced by a run, complete or partial
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslatedContent {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub seo: SeoFields,
}

impl TranslatedContent {
    /// Whether the run produced nothing at all
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Details recorded when a run fails
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureDetails {
    pub message: String,
    pub failed_chunk_index: Option<i64>,
    pub attempt_count: i64,
}

/// Selection of job records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobFilter {
    /// A single job by ID
    #[serde(rename_all = "camelCase")]
    Id { translation_id: String },
    /// A post in one language
    #[serde(rename_all = "camelCase")]
    PostLanguage { post_id: String, language_code: String },
    /// Every language of a post
    #[serde(rename_all = "camelCase")]
    Post { post_id: String },
    /// Every job; the flag must be set explicitly
    #[serde(rename_all = "camelCase")]
    All { delete_all: bool },
}

impl JobFilter {
    /// Every job of a post
    pub fn post(post_id: impl Into<String>) -> Self {
        JobFilter::Post { post_id: post_id.into() }
    }

    /// One job by ID
    pub fn id(translation_id: impl Into<String>) -> Self {
        JobFilter::Id {
            translation_id: translation_id.into(),
        }
    }

    /// A post in one language
    pub fn post_language(post_id: impl Into<String>, language_code: impl Into<String>) -> Self {
        JobFilter::PostLanguage {
            post_id: post_id.into(),
            language_code: language_code.into(),
        }
    }

    /// Every job
    pub fn all() -> Self {
        JobFilter::All { delete_all: true }
    }

    /// SQL condition and its parameters
    pub(crate) fn to_sql(&self) -> (&'static str, Vec<String>) {
        match self {
            JobFilter::Id { translation_id } => ("id = ?1", vec![translation_id.clone()]),
            JobFilter::PostLanguage { post_id, language_code } => (
                "post_id = ?1 AND language_code = ?2",
                vec![post_id.clone(), language_code.clone()],
            ),
            JobFilter::Post { post_id } => ("post_id = ?1", vec![post_id.clone()]),
            JobFilter::All { delete_all: true } => ("1 = 1", Vec::new()),
            JobFilter::All { delete_all: false } => ("1 = 0", Vec::new()),
        }
    }
}
