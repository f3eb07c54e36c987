/*!
 * Error types for the postlingo pipeline.
 *
 * This module contains custom error types for each stage of the pipeline,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The call did not finish within its deadline
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Bad credentials will not fix themselves between attempts, everything
    /// else (timeouts, 5xx, rate limits, garbled output) might.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::AuthenticationError(_))
    }

    /// Map an HTTP status and body to the matching variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => ProviderError::AuthenticationError(message),
            429 => ProviderError::RateLimitExceeded(message),
            _ => ProviderError::ApiError { status_code, message },
        }
    }
}

/// Raised when no safe split point exists within the size bound.
///
/// The chunker never lets this escape: it falls back to an oversized chunk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("No safe split point in a {length}-char block (limit {limit})")]
    BoundaryNotFound { length: usize, limit: usize },
}

/// The external response could not be turned into a field bundle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing resembling a JSON object was found
    #[error("Response contains no JSON object")]
    NoJsonObject,

    /// Strict decoding failed
    #[error("Invalid JSON in response: {0}")]
    InvalidJson(String),

    /// Fallback extraction found some fields but not the required ones
    #[error("Response is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

/// Errors that can occur during translation
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// Error from the provider API that was not retried
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Every allowed attempt failed
    #[error("Translation failed after {attempts} attempts: {last_cause}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// The error of the final attempt
        last_cause: String,
        /// Errors of all attempts, oldest first
        causes: Vec<String>,
    },

    /// A body chunk failed and the remaining chunks were abandoned
    #[error("Chunk {index} failed ({completed}/{total} chunks translated): {source}")]
    ChunkFailed {
        /// Zero-based index of the failing chunk
        index: usize,
        /// Total number of chunks in the document
        total: usize,
        /// Chunks translated successfully before the failure
        completed: usize,
        /// What went wrong with the chunk
        #[source]
        source: Box<TranslationError>,
    },

    /// Structured output could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A required field came back empty
    #[error("Translated field '{0}' is empty")]
    MissingField(String),

    /// No free slug was found below the suffix limit
    #[error("No unique slug for '{base}' within {limit} suffixes")]
    SlugCollisionExhausted {
        /// Slug that kept colliding
        base: String,
        /// Highest suffix tried
        limit: u32,
    },
}

impl TranslationError {
    /// Number of external attempts behind this error, if it came from the retry loop
    pub fn attempt_count(&self) -> Option<u32> {
        match self {
            TranslationError::RetriesExhausted { attempts, .. } => Some(*attempts),
            TranslationError::ChunkFailed { source, .. } => source.attempt_count(),
            TranslationError::Provider(_) => Some(1),
            _ => None,
        }
    }

    /// Index of the failing chunk, if the failure happened in the body
    pub fn failed_chunk_index(&self) -> Option<usize> {
        match self {
            TranslationError::ChunkFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Errors surfaced by the job orchestrator
#[derive(Error, Debug)]
pub enum JobError {
    /// The content collaborator has no such post
    #[error("Post not found: {0}")]
    PostNotFound(String),

    /// A requested language code is not a valid ISO 639 code
    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),

    /// Translation failed
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// The job record store failed
    #[error("Store error: {0}")]
    Store(String),

    /// A newer run took over the job while this one was in flight
    #[error("Job {0} was superseded by a newer run")]
    Superseded(String),

    /// A delete filter that matches nothing sensible
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// The background queue is no longer accepting work
    #[error("Background queue is closed")]
    QueueClosed,

    /// Created outside of a Tokio runtime
    #[error("No async runtime available: {0}")]
    Runtime(String),
}

impl From<anyhow::Error> for JobError {
    fn from(error: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", error))
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from the job orchestrator
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(format!("{:#}", error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
