/*!
 * Tests for error types and their conversions
 */

use postlingo::errors::{AppError, JobError, ProviderError, TranslationError};

#[test]
fn test_providerError_fromStatus_shouldMapKnownCodes() {
    assert!(matches!(ProviderError::from_status(401, "no"), ProviderError::AuthenticationError(_)));
    assert!(matches!(ProviderError::from_status(403, "no"), ProviderError::AuthenticationError(_)));
    assert!(matches!(ProviderError::from_status(429, "slow"), ProviderError::RateLimitExceeded(_)));
    assert!(matches!(
        ProviderError::from_status(502, "bad gateway"),
        ProviderError::ApiError { status_code: 502, .. }
    ));
}

#[test]
fn test_providerError_isRetryable_shouldExcludeAuthentication() {
    assert!(!ProviderError::AuthenticationError("bad key".to_string()).is_retryable());
    assert!(ProviderError::Timeout(30).is_retryable());
    assert!(ProviderError::RateLimitExceeded("wait".to_string()).is_retryable());
    assert!(ProviderError::ParseError("junk".to_string()).is_retryable());
}

#[test]
fn test_chunkFailed_shouldExposeIndexAndAttempts() {
    let error = TranslationError::ChunkFailed {
        index: 4,
        total: 7,
        completed: 4,
        source: Box::new(TranslationError::RetriesExhausted {
            attempts: 3,
            last_cause: "API responded with error: 500 - boom".to_string(),
            causes: vec!["boom".to_string(); 3],
        }),
    };

    assert_eq!(error.failed_chunk_index(), Some(4));
    assert_eq!(error.attempt_count(), Some(3));
    let message = error.to_string();
    assert!(message.contains("Chunk 4 failed"));
    assert!(message.contains("4/7"));
}

#[test]
fn test_jobError_fromAnyhow_shouldBecomeStoreError() {
    let error: JobError = anyhow::anyhow!("disk full").context("Failed to write job").into();
    match error {
        JobError::Store(message) => {
            assert!(message.contains("Failed to write job"));
            assert!(message.contains("disk full"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_appError_shouldWrapJobErrors() {
    let error: AppError = JobError::PostNotFound("p9".to_string()).into();
    assert_eq!(error.to_string(), "Job error: Post not found: p9");
}
