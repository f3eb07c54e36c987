/*!
 * End-to-end tests of synchronous translation requests
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use postlingo::content::SourceDocument;
use postlingo::database::{JobStatus, Repository};
use postlingo::errors::JobError;
use postlingo::jobs::{OutcomeStatus, RequestOptions};
use postlingo::providers::mock::MockProvider;

use crate::common::{beach_post, create_temp_dir, long_post, test_config, TestPipeline};

#[tokio::test]
async fn test_requestTranslation_withSmallPost_shouldCompleteInOneCall() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);

    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert!(outcome.success);
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.language, "fr");
    assert!(outcome.translation_id.is_some());

    // Short body travels with the other fields
    assert_eq!(pipeline.provider.call_count(), 1);

    let job = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(!job.translated_title.as_deref().unwrap_or_default().is_empty());
    let content = job.translated_content.unwrap();
    assert!(content.contains("Sand and sun."));
    assert!(!content.contains("**"));
    let slug = job.translated_slug.unwrap();
    assert!(!slug.is_empty());
    assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    assert_eq!(job.seo.seo_title.as_deref(), Some("[fr] Beach Guide | Travel Blog"));
    assert!(job.source_hash.is_some());
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn test_requestTranslation_calledTwice_shouldReportExistsWithoutCalls() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);
    let orchestrator = &pipeline.orchestrator;

    let first = orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    let calls_after_first = pipeline.provider.call_count();

    let second = orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(second[0].status, OutcomeStatus::Exists);
    assert!(second[0].success);
    assert_eq!(second[0].translation_id, first[0].translation_id);
    assert_eq!(second[0].translated_slug, first[0].translated_slug);
    assert_eq!(pipeline.provider.call_count(), calls_after_first);
}

#[tokio::test]
async fn test_requestTranslation_withTwoTransientFailures_shouldComplete() {
    let pipeline = TestPipeline::new(MockProvider::fail_first(2), vec![beach_post()]);

    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(pipeline.provider.call_count(), 3);

    let job = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(job.run_count, 1);
}

#[tokio::test]
async fn test_requestTranslation_withPersistentFailure_shouldFailAfterOneRerun() {
    let pipeline = TestPipeline::new(MockProvider::failing(), vec![beach_post()]);

    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();

    let outcome = &outcomes[0];
    assert!(!outcome.success);
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("3 attempts"));

    // Three attempts per call, two full runs
    assert_eq!(pipeline.provider.call_count(), 6);

    let job = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempt_count, 3);
    assert_eq!(job.run_count, 2);
    assert!(job.translated_slug.is_none());
}

#[tokio::test]
async fn test_requestTranslation_withSingleRunBudget_shouldNotRerun() {
    let mut config = test_config();
    config.translation.common.retry.job_runs = 1;
    let pipeline = TestPipeline::with_config(MockProvider::failing(), vec![beach_post()], config);

    pipeline
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(pipeline.provider.call_count(), 3);
}

#[tokio::test]
async fn test_requestTranslation_withSameTitleOnTwoPosts_shouldSuffixSecondSlug() {
    let mut other = beach_post();
    other.id = "post-2".to_string();
    other.slug = "beach-guide-2023".to_string();
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post(), other]);
    let orchestrator = &pipeline.orchestrator;

    let first = orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    let second = orchestrator
        .request_translation("post-2", &["fr"], RequestOptions::default())
        .await
        .unwrap();

    let first_slug = first[0].translated_slug.clone().unwrap();
    let second_slug = second[0].translated_slug.clone().unwrap();
    assert_ne!(first_slug, second_slug);
    assert_eq!(second_slug, format!("{}-1", first_slug));
}

#[tokio::test]
async fn test_requestTranslation_withDirectoryInSlug_shouldKeepDirectory() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![long_post("a", 1)]);

    let outcomes = pipeline
        .orchestrator
        .request_translation("a", &["de"], RequestOptions::default())
        .await
        .unwrap();

    let slug = outcomes[0].translated_slug.clone().unwrap();
    assert!(slug.starts_with("europe/"), "slug was {}", slug);
    assert!(slug.contains("harbour-walk"));
}

#[tokio::test]
async fn test_requestTranslation_withRegenerate_shouldRunAgainAndAdvanceTimestamp() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);
    let orchestrator = &pipeline.orchestrator;

    orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    let before = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    let calls_before = pipeline.provider.call_count();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let outcomes = orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::regenerate())
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(outcomes[0].translation_id.as_deref(), Some(before.id.as_str()));
    assert!(pipeline.provider.call_count() > calls_before);

    let after = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert!(after.updated_at > before.updated_at);
    assert_eq!(after.run_count, 2);
    // Re-completing the same job keeps its own slug
    assert_eq!(after.translated_slug, before.translated_slug);
}

#[tokio::test]
async fn test_requestTranslation_withSlowFirstChunk_shouldKeepChunkOrder() {
    let provider = MockProvider::working().with_delay_fn(|request| {
        let payload = MockProvider::source_text(request);
        if payload.contains("number 0") {
            Duration::from_millis(60)
        } else if payload.contains("number 1") {
            Duration::from_millis(30)
        } else {
            Duration::ZERO
        }
    });
    let pipeline = TestPipeline::new(provider, vec![long_post("a", 3)]);

    let outcomes = pipeline
        .orchestrator
        .request_translation("a", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);

    // One call for the fields, one per chunk
    assert_eq!(pipeline.provider.call_count(), 4);

    let content = pipeline
        .repo
        .find_job("a", "fr")
        .await
        .unwrap()
        .unwrap()
        .translated_content
        .unwrap();
    let positions: Vec<usize> = (0..3)
        .map(|i| content.find(&format!("number {}", i)).unwrap())
        .collect();
    assert!(positions[0] < positions[1] && positions[1] < positions[2], "{}", content);
    assert_eq!(content.matches("[fr]").count(), 3);
}

#[tokio::test]
async fn test_requestTranslation_withFailingChunk_shouldKeepPartialBody() {
    let mut config = test_config();
    config.translation.common.max_concurrent_chunks = Some(1);
    let pipeline = TestPipeline::with_config(MockProvider::fail_matching("number 2"), vec![long_post("a", 4)], config);

    let outcomes = pipeline
        .orchestrator
        .request_translation("a", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
    assert!(outcomes[0].error.as_deref().unwrap().contains("Chunk 2"));

    let job = pipeline.repo.find_job("a", "fr").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_chunk_index, Some(2));
    assert_eq!(job.attempt_count, 3);
    assert!(job.translated_title.is_some());

    let partial = job.translated_content.unwrap();
    assert!(partial.contains("number 0"));
    assert!(partial.contains("number 1"));
    assert!(!partial.contains("number 2"));
    assert!(!partial.contains("number 3"));
}

#[tokio::test]
async fn test_requestTranslation_withInvalidAndDuplicateLanguages_shouldReportEachOnce() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);

    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr", "FR", "not-a-language", "fra", "de"], RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].language, "fr");
    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(outcomes[1].language, "not-a-language");
    assert_eq!(outcomes[1].status, OutcomeStatus::Failed);
    assert!(outcomes[1].translation_id.is_none());
    assert!(outcomes[1].error.as_deref().unwrap().contains("Invalid language code"));
    assert_eq!(outcomes[2].language, "de");
    assert_eq!(outcomes[2].status, OutcomeStatus::Completed);

    assert_eq!(pipeline.repo.count_jobs().await.unwrap(), 2);
}

#[tokio::test]
async fn test_requestTranslation_withUnknownPost_shouldReturnPostNotFound() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);

    let result = pipeline
        .orchestrator
        .request_translation("missing", &["fr"], RequestOptions::default())
        .await;

    assert!(matches!(result, Err(JobError::PostNotFound(id)) if id == "missing"));
    assert_eq!(pipeline.repo.count_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_requestTranslation_withRunningJob_shouldReportInProgress() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);
    let job = pipeline.repo.ensure_job("post-1", "fr").await.unwrap();
    pipeline.repo.start_run(&job.id, false).await.unwrap().unwrap();

    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, OutcomeStatus::InProgress);
    assert!(outcomes[0].success);
    assert_eq!(pipeline.provider.call_count(), 0);
}

#[tokio::test]
async fn test_requestTranslation_withRegenerateDuringRun_shouldLetNewerRunWin() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    // Only the very first call is slow
    let provider = MockProvider::working().with_delay_fn(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Duration::from_millis(400)
        } else {
            Duration::ZERO
        }
    });
    let pipeline = TestPipeline::new(provider, vec![beach_post()]);
    let orchestrator = &pipeline.orchestrator;

    let slow = orchestrator.request_translation("post-1", &["fr"], RequestOptions::default());
    let regenerate = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator
            .request_translation("post-1", &["fr"], RequestOptions::regenerate())
            .await
    };
    let (slow, regenerate) = tokio::join!(slow, regenerate);

    let regenerate = regenerate.unwrap();
    assert_eq!(regenerate[0].status, OutcomeStatus::Completed);

    // The superseded run does not report a result of its own
    let slow = slow.unwrap();
    assert_eq!(slow[0].status, OutcomeStatus::InProgress);
    assert!(slow[0].success);

    let job = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.run_count, 2);
    assert_eq!(job.translated_slug, regenerate[0].translated_slug);
}

#[tokio::test]
async fn test_jobStatus_afterSourceChange_shouldFlagStale() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);
    let orchestrator = &pipeline.orchestrator;

    orchestrator
        .request_translation("post-1", &["fr", "de"], RequestOptions::default())
        .await
        .unwrap();
    let fresh = orchestrator.job_status("post-1", "fr").await.unwrap().unwrap();
    assert!(!fresh.is_stale);

    let mut edited = beach_post();
    edited.content = "<p>Sand, sun and sea.</p>".to_string();
    pipeline.posts.insert(edited);

    let stale = orchestrator.job_status("post-1", "fra").await.unwrap().unwrap();
    assert!(stale.is_stale);
    assert_eq!(stale.job.language_code, "fr");

    let views = orchestrator.list_jobs("post-1").await.unwrap();
    assert_eq!(views.len(), 2);
    assert!(views.iter().all(|view| view.is_stale));

    assert!(orchestrator.job_status("post-1", "it").await.unwrap().is_none());
    assert!(matches!(
        orchestrator.job_status("post-1", "nope").await,
        Err(JobError::InvalidLanguage(_))
    ));
}

#[tokio::test]
async fn test_requestTranslation_afterFailure_shouldRetryOnNextRequest() {
    let pipeline = TestPipeline::new(MockProvider::fail_first(6), vec![beach_post()]);
    let orchestrator = &pipeline.orchestrator;

    let failed = orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(failed[0].status, OutcomeStatus::Failed);

    // Failed jobs are claimable without regenerate
    let retried = orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(retried[0].status, OutcomeStatus::Completed);
    assert_eq!(retried[0].translation_id, failed[0].translation_id);

    let job = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert!(job.error_message.is_none());
    assert_eq!(job.run_count, 3);
}

#[tokio::test]
async fn test_requestTranslation_withUntitledPost_shouldCompleteWithSourceSlug() {
    let post = SourceDocument {
        title: String::new(),
        ..beach_post()
    };
    let pipeline = TestPipeline::new(MockProvider::working(), vec![post]);

    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(outcomes[0].translated_slug.as_deref(), Some("beach-guide"));

    let job = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.translated_title.is_none());
    assert!(job.translated_excerpt.is_some());
}

#[tokio::test]
async fn test_requestTranslation_withStoreErrorOnLaterLanguage_shouldStillRunEarlierClaims() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("jobs.db");
    let repo = Repository::open(&path).unwrap();
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_de BEFORE INSERT ON translations
             WHEN NEW.language_code = 'de'
             BEGIN SELECT RAISE(ABORT, 'disk quota exceeded'); END;",
        )
        .unwrap();
    }
    let pipeline = TestPipeline::with_repo(MockProvider::working(), vec![beach_post()], test_config(), repo);

    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr", "de"], RequestOptions::background())
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status, OutcomeStatus::InProgress);
    assert_eq!(outcomes[1].language, "de");
    assert_eq!(outcomes[1].status, OutcomeStatus::Failed);
    assert!(outcomes[1].translation_id.is_none());

    pipeline.orchestrator.shutdown().await;

    // The claimed job was queued rather than left in progress
    let fr = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(fr.status, JobStatus::Completed);
    assert!(pipeline.repo.find_job("post-1", "de").await.unwrap().is_none());
}

#[tokio::test]
async fn test_requestTranslation_withFailedRegenerate_shouldNotKeepOldFields() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("jobs.db");
    let first = TestPipeline::with_repo(
        MockProvider::working(),
        vec![beach_post()],
        test_config(),
        Repository::open(&path).unwrap(),
    );
    let completed = first
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(completed[0].status, OutcomeStatus::Completed);

    let second = TestPipeline::with_repo(
        MockProvider::failing(),
        vec![beach_post()],
        test_config(),
        Repository::open(&path).unwrap(),
    );
    let failed = second
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::regenerate())
        .await
        .unwrap();
    assert_eq!(failed[0].status, OutcomeStatus::Failed);

    let job = second.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.translated_title.is_none());
    assert!(job.translated_excerpt.is_none());
    assert!(job.translated_content.is_none());
    assert!(job.seo.seo_title.is_none());
    assert!(job.translated_slug.is_none());
}
