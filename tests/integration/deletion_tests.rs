/*!
 * Tests for deletion, deletion previews and interrupted-run recovery
 */

use std::time::Duration;

use postlingo::database::{JobFilter, JobStatus, Repository};
use postlingo::errors::JobError;
use postlingo::jobs::{OutcomeStatus, RequestOptions};
use postlingo::providers::mock::MockProvider;

use crate::common::{beach_post, create_temp_dir, test_config, TestPipeline};

const LANGUAGES: [&str; 5] = ["fr", "de", "es", "it", "pt"];

async fn translated_pipeline() -> TestPipeline {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);
    pipeline
        .orchestrator
        .request_translation("post-1", &LANGUAGES, RequestOptions::default())
        .await
        .unwrap();
    pipeline
}

#[tokio::test]
async fn test_deleteTranslation_withDeleteAll_shouldEmptyStore() {
    let pipeline = translated_pipeline().await;
    assert_eq!(pipeline.repo.count_jobs().await.unwrap(), 5);

    let report = pipeline.orchestrator.delete_translation(JobFilter::all()).await.unwrap();

    assert_eq!(report.deleted_count, 5);
    assert_eq!(report.deleted_translations.len(), 5);
    assert!(report
        .deleted_translations
        .iter()
        .all(|deleted| deleted.status == JobStatus::Completed));
    assert_eq!(pipeline.repo.count_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_deleteTranslation_withPostAndLanguage_shouldDeleteOne() {
    let pipeline = translated_pipeline().await;

    let report = pipeline
        .orchestrator
        .delete_translation(JobFilter::post_language("post-1", "de"))
        .await
        .unwrap();

    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.deleted_translations[0].language_code, "de");
    assert!(pipeline.repo.find_job("post-1", "de").await.unwrap().is_none());
    assert_eq!(pipeline.repo.count_jobs().await.unwrap(), 4);
}

#[tokio::test]
async fn test_deleteTranslation_withId_shouldAllowTranslatingAgain() {
    let pipeline = translated_pipeline().await;
    let job = pipeline.repo.find_job("post-1", "fr").await.unwrap().unwrap();

    let report = pipeline.orchestrator.delete_translation(JobFilter::id(&job.id)).await.unwrap();
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.deleted_translations[0].id, job.id);

    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    assert_ne!(outcomes[0].translation_id.as_deref(), Some(job.id.as_str()));
    // The freed slug is reused
    assert_eq!(outcomes[0].translated_slug, job.translated_slug);
}

#[tokio::test]
async fn test_deleteTranslation_withNoMatch_shouldReportZero() {
    let pipeline = translated_pipeline().await;
    let report = pipeline.orchestrator.delete_translation(JobFilter::post("post-9")).await.unwrap();
    assert_eq!(report.deleted_count, 0);
    assert!(report.deleted_translations.is_empty());
}

#[tokio::test]
async fn test_deleteTranslation_withUnsetDeleteAll_shouldBeRejected() {
    let pipeline = translated_pipeline().await;

    let result = pipeline
        .orchestrator
        .delete_translation(JobFilter::All { delete_all: false })
        .await;

    assert!(matches!(result, Err(JobError::InvalidFilter(_))));
    assert_eq!(pipeline.repo.count_jobs().await.unwrap(), 5);
}

#[tokio::test]
async fn test_previewDeletion_shouldLeaveStoreUnchanged() {
    let pipeline = translated_pipeline().await;

    let preview = pipeline.orchestrator.preview_deletion(&JobFilter::post("post-1")).await.unwrap();
    assert_eq!(preview.len(), 5);

    let languages: Vec<&str> = preview.iter().map(|job| job.language_code.as_str()).collect();
    for language in LANGUAGES {
        assert!(languages.contains(&language));
    }
    assert_eq!(pipeline.repo.count_jobs().await.unwrap(), 5);
}

#[tokio::test]
async fn test_recoverInterruptedJobs_withDeadOwner_shouldFailItsJobs() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("jobs.db");
    let pipeline = TestPipeline::with_repo(
        MockProvider::working(),
        vec![beach_post()],
        test_config(),
        Repository::open(&path).unwrap(),
    );

    // A process that claimed the job, then died without renewing its lease
    let dead = Repository::open(&path).unwrap().with_lease_ttl(Duration::ZERO);
    let job = dead.ensure_job("post-1", "fr").await.unwrap();
    dead.start_run(&job.id, false).await.unwrap();
    drop(dead);

    assert_eq!(pipeline.orchestrator.recover_interrupted_jobs().await.unwrap(), 1);

    let recovered = pipeline.repo.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, JobStatus::Failed);

    // A recovered job can be claimed again
    let outcomes = pipeline
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default())
        .await
        .unwrap();
    assert!(outcomes[0].success);
}

#[tokio::test]
async fn test_recoverInterruptedJobs_withOwnRunningJob_shouldLeaveItAlone() {
    let pipeline = TestPipeline::new(MockProvider::working(), vec![beach_post()]);
    let job = pipeline.repo.ensure_job("post-1", "fr").await.unwrap();
    pipeline.repo.start_run(&job.id, false).await.unwrap();

    assert_eq!(pipeline.orchestrator.recover_interrupted_jobs().await.unwrap(), 0);
    let running = pipeline.repo.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(running.status, JobStatus::InProgress);
}

#[tokio::test]
async fn test_recoverInterruptedJobs_whileAnotherProcessRuns_shouldNotFailIt() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("jobs.db");
    let provider = MockProvider::working().with_latency(Duration::from_millis(200));
    let worker = TestPipeline::with_repo(provider, vec![beach_post()], test_config(), Repository::open(&path).unwrap());
    // A second CLI invocation polling the same store
    let poller = TestPipeline::with_repo(
        MockProvider::working(),
        vec![beach_post()],
        test_config(),
        Repository::open(&path).unwrap(),
    );

    let request = worker
        .orchestrator
        .request_translation("post-1", &["fr"], RequestOptions::default());
    let poll = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let recovered = poller.orchestrator.recover_interrupted_jobs().await.unwrap();
        let view = poller.orchestrator.job_status("post-1", "fr").await.unwrap().unwrap();
        (recovered, view)
    };
    let (outcomes, (recovered, view)) = tokio::join!(request, poll);

    assert_eq!(recovered, 0);
    assert_eq!(view.job.status, JobStatus::InProgress);

    let outcomes = outcomes.unwrap();
    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    let job = poller.repo.find_job("post-1", "fr").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error_message.is_none());
}
