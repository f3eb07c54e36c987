/*!
 * Job orchestrator.
 *
 * One job exists per (post, language). A request moves each job through
 * `pending -> in_progress -> completed | failed`, either waiting for the
 * result or handing the claimed job to the background worker. Every write
 * made while running is gated on the run's own `run_id`, so a run that was
 * superseded by a regeneration can never overwrite the newer result.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::app_config::Config;
use crate::content::{ContentSource, SourceDocument};
use crate::database::models::{FailureDetails, JobFilter, JobStatus, SeoFields, TranslatedContent, TranslationJob};
use crate::database::repository::Repository;
use crate::errors::{JobError, TranslationError};
use crate::language_utils::LanguageCode;
use crate::slug;
use crate::translation::{join_chunks, Chunk, ContentChunker, FieldBundle, FieldName, TranslationService};

use super::models::{DeletionReport, JobView, LanguageOutcome, RequestOptions};
use super::worker::{BackgroundQueue, LeaseHeartbeat, QueuedJob};

/// Why a run did not produce a complete translation
#[derive(Debug)]
struct RunFailure {
    /// Whatever was translated before the failure
    partial: TranslatedContent,
    error: TranslationError,
}

impl RunFailure {
    fn new(partial: TranslatedContent, error: TranslationError) -> Self {
        Self { partial, error }
    }

    fn details(&self) -> FailureDetails {
        FailureDetails {
            message: self.error.to_string(),
            failed_chunk_index: self.error.failed_chunk_index().map(|i| i as i64),
            attempt_count: self.error.attempt_count().unwrap_or(0) as i64,
        }
    }
}

/// Executes claimed jobs; shared by the synchronous path and the worker
#[derive(Debug)]
pub(crate) struct JobRunner {
    repo: Repository,
    translator: TranslationService,
    chunker: ContentChunker,
    /// Bodies up to this size travel inside the field bundle
    inline_body_max_chars: usize,
    /// Full runs allowed per job, the first one included
    job_runs: u32,
    slug_suffix_limit: u32,
}

impl JobRunner {
    /// Run a claimed job to a terminal state.
    ///
    /// A failed run is rerun in full until `job_runs` is used up. Returns the
    /// outcome to report for the language.
    pub(crate) async fn run_job(
        &self,
        post: &SourceDocument,
        language: &LanguageCode,
        job_id: &str,
        run_id: &str,
    ) -> LanguageOutcome {
        let max_runs = self.job_runs.max(1);

        for run in 1..=max_runs {
            if run > 1 {
                match self.repo.restart_run(job_id, run_id).await {
                    Ok(true) => info!("Rerunning job {} ({}), run {}/{}", job_id, language, run, max_runs),
                    Ok(false) => return self.handed_over(job_id, language).await,
                    Err(e) => return store_failure(language, job_id, e),
                }
            }

            debug!("Running job {} for post {} in '{}'", job_id, post.id, language);
            let failure = match self.execute(post, language).await {
                Ok(content) => return self.finish(post, language, job_id, run_id, content).await,
                Err(failure) => failure,
            };

            let details = failure.details();
            match self.repo.fail_run(job_id, run_id, failure.partial, details).await {
                Ok(true) => {}
                Ok(false) => return self.handed_over(job_id, language).await,
                Err(e) => return store_failure(language, job_id, e),
            }

            if run < max_runs {
                warn!("Job {} ({}) failed on run {}: {}", job_id, language, run, failure.error);
            } else {
                error!("Job {} ({}) failed after {} run(s): {}", job_id, language, run, failure.error);
                return LanguageOutcome::failed(language.as_str(), Some(job_id.to_string()), failure.error.to_string());
            }
        }

        LanguageOutcome::failed(language.as_str(), Some(job_id.to_string()), "No run was attempted")
    }

    /// Translate every field of a post into one language
    async fn execute(&self, post: &SourceDocument, language: &LanguageCode) -> Result<TranslatedContent, RunFailure> {
        let chunks = self.chunker.chunk(&post.content);
        let body_chars = post.content.chars().count();
        let inline_body = chunks.len() <= 1 && body_chars <= self.inline_body_max_chars;
        debug!(
            "Post {} body: {} chars in {} chunk(s) {:?}{}",
            post.id,
            body_chars,
            chunks.len(),
            chunks.iter().map(Chunk::char_len).collect::<Vec<_>>(),
            if inline_body { ", sent with the fields" } else { "" }
        );

        let bundle = FieldBundle::from_document(post, inline_body);
        let mut fields = self
            .translator
            .translate_fields(&bundle, language)
            .await
            .map_err(|e| RunFailure::new(TranslatedContent::default(), e))?;

        let mut content = TranslatedContent {
            title: fields.take(FieldName::Title),
            excerpt: fields.take(FieldName::Excerpt),
            content: fields.take(FieldName::Content),
            seo: SeoFields {
                seo_title: fields.take(FieldName::SeoTitle),
                seo_description: fields.take(FieldName::SeoDescription),
                meta_title: fields.take(FieldName::MetaTitle),
                meta_description: fields.take(FieldName::MetaDescription),
            },
        };

        // Untitled posts keep no title and fall back to the source slug
        if content.title.is_none() && bundle.contains(FieldName::Title) {
            return Err(RunFailure::new(
                content,
                TranslationError::MissingField(FieldName::Title.key().to_string()),
            ));
        }

        if !inline_body && !chunks.is_empty() {
            match self.translator.translate_chunks(&chunks, language).await {
                Ok(translated) => content.content = Some(join_chunks(&translated)),
                Err(partial) => {
                    let prefix = partial.translated_prefix();
                    content.content = (!prefix.is_empty()).then_some(prefix);
                    return Err(RunFailure::new(content, partial.error));
                }
            }
        }

        Ok(content)
    }

    /// Derive the slug from the translated title and store the result
    async fn finish(
        &self,
        post: &SourceDocument,
        language: &LanguageCode,
        job_id: &str,
        run_id: &str,
        content: TranslatedContent,
    ) -> LanguageOutcome {
        let base_slug = slug::translated_slug(content.title.as_deref().unwrap_or_default(), &post.slug);
        let fingerprint = post.fingerprint();

        let stored = self
            .repo
            .complete_run(job_id, run_id, content, &base_slug, &fingerprint, self.slug_suffix_limit)
            .await;

        match stored {
            Ok(Some(job)) => {
                info!(
                    "Job {} ({}) completed with slug '{}'",
                    job.id,
                    language,
                    job.translated_slug.as_deref().unwrap_or_default()
                );
                LanguageOutcome::completed(&job)
            }
            Ok(None) => self.handed_over(job_id, language).await,
            Err(e) => {
                // Slug exhaustion will not resolve itself on a rerun
                let message = match e.downcast_ref::<TranslationError>() {
                    Some(cause) => cause.to_string(),
                    None => format!("Failed to store translation: {:#}", e),
                };
                error!("Job {} ({}): {}", job_id, language, message);
                let details = FailureDetails {
                    message: message.clone(),
                    ..FailureDetails::default()
                };
                if let Err(e) = self.repo.fail_run(job_id, run_id, TranslatedContent::default(), details).await {
                    error!("Could not mark job {} failed: {:#}", job_id, e);
                }
                LanguageOutcome::failed(language.as_str(), Some(job_id.to_string()), message)
            }
        }
    }

    /// Outcome for a run that lost ownership of its job
    async fn handed_over(&self, job_id: &str, language: &LanguageCode) -> LanguageOutcome {
        match self.repo.get_job(job_id).await {
            Ok(Some(_)) => {
                warn!("{}", JobError::Superseded(job_id.to_string()));
                LanguageOutcome::superseded(language.as_str(), job_id)
            }
            Ok(None) => {
                warn!("Job {} ({}) was deleted while running", job_id, language);
                LanguageOutcome::failed(language.as_str(), Some(job_id.to_string()), "Job was deleted while running")
            }
            Err(e) => store_failure(language, job_id, e),
        }
    }
}

fn store_failure(language: &LanguageCode, job_id: &str, e: anyhow::Error) -> LanguageOutcome {
    let error = JobError::from(e);
    error!("Job {} ({}): {}", job_id, language, error);
    LanguageOutcome::failed(language.as_str(), Some(job_id.to_string()), error.to_string())
}

/// What to do for one requested language
enum Plan {
    /// Report without running
    Report(LanguageOutcome),
    /// Claimed for this request
    Run {
        language: LanguageCode,
        job: TranslationJob,
    },
}

/// Entry point for translation requests, deletions and status reads
pub struct JobOrchestrator {
    runner: Arc<JobRunner>,
    content: Arc<dyn ContentSource>,
    queue: BackgroundQueue,
    heartbeat: LeaseHeartbeat,
    max_concurrent_jobs: usize,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("provider", &self.runner.translator.provider().name())
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("queue_open", &self.queue.is_open())
            .finish()
    }
}

impl JobOrchestrator {
    /// Create an orchestrator and start its background worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        repo: Repository,
        content: Arc<dyn ContentSource>,
        translator: TranslationService,
        config: &Config,
    ) -> Result<Self, JobError> {
        let handle = Handle::try_current().map_err(|e| JobError::Runtime(e.to_string()))?;
        let retry = &translator.options.retry;
        info!(
            "Retry budget: {} attempt(s) per call, {} run(s) per job, at most {} calls per field",
            retry.attempts_per_call,
            retry.job_runs,
            retry.max_calls_per_unit()
        );

        let repo = repo.with_lease_ttl(config.jobs.run_lease());
        let heartbeat = LeaseHeartbeat::start(&handle, repo.clone());

        let runner = Arc::new(JobRunner {
            repo,
            job_runs: retry.job_runs,
            chunker: ContentChunker::new(config.chunking.clone()),
            inline_body_max_chars: config.chunking.inline_body_max_chars,
            slug_suffix_limit: config.jobs.slug_suffix_limit,
            translator,
        });

        let max_concurrent_jobs = config.jobs.max_concurrent_jobs.max(1);
        let queue = BackgroundQueue::start(&handle, runner.clone(), config.jobs.queue_capacity, max_concurrent_jobs);

        Ok(Self {
            runner,
            content,
            queue,
            heartbeat,
            max_concurrent_jobs,
        })
    }

    /// The job-record store
    pub fn repository(&self) -> &Repository {
        &self.runner.repo
    }

    /// Request translations of a post.
    ///
    /// Returns one outcome per distinct requested language, in request
    /// order. In background mode claimed jobs are reported `in_progress`
    /// and finish on the worker.
    pub async fn request_translation<S: AsRef<str>>(
        &self,
        post_id: &str,
        languages: &[S],
        options: RequestOptions,
    ) -> Result<Vec<LanguageOutcome>, JobError> {
        let post = self
            .content
            .get_post(post_id)
            .await?
            .ok_or_else(|| JobError::PostNotFound(post_id.to_string()))?;
        let post = Arc::new(post);

        let mut seen = HashSet::new();
        let mut plans = Vec::new();
        for requested in languages {
            let requested = requested.as_ref().trim();
            let language = match LanguageCode::parse(requested) {
                Ok(language) => language,
                Err(_) => {
                    warn!("Rejecting invalid language code '{}'", requested);
                    let error = JobError::InvalidLanguage(requested.to_string());
                    if seen.insert(requested.to_lowercase()) {
                        plans.push(Plan::Report(LanguageOutcome::failed(requested, None, error.to_string())));
                    }
                    continue;
                }
            };
            if language == self.runner.translator.options.source_language {
                debug!("Requested language '{}' is the source language", language);
            }
            if !seen.insert(language.to_string()) {
                continue;
            }
            // Jobs claimed for earlier languages still run when this one fails
            let plan = match self.prepare(&post, language.clone(), options.regenerate).await {
                Ok(plan) => plan,
                Err(e) => {
                    error!("Could not prepare post {} in '{}': {}", post.id, language, e);
                    Plan::Report(LanguageOutcome::failed(language.as_str(), None, e.to_string()))
                }
            };
            plans.push(plan);
        }

        if options.background {
            let mut outcomes = Vec::with_capacity(plans.len());
            for plan in plans {
                outcomes.push(match plan {
                    Plan::Report(outcome) => outcome,
                    Plan::Run { language, job } => self.enqueue(post.clone(), language, job).await,
                });
            }
            return Ok(outcomes);
        }

        let runner = &self.runner;
        let post = post.as_ref();
        let mut indexed: Vec<(usize, LanguageOutcome)> = stream::iter(plans.into_iter().enumerate())
            .map(|(position, plan)| async move {
                let outcome = match plan {
                    Plan::Report(outcome) => outcome,
                    Plan::Run { language, job } => {
                        let run_id = job.run_id.unwrap_or_default();
                        runner.run_job(post, &language, &job.id, &run_id).await
                    }
                };
                (position, outcome)
            })
            .buffer_unordered(self.max_concurrent_jobs)
            .collect()
            .await;

        indexed.sort_by_key(|(position, _)| *position);
        Ok(indexed.into_iter().map(|(_, outcome)| outcome).collect())
    }

    /// Decide what to do for one language and claim the job if needed
    async fn prepare(&self, post: &SourceDocument, language: LanguageCode, regenerate: bool) -> Result<Plan, JobError> {
        let repo = &self.runner.repo;

        if !regenerate {
            if let Some(existing) = repo.find_job(&post.id, language.as_str()).await? {
                match existing.status {
                    JobStatus::Completed => {
                        debug!("Job {} ({}) already completed", existing.id, language);
                        return Ok(Plan::Report(LanguageOutcome::exists(&existing)));
                    }
                    JobStatus::InProgress => {
                        debug!("Job {} ({}) already running", existing.id, language);
                        return Ok(Plan::Report(LanguageOutcome::in_progress(&existing)));
                    }
                    JobStatus::Pending | JobStatus::Failed => {}
                }
            }
        }

        let job = repo.ensure_job(&post.id, language.as_str()).await?;
        match repo.start_run(&job.id, regenerate).await? {
            Some(claimed) => {
                info!(
                    "Claimed job {} for post {} in '{}'{}",
                    claimed.id,
                    post.id,
                    language,
                    if regenerate { " (regenerate)" } else { "" }
                );
                Ok(Plan::Run { language, job: claimed })
            }
            None => {
                // Another request claimed or finished it in between
                let current = repo.get_job(&job.id).await?.unwrap_or(job);
                debug!("Job {} ({}) is {}, not claiming it", current.id, language, current.status);
                let outcome = match current.status {
                    JobStatus::Completed => LanguageOutcome::exists(&current),
                    _ => LanguageOutcome::in_progress(&current),
                };
                Ok(Plan::Report(outcome))
            }
        }
    }

    async fn enqueue(&self, post: Arc<SourceDocument>, language: LanguageCode, job: TranslationJob) -> LanguageOutcome {
        let run_id = job.run_id.clone().unwrap_or_default();
        let queued = QueuedJob {
            post,
            language: language.clone(),
            job_id: job.id.clone(),
            run_id: run_id.clone(),
        };

        match self.queue.enqueue(queued).await {
            Ok(()) => LanguageOutcome::in_progress(&job),
            Err(e) => {
                warn!("Could not queue job {} ({}): {}", job.id, language, e);
                let details = FailureDetails {
                    message: e.to_string(),
                    ..FailureDetails::default()
                };
                if let Err(store_error) = self
                    .runner
                    .repo
                    .fail_run(&job.id, &run_id, TranslatedContent::default(), details)
                    .await
                {
                    error!("Could not mark job {} failed: {:#}", job.id, store_error);
                }
                LanguageOutcome::failed(language.as_str(), Some(job.id), e.to_string())
            }
        }
    }

    /// Delete the jobs matching a filter
    pub async fn delete_translation(&self, filter: JobFilter) -> Result<DeletionReport, JobError> {
        validate_filter(&filter)?;
        let deleted = self.runner.repo.delete_jobs(&filter).await?;
        info!("Deleted {} translation(s)", deleted.len());
        Ok(DeletionReport::from_jobs(deleted))
    }

    /// The jobs a deletion with this filter would remove, without removing them
    pub async fn preview_deletion(&self, filter: &JobFilter) -> Result<Vec<TranslationJob>, JobError> {
        validate_filter(filter)?;
        Ok(self.runner.repo.list_jobs(filter).await?)
    }

    /// Current state of one job
    pub async fn job_status(&self, post_id: &str, language: &str) -> Result<Option<JobView>, JobError> {
        let language = LanguageCode::parse(language).map_err(|_| JobError::InvalidLanguage(language.to_string()))?;
        let Some(job) = self.runner.repo.find_job(post_id, language.as_str()).await? else {
            return Ok(None);
        };
        let fingerprint = self.current_fingerprint(post_id).await?;
        Ok(Some(JobView::new(job, fingerprint.as_deref())))
    }

    /// Every job of a post
    pub async fn list_jobs(&self, post_id: &str) -> Result<Vec<JobView>, JobError> {
        let jobs = self.runner.repo.list_jobs(&JobFilter::post(post_id)).await?;
        let fingerprint = self.current_fingerprint(post_id).await?;
        Ok(jobs
            .into_iter()
            .map(|job| JobView::new(job, fingerprint.as_deref()))
            .collect())
    }

    async fn current_fingerprint(&self, post_id: &str) -> Result<Option<String>, JobError> {
        Ok(self.content.get_post(post_id).await?.map(|post| post.fingerprint()))
    }

    /// Fail jobs left in progress by a process that stopped renewing them.
    ///
    /// Runs of this orchestrator and of any other live one keep their lease
    /// and are left alone.
    pub async fn recover_interrupted_jobs(&self) -> Result<usize, JobError> {
        Ok(self.runner.repo.fail_interrupted_runs().await?)
    }

    /// Stop accepting background jobs and wait for queued ones to finish
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        self.heartbeat.stop();
    }
}

fn validate_filter(filter: &JobFilter) -> Result<(), JobError> {
    let blank = |value: &str| value.trim().is_empty();
    match filter {
        JobFilter::All { delete_all: false } => Err(JobError::InvalidFilter("deleteAll must be true".to_string())),
        JobFilter::Id { translation_id } if blank(translation_id) => {
            Err(JobError::InvalidFilter("translationId is empty".to_string()))
        }
        JobFilter::Post { post_id } | JobFilter::PostLanguage { post_id, .. } if blank(post_id) => {
            Err(JobError::InvalidFilter("postId is empty".to_string()))
        }
        JobFilter::PostLanguage { language_code, .. } if blank(language_code) => {
            Err(JobError::InvalidFilter("languageCode is empty".to_string()))
        }
        _ => Ok(()),
    }
}
