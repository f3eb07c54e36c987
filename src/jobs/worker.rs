/*!
 * Background execution of translation jobs.
 *
 * Requests made with `background: true` are claimed up front and pushed
 * onto a bounded queue. A single worker task drains the queue and runs at
 * most `max_concurrent_jobs` jobs at once. Shutting down closes the queue
 * and waits for every queued and running job to finish.
 *
 * While the orchestrator lives, a heartbeat task keeps renewing the lease
 * on every run it owns, so other processes can tell its runs are alive.
 */

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::content::SourceDocument;
use crate::database::repository::Repository;
use crate::errors::JobError;
use crate::language_utils::LanguageCode;

use super::models::OutcomeStatus;
use super::orchestrator::JobRunner;

/// A claimed job waiting for the worker
#[derive(Debug)]
pub(crate) struct QueuedJob {
    pub post: Arc<SourceDocument>,
    pub language: LanguageCode,
    pub job_id: String,
    pub run_id: String,
}

/// Handle to the background worker
#[derive(Debug)]
pub(crate) struct BackgroundQueue {
    /// `None` once shut down
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundQueue {
    /// Spawn the worker on the given runtime
    pub(crate) fn start(handle: &Handle, runner: Arc<JobRunner>, capacity: usize, max_concurrent: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = handle.spawn(worker_loop(runner, receiver, max_concurrent.max(1)));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a job, waiting for room if the queue is full
    pub(crate) async fn enqueue(&self, job: QueuedJob) -> Result<(), JobError> {
        let sender = self.sender.lock().clone().ok_or(JobError::QueueClosed)?;
        debug!("Queuing job {} ({})", job.job_id, job.language);
        sender.send(job).await.map_err(|_| JobError::QueueClosed)
    }

    /// Whether jobs can still be queued
    pub(crate) fn is_open(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Close the queue and wait for the worker to drain it
    pub(crate) async fn shutdown(&self) {
        // The channel closes once in-flight `enqueue` calls drop their clones
        drop(self.sender.lock().take());

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            info!("Waiting for background translation jobs to finish");
            if let Err(e) = worker.await {
                error!("Background worker stopped abnormally: {}", e);
            }
        }
    }
}

async fn worker_loop(runner: Arc<JobRunner>, mut receiver: mpsc::Receiver<QueuedJob>, max_concurrent: usize) {
    let permits = Arc::new(Semaphore::new(max_concurrent));
    let mut running = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let runner = runner.clone();
        running.spawn(async move {
            let _permit = permit;
            let outcome = runner.run_job(&job.post, &job.language, &job.job_id, &job.run_id).await;
            match outcome.status {
                OutcomeStatus::Completed => info!("Background job {} ({}) completed", job.job_id, job.language),
                OutcomeStatus::Failed => warn!(
                    "Background job {} ({}) failed: {}",
                    job.job_id,
                    job.language,
                    outcome.error.unwrap_or_default()
                ),
                _ => debug!("Background job {} ({}) handed over", job.job_id, job.language),
            }
        });

        while let Some(result) = running.try_join_next() {
            report_task(result);
        }
    }

    while let Some(result) = running.join_next().await {
        report_task(result);
    }
    debug!("Background worker stopped");
}

fn report_task(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!("Background job task panicked: {}", e);
    }
}

/// Renews the leases of the runs owned by one repository until stopped
#[derive(Debug)]
pub(crate) struct LeaseHeartbeat {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LeaseHeartbeat {
    /// Renew three times per lease period
    pub(crate) fn start(handle: &Handle, repo: Repository) -> Self {
        let period = (repo.lease_ttl() / 3).max(Duration::from_millis(100));
        let task = handle.spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                match repo.renew_leases().await {
                    Ok(0) => {}
                    Ok(renewed) => debug!("Renewed the lease of {} run(s)", renewed),
                    Err(e) => warn!("Could not renew run leases: {:#}", e),
                }
            }
        });

        Self {
            task: Mutex::new(Some(task)),
        }
    }

    pub(crate) fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for LeaseHeartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
