/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for translation job records,
 * abstracting away the SQL details and providing type-safe access.
 *
 * Every write made on behalf of a run is gated on the job being
 * `in_progress` under that run's `run_id`. A run that has been superseded
 * by a regeneration therefore cannot overwrite the newer run's state.
 *
 * Each repository instance also owns the runs it claims under a lease that
 * its orchestrator keeps renewing. Only runs whose lease ran out are treated
 * as interrupted.
 */

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::connection::{DatabaseConnection, DatabaseStats};
use super::models::{FailureDetails, JobFilter, JobStatus, TranslatedContent, TranslationJob};
use crate::slug;

const JOB_COLUMNS: &str = "id, post_id, language_code, status, run_id, \
    translated_title, translated_excerpt, translated_content, translated_slug, \
    seo_title, seo_description, meta_title, meta_description, \
    source_hash, error_message, failed_chunk_index, attempt_count, run_count, \
    created_at, updated_at, completed_at";

/// How long a claimed run stays owned without renewal
pub const DEFAULT_RUN_LEASE: Duration = Duration::from_secs(120);

/// Current time with enough precision to order consecutive updates
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Timestamps share one UTC format, so they compare as strings
fn now_plus(ttl: Duration) -> String {
    let ttl = chrono::Duration::milliseconds(ttl.as_millis().min(i64::MAX as u128) as i64);
    (Utc::now() + ttl).to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_job(row: &Row) -> rusqlite::Result<TranslationJob> {
    let status: String = row.get(3)?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;

    Ok(TranslationJob {
        id: row.get(0)?,
        post_id: row.get(1)?,
        language_code: row.get(2)?,
        status,
        run_id: row.get(4)?,
        translated_title: row.get(5)?,
        translated_excerpt: row.get(6)?,
        translated_content: row.get(7)?,
        translated_slug: row.get(8)?,
        seo: super::models::SeoFields {
            seo_title: row.get(9)?,
            seo_description: row.get(10)?,
            meta_title: row.get(11)?,
            meta_description: row.get(12)?,
        },
        source_hash: row.get(13)?,
        error_message: row.get(14)?,
        failed_chunk_index: row.get(15)?,
        attempt_count: row.get(16)?,
        run_count: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        completed_at: row.get(20)?,
    })
}

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
    /// Recorded on every run this instance claims
    owner: Arc<str>,
    lease_ttl: Duration,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.db.path())
            .field("owner", &self.owner)
            .field("lease_ttl", &self.lease_ttl)
            .finish()
    }
}

impl Repository {
    /// Create a new repository with the given database connection.
    ///
    /// Every instance gets its own owner id; clones share it.
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            owner: Uuid::new_v4().to_string().into(),
            lease_ttl: DEFAULT_RUN_LEASE,
        }
    }

    /// Set how long a claimed run stays owned without renewal
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Owner id recorded on the runs this instance claims
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Lease length applied to claimed runs
    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new(path)?))
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Job counts per status and the database file size
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.stats())
            .await
            .context("Database task panicked")?
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn get_job_sync(conn: &Connection, id: &str) -> Result<Option<TranslationJob>> {
        let sql = format!("SELECT {} FROM translations WHERE id = ?1", JOB_COLUMNS);
        Ok(conn.query_row(&sql, [id], row_to_job).optional()?)
    }

    fn list_jobs_sync(conn: &Connection, filter: &JobFilter) -> Result<Vec<TranslationJob>> {
        let (condition, values) = filter.to_sql();
        let sql = format!(
            "SELECT {} FROM translations WHERE {} ORDER BY post_id, language_code",
            JOB_COLUMNS, condition
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params_from_iter(values.iter()), row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn slug_taken_sync(conn: &Connection, language_code: &str, slug: &str, excluding_id: &str) -> Result<bool> {
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM translations WHERE language_code = ?1 AND translated_slug = ?2 AND id != ?3)",
            params![language_code, slug, excluding_id],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: &str) -> Result<Option<TranslationJob>> {
        let id = id.to_string();
        self.db.execute_async(move |conn| Self::get_job_sync(conn, &id)).await
    }

    /// Get the job for a post in one language
    pub async fn find_job(&self, post_id: &str, language_code: &str) -> Result<Option<TranslationJob>> {
        let filter = JobFilter::post_language(post_id, language_code);
        let jobs = self.list_jobs(&filter).await?;
        Ok(jobs.into_iter().next())
    }

    /// List the jobs matching a filter, ordered by post and language
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<TranslationJob>> {
        let filter = filter.clone();
        self.db.execute_async(move |conn| Self::list_jobs_sync(conn, &filter)).await
    }

    /// Whether a slug is used by another job in the same language
    pub async fn slug_taken(&self, language_code: &str, slug: &str) -> Result<bool> {
        let language_code = language_code.to_string();
        let slug = slug.to_string();
        self.db
            .execute_async(move |conn| Self::slug_taken_sync(conn, &language_code, &slug, ""))
            .await
    }

    /// Total number of job records
    pub async fn count_jobs(&self) -> Result<i64> {
        self.db
            .execute_async(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM translations", [], |row| row.get(0))?))
            .await
    }

    // =========================================================================
    // Run lifecycle
    // =========================================================================

    /// Get the job for a post and language, creating a pending one if absent
    pub async fn ensure_job(&self, post_id: &str, language_code: &str) -> Result<TranslationJob> {
        let post_id = post_id.to_string();
        let language_code = language_code.to_string();

        self.db
            .execute_async(move |conn| {
                let timestamp = now();
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO translations (id, post_id, language_code, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
                    params![Uuid::new_v4().to_string(), post_id, language_code, timestamp],
                )?;
                if inserted > 0 {
                    debug!("Created pending job for post {} in '{}'", post_id, language_code);
                }

                let filter = JobFilter::post_language(post_id.as_str(), language_code.as_str());
                Self::list_jobs_sync(conn, &filter)?
                    .into_iter()
                    .next()
                    .context("Job disappeared right after creation")
            })
            .await
    }

    /// Claim a job for a new run.
    ///
    /// Pending and failed jobs can always be claimed; completed and
    /// in-progress ones only when `regenerate` is set, which supersedes any
    /// run still in flight. Returns `None` when the job is not claimable.
    pub async fn start_run(&self, id: &str, regenerate: bool) -> Result<Option<TranslationJob>> {
        let id = id.to_string();
        let run_id = Uuid::new_v4().to_string();
        let owner = self.owner.clone();
        let lease = now_plus(self.lease_ttl);
        let allowed = if regenerate {
            "status IN ('pending', 'failed', 'completed', 'in_progress')"
        } else {
            "status IN ('pending', 'failed')"
        };

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "UPDATE translations
                     SET status = 'in_progress', run_id = ?2, run_count = run_count + 1,
                         error_message = NULL, failed_chunk_index = NULL, attempt_count = 0,
                         run_owner = ?4, lease_expires_at = ?5, updated_at = ?3
                     WHERE id = ?1 AND {}",
                    allowed
                );
                let changed = conn.execute(&sql, params![id, run_id, now(), &*owner, lease])?;
                if changed == 0 {
                    return Ok(None);
                }
                Self::get_job_sync(conn, &id)
            })
            .await
    }

    /// Move a failed run back to in-progress for an automatic rerun.
    ///
    /// Returns false when another run took the job in the meantime.
    pub async fn restart_run(&self, id: &str, run_id: &str) -> Result<bool> {
        let id = id.to_string();
        let run_id = run_id.to_string();
        let owner = self.owner.clone();
        let lease = now_plus(self.lease_ttl);

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    "UPDATE translations
                     SET status = 'in_progress', run_count = run_count + 1,
                         run_owner = ?4, lease_expires_at = ?5, updated_at = ?3
                     WHERE id = ?1 AND run_id = ?2 AND status = 'failed'",
                    params![id, run_id, now(), &*owner, lease],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    /// Store the result of a successful run and mark the job completed.
    ///
    /// The slug is made unique within the language inside the same
    /// transaction, by appending `-1`, `-2`, ... to `base_slug`. Returns
    /// `None` when the run no longer owns the job.
    pub async fn complete_run(
        &self,
        id: &str,
        run_id: &str,
        content: TranslatedContent,
        base_slug: &str,
        source_hash: &str,
        slug_suffix_limit: u32,
    ) -> Result<Option<TranslationJob>> {
        let id = id.to_string();
        let run_id = run_id.to_string();
        let base_slug = base_slug.to_string();
        let source_hash = source_hash.to_string();

        self.db
            .transaction_async(move |tx| {
                let language_code: Option<String> = tx
                    .query_row(
                        "SELECT language_code FROM translations WHERE id = ?1 AND run_id = ?2 AND status = 'in_progress'",
                        params![id, run_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(language_code) = language_code else {
                    return Ok(None);
                };

                let slug = slug::resolve_unique(&base_slug, slug_suffix_limit, |candidate| {
                    Self::slug_taken_sync(tx, &language_code, candidate, &id)
                })?;

                let timestamp = now();
                tx.execute(
                    "UPDATE translations
                     SET status = 'completed',
                         translated_title = ?3, translated_excerpt = ?4, translated_content = ?5,
                         translated_slug = ?6, seo_title = ?7, seo_description = ?8,
                         meta_title = ?9, meta_description = ?10, source_hash = ?11,
                         error_message = NULL, failed_chunk_index = NULL, lease_expires_at = NULL,
                         updated_at = ?12, completed_at = ?12
                     WHERE id = ?1 AND run_id = ?2",
                    params![
                        id,
                        run_id,
                        content.title,
                        content.excerpt,
                        content.content,
                        slug,
                        content.seo.seo_title,
                        content.seo.seo_description,
                        content.seo.meta_title,
                        content.seo.meta_description,
                        source_hash,
                        timestamp,
                    ],
                )?;

                Self::get_job_sync(tx, &id)
            })
            .await
    }

    /// Mark a run failed, keeping whatever this run translated.
    ///
    /// Output of earlier runs is replaced, so a failed regeneration never
    /// mixes old and new fields. Returns false when the run no longer owns
    /// the job.
    pub async fn fail_run(
        &self,
        id: &str,
        run_id: &str,
        partial: TranslatedContent,
        failure: FailureDetails,
    ) -> Result<bool> {
        let id = id.to_string();
        let run_id = run_id.to_string();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    "UPDATE translations
                     SET status = 'failed',
                         translated_title = ?3, translated_excerpt = ?4, translated_content = ?5,
                         seo_title = ?6, seo_description = ?7, meta_title = ?8, meta_description = ?9,
                         translated_slug = NULL, source_hash = NULL, completed_at = NULL,
                         error_message = ?10, failed_chunk_index = ?11, attempt_count = ?12,
                         lease_expires_at = NULL, updated_at = ?13
                     WHERE id = ?1 AND run_id = ?2 AND status = 'in_progress'",
                    params![
                        id,
                        run_id,
                        partial.title,
                        partial.excerpt,
                        partial.content,
                        partial.seo.seo_title,
                        partial.seo.seo_description,
                        partial.seo.meta_title,
                        partial.seo.meta_description,
                        failure.message,
                        failure.failed_chunk_index,
                        failure.attempt_count,
                        now(),
                    ],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    /// Extend the lease of every run this instance still has in progress
    pub async fn renew_leases(&self) -> Result<usize> {
        let owner = self.owner.clone();
        let lease = now_plus(self.lease_ttl);

        self.db
            .execute_async(move |conn| {
                Ok(conn.execute(
                    "UPDATE translations SET lease_expires_at = ?2
                     WHERE status = 'in_progress' AND run_owner = ?1",
                    params![&*owner, lease],
                )?)
            })
            .await
    }

    /// Fail the in-progress jobs whose owner stopped renewing their lease.
    ///
    /// Runs owned by this instance are never touched, and neither are runs
    /// another live process keeps renewing.
    pub async fn fail_interrupted_runs(&self) -> Result<usize> {
        let owner = self.owner.clone();
        let changed = self
            .db
            .execute_async(move |conn| {
                Ok(conn.execute(
                    "UPDATE translations
                     SET status = 'failed', error_message = 'Interrupted before completion',
                         lease_expires_at = NULL, updated_at = ?1
                     WHERE status = 'in_progress'
                       AND (run_owner IS NULL OR run_owner != ?2)
                       AND (lease_expires_at IS NULL OR lease_expires_at <= ?1)",
                    params![now(), &*owner],
                )?)
            })
            .await?;

        if changed > 0 {
            info!("Marked {} interrupted job(s) as failed", changed);
        }
        Ok(changed)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete the jobs matching a filter and return them
    pub async fn delete_jobs(&self, filter: &JobFilter) -> Result<Vec<TranslationJob>> {
        let filter = filter.clone();

        self.db
            .transaction_async(move |tx| {
                let jobs = Self::list_jobs_sync(tx, &filter)?;
                let (condition, values) = filter.to_sql();
                let sql = format!("DELETE FROM translations WHERE {}", condition);
                let deleted = tx.execute(&sql, params_from_iter(values.iter()))?;
                debug!("Deleted {} job record(s)", deleted);
                Ok(jobs)
            })
            .await
    }
}
