/*!
 * Translation job orchestration.
 *
 * - `orchestrator`: request handling, the per-job state machine, deletion
 * - `worker`: the background queue and its worker task
 * - `models`: request options and reported outcomes
 */

pub mod models;
pub mod orchestrator;
mod worker;

pub use models::{DeletedTranslation, DeletionReport, JobView, LanguageOutcome, OutcomeStatus, RequestOptions};
pub use orchestrator::JobOrchestrator;
