//! Backend port - where Dagobah, Job and Log documents are persisted.

use async_trait::async_trait;

use crate::domain::{DagobahId, DagobahRecord, JobId, JobRecord, LogId, LogRecord, Result};

/// Persistence interface used by the orchestrator.
///
/// Every method is one independent request/response exchange with the store.
/// Commits stamp `save_date` and replace the whole stored document keyed by
/// the record id (last write wins).
#[async_trait]
pub trait Backend: Send + Sync {
    /// A Dagobah id not present in the dagobah collection.
    async fn get_new_dagobah_id(&self) -> Result<DagobahId>;

    /// A Job id not present in the job collection.
    async fn get_new_job_id(&self) -> Result<JobId>;

    /// A Log id not present in the log collection.
    async fn get_new_log_id(&self) -> Result<LogId>;

    /// The stored Dagobah, or `None` if it was never committed.
    async fn get_dagobah_json(&self, dagobah_id: DagobahId) -> Result<Option<DagobahRecord>>;

    async fn commit_dagobah(&self, record: &DagobahRecord) -> Result<()>;

    /// Delete the Dagobah and every Job its `jobs` list references.
    ///
    /// Logs are kept. Fails with `DagobahNotFound` when no such Dagobah is
    /// stored.
    async fn delete_dagobah(&self, dagobah_id: DagobahId) -> Result<()>;

    async fn commit_job(&self, record: &JobRecord) -> Result<()>;

    /// Remove a Job. Deleting an unknown id is a no-op.
    async fn delete_job(&self, job_id: JobId) -> Result<()>;

    async fn commit_log(&self, record: &LogRecord) -> Result<()>;
}
