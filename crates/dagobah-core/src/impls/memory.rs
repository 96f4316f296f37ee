//! In-memory backend.
//!
//! Same observable contract as the MongoDB backend: stamped last-write-wins
//! upserts, jobs cascade with their Dagobah, logs are never cascaded. All
//! three maps sit behind one lock, so the cascade is atomic here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::app::IdAllocator;
use crate::domain::{
    BackendError, DagobahId, DagobahRecord, JobId, JobRecord, LogId, LogRecord, Record, Result,
};
use crate::ports::{Backend, Clock, IdGenerator, SystemClock, UlidGenerator};

/// Number of stored documents per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub dagobahs: usize,
    pub jobs: usize,
    pub logs: usize,
}

#[derive(Default)]
struct InMemoryState {
    dagobahs: HashMap<DagobahId, DagobahRecord>,
    jobs: HashMap<JobId, JobRecord>,
    logs: HashMap<LogId, LogRecord>,
}

/// `Backend` kept entirely in process memory.
///
/// Used by tests and by the CLI's `--memory` mode. Contents are lost on drop.
///
/// # Thread Safety
/// - One `tokio::sync::Mutex` guards all three maps; every operation holds it
///   for its whole duration, so each call (the cascade included) is atomic.
/// - `Send + Sync`; share it behind an `Arc` across tasks.
pub struct InMemoryBackend {
    state: Arc<Mutex<InMemoryState>>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,
    allocator: IdAllocator,
}

impl InMemoryBackend {
    /// Empty store using the system clock and random ULIDs.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState::default())),
            clock: Arc::new(SystemClock),
            id_gen: Arc::new(UlidGenerator::new(SystemClock)),
            allocator: IdAllocator::default(),
        }
    }

    /// Stamp `save_date` from `clock` instead of the system time.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Draw id candidates from `id_gen`.
    pub fn with_id_generator(mut self, id_gen: impl IdGenerator + 'static) -> Self {
        self.id_gen = Arc::new(id_gen);
        self
    }

    /// Bound on candidates tried per `get_new_*_id` call (at least one).
    pub fn with_max_id_attempts(mut self, max_attempts: u32) -> Self {
        self.allocator = IdAllocator::new(max_attempts);
        self
    }

    /// Stored job, if any. Inspection helper outside the `Backend` port.
    pub async fn job(&self, job_id: JobId) -> Option<JobRecord> {
        self.state.lock().await.jobs.get(&job_id).cloned()
    }

    /// Stored log, if any.
    pub async fn log(&self, log_id: LogId) -> Option<LogRecord> {
        self.state.lock().await.logs.get(&log_id).cloned()
    }

    /// Document count per collection.
    pub async fn counts(&self) -> StoreCounts {
        let state = self.state.lock().await;
        StoreCounts {
            dagobahs: state.dagobahs.len(),
            jobs: state.jobs.len(),
            logs: state.logs.len(),
        }
    }

    fn stamped<R: Record>(&self, record: &R) -> R {
        let mut record = record.clone();
        record.stamp(self.clock.now());
        record
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn get_new_dagobah_id(&self) -> Result<DagobahId> {
        self.allocator
            .allocate(
                || self.id_gen.generate_dagobah_id(),
                |id| async move { Ok(self.state.lock().await.dagobahs.contains_key(&id)) },
            )
            .await
    }

    async fn get_new_job_id(&self) -> Result<JobId> {
        self.allocator
            .allocate(
                || self.id_gen.generate_job_id(),
                |id| async move { Ok(self.state.lock().await.jobs.contains_key(&id)) },
            )
            .await
    }

    async fn get_new_log_id(&self) -> Result<LogId> {
        self.allocator
            .allocate(
                || self.id_gen.generate_log_id(),
                |id| async move { Ok(self.state.lock().await.logs.contains_key(&id)) },
            )
            .await
    }

    async fn get_dagobah_json(&self, dagobah_id: DagobahId) -> Result<Option<DagobahRecord>> {
        Ok(self.state.lock().await.dagobahs.get(&dagobah_id).cloned())
    }

    async fn commit_dagobah(&self, record: &DagobahRecord) -> Result<()> {
        let record = self.stamped(record);
        debug!(dagobah_id = %record.dagobah_id, "Committed dagobah");
        self.state
            .lock()
            .await
            .dagobahs
            .insert(record.dagobah_id, record);
        Ok(())
    }

    async fn delete_dagobah(&self, dagobah_id: DagobahId) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .dagobahs
            .remove(&dagobah_id)
            .ok_or(BackendError::DagobahNotFound(dagobah_id))?;

        for job_id in record.job_ids() {
            state.jobs.remove(&job_id);
        }

        debug!(dagobah_id = %dagobah_id, jobs = record.jobs.len(), "Deleted dagobah");
        Ok(())
    }

    async fn commit_job(&self, record: &JobRecord) -> Result<()> {
        let record = self.stamped(record);
        debug!(job_id = %record.job_id, "Committed job");
        self.state.lock().await.jobs.insert(record.job_id, record);
        Ok(())
    }

    async fn delete_job(&self, job_id: JobId) -> Result<()> {
        let removed = self.state.lock().await.jobs.remove(&job_id).is_some();
        debug!(job_id = %job_id, removed, "Deleted job");
        Ok(())
    }

    async fn commit_log(&self, record: &LogRecord) -> Result<()> {
        let record = self.stamped(record);
        debug!(log_id = %record.log_id, "Committed log");
        self.state.lock().await.logs.insert(record.log_id, record);
        Ok(())
    }
}
