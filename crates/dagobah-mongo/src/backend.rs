//! MongoDB backend.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dagobah_core::app::IdAllocator;
use dagobah_core::domain::Result;
use dagobah_core::{
    Backend, BackendError, Clock, DagobahId, DagobahRecord, IdGenerator, JobId, JobRecord, LogId,
    LogRecord, Record, SystemClock, UlidGenerator,
};
use mongodb::bson::{Bson, Document, doc};
use mongodb::{Client, ClientSession, Collection};
use tracing::{debug, info, warn};

use crate::config::MongoConfig;
use crate::document::{by_id, from_document, referenced_job_ids, to_document};

/// Persists Dagobah, Job and Log documents in three MongoDB collections.
///
/// Handles are bound once in [`MongoBackend::connect`] and shared by every
/// call; nothing is global.
///
/// # Cascade
/// - `use_transactions = false` (default): jobs are deleted one by one, then
///   the Dagobah. Not atomic, but safe to re-run after a failure.
/// - `use_transactions = true`: lookup and deletes run in one transaction.
///   Needs a replica set or sharded cluster.
///
/// # Thread Safety
/// - `Client` is an internally pooled, cheaply shared handle; `MongoBackend`
///   is `Send + Sync` and can serve concurrent calls.
pub struct MongoBackend {
    config: MongoConfig,
    client: Client,
    dagobah_coll: Collection<Document>,
    job_coll: Collection<Document>,
    log_coll: Collection<Document>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,
    allocator: IdAllocator,
}

impl MongoBackend {
    /// Connect and verify the server answers a `ping`.
    ///
    /// An unreachable server fails here with `BackendError::Connection`; there
    /// is no retry.
    pub async fn connect(config: MongoConfig) -> Result<Self> {
        let address = config.address();
        let connection_error = |source: mongodb::error::Error| BackendError::Connection {
            address: address.clone(),
            source: Box::new(source),
        };

        let client = Client::with_uri_str(config.uri())
            .await
            .map_err(connection_error)?;
        client
            .database(&config.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;

        info!(
            address = %address,
            database = %config.database,
            transactions = config.use_transactions,
            "Connected to MongoDB"
        );
        Ok(Self::bind(client, config))
    }

    /// Bind collection handles without contacting the server.
    pub(crate) fn bind(client: Client, config: MongoConfig) -> Self {
        let db = client.database(&config.database);
        Self {
            dagobah_coll: db.collection(&config.collections.dagobah),
            job_coll: db.collection(&config.collections.job),
            log_coll: db.collection(&config.collections.log),
            allocator: IdAllocator::new(config.max_id_attempts),
            clock: Arc::new(SystemClock),
            id_gen: Arc::new(UlidGenerator::new(SystemClock)),
            client,
            config,
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

    /// Configuration the backend was connected with.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    async fn exists(
        coll: &Collection<Document>,
        key: String,
        op: &'static str,
    ) -> Result<bool> {
        let found = coll
            .find_one(by_id(key))
            .await
            .map_err(BackendError::store(op))?;
        Ok(found.is_some())
    }

    /// Whole-document replace keyed by `_id`, inserting when absent.
    async fn upsert<R: Record>(
        &self,
        coll: &Collection<Document>,
        record: &R,
        op: &'static str,
    ) -> Result<()> {
        let key = record.id().key();
        let document = to_document(record, self.clock.now())?;
        coll.replace_one(by_id(key), document)
            .upsert(true)
            .await
            .map_err(BackendError::store(op))?;
        debug!(
            collection = %coll.name(),
            id = %record.id(),
            "Committed document"
        );
        Ok(())
    }

    /// Jobs first, then the Dagobah.
    ///
    /// Each delete is idempotent and the parent goes last, so a cascade cut
    /// short by a failure leaves the Dagobah in place and can simply be
    /// retried. Between the first job delete and the final Dagobah delete a
    /// reader may observe a Dagobah whose jobs are partly gone.
    async fn delete_dagobah_sequential(&self, dagobah_id: DagobahId) -> Result<()> {
        let filter = by_id(dagobah_id.key());
        let dagobah = self
            .dagobah_coll
            .find_one(filter.clone())
            .await
            .map_err(BackendError::store("delete_dagobah"))?
            .ok_or(BackendError::DagobahNotFound(dagobah_id))?;

        let job_ids = referenced_job_ids(&dagobah);
        for job_id in &job_ids {
            self.delete_job_by_key(job_id.clone()).await?;
        }
        self.dagobah_coll
            .delete_one(filter)
            .await
            .map_err(BackendError::store("delete_dagobah"))?;

        debug!(dagobah_id = %dagobah_id, jobs = job_ids.len(), "Deleted dagobah");
        Ok(())
    }

    /// Lookup and deletes inside one transaction. Requires a replica set or
    /// sharded cluster.
    async fn delete_dagobah_transactional(&self, dagobah_id: DagobahId) -> Result<()> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(BackendError::store("start_session"))?;
        session
            .start_transaction()
            .await
            .map_err(BackendError::store("start_transaction"))?;

        match self.cascade_in_session(dagobah_id, &mut session).await {
            Ok(jobs) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(BackendError::store("commit_transaction"))?;
                debug!(dagobah_id = %dagobah_id, jobs, "Deleted dagobah in transaction");
                Ok(())
            }
            Err(err) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(dagobah_id = %dagobah_id, error = %abort, "Failed to abort transaction");
                }
                Err(err)
            }
        }
    }

    async fn cascade_in_session(
        &self,
        dagobah_id: DagobahId,
        session: &mut ClientSession,
    ) -> Result<usize> {
        let filter = by_id(dagobah_id.key());
        let dagobah = self
            .dagobah_coll
            .find_one(filter.clone())
            .session(&mut *session)
            .await
            .map_err(BackendError::store("delete_dagobah"))?
            .ok_or(BackendError::DagobahNotFound(dagobah_id))?;

        let job_ids = referenced_job_ids(&dagobah);
        let jobs = job_ids.len();
        if !job_ids.is_empty() {
            self.job_coll
                .delete_many(doc! { "_id": { "$in": job_ids } })
                .session(&mut *session)
                .await
                .map_err(BackendError::store("delete_job"))?;
        }
        self.dagobah_coll
            .delete_one(filter)
            .session(&mut *session)
            .await
            .map_err(BackendError::store("delete_dagobah"))?;
        Ok(jobs)
    }

    async fn delete_job_by_key(&self, key: impl Into<Bson>) -> Result<()> {
        let result = self
            .job_coll
            .delete_one(by_id(key))
            .await
            .map_err(BackendError::store("delete_job"))?;
        debug!(deleted = result.deleted_count, "Deleted job");
        Ok(())
    }
}

#[async_trait]
impl Backend for MongoBackend {
    async fn get_new_dagobah_id(&self) -> Result<DagobahId> {
        self.allocator
            .allocate(
                || self.id_gen.generate_dagobah_id(),
                |id| Self::exists(&self.dagobah_coll, id.key(), "get_new_dagobah_id"),
            )
            .await
    }

    async fn get_new_job_id(&self) -> Result<JobId> {
        self.allocator
            .allocate(
                || self.id_gen.generate_job_id(),
                |id| Self::exists(&self.job_coll, id.key(), "get_new_job_id"),
            )
            .await
    }

    async fn get_new_log_id(&self) -> Result<LogId> {
        self.allocator
            .allocate(
                || self.id_gen.generate_log_id(),
                |id| Self::exists(&self.log_coll, id.key(), "get_new_log_id"),
            )
            .await
    }

    /// A stored `jobs` entry that is not a mapping fails with `Codec`;
    /// `delete_dagobah` still removes such a document.
    async fn get_dagobah_json(&self, dagobah_id: DagobahId) -> Result<Option<DagobahRecord>> {
        self.dagobah_coll
            .find_one(by_id(dagobah_id.key()))
            .await
            .map_err(BackendError::store("get_dagobah_json"))?
            .map(from_document::<DagobahRecord>)
            .transpose()
    }

    async fn commit_dagobah(&self, record: &DagobahRecord) -> Result<()> {
        self.upsert(&self.dagobah_coll, record, "commit_dagobah")
            .await
    }

    async fn delete_dagobah(&self, dagobah_id: DagobahId) -> Result<()> {
        if self.config.use_transactions {
            self.delete_dagobah_transactional(dagobah_id).await
        } else {
            self.delete_dagobah_sequential(dagobah_id).await
        }
    }

    async fn commit_job(&self, record: &JobRecord) -> Result<()> {
        self.upsert(&self.job_coll, record, "commit_job").await
    }

    async fn delete_job(&self, job_id: JobId) -> Result<()> {
        self.delete_job_by_key(job_id.key()).await
    }

    async fn commit_log(&self, record: &LogRecord) -> Result<()> {
        self.upsert(&self.log_coll, record, "commit_log").await
    }
}

impl fmt::Display for MongoBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<MongoBackend (host: {}, port: {})>",
            self.config.host, self.config.port
        )
    }
}

impl fmt::Debug for MongoBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoBackend")
            .field("config", &self.config)
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}
