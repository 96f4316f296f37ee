//! Persisted records: Dagobah, Job and Log documents.
//!
//! Each record names the fields the persistence layer relies on (its id,
//! `save_date`, and for a Dagobah the `jobs` list) and keeps every other
//! orchestrator-defined field in a flattened `extra` map, so unknown fields
//! survive a commit/read cycle untouched.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{BackendError, Result};
use super::ids::{DagobahId, Id, IdMarker, JobId, LogId};

/// Common behaviour of the three record kinds.
///
/// Backends are written once against this trait: they read the id to build the
/// storage key, stamp `save_date` on commit, and use `kind()` in errors and
/// log fields.
///
/// # Implementors
/// - **DagobahRecord**: `dagobah_id`, `jobs`
/// - **JobRecord**: `job_id`
/// - **LogRecord**: `log_id`
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Marker of the record's id type.
    type Marker: IdMarker;

    /// Name of the identifier field in the orchestrator's JSON.
    const ID_FIELD: &'static str;

    /// Identifier; the storage key is `id().key()`.
    fn id(&self) -> Id<Self::Marker>;

    /// Time of the last commit, `None` for a record that was never stored.
    fn save_date(&self) -> Option<DateTime<Utc>>;

    /// Overwrite `save_date`.
    fn stamp(&mut self, at: DateTime<Utc>);

    /// `"dagobah"`, `"job"` or `"log"`.
    fn kind() -> &'static str {
        <Self::Marker as IdMarker>::kind()
    }

    /// Parse the orchestrator's JSON mapping.
    ///
    /// A missing or null id field is reported as `MissingField`, anything else
    /// that does not fit the record shape as `Malformed`.
    ///
    /// `_id` and `save_date` are dropped whatever their shape: backends derive
    /// the former from the id field and stamp the latter on every commit.
    fn from_json(mut value: Value) -> Result<Self> {
        if let Some(object) = value.as_object_mut() {
            if object.get(Self::ID_FIELD).is_none_or(Value::is_null) {
                return Err(BackendError::MissingField(Self::ID_FIELD));
            }
            object.remove("_id");
            object.remove("save_date");
        }
        serde_json::from_value(value).map_err(|source| BackendError::Malformed {
            kind: Self::kind(),
            source,
        })
    }

    /// The record as the orchestrator's JSON mapping, `extra` fields inlined.
    fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|source| BackendError::Malformed {
            kind: Self::kind(),
            source,
        })
    }
}

// ========================================
// Dagobah
// ========================================

/// Top-level orchestrator state.
///
/// Only `dagobah_id` and `jobs` matter to persistence; `jobs` drives the
/// cascade in `Backend::delete_dagobah`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagobahRecord {
    pub dagobah_id: DagobahId,

    /// Jobs owned by this Dagobah. Entries without a `job_id` are kept but
    /// never cascaded.
    #[serde(default)]
    pub jobs: Vec<JobRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_date: Option<DateTime<Utc>>,

    /// Every other field, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DagobahRecord {
    /// Empty Dagobah: no jobs, no extra fields, never saved.
    pub fn new(dagobah_id: DagobahId) -> Self {
        Self {
            dagobah_id,
            jobs: Vec::new(),
            save_date: None,
            extra: Map::new(),
        }
    }

    /// Append an entry to `jobs`.
    pub fn with_job(mut self, job: JobRef) -> Self {
        self.jobs.push(job);
        self
    }

    /// Set an `extra` field, replacing any previous value.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Ids of every referenced job, in list order.
    pub fn job_ids(&self) -> impl Iterator<Item = JobId> + '_ {
        self.jobs.iter().filter_map(|job| job.job_id)
    }
}

impl Record for DagobahRecord {
    type Marker = super::ids::Dagobah;
    const ID_FIELD: &'static str = "dagobah_id";

    fn id(&self) -> DagobahId {
        self.dagobah_id
    }

    fn save_date(&self) -> Option<DateTime<Utc>> {
        self.save_date
    }

    fn stamp(&mut self, at: DateTime<Utc>) {
        self.save_date = Some(at);
    }
}

/// One entry of a Dagobah's `jobs` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobRef {
    /// Entry referencing `job_id`.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id: Some(job_id),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

// ========================================
// Job
// ========================================

/// Task-graph definition owned by a Dagobah. Everything but the id is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_date: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobRecord {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            save_date: None,
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl Record for JobRecord {
    type Marker = super::ids::Job;
    const ID_FIELD: &'static str = "job_id";

    fn id(&self) -> JobId {
        self.job_id
    }

    fn save_date(&self) -> Option<DateTime<Utc>> {
        self.save_date
    }

    fn stamp(&mut self, at: DateTime<Utc>) {
        self.save_date = Some(at);
    }
}

// ========================================
// Log
// ========================================

/// One execution record of a job. Never removed by the Dagobah cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub log_id: LogId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_date: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogRecord {
    pub fn new(log_id: LogId) -> Self {
        Self {
            log_id,
            save_date: None,
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl Record for LogRecord {
    type Marker = super::ids::Log;
    const ID_FIELD: &'static str = "log_id";

    fn id(&self) -> LogId {
        self.log_id
    }

    fn save_date(&self) -> Option<DateTime<Utc>> {
        self.save_date
    }

    fn stamp(&mut self, at: DateTime<Utc>) {
        self.save_date = Some(at);
    }
}
