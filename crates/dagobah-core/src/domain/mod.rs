//! Domain model (ids, records, errors).

pub mod errors;
pub mod ids;
pub mod record;

pub use errors::{BackendError, BoxError, Result};
pub use ids::{DagobahId, Id, IdMarker, JobId, LogId};
pub use record::{DagobahRecord, JobRecord, JobRef, LogRecord, Record};
