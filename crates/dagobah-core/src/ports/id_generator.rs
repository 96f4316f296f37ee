//! IdGenerator port - candidate identifier generation.
//!
//! Generators only propose candidates. Uniqueness within a collection is
//! checked by the backend through `IdAllocator`.

use crate::domain::ids::{DagobahId, JobId, LogId};
use crate::ports::Clock;
use ulid::Ulid;

/// Produces candidate identifiers.
///
/// `Send + Sync` so a backend can share one generator across tasks.
pub trait IdGenerator: Send + Sync {
    fn generate_dagobah_id(&self) -> DagobahId;

    fn generate_job_id(&self) -> JobId;

    fn generate_log_id(&self) -> LogId;
}

/// ULID based generator: 48-bit millisecond timestamp from the clock plus
/// 80 random bits.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_dagobah_id(&self) -> DagobahId {
        DagobahId::from(self.next_ulid())
    }

    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_log_id(&self) -> LogId {
        LogId::from(self.next_ulid())
    }
}
