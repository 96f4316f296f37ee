//! Bounded probe for unused identifiers.

use std::future::Future;

use tracing::debug;

use crate::domain::{BackendError, Id, IdMarker, Result};

pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 8;

/// Draws candidates until one is not in use, giving up after `max_attempts`
/// with `BackendError::IdSpaceExhausted`.
#[derive(Debug, Clone, Copy)]
pub struct IdAllocator {
    max_attempts: u32,
}

impl IdAllocator {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn allocate<T, G, F, Fut>(&self, mut candidate: G, mut in_use: F) -> Result<Id<T>>
    where
        T: IdMarker,
        G: FnMut() -> Id<T>,
        F: FnMut(Id<T>) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        for attempt in 1..=self.max_attempts {
            let id = candidate();
            if !in_use(id).await? {
                return Ok(id);
            }
            debug!(kind = T::kind(), id = %id, attempt, "id candidate already in use");
        }
        Err(BackendError::IdSpaceExhausted {
            kind: T::kind(),
            attempts: self.max_attempts,
        })
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ID_ATTEMPTS)
    }
}
