//! Impls - backends that need no external service.
//!
//! The MongoDB backend lives in the `dagobah-mongo` crate.

pub mod memory;

pub use self::memory::{InMemoryBackend, StoreCounts};
