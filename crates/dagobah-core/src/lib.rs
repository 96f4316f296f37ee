//! dagobah-core
//!
//! Core building blocks for persisting Dagobah scheduler state.
//!
//! # Modules
//! - **domain**: identifiers, records (Dagobah / Job / Log), errors
//! - **ports**: `Backend`, `Clock`, `IdGenerator`
//! - **app**: `IdAllocator` (bounded unused-id probe shared by every backend)
//! - **impls**: `InMemoryBackend`
//!
//! Production backends live in their own crates (`dagobah-mongo`).

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use domain::{
    BackendError, DagobahId, DagobahRecord, JobId, JobRecord, JobRef, LogId, LogRecord, Record,
};
pub use ports::{Backend, Clock, FixedClock, IdGenerator, SystemClock, UlidGenerator};
