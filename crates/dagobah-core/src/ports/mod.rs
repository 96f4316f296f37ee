//! Ports: the seams between the orchestrator and the storage adapters.
//!
//! - **Backend**: the persistence interface every store implements
//! - **Clock**: source of `save_date` stamps
//! - **IdGenerator**: source of candidate identifiers

pub mod backend;
pub mod clock;
pub mod id_generator;

pub use self::backend::Backend;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
