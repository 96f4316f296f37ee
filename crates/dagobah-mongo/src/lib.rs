//! dagobah-mongo
//!
//! MongoDB implementation of the `dagobah_core::Backend` port.
//!
//! | Collection (default) | Key | Notable fields |
//! |---|---|---|
//! | `dagobah` | `_id` = `dagobah_id` | `jobs: [{ job_id, .. }]`, `save_date` |
//! | `dagobah_job` | `_id` = `job_id` | `save_date` |
//! | `dagobah_log` | `_id` = `log_id` | `save_date` |

pub mod backend;
pub mod config;
mod document;

pub use backend::MongoBackend;
pub use config::{CollectionNames, ConfigError, MongoConfig};
