//! Errors shared by every backend.

use thiserror::Error;

use super::ids::DagobahId;

/// Boxed driver error. Keeps the core crate independent of any database client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = BackendError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to connect to {address}")]
    Connection {
        address: String,
        #[source]
        source: BoxError,
    },

    #[error("store operation `{op}` failed")]
    Store {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("malformed {kind} payload")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot convert stored {kind} document: {message}")]
    Codec { kind: &'static str, message: String },

    #[error("dagobah not found: {0}")]
    DagobahNotFound(DagobahId),

    #[error("no unused {kind} id after {attempts} attempts")]
    IdSpaceExhausted { kind: &'static str, attempts: u32 },
}

impl BackendError {
    /// Wrap a driver error raised while running `op`.
    pub fn store<E>(op: &'static str) -> impl FnOnce(E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |source| Self::Store {
            op,
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DagobahNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use ulid::Ulid;

    #[test]
    fn store_keeps_source() {
        let io = std::io::Error::other("socket closed");
        let err = BackendError::store("commit_job")(io);

        assert_eq!(err.to_string(), "store operation `commit_job` failed");
        assert_eq!(err.source().unwrap().to_string(), "socket closed");
    }

    #[test]
    fn not_found_names_the_dagobah() {
        let id = DagobahId::from_ulid(Ulid::new());
        let err = BackendError::DagobahNotFound(id);

        assert!(err.is_not_found());
        assert!(err.to_string().contains(&id.to_string()));
    }
}
