//! Strongly-typed identifiers for the three persisted entity kinds.
//!
//! `Id<T>` wraps a ULID and carries a zero-sized marker so a `JobId` can never
//! be handed to an operation expecting a `DagobahId`. On the wire (JSON, BSON)
//! an id is the bare 26-character ULID string; `Display` adds a kind prefix
//! for log output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait naming an entity kind.
pub trait IdMarker: Send + Sync + 'static {
    /// Display prefix, e.g. `"job-"`.
    fn prefix() -> &'static str;

    /// Human-readable kind used in errors and log fields.
    fn kind() -> &'static str;
}

/// Typed ULID identifier.
///
/// # Trait impls
/// `Clone`, `Copy`, equality, ordering and hashing are written by hand so they
/// hold for every `T: IdMarker`. Derives would demand the same traits from the
/// marker, which generic code over `Id<T>` cannot assume.
#[repr(transparent)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Storage key: the unprefixed ULID string.
    pub fn key(&self) -> String {
        self.ulid.to_string()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the storage form and the prefixed display form.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

// ========================================
// Markers
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dagobah {}

impl IdMarker for Dagobah {
    fn prefix() -> &'static str {
        "dagobah-"
    }

    fn kind() -> &'static str {
        "dagobah"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }

    fn kind() -> &'static str {
        "job"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Log {}

impl IdMarker for Log {
    fn prefix() -> &'static str {
        "log-"
    }

    fn kind() -> &'static str {
        "log"
    }
}

/// Identifier of a Dagobah (top-level orchestrator state).
pub type DagobahId = Id<Dagobah>;

/// Identifier of a Job (task-graph definition owned by a Dagobah).
pub type JobId = Id<Job>;

/// Identifier of a Log (one execution record).
pub type LogId = Id<Log>;
