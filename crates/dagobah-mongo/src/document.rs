//! Conversion between records and stored BSON documents.
//!
//! Stored layout: the record's fields, plus `_id` (= the record id as a ULID
//! string) and `save_date` as a native BSON datetime.

use chrono::{DateTime, Utc};
use dagobah_core::{BackendError, Record};
use mongodb::bson::{self, Bson, DateTime as BsonDateTime, Document};

pub(crate) const ID_KEY: &str = "_id";
pub(crate) const SAVE_DATE_KEY: &str = "save_date";

/// Filter matching one document by key.
pub(crate) fn by_id(key: impl Into<Bson>) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_KEY, key.into());
    filter
}

pub(crate) fn to_document<R: Record>(
    record: &R,
    saved_at: DateTime<Utc>,
) -> Result<Document, BackendError> {
    let mut document = bson::to_document(record).map_err(codec::<R>)?;
    document.insert(ID_KEY, record.id().key());
    document.insert(
        SAVE_DATE_KEY,
        BsonDateTime::from_millis(saved_at.timestamp_millis()),
    );
    Ok(document)
}

pub(crate) fn from_document<R: Record>(mut document: Document) -> Result<R, BackendError> {
    document.remove(ID_KEY);
    let save_date = match document.remove(SAVE_DATE_KEY) {
        None | Some(Bson::Null) => None,
        Some(Bson::DateTime(at)) => Some(
            DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis()).ok_or_else(|| {
                BackendError::Codec {
                    kind: R::kind(),
                    message: format!("save_date out of range: {at:?}"),
                }
            })?,
        ),
        Some(other) => {
            return Err(BackendError::Codec {
                kind: R::kind(),
                message: format!("save_date has BSON type {:?}", other.element_type()),
            });
        }
    };

    let mut record: R = bson::from_document(document).map_err(codec::<R>)?;
    if let Some(at) = save_date {
        record.stamp(at);
    }
    Ok(record)
}

/// Raw `job_id` values of every `jobs` entry that carries one.
///
/// Reads never tolerate a corrupt `jobs` list: `from_document` fails with
/// `Codec` when an entry is not a mapping. Deletes do: entries that are not
/// mappings, or that lack a `job_id`, are skipped here so that such a Dagobah
/// can still be removed.
pub(crate) fn referenced_job_ids(dagobah: &Document) -> Vec<Bson> {
    let Ok(jobs) = dagobah.get_array("jobs") else {
        return Vec::new();
    };
    jobs.iter()
        .filter_map(Bson::as_document)
        .filter_map(|job| job.get("job_id"))
        .filter(|id| !matches!(id, Bson::Null))
        .cloned()
        .collect()
}

fn codec<R: Record>(err: impl std::fmt::Display) -> BackendError {
    BackendError::Codec {
        kind: R::kind(),
        message: err.to_string(),
    }
}
