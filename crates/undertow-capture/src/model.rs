//! Traits host record types implement to be tracked.

use rusqlite::Connection;
use serde::Serialize;
use undertow_types::RecordRef;

use crate::diff::snapshot_of;
use crate::error::{BoxError, CaptureError};
use crate::event::Snapshot;

/// A host record type whose lifecycle Undertow can capture.
///
/// The default [`snapshot`](Model::snapshot) is the record's serde
/// serialization. Relation-valued fields should serialize as the referenced
/// record's id (a plain foreign-key field), never as a nested object, so
/// that diffs stay small and stable.
pub trait Model: Serialize {
    /// Record type id, `{namespace}.{name}`, e.g. `garage.car`.
    const RECORD_TYPE: &'static str;

    /// The record's id within its type.
    fn record_id(&self) -> String;

    /// Loads a record by id, returning `None` if it no longer exists.
    fn load(conn: &Connection, record_id: &str) -> rusqlite::Result<Option<Self>>
    where
        Self: Sized;

    /// Polymorphic reference to this record.
    fn record_ref(&self) -> RecordRef {
        RecordRef::new(Self::RECORD_TYPE, self.record_id())
    }

    /// Current persisted field values.
    fn snapshot(&self) -> Result<Snapshot, CaptureError> {
        snapshot_of(Self::RECORD_TYPE, self)
    }

    /// Other records that changes to this record should also be attributed
    /// to. Their own indirect aggregates are followed transitively.
    fn indirect_aggregates(&self, _conn: &Connection) -> Result<Vec<RecordRef>, BoxError> {
        Ok(Vec::new())
    }
}

/// Row-level writes for a [`Model`], letting
/// [`Tracker::insert`](crate::Tracker::insert),
/// [`Tracker::save`](crate::Tracker::save) and
/// [`Tracker::remove`](crate::Tracker::remove) perform the mutation and its
/// capture in one call.
pub trait Persist: Model + Sized {
    /// Inserts the record.
    fn insert(&self, conn: &Connection) -> rusqlite::Result<()>;

    /// Writes the record's current fields over its stored row.
    fn update(&self, conn: &Connection) -> rusqlite::Result<()>;

    /// Deletes the record's row.
    fn delete(&self, conn: &Connection) -> rusqlite::Result<()>;
}
