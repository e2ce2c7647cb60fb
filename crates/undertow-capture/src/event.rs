//! Event and snapshot types.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use undertow_types::RecordRef;
use uuid::Uuid;

use crate::error::CaptureError;

/// Field-level state of a record, keyed by field name.
///
/// Snapshots are what the diff engine compares and what automatic events
/// carry as their `data`.
pub type Snapshot = serde_json::Map<String, serde_json::Value>;

/// An immutable record of a single occurrence affecting a target record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id, assigned at creation.
    pub id: Uuid,
    /// Storage sequence number; breaks ties between equal `created_at`.
    pub seq: i64,
    /// Event type, e.g. `garage.car.updated` or `app.custom.promoted`.
    pub event_type: String,
    /// The record directly affected.
    pub target: RecordRef,
    /// Field diff for automatic events, caller payload for manual ones.
    pub data: Snapshot,
    /// The identity acting when the event was recorded, if any.
    pub actor: Option<RecordRef>,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// Current time at the precision stored in the database.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp the way it is stored. The fixed width keeps
/// lexicographic order equal to chronological order.
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Raw `undertow_events` row, decoded into an [`Event`] outside the
/// rusqlite row closure so that decode errors keep their own variants.
pub(crate) struct EventRow {
    pub seq: i64,
    pub id: String,
    pub event_type: String,
    pub target_type: String,
    pub target_id: String,
    pub data_json: String,
    pub actor_type: Option<String>,
    pub actor_id: Option<String>,
    pub created_at: String,
}

/// Column list matching [`EventRow::from_row`].
pub(crate) const EVENT_COLUMNS: &str = "e.seq, e.id, e.event_type, e.target_type, e.target_id, \
     e.data_json, e.actor_type, e.actor_id, e.created_at";

impl EventRow {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            event_type: row.get(2)?,
            target_type: row.get(3)?,
            target_id: row.get(4)?,
            data_json: row.get(5)?,
            actor_type: row.get(6)?,
            actor_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = CaptureError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let actor = match (row.actor_type, row.actor_id) {
            (Some(record_type), Some(record_id)) => Some(RecordRef::new(record_type, record_id)),
            _ => None,
        };
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            seq: row.seq,
            event_type: row.event_type,
            target: RecordRef::new(row.target_type, row.target_id),
            data: serde_json::from_str(&row.data_json)?,
            actor,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc),
        })
    }
}
