//! Event row writes.
//!
//! [`insert_event`] is the only code that writes `undertow_events`. It runs
//! on the session's connection, so the row belongs to the caller's
//! transaction.

use rusqlite::{params, Connection};
use undertow_types::RecordRef;
use uuid::Uuid;

use crate::error::CaptureError;
use crate::event::{format_timestamp, now, Event, Snapshot};

/// Inserts a new event row and returns the stored event.
pub(crate) fn insert_event(
    conn: &Connection,
    event_type: &str,
    target: &RecordRef,
    data: Snapshot,
    actor: Option<RecordRef>,
) -> Result<Event, CaptureError> {
    let id = Uuid::new_v4();
    let created_at = now();
    let data_json = serde_json::to_string(&data)?;

    let seq: i64 = conn.query_row(
        "INSERT INTO undertow_events
            (id, event_type, target_type, target_id, data_json, actor_type, actor_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING seq",
        params![
            id.to_string(),
            event_type,
            target.record_type,
            target.record_id,
            data_json,
            actor.as_ref().map(|a| a.record_type.as_str()),
            actor.as_ref().map(|a| a.record_id.as_str()),
            format_timestamp(&created_at),
        ],
        |row| row.get(0),
    )?;

    Ok(Event {
        id,
        seq,
        event_type: event_type.to_string(),
        target: target.clone(),
        data,
        actor,
        created_at,
    })
}
