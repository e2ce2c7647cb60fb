//! Read-only queries over recorded history.
//!
//! [`history`] is the main entry point: given any record, it returns the
//! events whose aggregate set contains it, so a car's history includes
//! events that targeted its engine or cylinders.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use undertow_types::RecordRef;
use uuid::Uuid;

use crate::error::CaptureError;
use crate::event::{format_timestamp, Event, EventRow, EVENT_COLUMNS};

/// Sort order of history results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryOrder {
    /// Most recent first.
    #[default]
    NewestFirst,
    /// Oldest first.
    OldestFirst,
}

impl HistoryOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::NewestFirst => "e.created_at DESC, e.seq DESC",
            Self::OldestFirst => "e.created_at ASC, e.seq ASC",
        }
    }
}

/// Filter criteria for history queries.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only events of this exact type.
    pub event_type: Option<String>,
    /// Only events created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default: 100).
    pub limit: Option<i64>,
    /// Result order.
    pub order: HistoryOrder,
}

/// Returns the events attributed to `record`, directly or through the
/// aggregate graph.
///
/// # Errors
///
/// Returns `CaptureError::Database` on SQL failure, or a decode error if a
/// stored row is malformed.
pub fn history(
    conn: &Connection,
    record: &RecordRef,
    filter: &HistoryFilter,
) -> Result<Vec<Event>, CaptureError> {
    // Collect WHERE clauses and bind parameters separately so nothing is
    // interpolated into the SQL.
    let mut clauses = vec![
        "a.aggregate_type = ?1".to_string(),
        "a.aggregate_id = ?2".to_string(),
    ];
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
        Box::new(record.record_type.clone()),
        Box::new(record.record_id.clone()),
    ];
    let mut idx = 3u32;

    if let Some(ref event_type) = filter.event_type {
        clauses.push(format!("e.event_type = ?{idx}"));
        param_values.push(Box::new(event_type.clone()));
        idx += 1;
    }

    if let Some(ref since) = filter.since {
        clauses.push(format!("e.created_at >= ?{idx}"));
        param_values.push(Box::new(format_timestamp(since)));
        idx += 1;
    }

    let limit = filter.limit.unwrap_or(100);
    param_values.push(Box::new(limit));

    let sql = format!(
        "SELECT {EVENT_COLUMNS}
         FROM undertow_events e
         JOIN undertow_event_aggregates a ON a.event_id = e.id
         WHERE {}
         ORDER BY {}
         LIMIT ?{idx}",
        clauses.join(" AND "),
        filter.order.sql(),
    );

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), EventRow::from_row)?;
    decode_rows(rows)
}

/// Returns the events whose direct target is `target`, newest first.
///
/// # Errors
///
/// Returns `CaptureError::Database` on SQL failure.
pub fn events_for_target(conn: &Connection, target: &RecordRef) -> Result<Vec<Event>, CaptureError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS}
         FROM undertow_events e
         WHERE e.target_type = ?1 AND e.target_id = ?2
         ORDER BY e.created_at DESC, e.seq DESC"
    ))?;
    let rows = stmt.query_map(
        [target.record_type.as_str(), target.record_id.as_str()],
        EventRow::from_row,
    )?;
    decode_rows(rows)
}

/// Fetches a single event by id.
///
/// # Errors
///
/// Returns `CaptureError::Database` on SQL failure.
pub fn get_event(conn: &Connection, id: &Uuid) -> Result<Option<Event>, CaptureError> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM undertow_events e WHERE e.id = ?1"),
        [id.to_string()],
        EventRow::from_row,
    )
    .optional()?
    .map(Event::try_from)
    .transpose()
}

/// Returns the aggregate set of an event, target first.
///
/// # Errors
///
/// Returns `CaptureError::Database` on SQL failure.
pub fn aggregates_of(conn: &Connection, event_id: &Uuid) -> Result<Vec<RecordRef>, CaptureError> {
    let mut stmt = conn.prepare(
        "SELECT aggregate_type, aggregate_id
         FROM undertow_event_aggregates
         WHERE event_id = ?1
         ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([event_id.to_string()], |row| {
        Ok(RecordRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut aggregates = Vec::new();
    for row in rows {
        aggregates.push(row?);
    }
    Ok(aggregates)
}

fn decode_rows(
    rows: impl Iterator<Item = rusqlite::Result<EventRow>>,
) -> Result<Vec<Event>, CaptureError> {
    let mut events = Vec::new();
    for row in rows {
        events.push(Event::try_from(row?)?);
    }
    Ok(events)
}
