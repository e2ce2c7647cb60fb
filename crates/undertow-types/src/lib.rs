//! Shared types for the Undertow change-capture workspace.
//!
//! This crate holds the vocabulary every other Undertow crate speaks:
//! polymorphic record references, lifecycle verbs, and the event type
//! format check. It has no knowledge of storage so that host applications
//! can depend on it without pulling in SQLite.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A polymorphic pointer to a host record: `(record-type-id, record-id)`.
///
/// Events and aggregates refer to host records through this pair rather
/// than a typed relation, so a single table can reference any record type
/// and rows stay valid after the referenced record is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    /// Record type id, `{namespace}.{name}` by convention (e.g. `garage.car`).
    pub record_type: String,
    /// Identifier of the record within its type.
    pub record_id: String,
}

impl RecordRef {
    /// Builds a reference from a record type id and a record id.
    pub fn new(record_type: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            record_id: record_id.into(),
        }
    }

    /// Returns the namespace segment of the record type.
    pub fn namespace(&self) -> &str {
        namespace_of(&self.record_type)
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.record_type, self.record_id)
    }
}

/// Returns the namespace of a record type id: everything before the first
/// `.`, or the whole id when it has no `.`.
pub fn namespace_of(record_type: &str) -> &str {
    record_type
        .split_once('.')
        .map_or(record_type, |(namespace, _)| namespace)
}

/// Lifecycle mutation observed on a host record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// The record was inserted.
    Created,
    /// An existing record was modified.
    Updated,
    /// The record was removed.
    Deleted,
}

impl Lifecycle {
    /// Returns the verb used as the last segment of automatic event types.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    /// Returns the automatic event type for this verb on `record_type`,
    /// e.g. `garage.car.updated`.
    pub fn event_type(self, record_type: &str) -> String {
        format!("{record_type}.{}", self.as_str())
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Lifecycle {
    type Err = ParseLifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            _ => Err(ParseLifecycleError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown lifecycle verb.
#[derive(Debug, Clone, Error)]
#[error("unknown lifecycle verb: {0}")]
pub struct ParseLifecycleError(pub String);

/// Error returned when an event type does not match
/// `^[a-zA-Z0-9.\-_@\\/]+$`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid event type: {0:?}")]
pub struct InvalidEventType(pub String);

/// Checks an event type against the allowed character set.
///
/// Event types must be non-empty and consist only of ASCII letters, digits
/// and the characters `.`, `-`, `_`, `@`, `\` and `/`.
pub fn validate_event_type(event_type: &str) -> Result<(), InvalidEventType> {
    let valid = !event_type.is_empty()
        && event_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@' | '\\' | '/'));
    if valid {
        Ok(())
    } else {
        Err(InvalidEventType(event_type.to_string()))
    }
}
