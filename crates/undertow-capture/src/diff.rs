//! Field-level diffing of record snapshots.

use serde::Serialize;
use serde_json::Value;

use crate::error::CaptureError;
use crate::event::Snapshot;

/// Computes the fields of `current` whose value differs from `previous`.
///
/// With no previous state (a creation) every field of `current` is part of
/// the diff. A field that existed before but is absent now is reported as
/// `null`.
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Snapshot {
    let Some(previous) = previous else {
        return current.clone();
    };

    let mut changes = Snapshot::new();
    for (field, value) in current {
        if previous.get(field) != Some(value) {
            changes.insert(field.clone(), value.clone());
        }
    }
    for (field, value) in previous {
        if !current.contains_key(field) && !value.is_null() {
            changes.insert(field.clone(), Value::Null);
        }
    }
    changes
}

/// Serializes `value` into a [`Snapshot`].
///
/// Fails with [`CaptureError::DiffComputation`] if serialization fails or
/// does not produce a JSON object.
pub fn snapshot_of<T: Serialize + ?Sized>(
    record_type: &str,
    value: &T,
) -> Result<Snapshot, CaptureError> {
    let failed = |reason: String| CaptureError::DiffComputation {
        record_type: record_type.to_string(),
        reason,
    };

    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(failed(format!(
            "snapshot must be an object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(failed(e.to_string())),
    }
}

/// Short name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
