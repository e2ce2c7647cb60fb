//! Error types for the capture engine.

use undertow_types::RecordRef;

/// Boxed error returned by host-supplied code: listener callbacks,
/// indirect-aggregate hooks and record loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while capturing, recording or querying events.
///
/// Every variant surfaces to the caller of the triggering mutation. The
/// engine never swallows a failure, so the host can drop its session and
/// roll back the mutation together with any partially written history.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The event type contains characters outside the allowed set.
    #[error(transparent)]
    InvalidEventType(#[from] undertow_types::InvalidEventType),

    /// Application-supplied event data was not a JSON object.
    #[error("event data must be a JSON object, got {0}")]
    InvalidEventData(&'static str),

    /// A snapshot could not be captured or compared.
    #[error("diff computation failed for {record_type}: {reason}")]
    DiffComputation {
        /// The record type being snapshotted.
        record_type: String,
        /// What went wrong.
        reason: String,
    },

    /// A listener callback returned an error.
    #[error("listener for {event_type} failed: {source}")]
    Listener {
        /// The type of the event being dispatched.
        event_type: String,
        /// The listener's error.
        source: BoxError,
    },

    /// An indirect-aggregate hook or record loader failed.
    #[error("aggregate resolution failed at {record}: {source}")]
    AggregateResolution {
        /// The record whose expansion failed.
        record: RecordRef,
        /// The hook's error.
        source: BoxError,
    },

    /// The aggregate graph reached more records than the configured limit.
    #[error("aggregate set exceeds the limit of {limit} records")]
    AggregateLimitExceeded {
        /// The configured `max_aggregates`.
        limit: usize,
    },

    /// A database operation failed.
    #[error("capture database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("capture serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored timestamp could not be parsed.
    #[error("invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// A stored event id could not be parsed.
    #[error("invalid stored event id: {0}")]
    Identifier(#[from] uuid::Error),
}
