//! Tracking configuration.
//!
//! This is the only configuration surface that affects capture behavior.
//! It is deserialized from the `[tracking]` table of the host's config file
//! and turned into a [`Tracker`](crate::Tracker) through
//! [`TrackerBuilder::config`](crate::TrackerBuilder::config).

use std::collections::BTreeSet;

use serde::Deserialize;

/// What a deletion event carries as its `data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePayload {
    /// An empty object; the event type alone says the record is gone.
    #[default]
    Empty,
    /// The record's final snapshot.
    Snapshot,
}

/// Capture settings: which record types are tracked, how deletions are
/// recorded, and how large an aggregate set may grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TrackingConfig {
    /// Record types that never produce automatic events.
    #[serde(default)]
    pub excluded_types: BTreeSet<String>,

    /// Namespaces whose record types never produce automatic events, unless
    /// the type itself is listed in `included_types`.
    #[serde(default)]
    pub excluded_namespaces: BTreeSet<String>,

    /// When set, only these record types (plus those in
    /// `included_namespaces`) are tracked.
    #[serde(default)]
    pub included_types: Option<BTreeSet<String>>,

    /// When set, only record types in these namespaces (plus those in
    /// `included_types`) are tracked.
    #[serde(default)]
    pub included_namespaces: Option<BTreeSet<String>>,

    /// Payload policy for deletion events.
    #[serde(default)]
    pub delete_payload: DeletePayload,

    /// Upper bound on the number of records in one event's aggregate set.
    /// `None` means unbounded.
    #[serde(default)]
    pub max_aggregates: Option<usize>,
}
