//! Static opt-out of automatic event generation per record type.

use std::collections::BTreeSet;

use undertow_types::namespace_of;

use crate::config::TrackingConfig;

/// Namespaces that are never tracked, whatever the configuration says.
pub const DEFAULT_EXCLUDED_NAMESPACES: &[&str] = &["undertow"];

/// Decides which record types produce automatic events.
///
/// Precedence, highest first:
///
/// 1. [`DEFAULT_EXCLUDED_NAMESPACES`]
/// 2. `excluded_types`
/// 3. `included_types`
/// 4. `excluded_namespaces`
/// 5. `included_namespaces`
/// 6. tracked only if neither include list is configured
///
/// Read-only once built; lookups take no locks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionPolicy {
    excluded_types: BTreeSet<String>,
    excluded_namespaces: BTreeSet<String>,
    included_types: Option<BTreeSet<String>>,
    included_namespaces: Option<BTreeSet<String>>,
}

impl ExclusionPolicy {
    /// A policy that tracks every record type outside the default
    /// exclusions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the policy from the include/exclude lists of a
    /// [`TrackingConfig`].
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            excluded_types: config.excluded_types.clone(),
            excluded_namespaces: config.excluded_namespaces.clone(),
            included_types: config.included_types.clone(),
            included_namespaces: config.included_namespaces.clone(),
        }
    }

    /// Adds a record type to the exclusion set.
    pub fn exclude_type(mut self, record_type: impl Into<String>) -> Self {
        self.excluded_types.insert(record_type.into());
        self
    }

    /// Adds a namespace to the exclusion set.
    pub fn exclude_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.excluded_namespaces.insert(namespace.into());
        self
    }

    /// Returns `true` if `record_type` must never produce automatic events.
    pub fn is_excluded(&self, record_type: &str) -> bool {
        let namespace = namespace_of(record_type);

        if DEFAULT_EXCLUDED_NAMESPACES.contains(&namespace) {
            return true;
        }
        if self.excluded_types.contains(record_type) {
            return true;
        }
        if self
            .included_types
            .as_ref()
            .is_some_and(|types| types.contains(record_type))
        {
            return false;
        }
        if self.excluded_namespaces.contains(namespace) {
            return true;
        }
        if self
            .included_namespaces
            .as_ref()
            .is_some_and(|namespaces| namespaces.contains(namespace))
        {
            return false;
        }
        self.included_types.is_some() || self.included_namespaces.is_some()
    }
}
