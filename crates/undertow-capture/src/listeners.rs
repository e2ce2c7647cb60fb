//! Synchronous post-creation notification of recorded events.

use std::collections::BTreeSet;

use undertow_types::Lifecycle;

use crate::error::{BoxError, CaptureError};
use crate::event::Event;
use crate::model::Model;
use crate::session::Session;

/// Selects which event types a listener is called for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMatcher {
    /// Every event.
    Any,
    /// Any of the listed event types, compared exactly.
    Exact(BTreeSet<String>),
    /// Every event type starting with the given prefix.
    Prefix(String),
}

impl EventMatcher {
    /// Matches every event.
    pub fn any() -> Self {
        Self::Any
    }

    /// Matches any of `event_types` exactly.
    pub fn exact<I, S>(event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exact(event_types.into_iter().map(Into::into).collect())
    }

    /// Matches the automatic events of model `M` for the given verbs, e.g.
    /// `EventMatcher::model::<Car>([Lifecycle::Created])` matches
    /// `garage.car.created`.
    pub fn model<M: Model>(verbs: impl IntoIterator<Item = Lifecycle>) -> Self {
        Self::Exact(
            verbs
                .into_iter()
                .map(|verb| verb.event_type(M::RECORD_TYPE))
                .collect(),
        )
    }

    /// Matches every event type starting with `prefix`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Returns `true` if `event_type` is accepted.
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(types) => types.contains(event_type),
            Self::Prefix(prefix) => event_type.starts_with(prefix.as_str()),
        }
    }
}

/// Listener callback. It receives the session so that its own writes join
/// the unit of work that produced the event.
pub type ListenerFn = Box<dyn Fn(&Session<'_>, &Event) -> Result<(), BoxError> + Send + Sync>;

struct Listener {
    matcher: EventMatcher,
    callback: ListenerFn,
}

/// Ordered list of registered listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Listener>,
}

impl ListenerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for events accepted by `matcher`.
    pub fn register<F>(&mut self, matcher: EventMatcher, callback: F)
    where
        F: Fn(&Session<'_>, &Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.listeners.push(Listener {
            matcher,
            callback: Box::new(callback),
        });
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Calls every matching listener in registration order. The first
    /// failure stops dispatch and is returned.
    pub fn dispatch(&self, session: &Session<'_>, event: &Event) -> Result<(), CaptureError> {
        for listener in &self.listeners {
            if !listener.matcher.matches(&event.event_type) {
                continue;
            }
            if let Err(source) = (listener.callback)(session, event) {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %source,
                    "event listener failed"
                );
                return Err(CaptureError::Listener {
                    event_type: event.event_type.clone(),
                    source,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.listeners.iter().map(|l| &l.matcher))
            .finish()
    }
}
