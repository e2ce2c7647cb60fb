//! The capture pipeline: gate, diff, record, resolve aggregates, dispatch.

use serde_json::Value;
use undertow_types::{validate_event_type, Lifecycle, RecordRef};

use crate::aggregates::{persist_aggregates, AggregateRegistry};
use crate::config::{DeletePayload, TrackingConfig};
use crate::diff::{diff, json_kind};
use crate::error::{BoxError, CaptureError};
use crate::event::{Event, Snapshot};
use crate::exclusion::ExclusionPolicy;
use crate::listeners::{EventMatcher, ListenerRegistry};
use crate::model::{Model, Persist};
use crate::session::Session;
use crate::store::insert_event;

/// Change-capture engine.
///
/// A `Tracker` is built once at startup and is read-only afterwards; share
/// it between threads behind an `Arc`. All per-request state lives in the
/// [`Session`] passed to each call.
///
/// Lifecycle observer methods ([`created`](Self::created),
/// [`updated`](Self::updated), [`deleted`](Self::deleted)) are meant to be
/// called by the host's persistence layer right after each per-record
/// write. They return `Ok(None)` when no event was produced.
#[derive(Debug)]
pub struct Tracker {
    exclusion: ExclusionPolicy,
    delete_payload: DeletePayload,
    max_aggregates: Option<usize>,
    aggregates: AggregateRegistry,
    listeners: ListenerRegistry,
}

impl Tracker {
    /// Starts building a tracker.
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// The exclusion policy in effect.
    pub fn exclusion(&self) -> &ExclusionPolicy {
        &self.exclusion
    }

    /// Returns `true` if automatic events are produced for `record_type`.
    pub fn is_tracked(&self, record_type: &str) -> bool {
        !self.exclusion.is_excluded(record_type)
    }

    /// Registers a listener for events accepted by `matcher`.
    pub fn register<F>(&mut self, matcher: EventMatcher, callback: F)
    where
        F: Fn(&Session<'_>, &Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.listeners.register(matcher, callback);
    }

    // ── Event recorder ──────────────────────────────────────────────

    /// Records an application-initiated event on `target`, attributed to
    /// the session's current actor.
    ///
    /// `data` must be a JSON object, or `null` for an empty payload.
    pub fn record(
        &self,
        session: &Session<'_>,
        event_type: &str,
        target: &RecordRef,
        data: Value,
    ) -> Result<Event, CaptureError> {
        let actor = session.current_actor().cloned();
        self.record_with_actor(session, event_type, target, data, actor)
    }

    /// Records an application-initiated event with an explicit actor.
    pub fn record_with_actor(
        &self,
        session: &Session<'_>,
        event_type: &str,
        target: &RecordRef,
        data: Value,
        actor: Option<RecordRef>,
    ) -> Result<Event, CaptureError> {
        validate_event_type(event_type)?;
        let data = payload(data)?;
        self.write_event(session, event_type, target, data, actor, None)
    }

    /// Records an application-initiated event targeting an in-memory
    /// record. The record's own indirect aggregates are used for the first
    /// expansion step instead of reloading it.
    pub fn record_for<M: Model>(
        &self,
        session: &Session<'_>,
        event_type: &str,
        record: &M,
        data: Value,
    ) -> Result<Event, CaptureError> {
        // Host hooks run only for events that could be stored.
        validate_event_type(event_type)?;
        let data = payload(data)?;
        let first_hop = first_hop(session, record)?;
        let actor = session.current_actor().cloned();
        self.write_event(
            session,
            event_type,
            &record.record_ref(),
            data,
            actor,
            Some(first_hop),
        )
    }

    // ── Change detector ─────────────────────────────────────────────

    /// Observes the creation of `record`.
    pub fn created<M: Model>(
        &self,
        session: &Session<'_>,
        record: &M,
    ) -> Result<Option<Event>, CaptureError> {
        if !self.should_capture(session, M::RECORD_TYPE, Lifecycle::Created) {
            return Ok(None);
        }
        let current = record.snapshot()?;
        let changes = diff(None, &current);
        self.capture(session, Lifecycle::Created, record, changes)
            .map(Some)
    }

    /// Observes an update of `record`, given its snapshot from before the
    /// write. Produces no event when no field changed.
    pub fn updated<M: Model>(
        &self,
        session: &Session<'_>,
        previous: &Snapshot,
        record: &M,
    ) -> Result<Option<Event>, CaptureError> {
        if !self.should_capture(session, M::RECORD_TYPE, Lifecycle::Updated) {
            return Ok(None);
        }
        let current = record.snapshot()?;
        let changes = diff(Some(previous), &current);
        if changes.is_empty() {
            tracing::trace!(
                record = %record.record_ref(),
                "update changed no fields, no event"
            );
            return Ok(None);
        }
        self.capture(session, Lifecycle::Updated, record, changes)
            .map(Some)
    }

    /// Observes the deletion of `record`.
    pub fn deleted<M: Model>(
        &self,
        session: &Session<'_>,
        record: &M,
    ) -> Result<Option<Event>, CaptureError> {
        if !self.should_capture(session, M::RECORD_TYPE, Lifecycle::Deleted) {
            return Ok(None);
        }
        let data = match self.delete_payload {
            DeletePayload::Empty => Snapshot::new(),
            DeletePayload::Snapshot => record.snapshot()?,
        };
        self.capture(session, Lifecycle::Deleted, record, data)
            .map(Some)
    }

    // ── Tracked persistence ─────────────────────────────────────────

    /// Inserts `record` and captures its creation.
    pub fn insert<M: Persist>(
        &self,
        session: &Session<'_>,
        record: &M,
    ) -> Result<Option<Event>, CaptureError> {
        record.insert(session.conn())?;
        self.created(session, record)
    }

    /// Writes `record` over its stored row and captures the update.
    ///
    /// The prior state is loaded from the database before the write.
    pub fn save<M: Persist>(
        &self,
        session: &Session<'_>,
        record: &M,
    ) -> Result<Option<Event>, CaptureError> {
        let previous = if self.should_capture(session, M::RECORD_TYPE, Lifecycle::Updated) {
            let record_id = record.record_id();
            let stored = M::load(session.conn(), &record_id)
                .map_err(|source| CaptureError::DiffComputation {
                    record_type: M::RECORD_TYPE.to_string(),
                    reason: format!("loading prior state of id {record_id} failed: {source}"),
                })?
                .ok_or_else(|| CaptureError::DiffComputation {
                    record_type: M::RECORD_TYPE.to_string(),
                    reason: format!("no stored row for id {record_id}"),
                })?;
            Some(stored.snapshot()?)
        } else {
            None
        };

        record.update(session.conn())?;

        match previous {
            Some(previous) => self.updated(session, &previous, record),
            None => Ok(None),
        }
    }

    /// Deletes `record` and captures the deletion.
    pub fn remove<M: Persist>(
        &self,
        session: &Session<'_>,
        record: &M,
    ) -> Result<Option<Event>, CaptureError> {
        record.delete(session.conn())?;
        self.deleted(session, record)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn should_capture(&self, session: &Session<'_>, record_type: &str, verb: Lifecycle) -> bool {
        if self.exclusion.is_excluded(record_type) {
            tracing::trace!(record_type, lifecycle = %verb, "capture skipped: record type excluded");
            return false;
        }
        if session.is_suspended() {
            tracing::trace!(record_type, lifecycle = %verb, "capture skipped: session suspended");
            return false;
        }
        true
    }

    fn capture<M: Model>(
        &self,
        session: &Session<'_>,
        verb: Lifecycle,
        record: &M,
        data: Snapshot,
    ) -> Result<Event, CaptureError> {
        let event_type = verb.event_type(M::RECORD_TYPE);
        validate_event_type(&event_type)?;
        let first_hop = first_hop(session, record)?;
        let actor = session.current_actor().cloned();
        self.write_event(
            session,
            &event_type,
            &record.record_ref(),
            data,
            actor,
            Some(first_hop),
        )
    }

    fn write_event(
        &self,
        session: &Session<'_>,
        event_type: &str,
        target: &RecordRef,
        data: Snapshot,
        actor: Option<RecordRef>,
        first_hop: Option<Vec<RecordRef>>,
    ) -> Result<Event, CaptureError> {
        // Resolve before writing so a failing hook leaves no partial rows.
        let aggregates =
            self.aggregates
                .resolve(session.conn(), target, first_hop, self.max_aggregates)?;

        let event = insert_event(session.conn(), event_type, target, data, actor)?;
        persist_aggregates(session.conn(), &event.id, &aggregates)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            target = %event.target,
            aggregates = aggregates.len(),
            "recorded event"
        );

        self.listeners.dispatch(session, &event)?;
        Ok(event)
    }
}

fn first_hop<M: Model>(session: &Session<'_>, record: &M) -> Result<Vec<RecordRef>, CaptureError> {
    record
        .indirect_aggregates(session.conn())
        .map_err(|source| CaptureError::AggregateResolution {
            record: record.record_ref(),
            source,
        })
}

fn payload(data: Value) -> Result<Snapshot, CaptureError> {
    match data {
        Value::Object(fields) => Ok(fields),
        Value::Null => Ok(Snapshot::new()),
        other => Err(CaptureError::InvalidEventData(json_kind(&other))),
    }
}

/// Builder for [`Tracker`].
#[derive(Debug, Default)]
pub struct TrackerBuilder {
    exclusion: ExclusionPolicy,
    delete_payload: DeletePayload,
    max_aggregates: Option<usize>,
    aggregates: AggregateRegistry,
    listeners: ListenerRegistry,
}

impl TrackerBuilder {
    /// Applies a [`TrackingConfig`]: exclusion lists, delete payload policy
    /// and aggregate limit.
    pub fn config(mut self, config: &TrackingConfig) -> Self {
        self.exclusion = ExclusionPolicy::from_config(config);
        self.delete_payload = config.delete_payload;
        self.max_aggregates = config.max_aggregates;
        self
    }

    /// Replaces the exclusion policy.
    pub fn exclusion(mut self, exclusion: ExclusionPolicy) -> Self {
        self.exclusion = exclusion;
        self
    }

    /// Sets what deletion events carry.
    pub fn delete_payload(mut self, delete_payload: DeletePayload) -> Self {
        self.delete_payload = delete_payload;
        self
    }

    /// Caps the size of aggregate sets; larger graphs fail the capture.
    pub fn max_aggregates(mut self, limit: usize) -> Self {
        self.max_aggregates = Some(limit);
        self
    }

    /// Registers `M` so references to it are expanded during aggregate
    /// resolution.
    pub fn model<M: Model + 'static>(mut self) -> Self {
        self.aggregates.register::<M>();
        self
    }

    /// Registers a listener.
    pub fn listener<F>(mut self, matcher: EventMatcher, callback: F) -> Self
    where
        F: Fn(&Session<'_>, &Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.listeners.register(matcher, callback);
        self
    }

    /// Finishes the tracker.
    pub fn build(self) -> Tracker {
        tracing::debug!(
            registered_models = ?self.aggregates,
            listeners = self.listeners.len(),
            "built change tracker"
        );
        Tracker {
            exclusion: self.exclusion,
            delete_payload: self.delete_payload,
            max_aggregates: self.max_aggregates,
            aggregates: self.aggregates,
            listeners: self.listeners,
        }
    }
}
