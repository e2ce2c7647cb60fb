//! Change capture for Undertow.
//!
//! Observes create/update/delete lifecycle mutations of host records and
//! records an immutable history of them as events, written in the same
//! SQLite transaction as the mutation itself. Each event is attributed to
//! its target and to every record reachable through the target's declared
//! indirect aggregates, so a query against any related record surfaces
//! events that originated elsewhere.
//!
//! # Pipeline
//!
//! | Stage | Where |
//! |-------|-------|
//! | exclusion and suspension gate | [`ExclusionPolicy`], [`Session::suspend`] |
//! | field diff | [`diff()`] |
//! | event row | [`Tracker::record`] |
//! | aggregate set | [`AggregateRegistry::resolve`] |
//! | listeners | [`EventMatcher`], [`TrackerBuilder::listener`] |
//!
//! Everything runs synchronously in the caller's thread. Any failure is
//! returned to the caller of the mutation; dropping the [`Session`] then
//! rolls back the mutation and its history together.
//!
//! # Usage
//!
//! ```rust,ignore
//! use undertow_capture::{EventMatcher, Lifecycle, Session, Tracker};
//!
//! let tracker = Tracker::builder()
//!     .config(&config.tracking)
//!     .model::<Car>()
//!     .model::<Engine>()
//!     .listener(EventMatcher::model::<Car>([Lifecycle::Deleted]), |_session, event| {
//!         tracing::info!(car = %event.target, "car scrapped");
//!         Ok(())
//!     })
//!     .build();
//!
//! let mut session = Session::begin_as(&mut conn, Some(current_user))?;
//! tracker.insert(&session, &car)?;
//! tracker.record(&session, "app.custom.promoted", &car.record_ref(), json!({"note": "x"}))?;
//! session.commit()?;
//! ```

mod aggregates;
mod config;
mod diff;
mod error;
mod event;
mod exclusion;
mod history;
mod listeners;
mod model;
mod session;
mod store;
mod tracker;

pub use aggregates::AggregateRegistry;
pub use config::{DeletePayload, TrackingConfig};
pub use diff::{diff, snapshot_of};
pub use error::{BoxError, CaptureError};
pub use event::{Event, Snapshot};
pub use exclusion::{ExclusionPolicy, DEFAULT_EXCLUDED_NAMESPACES};
pub use history::{aggregates_of, events_for_target, get_event, history, HistoryFilter, HistoryOrder};
pub use listeners::{EventMatcher, ListenerFn, ListenerRegistry};
pub use model::{Model, Persist};
pub use session::{Session, SuspendGuard};
pub use tracker::{Tracker, TrackerBuilder};
pub use undertow_types::{Lifecycle, RecordRef};
