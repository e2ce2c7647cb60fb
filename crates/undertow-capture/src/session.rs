//! Unit-of-work context: the host's transaction, the current actor and the
//! suspension counter.
//!
//! A [`Session`] is opened per unit of work (typically per request) and
//! carries all per-execution-context state. Nothing here is global: two
//! sessions on two threads never see each other's actor or suspension.

use std::cell::Cell;
use std::ops::Deref;
use std::rc::Rc;

use rusqlite::{Connection, Transaction};
use undertow_types::RecordRef;

/// A unit of work wrapping the host's SQLite transaction.
///
/// Event rows are written through the wrapped transaction, so they commit or
/// roll back together with the host's own writes. Dropping a session
/// without calling [`Session::commit`] rolls everything back.
pub struct Session<'conn> {
    tx: Transaction<'conn>,
    actor: Option<RecordRef>,
    suspension: Rc<Cell<usize>>,
}

impl<'conn> Session<'conn> {
    /// Wraps a transaction the host has already opened.
    pub fn new(tx: Transaction<'conn>) -> Self {
        Self {
            tx,
            actor: None,
            suspension: Rc::new(Cell::new(0)),
        }
    }

    /// Opens a transaction on `conn` and wraps it, with no actor.
    pub fn begin(conn: &'conn mut Connection) -> rusqlite::Result<Self> {
        Self::begin_as(conn, None)
    }

    /// Opens a transaction on `conn` with `actor` as the current actor.
    pub fn begin_as(conn: &'conn mut Connection, actor: Option<RecordRef>) -> rusqlite::Result<Self> {
        let mut session = Self::new(conn.transaction()?);
        session.actor = actor;
        Ok(session)
    }

    /// The connection all reads and writes of this unit of work go through.
    pub fn conn(&self) -> &Connection {
        &self.tx
    }

    /// Who is acting in this unit of work, if anyone.
    pub fn current_actor(&self) -> Option<&RecordRef> {
        self.actor.as_ref()
    }

    /// Replaces the current actor.
    pub fn set_actor(&mut self, actor: Option<RecordRef>) {
        self.actor = actor;
    }

    /// Clears the current actor, e.g. before running unattended work.
    pub fn clear_actor(&mut self) {
        self.actor = None;
    }

    /// Suspends automatic event generation until the returned guard is
    /// dropped.
    ///
    /// Suspensions nest: generation resumes only once every guard taken
    /// from this session has been dropped. Application-initiated
    /// [`Tracker::record`](crate::Tracker::record) calls are not affected.
    #[must_use = "suspension ends as soon as the guard is dropped"]
    pub fn suspend(&self) -> SuspendGuard {
        self.suspension.set(self.suspension.get() + 1);
        SuspendGuard {
            depth: Rc::clone(&self.suspension),
        }
    }

    /// Runs `f` with automatic event generation suspended.
    pub fn suspended<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.suspend();
        f()
    }

    /// Returns `true` while at least one suspension guard is alive.
    pub fn is_suspended(&self) -> bool {
        self.suspension.get() > 0
    }

    /// Commits the host's writes and the captured history together.
    pub fn commit(self) -> rusqlite::Result<()> {
        self.tx.commit()
    }

    /// Discards the host's writes and the captured history together.
    pub fn rollback(self) -> rusqlite::Result<()> {
        self.tx.rollback()
    }
}

impl Deref for Session<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("actor", &self.actor)
            .field("suspension_depth", &self.suspension.get())
            .finish_non_exhaustive()
    }
}

/// Scoped suspension handle returned by [`Session::suspend`].
///
/// Releasing happens in `Drop`, so the suspension ends on every exit path,
/// including `?` returns and unwinding panics.
#[derive(Debug)]
pub struct SuspendGuard {
    depth: Rc<Cell<usize>>,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}
