//! Connection pools over the database shared with the host application.
//!
//! A [`AccessMode::ReadWrite`] pool is what a host (or `undertow migrate`)
//! writes history through: the file is created on demand, switched to WAL so
//! readers never block the host's writers, and foreign keys are enforced so
//! aggregate links cannot outlive their event. A [`AccessMode::ReadOnly`]
//! pool is for inspection tools: it never creates or alters the file.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// How pooled connections open the database file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// Create the file if needed and allow writes.
    #[default]
    ReadWrite,
    /// Open an existing file for queries only.
    ReadOnly,
}

/// Runtime tunables for pooled connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a lock held by the host, in
    /// milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    pub pool_max_size: u32,

    /// Read-write or read-only access.
    pub access: AccessMode,
}

impl DbRuntimeSettings {
    /// Settings for a one-shot reader holding a single connection.
    pub fn read_only() -> Self {
        Self {
            pool_max_size: 1,
            access: AccessMode::ReadOnly,
            ..Self::default()
        }
    }
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
            access: AccessMode::ReadWrite,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when opening a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A read-only pool was requested for a file that does not exist.
    #[error("database file {0} does not exist")]
    MissingDatabase(String),

    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens a pool over `db_path`.
///
/// # Errors
///
/// Returns `PoolError::MissingDatabase` for a read-only pool over a missing
/// file, or `PoolError::PoolInit` if connections cannot be initialised.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = match settings.access {
        AccessMode::ReadWrite => {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        }
        AccessMode::ReadOnly => {
            if !Path::new(db_path).exists() {
                return Err(PoolError::MissingDatabase(db_path.to_string()));
            }
            OpenFlags::SQLITE_OPEN_READ_ONLY
        }
    } | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| configure(conn, settings));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;

    tracing::debug!(
        path = db_path,
        access = ?settings.access,
        pool_max_size = settings.pool_max_size,
        "opened history database pool"
    );

    Ok(pool)
}

fn configure(conn: &mut Connection, settings: DbRuntimeSettings) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;
    if settings.access == AccessMode::ReadOnly {
        return Ok(());
    }

    // In-memory databases stay in "memory" mode.
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") && !mode.eq_ignore_ascii_case("memory") {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal_mode stayed {mode}, expected wal")),
        ));
    }
    conn.pragma_update(None, "foreign_keys", true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_migrations;

    fn db_path(dir: &tempfile::TempDir) -> String {
        dir.path()
            .join("history.db")
            .to_str()
            .expect("temp path should be utf-8")
            .to_string()
    }

    #[test]
    fn read_write_pool_enforces_link_integrity() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let pool = create_pool(&db_path(&dir), DbRuntimeSettings::default())
            .expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");
        run_migrations(&conn).expect("migrations should succeed");

        let orphan = conn.execute(
            "INSERT INTO undertow_event_aggregates (event_id, aggregate_type, aggregate_id)
             VALUES ('no-such-event', 'garage.car', '1')",
            [],
        );
        assert!(orphan.is_err(), "links must reference an existing event");
    }

    #[test]
    fn read_only_pool_refuses_missing_file() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = db_path(&dir);

        let err = create_pool(&path, DbRuntimeSettings::read_only()).unwrap_err();
        assert!(matches!(err, PoolError::MissingDatabase(ref p) if *p == path), "{err:?}");
        assert!(!Path::new(&path).exists(), "a reader must not create the file");
    }

    #[test]
    fn read_only_pool_reads_but_never_writes() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = db_path(&dir);
        let writer = create_pool(&path, DbRuntimeSettings::default()).expect("writer pool");
        {
            let conn = writer.get().expect("should get a connection");
            run_migrations(&conn).expect("migrations should succeed");
            conn.execute(
                "INSERT INTO undertow_events (id, event_type, target_type, target_id, created_at)
                 VALUES ('e1', 'garage.car.created', 'garage.car', '1', '2024-01-01T00:00:00.000000Z')",
                [],
            )
            .expect("writer insert should succeed");
        }

        let reader = create_pool(&path, DbRuntimeSettings::read_only()).expect("reader pool");
        assert_eq!(reader.max_size(), 1);
        let conn = reader.get().expect("should get a connection");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM undertow_events", [], |row| row.get(0))
            .expect("reader should see committed events");
        assert_eq!(count, 1);

        let write = conn.execute(
            "INSERT INTO undertow_events (id, event_type, target_type, target_id, created_at)
             VALUES ('e2', 'garage.car.updated', 'garage.car', '1', '2024-01-01T00:00:01.000000Z')",
            [],
        );
        assert!(write.is_err(), "read-only connections must reject writes");
    }
}
