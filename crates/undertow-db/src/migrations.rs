//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time. They run sequentially,
//! tracked by the `_undertow_migrations` table. Each migration runs exactly
//! once; if it has already been applied, it is skipped.

use std::collections::HashSet;

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_events",
        sql: include_str!("migrations/001_events.sql"),
    },
    Migration {
        name: "002_event_aggregates",
        sql: include_str!("migrations/002_event_aggregates.sql"),
    },
    Migration {
        name: "003_immutability",
        sql: include_str!("migrations/003_immutability.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

const TRACKING_TABLE: &str = "_undertow_migrations";

/// Runs all pending migrations against the given connection.
///
/// Returns the number of migrations applied by this call.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// migration tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

/// Names of the migrations this build knows about that `conn` has not
/// applied yet, in application order.
///
/// Only reads, so it is safe on a read-only connection. A database that has
/// never been migrated reports every migration as pending.
///
/// # Errors
///
/// Returns `MigrationError::StateQuery` if the tracking table cannot be read.
pub fn pending_migrations(conn: &Connection) -> Result<Vec<&'static str>, MigrationError> {
    let applied = applied_names(conn)?;
    Ok(MIGRATIONS
        .iter()
        .map(|migration| migration.name)
        .filter(|name| !applied.contains(*name))
        .collect())
}

fn applied_names(conn: &Connection) -> Result<HashSet<String>, MigrationError> {
    let tracked: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [TRACKING_TABLE],
            |row| row.get(0),
        )
        .map_err(MigrationError::StateQuery)?;
    if !tracked {
        return Ok(HashSet::new());
    }

    let mut stmt = conn
        .prepare(&format!("SELECT name FROM {TRACKING_TABLE}"))
        .map_err(MigrationError::StateQuery)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(MigrationError::StateQuery)?
        .collect::<rusqlite::Result<HashSet<_>>>()
        .map_err(MigrationError::StateQuery)?;
    Ok(names)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {TRACKING_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );"
    ))
    .map_err(|source| MigrationError::ExecutionFailed {
        name: TRACKING_TABLE.to_string(),
        source,
    })?;

    let already_applied = applied_names(conn)?;
    let pending: Vec<&Migration> = migrations
        .iter()
        .filter(|migration| !already_applied.contains(migration.name))
        .collect();

    if pending.is_empty() {
        tracing::debug!("history schema is up to date");
        return Ok(0);
    }

    for migration in &pending {
        apply(conn, migration)?;
    }
    Ok(pending.len())
}

/// Applies one migration and records it, atomically.
fn apply(conn: &Connection, migration: &Migration) -> Result<(), MigrationError> {
    tracing::info!(migration = migration.name, "applying migration");

    let failed = |source| MigrationError::ExecutionFailed {
        name: migration.name.to_string(),
        source,
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    tx.execute_batch(migration.sql).map_err(failed)?;
    tx.execute(
        &format!("INSERT INTO {TRACKING_TABLE} (name) VALUES (?1)"),
        [migration.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}
