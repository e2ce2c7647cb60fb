//! Database layer for Undertow.
//!
//! Provides read-write and read-only SQLite pools (via `r2d2`) and the
//! embedded SQL migrations that create the event history tables. Host
//! applications that already manage their own connections only need
//! [`run_migrations`]; inspection tools open a read-only pool and check
//! [`pending_migrations`] instead of altering the schema.
//!
//! # Design decisions
//!
//! - **Same database as the host**: history rows must commit or roll back
//!   with the mutation that produced them, so the event tables live next to
//!   the host's tables and are written inside the host's transaction.
//! - **Immutability in storage**: triggers reject any `UPDATE` or `DELETE`
//!   on history rows, whatever code path attempts it.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` and tracked in `_undertow_migrations`.

mod migrations;
mod pool;

pub use migrations::{pending_migrations, run_migrations, MigrationError};
pub use pool::{create_pool, AccessMode, DbPool, DbRuntimeSettings, PoolError};
