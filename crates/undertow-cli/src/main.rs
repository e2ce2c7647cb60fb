//! Undertow command-line tool.
//!
//! `migrate` installs the history schema in the database shared with the
//! host application. The query commands open that database read-only and
//! refuse to run against a schema that is behind this build.

mod cli;
mod config;

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use undertow_capture::{aggregates_of, get_event, history, CaptureError, ExclusionPolicy};
use undertow_db::{AccessMode, DbPool};

use crate::cli::{Cli, Command};
use crate::config::{Config, ConfigError};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] undertow_db::PoolError),

    #[error("failed to get database connection: {0}")]
    Connection(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] undertow_db::MigrationError),

    #[error("history schema is behind (pending: {0}); run `undertow migrate`")]
    SchemaOutdated(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("no event with id {0}")]
    EventNotFound(uuid::Uuid),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn resolve_config_path(from_args: Option<String>) -> (Option<String>, &'static str) {
    if let Some(path) = from_args.filter(|value| !value.trim().is_empty()) {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("UNDERTOW_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so stdout stays machine-readable.
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Opens the database read-only after checking its history schema is
/// current.
fn open_reader(config: &Config) -> Result<DbPool, CliError> {
    let pool = undertow_db::create_pool(
        &config.database.path,
        config.database.runtime_settings(AccessMode::ReadOnly),
    )?;
    let pending = undertow_db::pending_migrations(&*pool.get()?)?;
    if !pending.is_empty() {
        return Err(CliError::SchemaOutdated(pending.join(", ")));
    }
    Ok(pool)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let (resolved_config_path, config_source) = resolve_config_path(cli.config);
    let selected_config_path = resolved_config_path.as_deref().or(Some("undertow.toml"));

    let config = config::load_config(selected_config_path)?;
    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    match cli.command {
        Command::Tracked { record_type } => {
            let policy = ExclusionPolicy::from_config(&config.tracking);
            let tracked = !policy.is_excluded(&record_type);
            print_json(&json!({ "record_type": record_type, "tracked": tracked }))
        }
        Command::Migrate => {
            let pool = undertow_db::create_pool(
                &config.database.path,
                config.database.runtime_settings(AccessMode::ReadWrite),
            )?;
            let applied = undertow_db::run_migrations(&*pool.get()?)?;
            if applied > 0 {
                tracing::info!(count = applied, "applied database migrations");
            }
            print_json(&json!({ "applied": applied }))
        }
        Command::History(args) => {
            let conn = open_reader(&config)?.get()?;
            let record = args.record();
            let events = history(&conn, &record, &args.filter())?;
            tracing::debug!(record = %record, count = events.len(), "loaded history");
            print_json(&events)
        }
        Command::Event { event_id } => {
            let conn = open_reader(&config)?.get()?;
            let event = get_event(&conn, &event_id)?.ok_or(CliError::EventNotFound(event_id))?;
            let aggregates = aggregates_of(&conn, &event_id)?;
            print_json(&json!({ "event": event, "aggregates": aggregates }))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("undertow: {err}");
            ExitCode::FAILURE
        }
    }
}
