//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use undertow_capture::{HistoryFilter, HistoryOrder};
use undertow_types::RecordRef;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "undertow",
    version,
    about = "Inspect and maintain the change history stored next to a host database",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Path to the TOML configuration file (default: `UNDERTOW_CONFIG_PATH`,
    /// then `undertow.toml`).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Apply pending history migrations.
    Migrate,
    /// Print events attributed to a record, directly or through aggregates.
    History(HistoryArgs),
    /// Print one event and its aggregate set.
    Event {
        /// Event id.
        event_id: Uuid,
    },
    /// Report whether a record type produces automatic events.
    Tracked {
        /// Record type, e.g. `garage.car`.
        record_type: String,
    },
}

#[derive(Debug, PartialEq, Args)]
pub struct HistoryArgs {
    /// Record type, e.g. `garage.car`.
    pub record_type: String,

    /// Record id within its type.
    pub record_id: String,

    /// Only events of this exact type.
    #[arg(long)]
    pub event_type: Option<String>,

    /// Maximum number of events (default: 100).
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    pub limit: Option<i64>,

    /// List oldest events first.
    #[arg(long)]
    pub oldest_first: bool,
}

impl HistoryArgs {
    pub fn record(&self) -> RecordRef {
        RecordRef::new(self.record_type.clone(), self.record_id.clone())
    }

    pub fn filter(&self) -> HistoryFilter {
        HistoryFilter {
            event_type: self.event_type.clone(),
            since: None,
            limit: self.limit,
            order: if self.oldest_first {
                HistoryOrder::OldestFirst
            } else {
                HistoryOrder::NewestFirst
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("undertow").chain(args.iter().copied()))
    }

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn history_with_flags() {
        let cli = parse(&[
            "--config",
            "garage.toml",
            "history",
            "garage.car",
            "1",
            "--limit",
            "5",
            "--event-type",
            "garage.car.updated",
            "--oldest-first",
        ])
        .expect("should parse");

        assert_eq!(cli.config.as_deref(), Some("garage.toml"));
        let Command::History(args) = cli.command else {
            panic!("expected history command");
        };
        assert_eq!(args.record(), RecordRef::new("garage.car", "1"));

        let filter = args.filter();
        assert_eq!(filter.event_type.as_deref(), Some("garage.car.updated"));
        assert_eq!(filter.limit, Some(5));
        assert_eq!(filter.order, HistoryOrder::OldestFirst);
    }

    #[test]
    fn config_flag_is_accepted_after_the_command() {
        let cli = parse(&["migrate", "--config", "garage.toml"]).expect("should parse");
        assert_eq!(cli.config.as_deref(), Some("garage.toml"));
        assert_eq!(cli.command, Command::Migrate);
    }

    #[test]
    fn simple_commands() {
        assert_eq!(
            parse(&["tracked", "auth.session"])
                .expect("should parse")
                .command,
            Command::Tracked {
                record_type: "auth.session".to_string()
            }
        );

        let id = Uuid::new_v4();
        assert_eq!(
            parse(&["event", &id.to_string()])
                .expect("should parse")
                .command,
            Command::Event { event_id: id }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&[]).is_err());
        assert_eq!(
            parse(&["history", "garage.car"]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse(&["explode"]).unwrap_err().kind(),
            ErrorKind::InvalidSubcommand
        );
        assert_eq!(
            parse(&["migrate", "now"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
        assert_eq!(
            parse(&["history", "garage.car", "1", "--limit", "0"])
                .unwrap_err()
                .kind(),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            parse(&["event", "not-a-uuid"]).unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
    }
}
