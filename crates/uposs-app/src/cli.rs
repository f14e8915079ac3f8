//! Command-line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uposs_core::TaskKind;

#[derive(Parser, Debug)]
#[command(name = "uposs")]
#[command(author, version, about = "Sync dated photo folders to object storage")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data home holding the config, dedup store and task logs
    #[arg(long, env = "UPOSS_HOME", default_value = "./uposs-data", global = true)]
    pub home: PathBuf,

    /// Configuration file (default: <home>/config.json)
    #[arg(long, env = "UPOSS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.home.join("config.json"))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the continuous loop until Ctrl-C
    Auto,

    /// Run the bounded loop over the configured date window
    Sched {
        /// Only copy files carrying one of these order numbers (comma list)
        #[arg(long)]
        orders: Option<String>,
    },

    /// Test the object storage connection
    Check,

    /// Browse dedup records
    #[command(subcommand)]
    Records(RecordsCommand),

    /// Delete dedup records and task logs for a date range
    Clean(CleanArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum RecordsCommand {
    /// List records of one task kind, newest first
    List {
        /// Task kind: auto or sched
        #[arg(long, value_parser = parse_kind)]
        kind: TaskKind,

        /// Only records copied from this date folder
        #[arg(long)]
        dir: Option<String>,

        #[arg(long, default_value_t = uposs_core::defaults::PAGE_LIMIT)]
        limit: i64,

        #[arg(long, default_value_t = uposs_core::defaults::PAGE_OFFSET)]
        offset: i64,
    },

    /// List bounded-task records for a window label (start-end)
    Range {
        label: String,

        #[arg(long, default_value_t = uposs_core::defaults::PAGE_LIMIT)]
        limit: i64,
    },

    /// Search records by file-name substring
    Search {
        needle: String,

        #[arg(long, default_value_t = uposs_core::defaults::PAGE_LIMIT)]
        limit: i64,
    },
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// First date folder (YYYY.MM.DD); defaults to clean_start_time
    #[arg(long)]
    pub start: Option<String>,

    /// Last date folder (YYYY.MM.DD); defaults to clean_end_time
    #[arg(long)]
    pub end: Option<String>,

    /// Report what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration with secrets masked
    Show,
}

fn parse_kind(s: &str) -> Result<TaskKind, String> {
    s.parse::<TaskKind>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sched_with_orders() {
        let cli = Cli::try_parse_from(["uposs", "sched", "--orders", "A123,B456"]).unwrap();
        match cli.command {
            Command::Sched { orders } => assert_eq!(orders.as_deref(), Some("A123,B456")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_path_defaults_under_home() {
        let cli = Cli::try_parse_from(["uposs", "--home", "/srv/uposs", "auto"]).unwrap();
        assert_eq!(cli.config_path(), PathBuf::from("/srv/uposs/config.json"));

        let cli =
            Cli::try_parse_from(["uposs", "auto", "--config", "/etc/uposs.json"]).unwrap();
        assert_eq!(cli.config_path(), PathBuf::from("/etc/uposs.json"));
    }

    #[test]
    fn test_records_list_kind() {
        let cli = Cli::try_parse_from([
            "uposs", "records", "list", "--kind", "sched", "--dir", "2025.01.01", "--limit", "5",
        ])
        .unwrap();
        match cli.command {
            Command::Records(RecordsCommand::List {
                kind,
                dir,
                limit,
                offset,
            }) => {
                assert_eq!(kind, TaskKind::Bounded);
                assert_eq!(dir.as_deref(), Some("2025.01.01"));
                assert_eq!(limit, 5);
                assert_eq!(offset, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_records_list_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["uposs", "records", "list", "--kind", "nightly"]).is_err());
    }

    #[test]
    fn test_clean_dry_run() {
        let cli = Cli::try_parse_from([
            "uposs", "clean", "--start", "2025.01.01", "--end", "2025.01.31", "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Command::Clean(args) => {
                assert!(args.dry_run);
                assert_eq!(args.start.as_deref(), Some("2025.01.01"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
