//! uposs: copy dated photo folders into staging, normalize them, validate
//! order numbers and upload to S3-compatible storage.

mod cli;
mod commands;
mod logging;

use clap::Parser;
use tracing::info;

use uposs_jobs::Schedule;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli.config_path();

    // Config commands print to stdout only; everything else logs.
    let command = match cli.command {
        Command::Config(command) => return commands::config(&config_path, command),
        other => other,
    };

    std::fs::create_dir_all(&cli.home)?;
    let _log_guards = logging::init(&cli.home)?;
    info!(
        home = %cli.home.display(),
        config = %config_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "uposs starting"
    );

    match command {
        Command::Auto => commands::run_task(&cli.home, config_path, Schedule::Continuous).await,
        Command::Sched { orders } => {
            let schedule = Schedule::bounded(orders.as_deref().unwrap_or_default());
            commands::run_task(&cli.home, config_path, schedule).await
        }
        Command::Check => commands::check(&config_path).await,
        Command::Records(command) => commands::records(&cli.home, command).await,
        Command::Clean(args) => commands::clean(&cli.home, &config_path, args).await,
        Command::Config(_) => Ok(()),
    }
}
