//! Command implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tracing::info;

use uposs_core::defaults::STORAGE_PROBE_TIMEOUT_SECS;
use uposs_core::{Config, CopyRecord, DateWindow, LogSink, TracingSink};
use uposs_db::{Database, DATABASE_FILE};
use uposs_jobs::{LogLocation, Pipeline, RetentionCleaner, Schedule, TaskExit, TaskRunner};
use uposs_remote::{ObjectStoreProvider, S3Provider};

use crate::cli::{CleanArgs, ConfigCommand, RecordsCommand};
use crate::logging::{AUTO_LOG_DIR, SCHED_LOG_DIR, SYSTEM_LOG_PREFIX};

/// Open (creating if needed) and migrate the dedup store under `home`.
pub async fn open_database(home: &Path) -> anyhow::Result<Database> {
    std::fs::create_dir_all(home)
        .with_context(|| format!("creating data home {}", home.display()))?;
    let db = Database::open(&home.join(DATABASE_FILE))
        .await
        .context("opening dedup store")?;
    db.migrate().await.context("migrating dedup store")?;
    Ok(db)
}

/// Run a task loop until it ends or Ctrl-C fires the stop signal.
pub async fn run_task(home: &Path, config_path: PathBuf, schedule: Schedule) -> anyhow::Result<()> {
    let db = open_database(home).await?;
    let kind = schedule.kind();
    let pipeline = Arc::new(Pipeline::new(
        config_path,
        Arc::new(db.copy_records.clone()),
        Arc::new(S3Provider),
    ));
    let sink = Arc::new(TracingSink::for_task(kind));
    let system = TracingSink::system();

    let handle = TaskRunner::new(pipeline, schedule, sink).start();
    system.info(&format!("{kind} task started"));

    let stop = handle.stop_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current step");
            stop.cancel();
        }
    });

    let exit = handle.wait().await?;
    ctrl_c.abort();
    db.close().await;

    match exit {
        TaskExit::Stopped => {
            system.info(&format!("{kind} task stopped"));
            Ok(())
        }
        TaskExit::Completed { cycles } => {
            system.info(&format!("{kind} task completed {cycles} cycle(s)"));
            Ok(())
        }
        TaskExit::Failed(message) => {
            system.error(&format!("{kind} task failed: {message}"));
            Err(anyhow!("{kind} task failed: {message}"))
        }
    }
}

/// List buckets to prove the storage service is reachable.
pub async fn check(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let store = S3Provider.connect(&config)?;
    let timeout = Duration::from_secs(STORAGE_PROBE_TIMEOUT_SECS);

    let buckets = tokio::time::timeout(timeout, store.list_buckets())
        .await
        .map_err(|_| anyhow!("storage connection test timed out after {}s", timeout.as_secs()))??;
    println!("Connected to {} ({} bucket(s))", config.endpoint_url(), buckets.len());
    for bucket in &buckets {
        println!("  {bucket}");
    }

    let bucket = config.bucket_name.trim();
    if !bucket.is_empty() {
        if store.bucket_exists(bucket).await? {
            println!("Bucket {bucket} exists");
        } else {
            println!("Bucket {bucket} does not exist yet; it will be created on first upload");
        }
    }
    TracingSink::system().info("Storage connection test passed");
    Ok(())
}

pub async fn records(home: &Path, command: RecordsCommand) -> anyhow::Result<()> {
    let db = open_database(home).await?;
    let repo = &db.copy_records;
    let rows = match command {
        RecordsCommand::List {
            kind,
            dir,
            limit,
            offset,
        } => {
            let total = repo.count(kind).await?;
            println!("{kind} records: {total}");
            repo.list(kind, dir.as_deref(), limit, offset).await?
        }
        RecordsCommand::Range { label, limit } => {
            repo.list_by_date_range(&label, limit, 0).await?
        }
        RecordsCommand::Search { needle, limit } => repo.search(&needle, limit).await?,
    };
    for row in &rows {
        println!("{}", format_record(row));
    }
    db.close().await;
    Ok(())
}

fn format_record(row: &CopyRecord) -> String {
    format!(
        "{:>6}  {:<5}  {}  {:<10}  {:<21}  {}  {}",
        row.id,
        row.task_kind,
        row.copy_time.format("%Y-%m-%d %H:%M:%S"),
        row.copy_dir,
        row.date_range.as_deref().unwrap_or("-"),
        row.status,
        row.file_name
    )
}

/// Resolve the clean window from arguments, falling back to the config.
pub fn clean_window(args: &CleanArgs, config: &Config) -> anyhow::Result<DateWindow> {
    let start = args.start.as_deref().unwrap_or(&config.clean_start_time);
    let end = args.end.as_deref().unwrap_or(&config.clean_end_time);
    let window = DateWindow::parse(start, end)
        .ok_or_else(|| anyhow!("invalid clean range {start:?} - {end:?}; expected YYYY.MM.DD"))?;
    if window.start > window.end {
        bail!("clean range {} is inverted", window.label());
    }
    Ok(window)
}

pub async fn clean(home: &Path, config_path: &Path, args: CleanArgs) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let window = clean_window(&args, &config)?;
    let db = open_database(home).await?;

    let cleaner = RetentionCleaner::new(
        db.copy_records.clone(),
        vec![
            LogLocation::all(home.join(AUTO_LOG_DIR)),
            LogLocation::all(home.join(SCHED_LOG_DIR)),
            LogLocation::prefixed(home, SYSTEM_LOG_PREFIX),
        ],
        Arc::new(TracingSink::system()),
    );
    let report = cleaner.clean(window, args.dry_run).await?;
    let verb = if report.dry_run { "Would delete" } else { "Deleted" };
    println!(
        "{verb} {} record(s) and {} log file(s) ({} bytes) for {}",
        report.records,
        report.log_files,
        report.log_bytes,
        window.label()
    );
    db.close().await;
    Ok(())
}

pub fn config(config_path: &Path, command: ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    config_path.display()
                );
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Config::default().save(config_path)?;
            println!("Wrote {}", config_path.display());
        }
        ConfigCommand::Show => {
            let config = Config::load(config_path)?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }
    Ok(())
}
