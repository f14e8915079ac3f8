//! Tracing initialisation.
//!
//! Environment variables:
//!   LOG_FORMAT  - "json" or "text" (default: "text")
//!   LOG_FILE    - path to log file (optional, enables file logging)
//!   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
//!   RUST_LOG    - standard env filter (default: [`DEFAULT_FILTER`])
//!
//! Independently of the above, task-sink messages are written to daily
//! rolling files under the data home: `log_auto/auto.log.*`,
//! `log_sched/sched.log.*` and `sys.log.*`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use uposs_core::logging::{TARGET_AUTO, TARGET_SCHED, TARGET_SYSTEM};

pub const DEFAULT_FILTER: &str =
    "uposs=info,uposs_core=info,uposs_db=info,uposs_remote=info,uposs_jobs=info,uposs_app=info";

/// Prefix of the system log files in the data home.
pub const SYSTEM_LOG_PREFIX: &str = "sys.log";
pub const AUTO_LOG_DIR: &str = "log_auto";
pub const SCHED_LOG_DIR: &str = "log_sched";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the non-blocking writers flushing until dropped.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Where each task sink's files live, as (directory, file prefix, target).
pub fn task_log_files(home: &Path) -> [(PathBuf, &'static str, &'static str); 3] {
    [
        (home.join(AUTO_LOG_DIR), "auto.log", TARGET_AUTO),
        (home.join(SCHED_LOG_DIR), "sched.log", TARGET_SCHED),
        (home.to_path_buf(), SYSTEM_LOG_PREFIX, TARGET_SYSTEM),
    ]
}

pub fn init(home: &Path) -> anyhow::Result<LogGuards> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let json = log_format == "json";
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    // Main output: stdout or LOG_FILE with daily rotation
    let main: BoxedLayer = if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("uposs.log");
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(file_dir, file_name));
        guards.push(guard);
        if json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(log_ansi.unwrap_or(false)) // no ANSI in files by default
                .boxed()
        }
    } else if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        layer.boxed()
    };
    layers.push(main.with_filter(env_filter).boxed());

    // Per-task files
    for (dir, prefix, target) in task_log_files(home) {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, prefix));
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(Targets::new().with_target(target, Level::INFO))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("installing tracing subscriber")?;

    tracing::info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        home = %home.display(),
        "Logging initialized"
    );
    Ok(LogGuards { _guards: guards })
}
