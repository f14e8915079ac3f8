//! Structured logging schema, field name constants and the log sink
//! injected into every pipeline component.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded pipeline, requires operator attention |
//! | WARN  | Recoverable issue, file skipped or retry scheduled |
//! | INFO  | Lifecycle events, step boundaries, cycle completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-chunk iteration, high-volume data |
//!
//! ## Sinks
//!
//! Pipeline components never write to a presentation surface directly. They
//! receive an `Arc<dyn LogSink>` and report through it. [`TracingSink`] routes
//! each [`LogChannel`] to its own tracing target so the binary can send the
//! continuous task, the bounded task and system messages to separate files.

use std::sync::Mutex;

use tracing::Level;

use crate::models::TaskKind;

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "remote", "jobs", "app"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "copy", "normalize", "upload", "driver"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "copy_tree", "validate", "push", "put_object"
pub const OPERATION: &str = "op";

/// Task kind driving the operation ("auto" or "sched").
pub const TASK: &str = "task";

/// Correlation ID of one pipeline cycle.
pub const CYCLE_ID: &str = "cycle_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// File name being operated on.
pub const FILE: &str = "file";

/// Candidate order identifier.
pub const ORDER: &str = "order";

/// Object storage bucket.
pub const BUCKET: &str = "bucket";

/// Object key inside the bucket.
pub const OBJECT_KEY: &str = "key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of bytes moved.
pub const BYTES: &str = "bytes";

/// Attempt number of a retried call (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Sink targets ──────────────────────────────────────────────────────────

/// Tracing target of the continuous-task sink.
pub const TARGET_AUTO: &str = "uposs::auto";

/// Tracing target of the bounded-task sink.
pub const TARGET_SCHED: &str = "uposs::sched";

/// Tracing target of the system sink.
pub const TARGET_SYSTEM: &str = "uposs::system";

/// Destination a sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogChannel {
    /// Continuous ("auto") task log.
    Auto,
    /// Bounded ("scheduled") task log.
    Sched,
    /// Process-wide system log.
    System,
}

impl LogChannel {
    /// Tracing target this channel emits on.
    pub fn target(&self) -> &'static str {
        match self {
            LogChannel::Auto => TARGET_AUTO,
            LogChannel::Sched => TARGET_SCHED,
            LogChannel::System => TARGET_SYSTEM,
        }
    }
}

impl From<TaskKind> for LogChannel {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Continuous => LogChannel::Auto,
            TaskKind::Bounded => LogChannel::Sched,
        }
    }
}

/// Operator-facing log destination injected into pipeline components.
pub trait LogSink: Send + Sync {
    /// Record one message at the given level.
    fn log(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }
}

/// Sink that forwards messages to `tracing` on the channel's target.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    channel: LogChannel,
}

impl TracingSink {
    pub fn new(channel: LogChannel) -> Self {
        Self { channel }
    }

    /// Sink for the given task kind.
    pub fn for_task(kind: TaskKind) -> Self {
        Self::new(kind.into())
    }

    /// Process-wide system sink.
    pub fn system() -> Self {
        Self::new(LogChannel::System)
    }

    pub fn channel(&self) -> LogChannel {
        self.channel
    }
}

// Targets must be literals, so each (channel, level) pair gets its own call.
macro_rules! emit {
    ($target:literal, $level:expr, $message:expr) => {
        match $level {
            Level::ERROR => tracing::error!(target: $target, "{}", $message),
            Level::WARN => tracing::warn!(target: $target, "{}", $message),
            Level::INFO => tracing::info!(target: $target, "{}", $message),
            Level::DEBUG => tracing::debug!(target: $target, "{}", $message),
            _ => tracing::trace!(target: $target, "{}", $message),
        }
    };
}

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        match self.channel {
            LogChannel::Auto => emit!("uposs::auto", level, message),
            LogChannel::Sched => emit!("uposs::sched", level, message),
            LogChannel::System => emit!("uposs::system", level, message),
        }
    }
}

/// Sink that keeps every line in memory. Used by tests and by callers that
/// want to show the last messages of a run.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded lines.
    pub fn lines(&self) -> Vec<(Level, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }

    /// Number of lines recorded at `level`.
    pub fn count_at(&self, level: Level) -> usize {
        self.lines().iter().filter(|(l, _)| *l == level).count()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push((level, message.to_string()));
    }
}
