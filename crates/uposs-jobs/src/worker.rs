//! Task driver for the continuous and bounded loops.
//!
//! Both loops share one driver; [`Schedule`] captures the two variation
//! points (date window and termination). A [`TaskHandle`] owns the stop
//! signal and the join handle so a caller can stop a running task and wait
//! for its clean exit before starting another one of the same kind.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use uposs_core::defaults::EVENT_BUS_CAPACITY;
use uposs_core::{parse_order_filter, Config, Error, LogSink, Result, TaskKind};

use crate::pipeline::Pipeline;
use crate::upload::UploadOutcome;

/// How a task loop is driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Yesterday ∪ today, forever, sleeping `auto_interval` between cycles.
    Continuous,
    /// Configured date window, `sched_times` cycles back to back.
    Bounded {
        /// Only copy files whose name carries one of these order numbers.
        /// Empty means no filter.
        order_filter: Vec<String>,
    },
}

impl Schedule {
    /// Bounded schedule with an order filter parsed from a comma list.
    pub fn bounded(orders: &str) -> Self {
        Self::Bounded {
            order_filter: parse_order_filter(orders),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Continuous => TaskKind::Continuous,
            Self::Bounded { .. } => TaskKind::Bounded,
        }
    }

    fn order_filter(&self) -> &[String] {
        match self {
            Self::Continuous => &[],
            Self::Bounded { order_filter } => order_filter,
        }
    }
}

/// One pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Copy,
    Normalize,
    Upload,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Normalize => "normalize",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by a running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// The loop started.
    Started { task: TaskKind },
    /// A step began.
    StepStarted { task: TaskKind, cycle: u32, step: Step },
    /// A step finished (successfully or not).
    StepCompleted {
        task: TaskKind,
        cycle: u32,
        step: Step,
        ok: bool,
    },
    /// A full cycle finished. `total` is `None` for the continuous loop.
    CycleCompleted {
        task: TaskKind,
        cycle: u32,
        total: Option<u32>,
    },
    /// The loop gave up on a fatal error.
    Failed { task: TaskKind, error: String },
    /// The loop exited.
    Stopped { task: TaskKind },
}

/// Why a task loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    /// The stop signal fired.
    Stopped,
    /// The bounded loop ran all its cycles.
    Completed { cycles: u32 },
    /// A configuration error ended the loop.
    Failed(String),
}

/// Handle for controlling a running task.
pub struct TaskHandle {
    kind: TaskKind,
    cancel: CancellationToken,
    join: JoinHandle<TaskExit>,
    event_rx: broadcast::Receiver<TaskEvent>,
}

impl TaskHandle {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Fire the stop signal without waiting.
    pub fn stop_signal(&self) {
        self.cancel.cancel();
    }

    /// A clone of the stop signal, for wiring to an external trigger.
    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fire the stop signal and wait for the loop to exit.
    pub async fn stop(self) -> Result<TaskExit> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the loop to exit on its own.
    pub async fn wait(self) -> Result<TaskExit> {
        self.join
            .await
            .map_err(|e| Error::Internal(format!("{} task panicked: {e}", self.kind)))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Get a receiver for task events.
    pub fn events(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_rx.resubscribe()
    }
}

/// Drives [`Pipeline`] cycles according to a [`Schedule`].
pub struct TaskRunner {
    pipeline: Arc<Pipeline>,
    schedule: Schedule,
    sink: Arc<dyn LogSink>,
    event_tx: broadcast::Sender<TaskEvent>,
}

/// Control flow after a cycle.
enum CycleEnd {
    Continue,
    Stop,
    Fatal(Error),
}

impl TaskRunner {
    pub fn new(pipeline: Arc<Pipeline>, schedule: Schedule, sink: Arc<dyn LogSink>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            pipeline,
            schedule,
            sink,
            event_tx,
        }
    }

    /// Get a receiver for task events, including those emitted right after
    /// [`TaskRunner::start`].
    pub fn events(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_tx.subscribe()
    }

    /// Spawn the loop and return a handle for control.
    pub fn start(self) -> TaskHandle {
        let kind = self.schedule.kind();
        let cancel = CancellationToken::new();
        let event_rx = self.event_tx.subscribe();

        let token = cancel.clone();
        let span = tracing::info_span!("task", task = %kind);
        let join = tokio::spawn(async move { self.run(token).await }.instrument(span));

        TaskHandle {
            kind,
            cancel,
            join,
            event_rx,
        }
    }

    /// Run the loop on the current task until it exits.
    pub async fn run(self, cancel: CancellationToken) -> TaskExit {
        let kind = self.schedule.kind();
        self.sink.info(&format!("{kind} task started"));
        info!(subsystem = "jobs", component = "worker", task = %kind, "Task started");
        self.emit(TaskEvent::Started { task: kind });

        let exit = match &self.schedule {
            Schedule::Continuous => self.run_continuous(&cancel).await,
            Schedule::Bounded { .. } => self.run_bounded(&cancel).await,
        };

        match &exit {
            TaskExit::Failed(message) => {
                self.sink.error(&format!("{kind} task stopped on error: {message}"));
                error!(subsystem = "jobs", component = "worker", task = %kind, error = %message, "Task failed");
                self.emit(TaskEvent::Failed {
                    task: kind,
                    error: message.clone(),
                });
            }
            TaskExit::Completed { cycles } => {
                self.sink.info(&format!("{kind} task finished after {cycles} cycle(s)"));
            }
            TaskExit::Stopped => {
                self.sink.info(&format!("{kind} task stopped"));
            }
        }
        info!(subsystem = "jobs", component = "worker", task = %kind, exit = ?exit, "Task stopped");
        self.emit(TaskEvent::Stopped { task: kind });
        exit
    }

    async fn run_continuous(&self, cancel: &CancellationToken) -> TaskExit {
        let mut cycle: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return TaskExit::Stopped;
            }
            cycle = cycle.saturating_add(1);

            let config = match self.pipeline.load_config() {
                Ok(c) => c,
                Err(e) => return TaskExit::Failed(e.to_string()),
            };
            let interval = match config.interval() {
                Ok(i) => i,
                Err(e) => return TaskExit::Failed(e.to_string()),
            };

            match self.run_cycle(&config, cycle, None, cancel).await {
                CycleEnd::Continue => {}
                CycleEnd::Stop => return TaskExit::Stopped,
                CycleEnd::Fatal(e) => return TaskExit::Failed(e.to_string()),
            }

            self.sink
                .info(&format!("Sleeping {}s until next cycle", interval.as_secs()));
            tokio::select! {
                _ = cancel.cancelled() => return TaskExit::Stopped,
                _ = sleep(interval) => {}
            }
        }
    }

    async fn run_bounded(&self, cancel: &CancellationToken) -> TaskExit {
        let total = match self
            .pipeline
            .load_config()
            .and_then(|c| c.repeat_count())
        {
            Ok(n) => n,
            Err(e) => return TaskExit::Failed(e.to_string()),
        };
        self.sink.info(&format!("Running {total} cycle(s)"));

        for cycle in 1..=total {
            if cancel.is_cancelled() {
                return TaskExit::Stopped;
            }
            let config = match self.pipeline.load_config() {
                Ok(c) => c,
                Err(e) => return TaskExit::Failed(e.to_string()),
            };
            match self.run_cycle(&config, cycle, Some(total), cancel).await {
                CycleEnd::Continue => {}
                CycleEnd::Stop => return TaskExit::Stopped,
                CycleEnd::Fatal(e) => return TaskExit::Failed(e.to_string()),
            }
        }
        TaskExit::Completed { cycles: total }
    }

    /// One copy → normalize → upload cycle. The stop signal is checked
    /// between steps; configuration errors end the loop, other step errors
    /// end only this cycle.
    async fn run_cycle(
        &self,
        config: &Config,
        cycle: u32,
        total: Option<u32>,
        cancel: &CancellationToken,
    ) -> CycleEnd {
        let kind = self.schedule.kind();
        let cycle_id = Uuid::now_v7();
        let start = Instant::now();
        match total {
            Some(total) => self.sink.info(&format!("Cycle {cycle}/{total} started")),
            None => self.sink.info(&format!("Cycle {cycle} started")),
        }

        for step in [Step::Copy, Step::Normalize, Step::Upload] {
            if cancel.is_cancelled() {
                self.sink.info(&format!("Stop requested before {step} step"));
                return CycleEnd::Stop;
            }
            self.sink.info(&format!("Step {step} started"));
            self.emit(TaskEvent::StepStarted { task: kind, cycle, step });

            let result = self.run_step(step, config, cancel).await;
            self.emit(TaskEvent::StepCompleted {
                task: kind,
                cycle,
                step,
                ok: result.is_ok(),
            });

            match result {
                Ok(summary) => self.sink.info(&format!("Step {step} done: {summary}")),
                Err(e) if e.is_config() => return CycleEnd::Fatal(e),
                Err(e) if cancel.is_cancelled() => {
                    self.sink.info(&format!("Step {step} interrupted: {e}"));
                    return CycleEnd::Stop;
                }
                Err(e) => {
                    self.sink.error(&format!("Step {step} failed: {e}"));
                    warn!(
                        subsystem = "jobs",
                        component = "worker",
                        task = %kind,
                        cycle_id = %cycle_id,
                        step = %step,
                        error = %e,
                        "Step failed, skipping rest of cycle"
                    );
                    break;
                }
            }
        }

        info!(
            subsystem = "jobs",
            component = "worker",
            task = %kind,
            cycle_id = %cycle_id,
            cycle,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cycle complete"
        );
        match total {
            Some(total) => self.sink.info(&format!("Cycle {cycle}/{total} complete")),
            None => self.sink.info(&format!("Cycle {cycle} complete")),
        }
        self.emit(TaskEvent::CycleCompleted {
            task: kind,
            cycle,
            total,
        });
        CycleEnd::Continue
    }

    async fn run_step(&self, step: Step, config: &Config, cancel: &CancellationToken) -> Result<String> {
        let kind = self.schedule.kind();
        match step {
            Step::Copy => {
                let r = self
                    .pipeline
                    .copy_step(config, kind, self.schedule.order_filter(), self.sink.clone())
                    .await?;
                Ok(format!(
                    "{} folder(s), {} copied, {} already copied, {} failed",
                    r.folders, r.copied, r.skipped_existing, r.failed
                ))
            }
            Step::Normalize => {
                let r = self.pipeline.normalize_step(config, self.sink.clone()).await?;
                Ok(format!(
                    "{} processed, {} under size threshold, {} purged, {} failed",
                    r.processed, r.skipped_small, r.purged, r.failed
                ))
            }
            Step::Upload => {
                let outcome = self
                    .pipeline
                    .upload_step(config, kind, self.sink.clone(), cancel)
                    .await?;
                Ok(match outcome {
                    UploadOutcome::NothingToUpload => "nothing to upload".to_string(),
                    UploadOutcome::Completed(r) => format!(
                        "{} pushed, {} push failed, {} kept for next cycle, {} unreadable",
                        r.pushed,
                        r.push_failed,
                        r.indeterminate + r.oversized,
                        r.failed
                    ),
                })
            }
        }
    }

    fn emit(&self, event: TaskEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_kind() {
        assert_eq!(Schedule::Continuous.kind(), TaskKind::Continuous);
        assert_eq!(Schedule::bounded("").kind(), TaskKind::Bounded);
    }

    #[test]
    fn test_bounded_schedule_parses_order_list() {
        let schedule = Schedule::bounded("A123, B456，C789,,");
        assert_eq!(
            schedule,
            Schedule::Bounded {
                order_filter: vec!["A123".into(), "B456".into(), "C789".into()]
            }
        );
        assert_eq!(schedule.order_filter().len(), 3);
    }

    #[test]
    fn test_continuous_schedule_has_no_filter() {
        assert!(Schedule::Continuous.order_filter().is_empty());
    }

    #[test]
    fn test_step_display() {
        assert_eq!(Step::Copy.to_string(), "copy");
        assert_eq!(Step::Normalize.to_string(), "normalize");
        assert_eq!(Step::Upload.to_string(), "upload");
    }
}
