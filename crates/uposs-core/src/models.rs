//! Shared data types for the pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which driver a pipeline run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Unbounded interval loop ("auto"), window is yesterday and today.
    #[serde(rename = "auto")]
    Continuous,
    /// Bounded-count loop ("sched"), window comes from configuration.
    #[serde(rename = "sched")]
    Bounded,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::Continuous, TaskKind::Bounded];

    /// Stable short name, also the value stored in the dedup store.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Continuous => "auto",
            TaskKind::Bounded => "sched",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "continuous" => Ok(TaskKind::Continuous),
            "sched" | "scheduled" | "bounded" => Ok(TaskKind::Bounded),
            other => Err(Error::InvalidInput(format!("unknown task kind: {other}"))),
        }
    }
}

/// A dedup store row: one source file that has been copied to staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRecord {
    pub id: i64,
    pub task_kind: TaskKind,
    pub file_name: String,
    /// Name of the date folder the file was copied from.
    pub copy_dir: String,
    /// Window label (`start-end`) for bounded runs.
    pub date_range: Option<String>,
    pub copy_time: DateTime<Utc>,
    pub status: String,
}

/// Fields needed to insert a copy record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCopyRecord {
    pub task_kind: TaskKind,
    pub file_name: String,
    pub copy_dir: String,
    pub date_range: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_round_trips_through_str() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_task_kind_aliases() {
        assert_eq!("Scheduled".parse::<TaskKind>().unwrap(), TaskKind::Bounded);
        assert_eq!(
            "continuous".parse::<TaskKind>().unwrap(),
            TaskKind::Continuous
        );
        assert!("weekly".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_task_kind_serde_uses_short_names() {
        let json = serde_json::to_string(&TaskKind::Bounded).unwrap();
        assert_eq!(json, "\"sched\"");
    }
}
