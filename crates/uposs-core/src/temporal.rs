//! Date-folder parsing and the Folder Matcher.
//!
//! A date folder is a directory named `YYYY.MM.DD`. The continuous task
//! always targets yesterday and today by local wall-clock date; the bounded
//! task targets the configured inclusive window.

use chrono::{Duration, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::Config;
use crate::defaults::DATE_FOLDER_FORMAT;
use crate::models::TaskKind;

static DATE_FOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}\.\d{2}\.\d{2}$").expect("static regex"));

/// Parse a `YYYY.MM.DD` folder name. Returns `None` for anything else,
/// including well-formed but impossible dates such as `2025.13.40`.
pub fn parse_folder_date(name: &str) -> Option<NaiveDate> {
    if !DATE_FOLDER_RE.is_match(name) {
        return None;
    }
    NaiveDate::parse_from_str(name, DATE_FOLDER_FORMAT).ok()
}

/// Render a date as a folder name.
pub fn format_folder_date(date: NaiveDate) -> String {
    date.format(DATE_FOLDER_FORMAT).to_string()
}

/// Today's date on the local wall clock.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Parse both bounds; either failing yields `None`.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self::new(
            parse_folder_date(start.trim())?,
            parse_folder_date(end.trim())?,
        ))
    }

    /// Yesterday and today relative to `today`.
    pub fn recent(today: NaiveDate) -> Self {
        Self::new(today - Duration::days(1), today)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// `start-end` label stored with bounded-task copy records.
    pub fn label(&self) -> String {
        format!(
            "{}-{}",
            format_folder_date(self.start),
            format_folder_date(self.end)
        )
    }

    /// Whether the window is usable by the bounded task:
    /// start ≤ end ≤ today.
    pub fn is_well_ordered(&self, today: NaiveDate) -> bool {
        self.start <= self.end && self.end <= today
    }
}

/// Decides whether a date folder belongs to the active window of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderMatcher {
    /// `None` when the configured bounds failed to parse: nothing matches.
    window: Option<DateWindow>,
}

impl FolderMatcher {
    /// Matcher for yesterday and today, independent of configuration.
    pub fn continuous(today: NaiveDate) -> Self {
        Self {
            window: Some(DateWindow::recent(today)),
        }
    }

    /// Matcher for a configured window. Unparseable bounds fail closed.
    pub fn bounded(start: &str, end: &str) -> Self {
        Self {
            window: DateWindow::parse(start, end),
        }
    }

    /// Matcher for `kind`, using `config` only for the bounded kind.
    pub fn for_task(kind: TaskKind, config: &Config, today: NaiveDate) -> Self {
        match kind {
            TaskKind::Continuous => Self::continuous(today),
            TaskKind::Bounded => Self::bounded(&config.start_time, &config.end_time),
        }
    }

    /// The effective window, if any.
    pub fn window(&self) -> Option<DateWindow> {
        self.window
    }

    pub fn matches(&self, folder_name: &str) -> bool {
        match (self.window, parse_folder_date(folder_name)) {
            (Some(window), Some(date)) => window.contains(date),
            _ => false,
        }
    }
}

/// One-shot form of the matcher using the local clock.
pub fn folder_matches(folder_name: &str, kind: TaskKind, config: &Config) -> bool {
    FolderMatcher::for_task(kind, config, local_today()).matches(folder_name)
}
