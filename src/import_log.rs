//! Per-run diagnostics for a table import.
//!
//! Binding never fails on a bad cell; the problem is recorded here instead
//! and the run carries on. Entries below the configured threshold are
//! dropped at record time, and [`ImportLog::export`] renders a report only
//! when the worst entry reaches the threshold.

use std::fmt::{self, Write as _};

use clap::ValueEnum;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

/// Severity of a diagnostic, also used as the reporting threshold.
///
/// `None` as a threshold silences the log entirely.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    #[default]
    Log,
    Warning,
    Error,
    None,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Log => "log",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::None => "none",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            LogLevel::Warning => write!(f, "[Warning] {}", self.message),
            LogLevel::Error => write!(f, "[Error] {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportLog {
    table_name: String,
    record_count: usize,
    threshold: LogLevel,
    entries: Vec<LogEntry>,
    max_severity: Option<LogLevel>,
    record_severity: Option<LogLevel>,
}

impl ImportLog {
    pub fn new(table_name: &str, record_count: usize, threshold: LogLevel) -> Self {
        let mut log = Self::default();
        log.initialize(table_name, record_count, threshold);
        log
    }

    /// Resets the log for a new run.
    pub fn initialize(&mut self, table_name: &str, record_count: usize, threshold: LogLevel) {
        self.table_name = table_name.to_string();
        self.record_count = record_count;
        self.threshold = threshold;
        self.entries.clear();
        self.max_severity = None;
        self.record_severity = None;
    }

    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn record(&mut self, severity: LogLevel, message: impl Into<String>) {
        if severity == LogLevel::None
            || self.threshold == LogLevel::None
            || severity < self.threshold
        {
            return;
        }
        self.entries.push(LogEntry {
            severity,
            message: message.into(),
        });
        self.max_severity = self.max_severity.max(Some(severity));
        self.record_severity = self.record_severity.max(Some(severity));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Error, message);
    }

    pub fn implicit_cast(&mut self, index: usize, raw: &str, result: i64) {
        self.warning(format!(
            "implicit float->int cast (index={index}, {raw} -> {result})"
        ));
    }

    pub fn parse_failed(&mut self, type_name: &str, index: usize, raw: &str) {
        self.error(format!(
            "failed to parse {type_name} (index={index}, str={raw})"
        ));
    }

    pub fn out_of_range(&mut self, index: usize) {
        self.error(format!("column index out of range (index={index})"));
    }

    pub fn duplicate_key(&mut self, key: i64) {
        self.error(format!("duplicate key (id={key}); keeping the first record"));
    }

    /// Marks the start of one record's diagnostics.
    pub fn begin_record(&mut self) {
        self.record_severity = None;
    }

    /// Adds an "Imported" line when the record's worst entry reaches the
    /// threshold. A clean record counts as `Log`, so at the `Log` threshold
    /// every stored record is listed.
    pub fn end_record(&mut self, record: &dyn fmt::Display) {
        let severity = self.record_severity.unwrap_or(LogLevel::Log);
        if self.threshold != LogLevel::None && severity >= self.threshold {
            self.entries.push(LogEntry {
                severity: LogLevel::Log,
                message: format!("Imported {record}"),
            });
        }
        self.record_severity = None;
    }

    /// Closes a record that was not stored, without an "Imported" line.
    pub fn skip_record(&mut self) {
        self.record_severity = None;
    }

    pub fn aborted(&mut self, cause: &dyn fmt::Display) {
        self.error(format!("import aborted by exception ({cause})"));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn count(&self, severity: LogLevel) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }

    pub fn max_severity(&self) -> Option<LogLevel> {
        self.max_severity
    }

    pub fn has_errors(&self) -> bool {
        self.max_severity == Some(LogLevel::Error)
    }

    /// Renders the report when the worst entry reaches the threshold.
    pub fn render(&self) -> Option<String> {
        if self.threshold == LogLevel::None {
            return None;
        }
        let max = self.max_severity.unwrap_or(LogLevel::Log);
        if max < self.threshold {
            return None;
        }
        let mut output = String::new();
        let _ = writeln!(output, "[{}]", self.table_name);
        let _ = writeln!(output, "count={}", self.record_count);
        let _ = writeln!(output);
        for entry in &self.entries {
            let _ = writeln!(output, "{entry}");
        }
        Some(output)
    }

    /// Renders the report and emits it through `log` at the level matching
    /// the worst entry.
    pub fn export(&self) -> Option<String> {
        let report = self.render()?;
        match self.max_severity.unwrap_or(LogLevel::Log) {
            LogLevel::Error => error!("{report}"),
            LogLevel::Warning => warn!("{report}"),
            _ => info!("{report}"),
        }
        Some(report)
    }
}
