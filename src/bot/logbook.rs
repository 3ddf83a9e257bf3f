// =============================================================================
// Logbook — per-bot append-only log file
// =============================================================================
//
// One line per record:
//   <rfc3339-utc> <LEVEL> [<CATEGORY>] <message>
//
// The file is append-only; the dashboard reads the last K records through
// `tail`. This log is separate from the process-wide tracing stream: tracing
// is for operators, the logbook is the bot's own durable audit trail.
// =============================================================================

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::storage;
use crate::types::LogCategory;

/// Severity of a logbook record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One parsed logbook record, as served by the dashboard API.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub ts_utc: String,
    pub bot_id: u64,
    pub level: String,
    pub category: String,
    pub message: String,
}

/// Append-only log for one bot. Writes are serialized by a mutex; the owning
/// worker is the only writer but the shutdown path may flush concurrently.
pub struct Logbook {
    bot_id: u64,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Logbook {
    pub fn new(data_dir: &std::path::Path, bot_id: u64) -> Self {
        Self {
            bot_id,
            path: storage::bot_log_path(data_dir, bot_id),
            write_lock: Mutex::new(()),
        }
    }

    /// Append one record. Failures are reported to tracing but never
    /// propagate: losing one log line must not fail a tick.
    pub fn log(&self, level: LogLevel, category: LogCategory, message: &str) {
        if let Err(e) = self.append(level, category, message) {
            warn!(bot_id = self.bot_id, error = %e, "logbook append failed");
        }
    }

    pub fn info(&self, category: LogCategory, message: &str) {
        self.log(LogLevel::Info, category, message);
    }

    pub fn warn(&self, category: LogCategory, message: &str) {
        self.log(LogLevel::Warn, category, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, LogCategory::Error, message);
    }

    fn append(&self, level: LogLevel, category: LogCategory, message: &str) -> Result<()> {
        let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        // Newlines inside a message would corrupt the line format.
        let message = message.replace('\n', " ");
        let line = format!("{ts} {level} [{category}] {message}\n");

        let _guard = self.write_lock.lock();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }

    /// The last `n` records, oldest first. Lines that do not parse (manual
    /// edits, partial writes) are skipped.
    pub fn tail(&self, n: usize) -> Vec<LogRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(n);
        lines[start..]
            .iter()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    fn parse_line(&self, line: &str) -> Option<LogRecord> {
        // <ts> <LEVEL> [<CATEGORY>] <message>
        let mut parts = line.splitn(3, ' ');
        let ts = parts.next()?;
        let level = parts.next()?;
        let rest = parts.next()?;

        // Timestamps must at least parse as RFC 3339.
        DateTime::parse_from_rfc3339(ts).ok()?;

        let rest = rest.strip_prefix('[')?;
        let (category, message) = rest.split_once("] ")?;

        Some(LogRecord {
            ts_utc: ts.to_string(),
            bot_id: self.bot_id,
            level: level.to_string(),
            category: category.to_string(),
            message: message.to_string(),
        })
    }
}

impl std::fmt::Debug for Logbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logbook")
            .field("bot_id", &self.bot_id)
            .field("path", &self.path)
            .finish()
    }
}
