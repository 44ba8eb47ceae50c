#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging for the directive pipeline.
//!
//! Every record carries the emitting module, a dotted message key
//! (`router.decode.failed`) and an optional directive correlation id so a
//! single directive can be followed from retrieval through dispatch.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Verbose diagnostics (skipped intents, stage transitions).
    Debug,
    /// Informational events.
    Info,
    /// Recoverable problems; the current directive is abandoned.
    Warn,
    /// Infrastructure failures.
    Error,
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Dotted message key.
    pub message: String,
    /// Directive the record belongs to, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<u64>,
    /// Arbitrary JSON fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            directive: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Tags the record with a directive id.
    #[must_use]
    pub fn with_directive(mut self, directive: u64) -> Self {
        self.directive = Some(directive);
        self
    }

    /// Merges the fields of a JSON object into the metadata. Non-object values
    /// are stored under `value`.
    #[must_use]
    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        match fields {
            serde_json::Value::Object(map) => self.metadata.extend(map),
            serde_json::Value::Null => {}
            other => {
                self.metadata.insert("value".into(), other);
            }
        }
        self
    }
}

/// Destination for log records.
pub trait LogSink: Send + Sync {
    /// Persists or forwards a record.
    fn log(&self, record: &LogRecord) -> Result<()>;
}

/// Thread-safe JSON logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLogger {
    fn log(&self, record: &LogRecord) -> Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// In-memory sink retaining the most recent records.
#[derive(Debug)]
pub struct MemoryLogSink {
    capacity: usize,
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    /// Creates a sink that keeps at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the retained records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Whether any retained record carries the given message key.
    #[must_use]
    pub fn contains(&self, message: &str) -> bool {
        self.records.lock().iter().any(|r| r.message == message)
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, record: &LogRecord) -> Result<()> {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.remove(0);
        }
        records.push(record.clone());
        Ok(())
    }
}
