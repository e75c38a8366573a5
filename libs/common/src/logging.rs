//! Classified request/response log
//!
//! The pipeline appends one [`LogEntry`] per observation to a [`LogSink`].
//! Entries are classified into four kinds (request, response, warning,
//! error); each kind has its own newline-delimited JSON stream. Records are
//! never mutated after they are written.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use uuid::Uuid;

/// Classification of a log record, which also selects its sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Request,
    Response,
    Warning,
    Error,
}

impl LogKind {
    pub const ALL: [LogKind; 4] = [
        LogKind::Request,
        LogKind::Response,
        LogKind::Warning,
        LogKind::Error,
    ];

    /// File name of the stream holding this kind
    pub fn file_name(&self) -> &'static str {
        match self {
            LogKind::Request => "requests.log",
            LogKind::Response => "responses.log",
            LogKind::Warning => "warnings.log",
            LogKind::Error => "errors.log",
        }
    }

    fn index(&self) -> usize {
        match self {
            LogKind::Request => 0,
            LogKind::Response => 1,
            LogKind::Warning => 2,
            LogKind::Error => 3,
        }
    }
}

/// Fields shared by every log record of one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMeta {
    pub request_id: Uuid,
    pub method: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestMeta {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: method.into(),
            url: url.into(),
            timestamp: Utc::now(),
        }
    }

    /// Same request, stamped with the current time
    pub fn restamp(&self) -> Self {
        Self {
            timestamp: Utc::now(),
            ..self.clone()
        }
    }
}

/// Whether a credential header was supplied; its value is never logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Provided,
    Absent,
}

impl Presence {
    pub fn of(provided: bool) -> Self {
        if provided {
            Presence::Provided
        } else {
            Presence::Absent
        }
    }
}

/// A single classified log record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "log_type", rename_all = "lowercase")]
pub enum LogEntry {
    Request {
        #[serde(flatten)]
        meta: RequestMeta,
        api_key: Presence,
        authorization: Presence,
        query: Option<String>,
    },
    Response {
        #[serde(flatten)]
        meta: RequestMeta,
        status: u16,
        duration_ms: f64,
    },
    Warning {
        #[serde(flatten)]
        meta: RequestMeta,
        status: u16,
        duration_ms: f64,
        message: String,
    },
    Error {
        #[serde(flatten)]
        meta: RequestMeta,
        status: u16,
        duration_ms: f64,
        message: String,
        detail: Option<String>,
    },
}

impl LogEntry {
    pub fn kind(&self) -> LogKind {
        match self {
            LogEntry::Request { .. } => LogKind::Request,
            LogEntry::Response { .. } => LogKind::Response,
            LogEntry::Warning { .. } => LogKind::Warning,
            LogEntry::Error { .. } => LogKind::Error,
        }
    }

    pub fn meta(&self) -> &RequestMeta {
        match self {
            LogEntry::Request { meta, .. }
            | LogEntry::Response { meta, .. }
            | LogEntry::Warning { meta, .. }
            | LogEntry::Error { meta, .. } => meta,
        }
    }

    /// Status code of the observed response, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            LogEntry::Request { .. } => None,
            LogEntry::Response { status, .. }
            | LogEntry::Warning { status, .. }
            | LogEntry::Error { status, .. } => Some(*status),
        }
    }
}

/// Append-only destination for classified log records
///
/// Implementations must accept concurrent calls without interleaving
/// records and must not block the calling task on I/O.
pub trait LogSink: Send + Sync {
    fn record(&self, entry: LogEntry);
}

/// Flushes and closes the file sink when dropped
pub struct LogSinkGuard {
    _guards: Vec<WorkerGuard>,
}

/// Four newline-delimited JSON files, one per [`LogKind`]
///
/// Each file is fed by a dedicated non-blocking writer; a record is handed
/// over as one buffer so lines never interleave.
#[derive(Clone)]
pub struct FileLogSink {
    writers: [NonBlocking; 4],
}

impl FileLogSink {
    /// Open (or create) the four log files under `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<(Self, LogSinkGuard)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        let mut writers = Vec::with_capacity(LogKind::ALL.len());
        let mut guards = Vec::with_capacity(LogKind::ALL.len());
        for kind in LogKind::ALL {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(kind.file_name())
                .build(dir)
                .with_context(|| format!("Failed to open {}", kind.file_name()))?;
            let (writer, guard) = NonBlockingBuilder::default()
                .lossy(false)
                .thread_name("log-sink")
                .finish(appender);
            writers.push(writer);
            guards.push(guard);
        }

        let writers: [NonBlocking; 4] = writers
            .try_into()
            .map_err(|_| anyhow::anyhow!("Expected one writer per log kind"))?;

        debug!("Log sink opened in {}", dir.display());
        Ok((Self { writers }, LogSinkGuard { _guards: guards }))
    }
}

impl LogSink for FileLogSink {
    fn record(&self, entry: LogEntry) {
        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize log entry: {}", e);
                return;
            }
        };
        line.push('\n');

        let mut writer = self.writers[entry.kind().index()].clone();
        if let Err(e) = writer.write_all(line.as_bytes()) {
            error!("Failed to write {} log: {}", entry.kind().file_name(), e);
        }
    }
}

/// In-memory sink, mostly useful in tests
#[derive(Clone, Default)]
pub struct MemoryLogSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record written so far, in order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn entries_of(&self, kind: LogKind) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.kind() == kind)
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}
