//! Per-stage logging.
//!
//! Every stage carries a [`StageLog`]: a leader string (the stage's driver
//! name), a verbosity-derived [`LogLevel`], and a shared writable stream.
//! A stage with no inputs opens its own stream from a named target; a stage
//! with inputs either opens an explicitly configured target or inherits the
//! stream object of its first input while keeping its own leader.
//!
//! This is the user-facing pipeline log required by the stage contract.
//! Engine-internal diagnostics use `tracing` instead.

use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::PipelineError;

/// Severity levels for stage log output.
///
/// The numeric order matches the `verbose` option: verbosity 0 logs errors
/// only, 3 and above logs everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Unrecoverable problems.
    Error = 0,
    /// Recoverable or suspicious conditions.
    Warning = 1,
    /// Progress reporting.
    Info = 2,
    /// Per-stage tracing output.
    Debug = 3,
}

impl LogLevel {
    /// Maps a `verbose` option value onto a level.
    #[must_use]
    pub fn from_verbosity(verbose: u32) -> Self {
        match verbose {
            0 => Self::Error,
            1 => Self::Warning,
            2 => Self::Info,
            _ => Self::Debug,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// A shared, lock-protected log sink.
///
/// Cloning a `LogStream` yields another handle onto the same sink, which is
/// how downstream stages inherit their first input's stream.
#[derive(Clone)]
pub struct LogStream {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LogStream {
    /// Opens a stream for a named target.
    ///
    /// Recognized targets: `stdlog` and `stderr` (standard error), `stdout`,
    /// `devnull`; anything else is treated as a file path and created.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LogTarget`] when a file target cannot be
    /// created.
    pub fn open(target: &str) -> Result<Self, PipelineError> {
        let sink: Box<dyn Write + Send> = match target {
            "stdlog" | "stderr" => Box::new(io::stderr()),
            "stdout" => Box::new(io::stdout()),
            "devnull" => Box::new(io::sink()),
            path => Box::new(File::create(path).map_err(|e| PipelineError::LogTarget {
                target: target.to_string(),
                reason: e.to_string(),
            })?),
        };
        Ok(Self {
            sink: Arc::new(Mutex::new(sink)),
        })
    }

    fn write_line(&self, line: &str) {
        let mut sink = self.sink.lock();
        // A failed log write must not fail the pipeline.
        let _ = writeln!(sink, "{line}");
        let _ = sink.flush();
    }

    /// Returns whether two handles share the same underlying sink.
    #[must_use]
    pub fn same_sink(&self, other: &LogStream) -> bool {
        Arc::ptr_eq(&self.sink, &other.sink)
    }
}

/// A stage's log: leader, level, and shared stream.
#[derive(Clone)]
pub struct StageLog {
    leader: String,
    level: LogLevel,
    stream: LogStream,
}

impl StageLog {
    /// Opens a log with its own stream for the named target.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LogTarget`] when the target cannot be opened.
    pub fn new(leader: impl Into<String>, target: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            leader: leader.into(),
            level: LogLevel::Error,
            stream: LogStream::open(target)?,
        })
    }

    /// Creates a log writing to an existing stream, with its own leader.
    #[must_use]
    pub fn with_stream(leader: impl Into<String>, stream: LogStream) -> Self {
        Self {
            leader: leader.into(),
            level: LogLevel::Error,
            stream,
        }
    }

    /// Returns the leader string.
    #[must_use]
    pub fn leader(&self) -> &str {
        &self.leader
    }

    /// Returns the current level.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Sets the level below which messages are dropped.
    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    /// Returns a handle to the underlying stream, for inheritance.
    #[must_use]
    pub fn stream(&self) -> LogStream {
        self.stream.clone()
    }

    /// Writes a message at the given level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level <= self.level {
            self.stream
                .write_line(&format!("({} {}) {message}", self.leader, level.tag()));
        }
    }

    /// Writes an error-level message.
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Writes a warning-level message.
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    /// Writes an info-level message.
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Writes a debug-level message.
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
}

impl std::fmt::Debug for StageLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageLog")
            .field("leader", &self.leader)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_verbosity() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Error);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Warning);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Debug);
    }

    #[test]
    fn test_file_target_and_filtering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.log");
        let mut log = StageLog::new("readers.faux", path.to_str().unwrap()).unwrap();
        log.set_level(LogLevel::Warning);

        log.warn("kept");
        log.debug("dropped");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("(readers.faux warning) kept"));
        assert!(!contents.contains("dropped"));
    }

    #[test]
    fn test_inherited_stream_keeps_own_leader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.log");
        let mut upstream = StageLog::new("readers.faux", path.to_str().unwrap()).unwrap();
        upstream.set_level(LogLevel::Info);

        let mut downstream = StageLog::with_stream("filters.decimation", upstream.stream());
        downstream.set_level(LogLevel::Info);
        assert!(downstream.stream().same_sink(&upstream.stream()));

        downstream.info("hello");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("(filters.decimation info) hello"));
    }
}
