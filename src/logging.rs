use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record};
use serde::{Deserialize, Serialize};

use crate::error::RetargetError;

/// Minimum level written by the logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name; used by the command line.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// One JSON object per line on stderr.
struct JsonLogger {
    level: LevelFilter,
}

fn log_line(record: &Record<'_>) -> serde_json::Value {
    serde_json::json!({
        "level": record.level().as_str().to_ascii_lowercase(),
        "target": record.target(),
        "message": record.args().to_string(),
        "timestamp": jiff::Zoned::now().to_string()
    })
}

impl Log for JsonLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        if let Err(e) = writeln!(stderr, "{}", log_line(record)) {
            eprintln!("Failed to write log message: {}", e);
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Initialize the logging system
pub fn init_logging(level: LogLevel) {
    let filter = LevelFilter::from(level);
    if log::set_boxed_logger(Box::new(JsonLogger { level: filter })).is_err() {
        eprintln!("Warning: Logging system already initialized");
        return;
    }
    log::set_max_level(filter);
}

/// Log RetargetError with automatic error-level logging
pub fn log_retarget_error(error: &RetargetError, context: Option<&str>) {
    let message = match context {
        Some(ctx) => format!("{}: {}", ctx, error),
        None => error.to_string(),
    };
    match error.location() {
        Some(location) => log::error!("[{}] {} ({:?})", error.kind().as_str(), message, location),
        None => log::error!("[{}] {}", error.kind().as_str(), message),
    }
}

/// Result extension for convenient error logging
pub trait ResultExt<T, E> {
    fn log_error(self, context: Option<&str>) -> Self;
}

impl<T> ResultExt<T, RetargetError> for Result<T, RetargetError> {
    fn log_error(self, context: Option<&str>) -> Self {
        if let Err(ref error) = self {
            log_retarget_error(error, context);
        }
        self
    }
}
