/// Structured logging for the flood alert service
///
/// Provides context-rich logging with component tags, optional context
/// identifiers (alert kind, record id, token prefix), timestamps, and
/// severity levels. Supports both console output and file-based logging
/// for the long-running server and simulator processes.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parses `LOG_LEVEL`-style names. Unknown names fall back to `Info`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Simulator,
    Evaluator,
    Predictor,
    Database,
    Notify,
    Sync,
    Http,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Simulator => write!(f, "SIM"),
            Component::Evaluator => write!(f, "EVAL"),
            Component::Predictor => write!(f, "AI"),
            Component::Database => write!(f, "DB"),
            Component::Notify => write!(f, "PUSH"),
            Component::Sync => write!(f, "SYNC"),
            Component::Http => write!(f, "HTTP"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the dependency is not configured in this deployment
    Expected,
    /// Unexpected failure - the dependency is configured but misbehaving
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// How records are rendered on stdout/stderr. File output is always the
/// timestamped form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStyle {
    /// `2024-10-01 12:00:00 UTC WARN SYNC [ctx]: message`
    Timestamped,
    /// `   ⚠ SYNC [ctx]: message`, for interactive runs of the simulator
    Compact,
}

impl ConsoleStyle {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "compact" | "short" => ConsoleStyle::Compact,
            _ => ConsoleStyle::Timestamped,
        }
    }
}

static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    min_level: LogLevel,
    log_file: Option<PathBuf>,
    style: ConsoleStyle,
}

impl Logger {
    /// Installs the global logger, replacing any earlier one.
    pub fn install(min_level: LogLevel, log_file: Option<PathBuf>, style: ConsoleStyle) {
        let logger = Logger {
            min_level,
            log_file,
            style,
        };
        if let Ok(mut guard) = LOGGER.lock() {
            *guard = Some(logger);
        }
    }

    fn write(&self, level: LogLevel, component: Component, context: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let tag = match context {
            Some(ctx) => format!("{} [{}]", component, ctx),
            None => component.to_string(),
        };
        let stamped = format!(
            "{} {} {}: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            level,
            tag,
            message
        );

        let console = match self.style {
            ConsoleStyle::Timestamped => stamped.clone(),
            ConsoleStyle::Compact => {
                let marker = match level {
                    LogLevel::Error => "✗ ",
                    LogLevel::Warning => "⚠ ",
                    LogLevel::Info => "",
                    LogLevel::Debug => "[DEBUG] ",
                };
                format!("   {}{}: {}", marker, tag, message)
            }
        };
        if level >= LogLevel::Warning {
            eprintln!("{}", console);
        } else {
            println!("{}", console);
        }

        if let Some(path) = &self.log_file {
            let appended = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{}", stamped));
            if let Err(e) = appended {
                eprintln!("log file {} unwritable: {}", path.display(), e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize from `LOG_LEVEL`, `LOG_FILE` and `LOG_STYLE`.
pub fn init_from_env() {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    Logger::install(
        var("LOG_LEVEL").map_or(LogLevel::Info, |v| LogLevel::from_name(&v)),
        var("LOG_FILE").map(PathBuf::from),
        var("LOG_STYLE").map_or(ConsoleStyle::Timestamped, |v| ConsoleStyle::from_name(&v)),
    );
}

fn emit(level: LogLevel, component: Component, context: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.write(level, component, context, message);
        }
    }
}

/// Log a general informational message
pub fn info(component: Component, context: Option<&str>, message: &str) {
    emit(LogLevel::Info, component, context, message);
}

/// Log a warning message
pub fn warn(component: Component, context: Option<&str>, message: &str) {
    emit(LogLevel::Warning, component, context, message);
}

/// Log an error message
pub fn error(component: Component, context: Option<&str>, message: &str) {
    emit(LogLevel::Error, component, context, message);
}

/// Log a debug message
pub fn debug(component: Component, context: Option<&str>, message: &str) {
    emit(LogLevel::Debug, component, context, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a dependency failure from its rendered error message.
pub fn classify_failure(error_message: &str) -> FailureType {
    let lower = error_message.to_ascii_lowercase();

    if lower.contains("not configured") || lower.contains("no device token") {
        FailureType::Expected
    } else if lower.contains("http")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
    {
        FailureType::Unexpected
    } else if lower.contains("malformed") || lower.contains("parse") {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

/// Log a dependency failure at the level its classification calls for.
pub fn log_dependency_failure(component: Component, operation: &str, err: &dyn std::error::Error) {
    let error_msg = err.to_string();
    let failure_type = classify_failure(&error_msg);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Expected => debug(component, None, &message),
        FailureType::Unexpected => error(component, None, &message),
        FailureType::Unknown => warn(component, None, &message),
    }
}

/// Log a summary of an outbox flush.
pub fn log_flush_summary(total: usize, delivered: usize, kept: usize) {
    let message = format!(
        "Flush complete: {}/{} delivered, {} kept for retry",
        delivered, total, kept
    );

    if kept == 0 {
        info(Component::Sync, None, &message);
    } else if delivered == 0 {
        error(Component::Sync, None, &message);
    } else {
        warn(Component::Sync, None, &message);
    }
}
