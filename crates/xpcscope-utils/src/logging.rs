//! # Logging Utilities
//!
//! Logging infrastructure for xpcscope using `tracing`.
//!
//! Console output always goes to stderr: stdout belongs to command output and
//! to pcap streams piped into Wireshark, and a stray log line there corrupts
//! the capture.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xpcscope_utils::init_logging;
//!
//! // Keep the guard alive for as long as logs should reach the file
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("capture started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=xpcscope_core::symbols=trace`)
//! - `XPCSCOPE_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `XPCSCOPE_LOG_FILE`: Optional log file; a directory gets a dated file
//!   (`YYYY-MM-DD-xpcscope.log`) inside it

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s} (use 'pretty' or 'json')"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s} (use 'error', 'warn', 'info', 'debug' or 'trace')"
            ))),
        }
    }
}

/// Keeps the file writer's background thread alive.
///
/// Buffered lines are flushed when this is dropped.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    file: Option<WorkerGuard>,
    path: Option<PathBuf>,
}

impl LoggingGuard
{
    /// The log file being written, if any.
    pub fn log_file(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    pub fn is_logging_to_file(&self) -> bool
    {
        self.file.is_some()
    }
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: Log level filter (e.g., `debug`, `xpcscope_core=debug`)
/// - `XPCSCOPE_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
/// - `XPCSCOPE_LOG_FILE`: Optional path to a log file or directory
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `XPCSCOPE_LOG_FORMAT` holds an unknown format
/// - The log directory cannot be created
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var("XPCSCOPE_LOG_FORMAT") {
        Ok(value) => LogFormat::from_str(&value)?,
        Err(_) => LogFormat::Pretty,
    };

    // A plain level in RUST_LOG also sets the default for the file layer
    let default_level = env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<LogLevel>().ok())
        .map_or(Level::INFO, Into::into);

    init_logging_internal(format, default_level, None, log_file_from_env())
}

/// Initialize logging with explicit level and format
///
/// The explicit level wins over `RUST_LOG`. `XPCSCOPE_LOG_FILE` is still
/// honoured.
///
/// ## Example
///
/// ```rust,no_run
/// use xpcscope_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let level = Level::from(level);
    init_logging_internal(format, level, Some(level), log_file_from_env())
}

fn log_file_from_env() -> Option<PathBuf>
{
    env::var_os("XPCSCOPE_LOG_FILE")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Where logs for `requested` actually go.
///
/// Existing directories (and paths ending in a separator) get a dated file
/// name; anything else is used as is.
pub fn resolve_log_path(requested: &Path) -> PathBuf
{
    let names_directory = requested.is_dir() || requested.as_os_str().to_string_lossy().ends_with('/');
    if names_directory {
        let today = Utc::now().format("%Y-%m-%d");
        requested.join(format!("{today}-xpcscope.log"))
    } else {
        requested.to_path_buf()
    }
}

/// Filter priority: explicit level, then `RUST_LOG`, then `default_level`.
fn build_filter(default_level: Level, explicit_level: Option<Level>) -> EnvFilter
{
    if let Some(level) = explicit_level {
        return EnvFilter::new(level.to_string());
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, filter: EnvFilter, path: &Path) -> Result<(BoxedLayer, WorkerGuard), LoggingError>
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InitializationFailed(format!("{} has no file name", path.display())))?;
    std::fs::create_dir_all(&directory)?;

    // The date is already in dated file names, so never roll
    let appender = tracing_appender::rolling::never(&directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false) // No ANSI in files
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    };
    Ok((layer, guard))
}

fn init_logging_internal(
    format: LogFormat,
    default_level: Level,
    explicit_level: Option<Level>,
    log_file: Option<PathBuf>,
) -> Result<LoggingGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![console_layer(format, build_filter(default_level, explicit_level))];
    let mut guard = LoggingGuard::default();

    if let Some(requested) = log_file {
        let path = resolve_log_path(&requested);
        let (layer, file_guard) = file_layer(format, build_filter(default_level, explicit_level), &path)?;
        layers.push(layer);
        guard.file = Some(file_guard);
        guard.path = Some(path);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    if let Some(path) = &guard.path {
        tracing::debug!(path = %path.display(), "logging to file");
    }
    Ok(guard)
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
