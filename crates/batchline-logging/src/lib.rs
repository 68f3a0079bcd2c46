//! Structured JSONL logging for Batchline
//!
//! Every Batchline crate logs through `tracing` with key-value fields. This
//! crate wires those events to an output: JSON lines on the console by
//! default, pretty console output for development, and rotated log files
//! for long-running hosts.
//!
//! ```ignore
//! use batchline_logging::{BatchlineSubscriberBuilder, LogConfig};
//!
//! // Follow the coordinator's own `debug_enabled` switch
//! let _guard = BatchlineSubscriberBuilder::new()
//!     .with_config(LogConfig::coordinator(config.debug_enabled))
//!     .try_init()?;
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level, e.g.
//! `RUST_LOG=batchline_coordinator=debug`.

pub mod config;
pub mod fields;

pub use config::{ConsoleFormat, FileConfig, LogConfig, RotationStrategy};
pub use fields::spans;
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to prepare log file: {0}")]
    File(String),

    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Installs the global Batchline subscriber
#[derive(Debug, Default)]
pub struct BatchlineSubscriberBuilder {
    config: LogConfig,
}

impl BatchlineSubscriberBuilder {
    /// JSON lines on the console at `info`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the filter directives used when `RUST_LOG` is unset
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn with_console(mut self, console: ConsoleFormat) -> Self {
        self.config.console = console;
        self
    }

    /// Also write JSON lines to a log file
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber
    ///
    /// With file output, the returned guard flushes the writer when dropped
    /// and must be held for as long as logs should reach the file.
    ///
    /// # Errors
    ///
    /// Fails if the log file cannot be created, if the level is not a valid
    /// filter, or if a global subscriber is already installed.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => parse_filter(&self.config.level)?,
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        match self.config.console {
            ConsoleFormat::Off => {}
            ConsoleFormat::Json => layers.push(jsonl_layer(std::io::stdout)),
            ConsoleFormat::Pretty => layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.ansi)
                    .with_target(true)
                    .boxed(),
            ),
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(jsonl_layer(writer));
            guard = Some(file_guard);
        }

        Registry::default()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;

        Ok(guard)
    }
}

fn parse_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives)
        .map_err(|e| LoggingError::Filter(format!("{:?}: {}", directives, e)))
}

/// JSON lines with event fields at the top level and the current span
fn jsonl_layer<W>(writer: W) -> BoxedLayer
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
        .boxed()
}

/// Create the non-blocking writer for file output
///
/// `Never` truncates a single `<prefix>.log`; the rotating strategies
/// append to dated files and prune beyond `max_files`.
fn file_writer(
    config: &FileConfig,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&config.directory)
                .map_err(|e| LoggingError::File(e.to_string()))?;
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(&path)
                .map_err(|e| LoggingError::File(format!("{}: {}", path.display(), e)))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }

    let appender = builder
        .build(&config.directory)
        .map_err(|e| LoggingError::File(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the quiet test subscriber
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_testing() {
    let _ = BatchlineSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
