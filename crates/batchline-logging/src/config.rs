//! Subscriber configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Filter directive that lets a coordinator's operation logs through
///
/// With `debug_enabled` the coordinator emits per-event and per-flush logs at
/// `debug`; the store's span events sit at the same level.
const OPERATION_DIRECTIVES: &str = "info,batchline_coordinator=debug,batchline_storage=debug";

/// What the subscriber writes and where
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub level: String,
    pub console: ConsoleFormat,
    /// Colour pretty console output
    pub ansi: bool,
    /// JSONL file output, off when `None`
    pub file: Option<FileConfig>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Json,
            ansi: false,
            file: None,
        }
    }
}

impl LogConfig {
    /// Levels matching a coordinator's `debug_enabled` switch
    ///
    /// Off, only lifecycle and batch outcomes are logged, as JSON lines.
    /// On, operation logs pass the filter and the console is human-readable.
    pub fn coordinator(debug_enabled: bool) -> Self {
        if debug_enabled {
            Self {
                level: OPERATION_DIRECTIVES.to_string(),
                console: ConsoleFormat::Pretty,
                ansi: true,
                file: None,
            }
        } else {
            Self::default()
        }
    }

    /// Warnings and errors only; used by test binaries
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            ..Self::default()
        }
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    Off,
    /// One JSON object per line on stdout
    #[default]
    Json,
    /// `tracing_subscriber`'s human-readable format
    Pretty,
}

/// JSONL log file output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// Files are named `<prefix>.log`, or `<prefix>.<date>.log` when rotated
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files kept before the oldest is removed; unbounded when `None`
    pub max_files: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "batchline".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// A single file, truncated when the subscriber starts
    Never,
}
