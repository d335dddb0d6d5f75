//! `tracing` subscriber setup shared by both binaries.
//!
//! Diagnostics go to stderr and, optionally, to an append-only file.
//! Operator status lines are printed to stdout by the binaries and never
//! pass through here.
//!
//! Field names used across the crate: `region`, `collection`, `phase`,
//! `attempt`, `inserted`, `rejected`, `fallback_location`.
//!
//! Connection strings are logged only after [`crate::store::redact_uri`].

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub use crate::config::LogFormat;

/// Appended to the configured level so driver internals stay quiet.
const DRIVER_DIRECTIVE: &str = "mongodb=warn";

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Logging section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level or directive list, e.g. `info` or `regionsync_core=debug`.
    /// `RUST_LOG` replaces it entirely when set.
    pub level: String,
    pub format: LogFormat,
    /// Append diagnostics to this file as well as stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,

    #[error("invalid log level {level:?}: {source}")]
    InvalidLevel {
        level: String,
        #[source]
        source: ParseError,
    },

    #[error("cannot open log file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to install subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Install the global subscriber. Only the first call succeeds.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    if INSTALLED.get().is_some() {
        return Err(LogError::AlreadyInitialized);
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let mut layers = vec![output_layer(config.format, io::stderr, true)];
    if let Some(path) = &config.file {
        let file = open_append(path)?;
        layers.push(output_layer(config.format, Mutex::new(file), false));
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()?;
    let _ = INSTALLED.set(());

    tracing::debug!(
        level = %config.level,
        format = %config.format,
        file = ?config.file,
        "Logging initialized"
    );
    Ok(())
}

/// Filter for `level`, with the driver capped at `warn` unless the level
/// already mentions it.
fn level_filter(level: &str) -> Result<EnvFilter, LogError> {
    let directives = if level.contains("mongodb") {
        level.to_string()
    } else {
        format!("{level},{DRIVER_DIRECTIVE}")
    };
    EnvFilter::try_new(directives).map_err(|source| LogError::InvalidLevel {
        level: level.to_string(),
        source,
    })
}

/// One formatted output. ANSI colour only applies to the pretty format.
fn output_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_timer(SystemTime)
            .with_current_span(true)
            .with_span_list(false)
            .flatten_event(true)
            .boxed(),
    }
}

fn open_append(path: &Path) -> Result<File, LogError> {
    let wrap = |source: io::Error| LogError::File {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(wrap)
}
