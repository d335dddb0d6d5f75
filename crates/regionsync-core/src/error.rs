//! Error types for regionsync-core

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::region::Region;

/// One suggested next step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    /// Shell command, labelled with what it checks or fixes
    Run { label: String, command: String },
    Note(String),
}

/// What an operator can do about a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub summary: String,
    pub hints: Vec<Hint>,
}

impl Remediation {
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            hints: Vec::new(),
        }
    }

    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.hints.push(Hint::Run {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    #[must_use]
    pub fn alternative(mut self, note: impl Into<String>) -> Self {
        self.hints.push(Hint::Note(note.into()));
        self
    }
}

/// Multi-line block printed under the error message.
impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "To fix: {}", self.summary)?;
        for hint in &self.hints {
            match hint {
                Hint::Run { label, command } => writeln!(f, "  $ {command}  # {label}")?,
                Hint::Note(note) => writeln!(f, "  - {note}")?,
            }
        }
        Ok(())
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for regionsync-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Store connection and query errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Batch source errors
    #[error("Batch source error: {0}")]
    SourceLoad(#[from] SourceLoadError),

    /// Terminal ingestion failures
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Config(err) => Some(err.remediation()),
            Self::Store(err) => Some(err.remediation()),
            Self::SourceLoad(err) => Some(err.remediation()),
            Self::Ingest(err) => err.remediation(),
        }
    }
}

/// Failures reading a batch source into memory.
#[derive(Error, Debug)]
pub enum SourceLoadError {
    #[error("batch file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read batch file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("batch file {} is not valid JSON: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("batch file {} has the wrong shape: {reason}", path.display())]
    WrongShape { path: PathBuf, reason: String },
}

impl SourceLoadError {
    /// Path of the batch source that failed to load.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Missing { path }
            | Self::Unreadable { path, .. }
            | Self::Malformed { path, .. }
            | Self::WrongShape { path, .. } => path,
        }
    }

    #[must_use]
    pub fn remediation(&self) -> Remediation {
        let path = self.path().display().to_string();
        match self {
            Self::Missing { .. } => Remediation::new(format!(
                "Place the batch file at {path} or point --batch-dir at its directory."
            ))
            .command("List batch files", "ls mongo_batch_*.json.arr")
            .alternative("Check that REGION matches the batch file suffix."),
            Self::Unreadable { .. } => {
                Remediation::new("Check file permissions on the batch file and retry.")
                    .command("Inspect permissions", format!("ls -l \"{path}\""))
            }
            Self::Malformed { .. } => Remediation::new("Validate the JSON input and retry.")
                .command(
                    "Validate JSON",
                    format!("python -m json.tool < \"{path}\""),
                )
                .alternative("Check for trailing commas or invalid UTF-8."),
            Self::WrongShape { .. } => Remediation::new(
                "The batch file must contain a JSON array of objects.",
            )
            .alternative("Wrap single documents in [ ... ]."),
        }
    }
}

/// Store connection and query errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid connection string {uri}: {message}")]
    InvalidUri { uri: String, message: String },

    #[error("failed to connect to {uri}: {message}")]
    Connect { uri: String, message: String },

    #[error("query on {collection} failed: {message}")]
    Query { collection: String, message: String },
}

impl StoreError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::InvalidUri { .. } => Remediation::new(
                "Fix the connection string (mongodb:// or mongodb+srv:// form).",
            )
            .command("Show configured URI", "echo $MONGO_URI")
            .alternative("Pass the URI as the first positional argument."),
            Self::Connect { .. } => Remediation::new(
                "The store could not be reached. Check network access and credentials.",
            )
            .alternative("Verify the cluster allows connections from this host."),
            Self::Query { .. } => {
                Remediation::new("A query failed. The reporter retries on the next interval.")
                    .alternative("Check the store's replica set health.")
            }
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Read { path, .. } => Remediation::new(format!(
                "Check that {} exists and is readable.",
                path.display()
            )),
            Self::Parse { .. } => Remediation::new("Fix the TOML syntax in the config file.")
                .alternative("Remove the --config flag to run with defaults."),
            Self::Invalid(_) => Remediation::new("Correct the configuration value and retry.")
                .alternative("Unset overriding environment variables (MONGO_URI, REGION)."),
        }
    }
}

/// Terminal ingestion failures (after any fallback has been considered)
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    SourceLoad(#[from] SourceLoadError),

    #[error("{rejected} record(s) rejected and region {region} has no fallback location")]
    UnmappedRegion { region: Region, rejected: usize },

    #[error("fallback insert with location={location} failed: {detail}")]
    FallbackFailed { location: &'static str, detail: String },

    #[error("insert failed: {cause}")]
    Transport { cause: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Process exit code for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        1
    }

    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::SourceLoad(err) => Some(err.remediation()),
            Self::Store(err) => Some(err.remediation()),
            Self::UnmappedRegion { .. } => Some(
                Remediation::new("Set REGION to AMER or EMEA to enable the fallback retry.")
                    .command("Retry", "REGION=AMER batch-writer <DB> <COLLECTION>"),
            ),
            Self::FallbackFailed { .. } => Some(
                Remediation::new("Inspect the rejected records; the batch was retried once.")
                    .alternative("Fix the offending documents and rerun the batch."),
            ),
            Self::Transport { .. } => None,
        }
    }
}
