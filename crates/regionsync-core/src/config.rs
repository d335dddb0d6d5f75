//! Configuration management for regionsync
//!
//! One [`Config`] value is built at startup (file, then environment, then
//! CLI flags) and passed by reference into the ingestor or reporter. Nothing
//! downstream reads the process environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::region::Region;

/// Environment variable holding the store connection string.
pub const ENV_MONGO_URI: &str = "MONGO_URI";
/// Environment variable selecting the ingestion region.
pub const ENV_REGION: &str = "REGION";
pub const ENV_LOG_LEVEL: &str = "REGIONSYNC_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "REGIONSYNC_LOG_FORMAT";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Store connection settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Batch ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Reporter settings
    #[serde(default)]
    pub reporter: ReporterConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection string (mongodb:// or mongodb+srv://)
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            collection: default_collection(),
            app_name: default_app_name(),
        }
    }
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "aaDB".to_string()
}

fn default_collection() -> String {
    "aaColl".to_string()
}

fn default_app_name() -> String {
    "regionsync".to_string()
}

/// Batch ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Region selector for the run
    #[serde(default)]
    pub region: Region,

    /// Directory holding `mongo_batch_<REGION>.json.arr`
    #[serde(default = "default_batch_dir")]
    pub batch_dir: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            batch_dir: default_batch_dir(),
        }
    }
}

impl IngestConfig {
    /// Path of the batch file for the configured region.
    #[must_use]
    pub fn batch_path(&self) -> PathBuf {
        self.batch_dir.join(self.region.batch_file_name())
    }
}

fn default_batch_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Reporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Seconds between count rounds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl ReporterConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_interval_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Parse TOML text; `path` is only used for error context
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_MONGO_URI) {
            self.store.uri = uri;
        }
        if let Some(region) = lookup(ENV_REGION) {
            self.ingest.region = Region::parse(&region);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format.parse().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    /// Reject values that cannot produce a working run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("store.uri is empty".to_string()));
        }
        if self.store.database.trim().is_empty() {
            return Err(ConfigError::Invalid("store.database is empty".to_string()));
        }
        if self.store.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("store.collection is empty".to_string()));
        }
        if self.reporter.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reporter.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.store.database, "aaDB");
        assert_eq!(config.store.collection, "aaColl");
        assert_eq!(config.reporter.interval_secs, 30);
        assert_eq!(config.ingest.region, Region::Amer);
        config.validate().unwrap();
    }

    #[test]
    fn batch_path_derives_from_region() {
        let ingest = IngestConfig {
            region: Region::Emea,
            batch_dir: PathBuf::from("/data"),
        };
        assert_eq!(
            ingest.batch_path(),
            PathBuf::from("/data/mongo_batch_EMEA.json.arr")
        );
    }

    #[test]
    fn toml_partial_sections_use_defaults() {
        let config = Config::from_toml(
            "[store]\ncollection = \"orders\"\n[reporter]\ninterval_secs = 5\n",
            Path::new("regionsync.toml"),
        )
        .unwrap();
        assert_eq!(config.store.collection, "orders");
        assert_eq!(config.store.database, "aaDB");
        assert_eq!(config.reporter.interval(), Duration::from_secs(5));
    }

    #[test]
    fn toml_region_parses_unknown_tag() {
        let config =
            Config::from_toml("[ingest]\nregion = \"APAC\"\n", Path::new("x.toml")).unwrap();
        assert_eq!(config.ingest.region, Region::Other("APAC".to_string()));
    }

    #[test]
    fn toml_syntax_error_is_reported() {
        let err = Config::from_toml("[store\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(lookup_from(&[
                (ENV_MONGO_URI, "mongodb://db.internal:27017"),
                (ENV_REGION, "EMEA"),
                (ENV_LOG_FORMAT, "json"),
            ]))
            .unwrap();
        assert_eq!(config.store.uri, "mongodb://db.internal:27017");
        assert_eq!(config.ingest.region, Region::Emea);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn env_rejects_unknown_log_format() {
        let mut config = Config::default();
        let err = config
            .apply_env(lookup_from(&[(ENV_LOG_FORMAT, "xml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.reporter.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_collection() {
        let mut config = Config::default();
        config.store.collection = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("invalid".parse::<LogFormat>().is_err());
    }
}
