//! Configuration management for efdpolld.
//!
//! Loads settings from /etc/efdpolld/config.toml or ./efdpolld.toml, or
//! falls back to defaults that match the historical hardcoded constants.

use anyhow::{bail, Context, Result};
use efd_shared::batch::DEFAULT_BATCH_SIZE;
use efd_shared::query::{
    DEFAULT_DATABASE, DEFAULT_QUERY_WINDOW, DEFAULT_RETENTION_POLICY, DEFAULT_TOPIC,
};
use efd_shared::{LatestSampleQuery, QueryWindow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/efdpolld/config.toml";

/// Fallback config in the working directory
pub const LOCAL_CONFIG_PATH: &str = "efdpolld.toml";

/// EFD connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfdConfig {
    /// Alias resolved through the credential service
    #[serde(default = "default_alias")]
    pub alias: String,

    /// Base URL of the credential service
    #[serde(default = "default_credentials_url")]
    pub credentials_url: String,

    /// Explicit InfluxDB base URL; skips the credential lookup when set
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_database")]
    pub database: String,

    /// Per-query timeout. Unset means wait forever.
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
}

fn default_alias() -> String {
    "summit_efd".to_string()
}

fn default_credentials_url() -> String {
    "https://roundtable.lsst.codes/segwarides".to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

impl Default for EfdConfig {
    fn default() -> Self {
        Self {
            alias: default_alias(),
            credentials_url: default_credentials_url(),
            url: None,
            username: None,
            password: None,
            database: default_database(),
            query_timeout_secs: None,
        }
    }
}

impl EfdConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }
}

/// Polling loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_retention_policy")]
    pub retention_policy: String,

    /// Trailing query window as an InfluxQL duration
    #[serde(default = "default_window")]
    pub window: String,

    /// Samples per flushed batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between iterations in seconds
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: f64,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_retention_policy() -> String {
    DEFAULT_RETENTION_POLICY.to_string()
}

fn default_window() -> String {
    DEFAULT_QUERY_WINDOW.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_sleep_secs() -> f64 {
    2.0
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            retention_policy: default_retention_policy(),
            window: default_window(),
            batch_size: default_batch_size(),
            sleep_secs: default_sleep_secs(),
        }
    }
}

impl PollConfig {
    /// Delay between iterations; fails for negative, non-finite or
    /// out-of-range values instead of panicking
    pub fn sleep_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.sleep_secs).with_context(|| {
            format!(
                "poll.sleep_secs {} is not a usable delay in seconds",
                self.sleep_secs
            )
        })
    }
}

/// Sample log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Write a `#` column header when the log file is new/empty
    #[serde(default)]
    pub write_header: bool,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("summit_M1M3_forceActuatorData.log")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            write_header: false,
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub efd: EfdConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load config from the standard locations, or return defaults
    pub fn load() -> Result<Self> {
        Self::load_first_existing(&[Path::new(CONFIG_PATH), Path::new(LOCAL_CONFIG_PATH)])
    }

    /// First file that exists wins. Only a missing file falls through;
    /// an unreadable or malformed one is an error.
    pub fn load_first_existing(paths: &[&Path]) -> Result<Self> {
        for path in paths {
            match fs::read_to_string(path) {
                Ok(content) => return Self::parse(path, &content),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to read config {}", path.display()))
                }
            }
        }
        warn!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Load config from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values the poller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll.batch_size == 0 {
            bail!("poll.batch_size must be at least 1");
        }
        self.poll.sleep_interval()?;
        self.query_window()?;
        Ok(())
    }

    pub fn query_window(&self) -> Result<QueryWindow> {
        self.poll
            .window
            .parse()
            .with_context(|| format!("poll.window '{}' is not a valid duration", self.poll.window))
    }

    /// The latest-sample query described by this config
    pub fn query(&self) -> Result<LatestSampleQuery> {
        Ok(LatestSampleQuery {
            database: self.efd.database.clone(),
            retention_policy: self.poll.retention_policy.clone(),
            topic: self.poll.topic.clone(),
            window: self.query_window()?,
            ..LatestSampleQuery::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.efd.alias, "summit_efd");
        assert_eq!(config.poll.batch_size, 100);
        assert_eq!(config.poll.sleep_secs, 2.0);
        assert_eq!(config.poll.window, "2m");
        assert_eq!(config.poll.topic, "lsst.sal.MTM1M3.forceActuatorData");
        assert_eq!(
            config.output.log_path,
            PathBuf::from("summit_M1M3_forceActuatorData.log")
        );
        assert!(!config.output.write_header);
        assert!(config.efd.query_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[efd]
url = "http://localhost:8086"
username = "reader"

[poll]
batch_size = 10
sleep_secs = 0.5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.efd.url.as_deref(), Some("http://localhost:8086"));
        assert_eq!(config.efd.username.as_deref(), Some("reader"));
        assert_eq!(config.poll.batch_size, 10);
        assert_eq!(config.poll.sleep_interval().unwrap(), Duration::from_millis(500));
        // Defaults for missing fields
        assert_eq!(config.poll.window, "2m");
        assert_eq!(config.efd.database, "efd");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.poll.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.poll.sleep_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.poll.window = "two minutes".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_sleep() {
        let mut config = Config::default();
        config.poll.sleep_secs = 1e30;
        assert!(config.poll.sleep_interval().is_err());
        assert!(config.validate().is_err());

        config.poll.sleep_secs = f64::NAN;
        assert!(config.validate().is_err());

        config.poll.sleep_secs = 0.0;
        assert_eq!(config.poll.sleep_interval().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_load_first_existing_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        let config = Config::load_first_existing(&[missing.as_path()]).unwrap();
        assert_eq!(config.poll.batch_size, 100);
    }

    #[test]
    fn test_load_first_existing_skips_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        let local = dir.path().join("efdpolld.toml");
        fs::write(&local, "[poll]\nbatch_size = 7\n").unwrap();

        let config = Config::load_first_existing(&[missing.as_path(), local.as_path()]).unwrap();
        assert_eq!(config.poll.batch_size, 7);
    }

    #[test]
    fn test_load_first_existing_reports_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let broken = dir.path().join("config.toml");
        let local = dir.path().join("efdpolld.toml");
        fs::write(&broken, "[poll\nbatch_size = ").unwrap();
        fs::write(&local, "[poll]\nbatch_size = 7\n").unwrap();

        let err = Config::load_first_existing(&[broken.as_path(), local.as_path()]).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }

    #[test]
    fn test_query_from_config() {
        let mut config = Config::default();
        config.poll.window = "5m".to_string();
        let query = config.query().unwrap();
        assert!(query.to_influxql().ends_with("now() - 5m"));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        assert!(Config::load_from_path("/nonexistent/efdpolld.toml").is_err());
    }
}
