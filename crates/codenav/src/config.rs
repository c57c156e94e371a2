//! Configuration loading and logging setup.
//!
//! Configuration lives in a small YAML file:
//!
//! ```yaml
//! database-path: /var/lib/codenav/visibility.db
//! log-filter: codenav=debug
//! cancel-check-interval: 512
//! ```
//!
//! Every key is optional; missing keys take the values of [`Config::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Default location of the visibility database, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = ".codenav/visibility.db";

/// Default tracing filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "codenav=info";

/// Default number of streamed envelopes written between cancellation checks.
pub const DEFAULT_CANCEL_CHECK_INTERVAL: usize = 256;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Path to the `SQLite` visibility database.
    pub database_path: PathBuf,

    /// Tracing filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// How many envelopes `calculate_visible_uploads` writes between cancellation checks.
    pub cancel_check_interval: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
        }
    }
}

impl Config {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not valid YAML or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed YAML or invalid values.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.cancel_check_interval == 0 {
            return Err(Error::Config(
                "cancel-check-interval must be at least 1".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database-path must not be empty".to_string()));
        }
        if let Err(e) = EnvFilter::try_new(&self.log_filter) {
            return Err(Error::Config(format!(
                "invalid log-filter '{}': {e}",
                self.log_filter
            )));
        }
        Ok(())
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter. Calling this more than once
/// (for example from several tests) is harmless; later calls are ignored.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::trace!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").expect("parse");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn keys_are_kebab_case() {
        let config = Config::from_yaml(
            "database-path: /tmp/nav.db\nlog-filter: codenav=trace\ncancel-check-interval: 8\n",
        )
        .expect("parse");

        assert_eq!(config.database_path, PathBuf::from("/tmp/nav.db"));
        assert_eq!(config.log_filter, "codenav=trace");
        assert_eq!(config.cancel_check_interval, 8);
    }

    #[rstest]
    #[case::zero_interval("cancel-check-interval: 0\n", "cancel-check-interval")]
    #[case::empty_path("database-path: ''\n", "database-path")]
    #[case::bad_yaml("database-path: [unclosed\n", "")]
    fn invalid_config_is_rejected(#[case] yaml: &str, #[case] mentions: &str) {
        let err = Config::from_yaml(yaml).expect_err("should be rejected");

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(mentions));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("codenav.yaml");
        std::fs::write(&path, "log-filter: codenav=debug\n").expect("write");

        let config = Config::load(&path).expect("load");
        assert_eq!(config.log_filter, "codenav=debug");
        assert_eq!(config.cancel_check_interval, DEFAULT_CANCEL_CHECK_INTERVAL);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = Config::load(&dir.path().join("missing.yaml")).expect_err("missing");
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn init_logging_twice_is_harmless() {
        let config = Config::default();
        init_logging(&config);
        init_logging(&config);
    }
}
