//! Daemon configuration
//!
//! Loaded from environment variables (a `.env` file is honored in
//! development). Validated once at startup; a misconfigured daemon
//! refuses to start instead of corrupting records later.

use folio_common::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location watched for incoming source documents.
pub const DEFAULT_HOTFOLDER: &str = "./hotfolder";

/// Default location failed source documents are moved to.
pub const DEFAULT_ERROR_DIR: &str = "./hotfolder/error";

/// Default root of the data repositories.
pub const DEFAULT_REPOSITORIES_ROOT: &str = "./repositories";

/// Default search backend endpoint.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8983/folio";

/// Default pause between hotfolder scans, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Watched input location
    pub hotfolder: PathBuf,
    /// Where failed source files are moved
    pub error_dir: PathBuf,
    /// Root directory holding the data repositories
    pub repositories_root: PathBuf,
    /// Repository names under the root, in preference order
    pub repositories: Vec<String>,
    /// Search backend base URL
    pub backend_url: String,
    /// Pause between hotfolder scans when the queue is empty
    pub poll_interval_secs: u64,
    /// Move successfully indexed sources into the repository archive;
    /// when false they are deleted after commit
    pub archive_sources: bool,
    /// Move failed sources to the error location; when false they are
    /// left in place
    pub move_failed_to_error: bool,
    /// Write a `.indexed` marker file for upstream workflow tooling
    pub write_success_marker: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            hotfolder: PathBuf::from(DEFAULT_HOTFOLDER),
            error_dir: PathBuf::from(DEFAULT_ERROR_DIR),
            repositories_root: PathBuf::from(DEFAULT_REPOSITORIES_ROOT),
            repositories: vec!["repository_1".to_string()],
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            archive_sources: true,
            move_failed_to_error: true,
            write_success_marker: false,
        }
    }
}

fn env_bool(var: &str) -> Result<Option<bool>> {
    match std::env::var(var) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(IndexError::Config(format!("invalid {var}: {v}"))),
        },
        Err(_) => Ok(None),
    }
}

impl DaemonConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    ///
    /// - `FOLIO_HOTFOLDER`: watched input location
    /// - `FOLIO_ERROR_DIR`: error location for failed sources
    /// - `FOLIO_REPOSITORIES_ROOT`: root of the data repositories
    /// - `FOLIO_REPOSITORIES`: comma-separated repository names
    /// - `FOLIO_BACKEND_URL`: search backend base URL
    /// - `FOLIO_POLL_INTERVAL_SECS`: pause between scans
    /// - `FOLIO_ARCHIVE_SOURCES`: archive sources after success
    /// - `FOLIO_MOVE_FAILED_TO_ERROR`: move failed sources away
    /// - `FOLIO_WRITE_SUCCESS_MARKER`: write `.indexed` marker files
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("FOLIO_HOTFOLDER") {
            config.hotfolder = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("FOLIO_ERROR_DIR") {
            config.error_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("FOLIO_REPOSITORIES_ROOT") {
            config.repositories_root = PathBuf::from(dir);
        }
        if let Ok(names) = std::env::var("FOLIO_REPOSITORIES") {
            config.repositories = names
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(url) = std::env::var("FOLIO_BACKEND_URL") {
            config.backend_url = url;
        }
        if let Ok(secs) = std::env::var("FOLIO_POLL_INTERVAL_SECS") {
            config.poll_interval_secs = secs.parse().map_err(|_| {
                IndexError::Config(format!("invalid FOLIO_POLL_INTERVAL_SECS: {secs}"))
            })?;
        }
        if let Some(value) = env_bool("FOLIO_ARCHIVE_SOURCES")? {
            config.archive_sources = value;
        }
        if let Some(value) = env_bool("FOLIO_MOVE_FAILED_TO_ERROR")? {
            config.move_failed_to_error = value;
        }
        if let Some(value) = env_bool("FOLIO_WRITE_SUCCESS_MARKER")? {
            config.write_success_marker = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.trim().is_empty() {
            return Err(IndexError::Config("backend_url cannot be empty".to_string()));
        }
        if self.repositories.is_empty() {
            return Err(IndexError::Config(
                "at least one repository must be configured".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(IndexError::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DaemonConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_repositories_rejected() {
        let mut config = DaemonConfig::default();
        config.repositories.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = DaemonConfig::default();
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
