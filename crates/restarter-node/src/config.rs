//! Node configuration types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use restarter_storage::{PoolConfig, StoreConfig};

use crate::observability::{InstrumentSettings, LogFormat};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid YAML for [`NodeConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the restarter node.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// HTTP listen address.
    pub http_addr: SocketAddr,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Maximum pooled store connections.
    pub pool_max_connections: usize,
    /// How long a request waits for a pooled connection.
    pub pool_acquire_timeout_ms: u64,
    /// How long SQLite waits on a locked database.
    pub busy_timeout_ms: u64,
    /// Deadline for the store calls of one request.
    pub request_timeout_ms: u64,
    /// Grace period for in-flight requests on shutdown.
    pub shutdown_timeout_ms: u64,
    /// Log level.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 9002)),
            database_path: PathBuf::from("./data/restarter.db"),
            pool_max_connections: 8,
            pool_acquire_timeout_ms: 5_000,
            busy_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            shutdown_timeout_ms: 5_000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl NodeConfig {
    /// Parses a configuration from YAML.
    pub fn from_yaml(path: &Path, yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads a configuration file, or the defaults if `path` does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(yaml) => Self::from_yaml(path, &yaml),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Checks that sizes and timeouts are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("pool_max_connections", self.pool_max_connections as u64),
            ("pool_acquire_timeout_ms", self.pool_acquire_timeout_ms),
            ("busy_timeout_ms", self.busy_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("shutdown_timeout_ms", self.shutdown_timeout_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path must not be empty".into()));
        }
        Ok(())
    }

    pub fn pool_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_acquire_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Settings for opening the resource store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.database_path.clone(),
            pool: PoolConfig {
                max_connections: self.pool_max_connections,
                acquire_timeout: self.pool_acquire_timeout(),
                ..PoolConfig::default()
            },
            busy_timeout: self.busy_timeout(),
        }
    }

    /// Settings for the request instrumentation.
    pub fn instrument_settings(&self) -> InstrumentSettings {
        InstrumentSettings {
            request_timeout: Some(self.request_timeout()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert_eq!(config.http_addr.port(), 9002);
        assert_eq!(config.log_format, LogFormat::Pretty);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "http_addr: 0.0.0.0:8080\nlog_format: json\npool_max_connections: 2\n";
        let config = NodeConfig::from_yaml(Path::new("node.yaml"), yaml).unwrap();
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.pool_max_connections, 2);
        assert_eq!(config.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = NodeConfig::from_yaml(Path::new("node.yaml"), "http_port: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_values_are_invalid() {
        let config = NodeConfig {
            pool_max_connections: 0,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = NodeConfig {
            request_timeout_ms: 0,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = NodeConfig {
            pool_max_connections: 3,
            busy_timeout_ms: 250,
            ..NodeConfig::default()
        };
        let store = config.store_config();
        assert_eq!(store.pool.max_connections, 3);
        assert_eq!(store.pool.acquire_timeout, Duration::from_secs(5));
        assert_eq!(store.busy_timeout, Duration::from_millis(250));
        assert_eq!(
            config.instrument_settings().request_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = NodeConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("node.yaml");
        std::fs::write(&path, "database_path: /tmp/r.db\nshutdown_timeout_ms: 100\n").unwrap();
        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/r.db"));
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(100));
    }
}
