//! Configuration loading for codedrop-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! field has a default, so an empty file or a missing section is valid.
//! Transfer lifetime and code lengths are fixed and not configurable here.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for codedrop-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Record storage configuration.
    pub storage: StorageConfig,
    /// Blob store configuration.
    pub blobs: BlobsConfig,
    /// Rate limiting configuration.
    pub limits: LimitsConfig,
    /// Cleanup task configuration.
    pub cleanup: CleanupConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Base URL clients reach this relay at, used in fetch handle URLs.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

/// Which record storage backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map; records vanish on restart.
    Memory,
    /// SQLite database file; may be shared by several relays.
    Sqlite,
}

/// Record storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend (default: sqlite).
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Which blob store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    /// Process-local map.
    Memory,
    /// Files under a root directory.
    Fs,
}

/// Blob store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobsConfig {
    /// Backend (default: fs).
    #[serde(default = "default_blob_backend")]
    pub backend: BlobBackend,
    /// Root directory for the fs backend.
    #[serde(default = "default_blob_root")]
    pub root: PathBuf,
    /// Lifetime of a fetch handle in seconds (default: 60).
    #[serde(default = "default_handle_ttl_secs")]
    pub handle_ttl_secs: u64,
    /// Time budget for storing a photo in seconds (default: 30).
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// Time budget for resolving or deleting a photo in seconds (default: 10).
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
}

impl BlobsConfig {
    /// Fetch handle lifetime.
    pub fn handle_ttl(&self) -> Duration {
        Duration::from_secs(self.handle_ttl_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Sends per client IP per minute (default: 20).
    #[serde(default = "default_sends_per_minute")]
    pub sends_per_minute: u32,
    /// Receive attempts per client IP per minute (default: 30).
    ///
    /// Codes are short, so this is what keeps guessing impractical.
    #[serde(default = "default_receives_per_minute")]
    pub receives_per_minute: u32,
    /// Requests per second across all clients (default: 500).
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
}

/// Cleanup task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Cleanup interval in seconds (default: 60).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Enable cleanup task (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_database_path() -> PathBuf {
    PathBuf::from("codedrop.db")
}

fn default_blob_backend() -> BlobBackend {
    BlobBackend::Fs
}

fn default_blob_root() -> PathBuf {
    PathBuf::from("blobs")
}

fn default_handle_ttl_secs() -> u64 {
    60
}

fn default_upload_timeout_secs() -> u64 {
    30
}

fn default_resolve_timeout_secs() -> u64 {
    10
}

fn default_sends_per_minute() -> u32 {
    20
}

fn default_receives_per_minute() -> u32 {
    30
}

fn default_global_requests_per_second() -> u32 {
    500
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_cleanup_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_url: default_public_url(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database: default_database_path(),
        }
    }
}

impl Default for BlobsConfig {
    fn default() -> Self {
        Self {
            backend: default_blob_backend(),
            root: default_blob_root(),
            handle_ttl_secs: default_handle_ttl_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            resolve_timeout_secs: default_resolve_timeout_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            sends_per_minute: default_sends_per_minute(),
            receives_per_minute: default_receives_per_minute(),
            global_requests_per_second: default_global_requests_per_second(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            enabled: default_cleanup_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// is out of range.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("limits.sends_per_minute", u64::from(self.limits.sends_per_minute)),
            ("limits.receives_per_minute", u64::from(self.limits.receives_per_minute)),
            (
                "limits.global_requests_per_second",
                u64::from(self.limits.global_requests_per_second),
            ),
            ("blobs.handle_ttl_secs", self.blobs.handle_ttl_secs),
            ("blobs.upload_timeout_secs", self.blobs.upload_timeout_secs),
            ("blobs.resolve_timeout_secs", self.blobs.resolve_timeout_secs),
            ("cleanup.interval_secs", self.cleanup.interval_secs),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if !self.server.public_url.starts_with("http://")
            && !self.server.public_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                field: "server.public_url",
                reason: format!("{} is not an http(s) URL", self.server.public_url),
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.blobs.backend, BlobBackend::Fs);
        assert_eq!(config.blobs.handle_ttl(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:5000"
public_url = "https://drop.example.com"

[storage]
backend = "memory"

[blobs]
backend = "memory"
handle_ttl_secs = 120

[limits]
receives_per_minute = 5

[cleanup]
interval_secs = 15
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:5000");
        assert_eq!(config.server.public_url, "https://drop.example.com");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.blobs.backend, BlobBackend::Memory);
        assert_eq!(config.blobs.handle_ttl_secs, 120);
        assert_eq!(config.limits.receives_per_minute, 5);
        assert_eq!(config.limits.sends_per_minute, 20);
        assert_eq!(config.cleanup.interval_secs, 15);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.storage.database, PathBuf::from("codedrop.db"));
        assert_eq!(config.blobs.upload_timeout_secs, 30);
        assert_eq!(config.blobs.resolve_timeout_secs, 10);
        assert!(config.cleanup.enabled);
    }

    #[test]
    fn unknown_backend_rejected() {
        let toml = r#"
[storage]
backend = "postgres"
"#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn zero_limit_rejected() {
        let mut config = Config::default();
        config.limits.sends_per_minute = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid limits.sends_per_minute: must be greater than zero"
        );
    }

    #[test]
    fn public_url_must_be_http() {
        let mut config = Config::default();
        config.server.public_url = "relay.local".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "server.public_url",
                ..
            })
        ));
    }

    #[test]
    fn from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cleanup]\ninterval_secs = 0").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Invalid { .. })
        ));

        let missing = Config::from_file(std::path::Path::new("/nonexistent/relay.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));
    }
}
