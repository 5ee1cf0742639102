//! Configuration management for Metadraft
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{MetadraftError, Result};
use crate::store::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Metadraft
///
/// Holds the HTTP service settings, the draft store location and retention
/// policy, the client-side autosave tuning, and logging preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP service configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Draft store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Client autosave configuration
    #[serde(default)]
    pub autosave: AutosaveConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Name of the cookie carrying the session credential
    ///
    /// The `X-Session-Token` header is accepted as a fallback for
    /// non-browser clients.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Address for the Prometheus exporter (requires the `prometheus` feature)
    #[serde(default)]
    pub metrics_bind: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_session_cookie() -> String {
    "metadraft_session".to_string()
}

fn default_max_payload_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_cookie: default_session_cookie(),
            max_payload_bytes: default_max_payload_bytes(),
            metrics_bind: None,
        }
    }
}

/// Which record backend the draft store uses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendKind {
    /// One JSON file per draft under the storage root
    #[default]
    Fs,
    /// Embedded sled database at the storage root
    Sled,
}

impl std::str::FromStr for StoreBackendKind {
    type Err = MetadraftError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fs" | "file" | "files" => Ok(Self::Fs),
            "sled" | "kv" => Ok(Self::Sled),
            other => Err(MetadraftError::Config(format!(
                "Invalid store backend: {}. Must be one of: fs, sled",
                other
            ))),
        }
    }
}

/// Draft store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StoreBackendKind,

    /// Storage root (directory for `fs`, database path for `sled`)
    #[serde(default = "default_store_root")]
    pub root: PathBuf,

    /// Drafts older than this many hours are purged
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Minimum spacing between opportunistic sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./var/drafts")
}

fn default_retention_hours() -> u64 {
    24 * 30
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::default(),
            root: default_store_root(),
            retention_hours: default_retention_hours(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl StoreConfig {
    /// Retention policy derived from this configuration.
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            window: chrono::Duration::hours(self.retention_hours.min(i64::MAX as u64) as i64),
            sweep_interval: chrono::Duration::seconds(
                self.sweep_interval_seconds.min(i64::MAX as u64) as i64,
            ),
        }
    }
}

/// Client-side autosave configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveConfig {
    /// Base URL of the draft service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Quiet period after the last edit before a save is issued
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// File remembering the current draft id between runs
    #[serde(default = "default_id_file")]
    pub id_file: PathBuf,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_throttle_ms() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    15
}

fn default_id_file() -> PathBuf {
    PathBuf::from("./var/autosave-id.json")
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            throttle_ms: default_throttle_ms(),
            request_timeout_seconds: default_request_timeout(),
            id_file: default_id_file(),
        }
    }
}

impl AutosaveConfig {
    /// Throttle window as a `Duration`.
    pub fn throttle(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.throttle_ms)
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            tracing::debug!(var = name, value = %raw, "Env override");
            Some(value)
        }
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring invalid environment override");
            None
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MetadraftError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| MetadraftError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(bind) = std::env::var("METADRAFT_BIND") {
            self.server.bind = bind;
        }

        if let Ok(cookie) = std::env::var("METADRAFT_SESSION_COOKIE") {
            self.server.session_cookie = cookie;
        }

        if let Some(limit) = env_parse("METADRAFT_MAX_PAYLOAD_BYTES") {
            self.server.max_payload_bytes = limit;
        }

        if let Some(backend) = env_parse("METADRAFT_STORE_BACKEND") {
            self.store.backend = backend;
        }

        if let Ok(root) = std::env::var("METADRAFT_STORAGE_ROOT") {
            self.store.root = PathBuf::from(root);
        }

        if let Some(hours) = env_parse("METADRAFT_RETENTION_HOURS") {
            self.store.retention_hours = hours;
        }

        if let Some(seconds) = env_parse("METADRAFT_SWEEP_INTERVAL_SECONDS") {
            self.store.sweep_interval_seconds = seconds;
        }

        if let Ok(endpoint) = std::env::var("METADRAFT_AUTOSAVE_ENDPOINT") {
            self.autosave.endpoint = endpoint;
        }

        if let Some(throttle) = env_parse("METADRAFT_THROTTLE_MS") {
            self.autosave.throttle_ms = throttle;
        }

        if let Some(json) = env_parse("METADRAFT_LOG_JSON") {
            self.logging.json_format = json;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(root) = &cli.storage_root {
            tracing::debug!(root = %root.display(), "CLI override: storage root");
            self.store.root = root.clone();
        }
        if cli.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(MetadraftError::Config("server.bind cannot be empty".to_string()).into());
        }

        let cookie = self.server.session_cookie.as_str();
        if cookie.is_empty()
            || !cookie
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(MetadraftError::Config(format!(
                "server.session_cookie is not a valid cookie name: {:?}",
                cookie
            ))
            .into());
        }

        if self.server.max_payload_bytes == 0 {
            return Err(MetadraftError::Config(
                "server.max_payload_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        if self.store.root.as_os_str().is_empty() {
            return Err(MetadraftError::Config("store.root cannot be empty".to_string()).into());
        }

        if self.store.retention_hours == 0 {
            return Err(MetadraftError::Config(
                "store.retention_hours must be greater than 0".to_string(),
            )
            .into());
        }

        if self.autosave.throttle_ms == 0 {
            return Err(MetadraftError::Config(
                "autosave.throttle_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.autosave.request_timeout_seconds == 0 {
            return Err(MetadraftError::Config(
                "autosave.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        url::Url::parse(&self.autosave.endpoint).map_err(|e| {
            MetadraftError::Config(format!(
                "autosave.endpoint is not a valid URL ({}): {}",
                self.autosave.endpoint, e
            ))
        })?;

        Ok(())
    }
}
