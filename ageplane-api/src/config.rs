//! Configuration management for the ageplane API server
//!
//! Settings are layered:
//! 1. Environment variables (highest priority)
//! 2. Configuration file (TOML format)
//! 3. Default values (lowest priority)

use crate::kubernetes::WorkloadProfile;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgePlaneConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub cluster: ClusterConfig,
    pub workload: WorkloadProfile,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

/// API key authentication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer key required on `/api/v1`; authentication is off when empty
    pub api_key: String,
}

impl AuthConfig {
    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Per-client request limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    pub window_secs: u64,
}

/// How to reach the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// Service account of the pod the server runs in
    InCluster,
    /// Explicit kubeconfig file
    Kubeconfig,
    /// In-cluster when available, otherwise the default kubeconfig
    Auto,
    /// Process-local cluster for development
    Memory,
}

impl std::str::FromStr for ClusterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "in_cluster" | "incluster" => Ok(Self::InCluster),
            "kubeconfig" => Ok(Self::Kubeconfig),
            "auto" => Ok(Self::Auto),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Validation(format!("Unknown cluster mode '{}'", other))),
        }
    }
}

/// Cluster connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub mode: ClusterMode,
    /// Kubeconfig file for `kubeconfig` mode
    pub kubeconfig_path: Option<PathBuf>,
    /// Kubeconfig context; current context when unset
    pub context: Option<String>,
    /// Upper bound for one provisioning call
    pub operation_timeout_secs: u64,
}

impl ClusterConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            mode: ClusterMode::Auto,
            kubeconfig_path: None,
            context: None,
            operation_timeout_secs: 30,
        }
    }
}

impl AgePlaneConfig {
    /// Load configuration from an explicit file, the standard locations,
    /// and environment variables
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(Self::find_config_file) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("AGEPLANE_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/ageplane/config.toml")),
            Some(PathBuf::from("./ageplane.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; `AGEPLANE_*` wins over the short names
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| keys.iter().find_map(|key| lookup(key));

        // Server
        if let Some(host) = get(&["AGEPLANE_HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = get(&["AGEPLANE_PORT", "PORT"]).and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Auth
        if let Some(key) = get(&["AGEPLANE_API_KEY", "API_KEY"]) {
            self.auth.api_key = key;
        }

        // Rate limit
        if let Some(max) = get(&["AGEPLANE_RATE_LIMIT"]).and_then(|v| v.parse().ok()) {
            self.rate_limit.max_requests = max;
        }
        if let Some(secs) = get(&["AGEPLANE_RATE_LIMIT_WINDOW_SECS"]).and_then(|v| v.parse().ok()) {
            self.rate_limit.window_secs = secs;
        }

        // Cluster
        if let Some(mode) = get(&["AGEPLANE_CLUSTER_MODE"]).and_then(|v| v.parse().ok()) {
            self.cluster.mode = mode;
        }
        if let Some(path) = get(&["AGEPLANE_KUBECONFIG", "KUBECONFIG"]) {
            self.cluster.kubeconfig_path = Some(PathBuf::from(path));
        }
        if let Some(context) = get(&["AGEPLANE_KUBE_CONTEXT"]) {
            self.cluster.context = Some(context);
        }
        if let Some(secs) = get(&["AGEPLANE_OPERATION_TIMEOUT_SECS"]).and_then(|v| v.parse().ok()) {
            self.cluster.operation_timeout_secs = secs;
        }

        // Workload
        if let Some(image) = get(&["AGEPLANE_BASE_IMAGE"]) {
            self.workload.base_image = image;
        }
        if let Some(policy) = get(&["AGEPLANE_IMAGE_PULL_POLICY"]) {
            self.workload.image_pull_policy = policy;
        }

        // Logging
        if let Some(level) = get(&["AGEPLANE_LOG_LEVEL"]) {
            self.logging.level = level;
        }
        if let Some(debug) = get(&["DEBUG"]) {
            if debug.eq_ignore_ascii_case("true") || debug == "1" {
                self.logging.level = "debug".to_string();
            }
        }
        if let Some(json) = get(&["AGEPLANE_LOG_JSON"]) {
            self.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(dir) = get(&["AGEPLANE_LOG_DIR"]) {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("Port cannot be 0".to_string()));
        }

        if self.cluster.operation_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Operation timeout must be at least 1 second".to_string(),
            ));
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Validation(
                "Rate limit requests and window must be positive".to_string(),
            ));
        }

        if self.workload.base_image.is_empty() {
            return Err(ConfigError::Validation("Base image cannot be empty".to_string()));
        }

        if self.cluster.mode == ClusterMode::Kubeconfig && self.cluster.kubeconfig_path.is_none() {
            return Err(ConfigError::Validation(
                "Cluster mode 'kubeconfig' requires kubeconfig_path".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Config validation failed: {0}")]
    Validation(String),
}
