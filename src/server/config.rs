//! Configuration loading for companiond.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.companion/config.toml` (user)
//! 3. `/etc/companion/config.toml` (system)
//!
//! With no file present every section takes its defaults. Environment
//! overrides are applied once, after loading, by [`Config::apply_env`].

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conversation::StoreConfig;
use crate::telemetry::exporter::{ExporterConfig, resolve_preference};
use crate::{CompanionError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub conversations: ConversationsConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8000).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8000".to_string()
}

/// Service identity reported on spans, metrics and health.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            environment: default_environment(),
        }
    }
}

fn default_service_name() -> String {
    crate::DEFAULT_SERVICE_NAME.to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

/// Span exporter selection.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub disabled: bool,
    /// Preference order (default: otlp-grpc, otlp-http, console). Unknown
    /// names are skipped with a warning when the exporter is selected.
    #[serde(default = "default_exporters")]
    pub exporters: Vec<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Explicit collector endpoint; overrides host and port.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            exporters: default_exporters(),
            host: default_host(),
            grpc_port: default_grpc_port(),
            http_port: default_http_port(),
            endpoint: None,
        }
    }
}

fn default_exporters() -> Vec<String> {
    ["otlp-grpc", "otlp-http", "console"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_grpc_port() -> u16 {
    4317
}

fn default_http_port() -> u16 {
    4318
}

/// Generation model endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds (default: 60).
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            endpoint: default_model_endpoint(),
            timeout_secs: default_model_timeout(),
            system_prompt: None,
        }
    }
}

fn default_model_name() -> String {
    "gemini-2.5-flash-preview-05-20".to_string()
}

fn default_model_endpoint() -> String {
    "http://localhost:8080/generate".to_string()
}

fn default_model_timeout() -> u64 {
    60
}

/// Background resource refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between samples (default: 30).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Seconds to wait after a failed sample (default: 60).
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    /// CPU measurement window in milliseconds (default: 1000).
    #[serde(default = "default_cpu_window")]
    pub cpu_window_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            retry_backoff_secs: default_retry_backoff(),
            cpu_window_ms: default_cpu_window(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_retry_backoff() -> u64 {
    60
}

fn default_cpu_window() -> u64 {
    1000
}

/// Conversation history retention.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationsConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
    /// Idle sessions are forgotten after this many seconds (default: 1800).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for ConversationsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_max_sessions() -> u64 {
    10_000
}

fn default_idle_timeout() -> u64 {
    1800
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.companion/config.toml`
    /// 3. `/etc/companion/config.toml`
    ///
    /// Returns defaults when no file is found.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CompanionError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            CompanionError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(CompanionError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".companion").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/companion/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Pass `|k| std::env::var(k).ok()` in production; tests pass a map.
    /// Never fails: bad telemetry settings are dealt with at selection time.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |key: &str| {
            lookup(key).is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        };
        if flag("COMPANION_TRACING_DISABLED") || flag("OTEL_SDK_DISABLED") {
            self.tracing.disabled = true;
        }
        if let Some(list) = lookup("COMPANION_TRACE_EXPORTERS") {
            self.tracing.exporters = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(host) = lookup("COMPANION_OTLP_HOST") {
            self.tracing.host = host;
        }
        if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.tracing.endpoint = Some(endpoint);
        }
        if let Some(environment) = lookup("DEPLOYMENT_ENVIRONMENT") {
            self.service.environment = environment;
        }
        if let Some(name) = lookup("OTEL_SERVICE_NAME") {
            self.service.name = name;
        }
        if let Some(endpoint) = lookup("COMPANION_MODEL_ENDPOINT") {
            self.model.endpoint = endpoint;
        }
        if let Some(address) = lookup("COMPANION_ADDRESS") {
            self.server.address = address;
        }
    }

    /// Exporter selection settings derived from this configuration.
    ///
    /// Unknown exporter names are logged and dropped here.
    pub fn exporter_config(&self) -> ExporterConfig {
        ExporterConfig {
            disabled: self.tracing.disabled,
            preference: resolve_preference(&self.tracing.exporters),
            host: self.tracing.host.clone(),
            grpc_port: self.tracing.grpc_port,
            http_port: self.tracing.http_port,
            endpoint: self.tracing.endpoint.clone(),
            service_name: self.service.name.clone(),
            service_version: crate::PKG_VERSION.to_string(),
            environment: self.service.environment.clone(),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_sessions: self.conversations.max_sessions,
            idle_timeout: Duration::from_secs(self.conversations.idle_timeout_secs),
        }
    }
}
