use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BulkConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl BulkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |msg: &str| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg.to_string())) };

        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        if self.import.batch_size == 0 {
            return invalid("import.batch_size must be > 0");
        }
        if self.import.max_in_flight == 0 {
            return invalid("import.max_in_flight must be > 0");
        }
        if self.export.pipe_buffer_bytes == 0 {
            return invalid("export.pipe_buffer_bytes must be > 0");
        }
        let method = self.export.upload_method.to_ascii_uppercase();
        if !["PUT", "POST", "PATCH"].contains(&method.as_str()) {
            return invalid("export.upload_method must be one of PUT, POST, PATCH");
        }
        if self.http.connect_timeout_ms == 0 || self.http.request_timeout_ms == 0 {
            return invalid("http timeouts must be > 0");
        }
        if self.resources.paths.iter().any(|m| m.prefix.trim_matches('/').is_empty()) {
            return invalid("resources.paths prefixes must not be empty");
        }
        if self.queue.port == 0 {
            return invalid("queue.port must be > 0");
        }
        if self.jobs.max_concurrent_jobs == 0 {
            return invalid("jobs.max_concurrent_jobs must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Records per `create_many` call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Normalizations allowed to run at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}
fn default_batch_size() -> usize {
    10_000
}
fn default_max_in_flight() -> usize {
    64
}
impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_upload_method")]
    pub upload_method: String,
    /// Capacity of each in-memory pipe between stages.
    #[serde(default = "default_pipe_buffer_bytes")]
    pub pipe_buffer_bytes: usize,
}
fn default_upload_method() -> String {
    "PUT".into()
}
fn default_pipe_buffer_bytes() -> usize {
    64 * 1024
}
impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            upload_method: default_upload_method(),
            pipe_buffer_bytes: default_pipe_buffer_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    600_000
}
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Where resources live and which request paths map to which type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Public base URL used to build `href` values.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_paths")]
    pub paths: Vec<PathMapping>,
}
fn default_base_url() -> String {
    "http://localhost:8080".into()
}
fn default_paths() -> Vec<PathMapping> {
    vec![PathMapping {
        prefix: "/resource".into(),
        resource_type: "Resource".into(),
    }]
}
impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            paths: default_paths(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pub prefix: String,
    pub resource_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_host")]
    pub host: String,
    #[serde(default = "default_queue_port")]
    pub port: u16,
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
}
fn default_queue_host() -> String {
    "localhost".into()
}
fn default_queue_port() -> u16 {
    5672
}
fn default_readiness_timeout_ms() -> u64 {
    30_000
}
impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: default_queue_host(),
            port: default_queue_port(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
        }
    }
}

impl QueueConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}
fn default_max_concurrent_jobs() -> usize {
    4
}
impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

pub mod loader {
    use super::BulkConfig;
    use crate::error::ConfigError;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<BulkConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or("inventory.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        // Environment variable overrides, e.g., INVENTORY__IMPORT__BATCH_SIZE=500
        builder = builder.add_source(
            Environment::with_prefix("INVENTORY")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: BulkConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        tracing::debug!(
            batch_size = merged.import.batch_size,
            max_in_flight = merged.import.max_in_flight,
            upload_method = %merged.export.upload_method,
            "configuration loaded"
        );
        Ok(merged)
    }
}
