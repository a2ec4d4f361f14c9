use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    /// Path of the template catalog; format inferred from the extension
    #[serde(default = "default_templates_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Stream carrying event messages
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Consumer group shared by all event store instances
    #[serde(default = "default_group")]
    pub group: String,
    /// Consumer name; a random one is generated when unset. Entries a
    /// previous consumer left pending are reclaimed after `claim_idle_ms`.
    #[serde(default)]
    pub consumer: Option<String>,
    /// Maximum entries fetched per read
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How long a read blocks waiting for new entries, in milliseconds
    #[serde(default = "default_block_ms")]
    pub block_ms: usize,
    /// Pending entries idle this long in any consumer are taken over
    #[serde(default = "default_claim_idle_ms")]
    pub claim_idle_ms: usize,
    /// Deliveries after which an unhandled entry is moved to the dead-letter stream
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: usize,
    /// Dead-letter stream; defaults to `<stream>:dead`
    #[serde(default)]
    pub dead_letter_stream: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "postgres" or "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_templates_path() -> String {
    "config/event-templates.yaml".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_stream() -> String {
    "events".to_string()
}

fn default_group() -> String {
    "event-store".to_string()
}

fn default_batch_size() -> usize {
    16
}

fn default_block_ms() -> usize {
    2000
}

fn default_claim_idle_ms() -> usize {
    60_000
}

fn default_max_deliveries() -> usize {
    10
}

fn default_database_url() -> String {
    "postgres://localhost:5432/events".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    300 // 5 minutes
}

fn default_storage_backend() -> String {
    "postgres".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("templates.path", default_templates_path())?
            .set_default("storage.backend", default_storage_backend())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER__PORT, TEMPLATES__PATH, DATABASE__URL, REDIS__BLOCK_MS, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl RedisConfig {
    /// Stream receiving entries that exhausted `max_deliveries`
    pub fn dead_letter_stream(&self) -> String {
        self.dead_letter_stream
            .clone()
            .unwrap_or_else(|| format!("{}:dead", self.stream))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: default_templates_path(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            stream: default_stream(),
            group: default_group(),
            consumer: None,
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            claim_idle_ms: default_claim_idle_ms(),
            max_deliveries: default_max_deliveries(),
            dead_letter_stream: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}
