mod settings;

pub use settings::{
    DatabaseConfig, LoggingConfig, RedisConfig, ServerConfig, Settings, StorageConfig,
    TemplatesConfig,
};
