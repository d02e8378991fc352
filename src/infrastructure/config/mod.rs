//! Engine configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{
    CacheConfig, ColorConfig, EngineConfig, LogLevel, NotificationsConfig, PreviewsConfig,
    ThumbnailsConfig,
};
pub use args::{CliArgs, Command, QualityArg};
pub use storage::{ConfigError, StorageManager};
