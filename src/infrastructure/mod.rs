//! Infrastructure layer with the cache, loader threads and codec adapters.

/// Shared image and thumbnail caches.
pub mod cache;
/// Codec, metadata and color adapters.
pub mod codec;
/// Engine configuration.
pub mod config;
/// Load and save tasks.
pub mod tasks;
/// Worker threads and notification plumbing.
pub mod thread;

pub use cache::{CacheOptions, CacheStats, LoadingCache};
pub use codec::{ExifMetadata, ImageCrateCodec, StaticColorManagement};
pub use config::{CliArgs, EngineConfig, LogLevel, StorageManager};
pub use tasks::{AccessMode, TaskServices};
pub use thread::{LoadSaveThread, LoadingMode, LoadingPolicy, NotificationPolicy, ThreadOptions};
