//! Shared caches for decoded images and thumbnails.

mod image_cache;
mod loading_cache;
mod process_registry;
mod thumbnail_cache;

pub use image_cache::{DEFAULT_IMAGE_BUDGET, ImageCache};
pub use loading_cache::{
    CacheLock, CacheOptions, CacheState, CacheStats, LoadingCache, WAIT_INTERVAL, cache, clean_up,
    initialize,
};
pub use process_registry::{Listener, ListenerId, ProcessId, ProcessRegistry};
pub use thumbnail_cache::{DEFAULT_THUMBNAIL_IMAGES, DEFAULT_THUMBNAIL_PIXMAPS, ThumbnailCache};
