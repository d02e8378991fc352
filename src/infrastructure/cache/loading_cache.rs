//! The shared loading cache: decoded images, thumbnails and in-flight loads
//! behind one lock and one condition variable.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::image_cache::{DEFAULT_IMAGE_BUDGET, ImageCache};
use super::process_registry::ProcessRegistry;
use super::thumbnail_cache::{DEFAULT_THUMBNAIL_IMAGES, DEFAULT_THUMBNAIL_PIXMAPS, ThumbnailCache};
use crate::domain::entities::{CacheKey, LoadedImage, Pixmap};

/// Interval of [`CacheLock::timed_wait`].
pub const WAIT_INTERVAL: Duration = Duration::from_millis(50);

/// Sizing of the loading cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Byte budget of the decoded image cache.
    pub image_budget: u64,
    /// Largest single image accepted, in bytes.
    pub oversize_threshold: u64,
    pub thumbnail_images: usize,
    pub thumbnail_pixmaps: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            image_budget: DEFAULT_IMAGE_BUDGET,
            oversize_threshold: DEFAULT_IMAGE_BUDGET,
            thumbnail_images: DEFAULT_THUMBNAIL_IMAGES,
            thumbnail_pixmaps: DEFAULT_THUMBNAIL_PIXMAPS,
        }
    }
}

/// Everything guarded by the cache lock.
pub struct CacheState {
    images: ImageCache,
    thumbnails: ThumbnailCache,
    processes: ProcessRegistry,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn new(options: &CacheOptions) -> Self {
        Self {
            images: ImageCache::new(options.image_budget, options.oversize_threshold),
            thumbnails: ThumbnailCache::new(options.thumbnail_images, options.thumbnail_pixmaps),
            processes: ProcessRegistry::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn count(&mut self, found: bool) {
        if found {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    /// Looks up a decoded image. The returned value shares the cached buffer.
    pub fn retrieve_image(&mut self, key: &CacheKey) -> Option<LoadedImage> {
        let found = self.images.retrieve(key).cloned();
        self.count(found.is_some());
        found
    }

    pub fn put_image(&mut self, key: CacheKey, image: LoadedImage, watched_path: &Path) -> bool {
        self.images.put(key, image, watched_path)
    }

    #[must_use]
    pub fn is_cacheable(&self, image: &LoadedImage) -> bool {
        self.images.is_cacheable(image)
    }

    pub fn retrieve_thumbnail(&mut self, key: &CacheKey) -> Option<LoadedImage> {
        let found = self.thumbnails.retrieve_image(key).cloned();
        self.count(found.is_some());
        found
    }

    pub fn put_thumbnail(&mut self, key: CacheKey, image: LoadedImage, watched_path: &Path) -> bool {
        self.thumbnails.put_image(key, image, watched_path)
    }

    pub fn retrieve_thumbnail_pixmap(&mut self, key: &CacheKey) -> Option<Pixmap> {
        let found = self.thumbnails.retrieve_pixmap(key).cloned();
        self.count(found.is_some());
        found
    }

    pub fn put_thumbnail_pixmap(&mut self, key: CacheKey, pixmap: Pixmap, watched_path: &Path) -> bool {
        self.thumbnails.put_pixmap(key, pixmap, watched_path)
    }

    /// Looks `key` up in the sub-cache that holds results of its kind.
    pub fn retrieve(&mut self, thumbnail: bool, key: &CacheKey) -> Option<LoadedImage> {
        if thumbnail {
            self.retrieve_thumbnail(key)
        } else {
            self.retrieve_image(key)
        }
    }

    /// Stores into the sub-cache that holds results of its kind.
    pub fn put(&mut self, thumbnail: bool, key: CacheKey, image: LoadedImage, watched_path: &Path) -> bool {
        if thumbnail {
            self.put_thumbnail(key, image, watched_path)
        } else {
            self.put_image(key, image, watched_path)
        }
    }

    pub fn remove_image(&mut self, key: &CacheKey) -> Option<LoadedImage> {
        self.images.remove(key)
    }

    pub fn remove_thumbnail(&mut self, key: &CacheKey) {
        self.thumbnails.remove_image(key);
        self.thumbnails.remove_pixmap(key);
    }

    pub fn remove_all(&mut self) {
        self.images.clear();
        self.thumbnails.clear();
    }

    /// Drops every cached result derived from `path`.
    pub fn remove_path(&mut self, path: &Path) -> usize {
        self.images.remove_path(path) + self.thumbnails.remove_path(path)
    }

    #[must_use]
    pub const fn processes(&self) -> &ProcessRegistry {
        &self.processes
    }

    pub fn processes_mut(&mut self) -> &mut ProcessRegistry {
        &mut self.processes
    }
}

/// Held lock on the loading cache.
///
/// Dereferences to [`CacheState`]. Waiting releases the lock for the duration
/// of the wait.
pub struct CacheLock<'a> {
    guard: MutexGuard<'a, CacheState>,
    condvar: &'a Condvar,
}

impl CacheLock<'_> {
    /// Blocks until woken.
    pub fn wait(&mut self) {
        self.condvar.wait(&mut self.guard);
    }

    /// Blocks until woken or [`WAIT_INTERVAL`] elapsed.
    pub fn timed_wait(&mut self) {
        let _ = self.condvar.wait_for(&mut self.guard, WAIT_INTERVAL);
    }

    /// Wakes every thread blocked on the cache.
    pub fn wake_all(&self) {
        self.condvar.notify_all();
    }
}

impl std::ops::Deref for CacheLock<'_> {
    type Target = CacheState;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl std::ops::DerefMut for CacheLock<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

/// Cache shared by all loader threads.
pub struct LoadingCache {
    state: Mutex<CacheState>,
    condvar: Condvar,
}

impl LoadingCache {
    #[must_use]
    pub fn new(options: CacheOptions) -> Self {
        Self {
            state: Mutex::new(CacheState::new(&options)),
            condvar: Condvar::new(),
        }
    }

    /// Takes the cache lock.
    pub fn lock(&self) -> CacheLock<'_> {
        CacheLock {
            guard: self.state.lock(),
            condvar: &self.condvar,
        }
    }

    /// Wakes every thread blocked on the cache.
    pub fn wake_all(&self) {
        self.condvar.notify_all();
    }

    pub fn retrieve_image(&self, key: &CacheKey) -> Option<LoadedImage> {
        self.lock().retrieve_image(key)
    }

    pub fn put_image(&self, key: CacheKey, image: LoadedImage, watched_path: &Path) -> bool {
        self.lock().put_image(key, image, watched_path)
    }

    pub fn retrieve_thumbnail(&self, key: &CacheKey) -> Option<LoadedImage> {
        self.lock().retrieve_thumbnail(key)
    }

    pub fn put_thumbnail(&self, key: CacheKey, image: LoadedImage, watched_path: &Path) -> bool {
        self.lock().put_thumbnail(key, image, watched_path)
    }

    pub fn retrieve_thumbnail_pixmap(&self, key: &CacheKey) -> Option<Pixmap> {
        self.lock().retrieve_thumbnail_pixmap(key)
    }

    pub fn put_thumbnail_pixmap(&self, key: CacheKey, pixmap: Pixmap, watched_path: &Path) -> bool {
        self.lock().put_thumbnail_pixmap(key, pixmap, watched_path)
    }

    pub fn remove_thumbnail(&self, key: &CacheKey) {
        self.lock().remove_thumbnail(key);
    }

    /// Removes every cached result of `path` and wakes all waiters.
    pub fn invalidate(&self, path: &Path) {
        let mut lock = self.lock();
        let removed = lock.remove_path(path);
        if removed > 0 {
            debug!(path = %path.display(), removed, "Invalidated cached images");
        }
        lock.wake_all();
    }

    /// Entry point for file watchers.
    pub fn notify_file_changed(&self, path: &Path) {
        self.invalidate(path);
    }

    /// Changes the decoded image budget.
    pub fn set_cache_options(&self, image_budget: u64) {
        let mut lock = self.lock();
        lock.images.set_budget(image_budget);
        info!(budget = image_budget, "Image cache budget changed");
    }

    pub fn set_oversize_threshold(&self, threshold: u64) {
        self.lock().images.set_oversize_threshold(threshold);
    }

    pub fn set_thumbnail_cache_size(&self, images: usize, pixmaps: usize) {
        self.lock().thumbnails.set_capacities(images, pixmaps);
    }

    /// Empties the decoded image cache.
    pub fn clean_cache(&self) {
        self.lock().images.clear();
    }

    /// Empties both thumbnail caches.
    pub fn clean_thumbnail_cache(&self) {
        self.lock().thumbnails.clear();
    }

    pub fn remove_all(&self) {
        self.lock().remove_all();
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let lock = self.lock();
        let total = lock.hits + lock.misses;
        let hit_rate = if total > 0 {
            (lock.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits: lock.hits,
            misses: lock.misses,
            hit_rate,
            images: lock.images.len(),
            image_cost: lock.images.total_cost(),
            image_budget: lock.images.budget(),
            thumbnail_images: lock.thumbnails.image_count(),
            thumbnail_pixmaps: lock.thumbnails.pixmap_count(),
            active_processes: lock.processes.active_count(),
        }
    }
}

impl Default for LoadingCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Decoded images held.
    pub images: usize,
    /// Bytes held by decoded images.
    pub image_cost: u64,
    pub image_budget: u64,
    pub thumbnail_images: usize,
    pub thumbnail_pixmaps: usize,
    /// Loads currently joinable by new requests.
    pub active_processes: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} / {} bytes), {} thumbnails, {} pixmaps, {:.1}% hit rate ({} hits, {} misses)",
            self.images,
            self.image_cost,
            self.image_budget,
            self.thumbnail_images,
            self.thumbnail_pixmaps,
            self.hit_rate,
            self.hits,
            self.misses
        )
    }
}

static GLOBAL_CACHE: Mutex<Option<Arc<LoadingCache>>> = parking_lot::const_mutex(None);

/// Returns the process-wide cache, creating it with default options on first use.
pub fn cache() -> Arc<LoadingCache> {
    let mut global = GLOBAL_CACHE.lock();
    Arc::clone(global.get_or_insert_with(|| Arc::new(LoadingCache::default())))
}

/// Creates the process-wide cache with `options`, or resizes the existing one.
pub fn initialize(options: CacheOptions) -> Arc<LoadingCache> {
    let mut global = GLOBAL_CACHE.lock();
    if let Some(existing) = global.as_ref() {
        existing.set_cache_options(options.image_budget);
        existing.set_oversize_threshold(options.oversize_threshold);
        existing.set_thumbnail_cache_size(options.thumbnail_images, options.thumbnail_pixmaps);
        return Arc::clone(existing);
    }
    let created = Arc::new(LoadingCache::new(options));
    *global = Some(Arc::clone(&created));
    created
}

/// Releases the process-wide cache. Holders of a handle keep theirs alive.
pub fn clean_up() {
    if let Some(cache) = GLOBAL_CACHE.lock().take() {
        cache.remove_all();
        cache.wake_all();
    }
}
