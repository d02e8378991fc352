//! Count-limited caches for generated thumbnails.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread::{self, ThreadId};

use lru::LruCache;
use tracing::{trace, warn};

use crate::domain::entities::{CacheKey, LoadedImage, Pixmap};

/// Default number of thumbnail images kept.
pub const DEFAULT_THUMBNAIL_IMAGES: usize = 100;

/// Default number of thumbnail pixmaps kept.
pub const DEFAULT_THUMBNAIL_PIXMAPS: usize = 100;

/// Thumbnail images shared across threads, and pixmaps owned by the one
/// consumer thread that first stored a pixmap.
pub struct ThumbnailCache {
    images: LruCache<CacheKey, (LoadedImage, PathBuf)>,
    pixmaps: LruCache<CacheKey, (Pixmap, PathBuf)>,
    pixmap_owner: Option<ThreadId>,
}

fn capacity(count: usize) -> NonZeroUsize {
    NonZeroUsize::new(count).unwrap_or(NonZeroUsize::MIN)
}

impl ThumbnailCache {
    #[must_use]
    pub fn new(image_count: usize, pixmap_count: usize) -> Self {
        Self {
            images: LruCache::new(capacity(image_count)),
            pixmaps: LruCache::new(capacity(pixmap_count)),
            pixmap_owner: None,
        }
    }

    /// Looks up a thumbnail image without changing eviction order.
    #[must_use]
    pub fn retrieve_image(&self, key: &CacheKey) -> Option<&LoadedImage> {
        self.images.peek(key).map(|(image, _)| image)
    }

    pub fn put_image(&mut self, key: CacheKey, image: LoadedImage, watched_path: &Path) -> bool {
        if image.is_null() {
            return false;
        }
        let evicted = self
            .images
            .push(key.clone(), (image, watched_path.to_path_buf()));
        if let Some((evicted, _)) = evicted.filter(|(evicted, _)| *evicted != key) {
            trace!(key = %evicted, "Evicted thumbnail image");
        }
        true
    }

    pub fn remove_image(&mut self, key: &CacheKey) -> Option<LoadedImage> {
        self.images.pop(key).map(|(image, _)| image)
    }

    #[must_use]
    pub fn retrieve_pixmap(&self, key: &CacheKey) -> Option<&Pixmap> {
        self.pixmaps.peek(key).map(|(pixmap, _)| pixmap)
    }

    /// Stores a pixmap. Only the thread that stored the first pixmap may store
    /// more; calls from any other thread are refused.
    pub fn put_pixmap(&mut self, key: CacheKey, pixmap: Pixmap, watched_path: &Path) -> bool {
        let current = thread::current().id();
        match self.pixmap_owner {
            Some(owner) if owner != current => {
                warn!(
                    key = %key,
                    "Refusing pixmap insert from a thread that does not own the pixmap cache"
                );
                return false;
            }
            Some(_) => {}
            None => self.pixmap_owner = Some(current),
        }
        self.pixmaps.push(key, (pixmap, watched_path.to_path_buf()));
        true
    }

    pub fn remove_pixmap(&mut self, key: &CacheKey) -> Option<Pixmap> {
        self.pixmaps.pop(key).map(|(pixmap, _)| pixmap)
    }

    /// Removes every image and pixmap generated from `path`.
    pub fn remove_path(&mut self, path: &Path) -> usize {
        let image_keys: Vec<CacheKey> = self
            .images
            .iter()
            .filter(|(_, (_, watched))| watched == path)
            .map(|(key, _)| key.clone())
            .collect();
        let pixmap_keys: Vec<CacheKey> = self
            .pixmaps
            .iter()
            .filter(|(_, (_, watched))| watched == path)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &image_keys {
            self.images.pop(key);
        }
        for key in &pixmap_keys {
            self.pixmaps.pop(key);
        }
        image_keys.len() + pixmap_keys.len()
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.pixmaps.clear();
    }

    pub fn set_capacities(&mut self, image_count: usize, pixmap_count: usize) {
        self.images.resize(capacity(image_count));
        self.pixmaps.resize(capacity(pixmap_count));
    }

    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn pixmap_count(&self) -> usize {
        self.pixmaps.len()
    }
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_IMAGES, DEFAULT_THUMBNAIL_PIXMAPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn image() -> LoadedImage {
        LoadedImage::new(DynamicImage::new_rgb8(4, 4))
    }

    fn pixmap() -> Pixmap {
        Pixmap::from_image(&DynamicImage::new_rgb8(4, 4))
    }

    #[test]
    fn test_image_count_limit() {
        let mut cache = ThumbnailCache::new(2, 2);
        cache.put_image(CacheKey::new("a"), image(), Path::new("/p/a.jpg"));
        cache.put_image(CacheKey::new("b"), image(), Path::new("/p/b.jpg"));
        cache.put_image(CacheKey::new("c"), image(), Path::new("/p/c.jpg"));

        assert_eq!(cache.image_count(), 2);
        assert!(cache.retrieve_image(&CacheKey::new("a")).is_none());
        assert!(cache.retrieve_image(&CacheKey::new("c")).is_some());
    }

    #[test]
    fn test_pixmaps_only_accepted_from_owner_thread() {
        let cache = std::sync::Arc::new(parking_lot::Mutex::new(ThumbnailCache::default()));
        assert!(
            cache
                .lock()
                .put_pixmap(CacheKey::new("a"), pixmap(), Path::new("/p/a.jpg"))
        );

        let remote = std::sync::Arc::clone(&cache);
        let accepted = std::thread::spawn(move || {
            remote
                .lock()
                .put_pixmap(CacheKey::new("b"), pixmap(), Path::new("/p/b.jpg"))
        })
        .join()
        .unwrap();

        assert!(!accepted);
        assert_eq!(cache.lock().pixmap_count(), 1);
    }

    #[test]
    fn test_remove_path_clears_both_sides() {
        let mut cache = ThumbnailCache::default();
        cache.put_image(CacheKey::new("a-128"), image(), Path::new("/p/a.jpg"));
        cache.put_image(CacheKey::new("a-256"), image(), Path::new("/p/a.jpg"));
        cache.put_pixmap(CacheKey::new("a-128"), pixmap(), Path::new("/p/a.jpg"));
        cache.put_image(CacheKey::new("b-128"), image(), Path::new("/p/b.jpg"));

        assert_eq!(cache.remove_path(Path::new("/p/a.jpg")), 3);
        assert_eq!(cache.image_count(), 1);
        assert_eq!(cache.pixmap_count(), 0);
    }

    #[test]
    fn test_null_image_is_refused() {
        let mut cache = ThumbnailCache::default();
        assert!(!cache.put_image(CacheKey::new("a"), LoadedImage::null(), Path::new("/p/a.jpg")));
    }
}
