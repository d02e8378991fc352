//! Byte-budgeted cache of decoded images.

use std::path::{Path, PathBuf};

use lru::LruCache;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, LoadedImage};

/// Default budget for decoded images (60 MB).
pub const DEFAULT_IMAGE_BUDGET: u64 = 60 * 1024 * 1024;

struct CacheEntry {
    image: LoadedImage,
    watched_path: PathBuf,
    cost: u64,
}

/// Decoded images keyed by [`CacheKey`], evicted oldest-inserted first.
///
/// Lookups never promote an entry; only inserts affect eviction order.
/// Not synchronized on its own: it lives inside the loading cache's lock.
pub struct ImageCache {
    entries: LruCache<CacheKey, CacheEntry>,
    total_cost: u64,
    budget: u64,
    oversize_threshold: u64,
}

impl ImageCache {
    /// Creates a cache holding at most `budget` bytes, refusing single images
    /// larger than `oversize_threshold`.
    #[must_use]
    pub fn new(budget: u64, oversize_threshold: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_cost: 0,
            budget,
            oversize_threshold,
        }
    }

    /// Looks up an image without changing eviction order.
    #[must_use]
    pub fn retrieve(&self, key: &CacheKey) -> Option<&LoadedImage> {
        self.entries.peek(key).map(|entry| &entry.image)
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// True when `image` may be stored at all.
    #[must_use]
    pub fn is_cacheable(&self, image: &LoadedImage) -> bool {
        !image.is_null() && image.byte_cost() <= self.oversize_threshold.min(self.budget)
    }

    /// Stores `image`, evicting the oldest entries until the budget holds.
    /// Returns false and drops the image if it is not cacheable.
    pub fn put(&mut self, key: CacheKey, image: LoadedImage, watched_path: &Path) -> bool {
        if !self.is_cacheable(&image) {
            debug!(
                key = %key,
                cost = image.byte_cost(),
                budget = self.budget,
                "Image not cacheable"
            );
            return false;
        }

        self.remove(&key);

        let cost = image.byte_cost();
        while self.total_cost + cost > self.budget {
            let Some((evicted, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.total_cost -= entry.cost;
            trace!(key = %evicted, cost = entry.cost, "Evicted image from cache");
        }

        self.entries.push(
            key,
            CacheEntry {
                image,
                watched_path: watched_path.to_path_buf(),
                cost,
            },
        );
        self.total_cost += cost;
        true
    }

    /// Removes one entry, returning its image.
    pub fn remove(&mut self, key: &CacheKey) -> Option<LoadedImage> {
        let entry = self.entries.pop(key)?;
        self.total_cost -= entry.cost;
        Some(entry.image)
    }

    /// Removes every entry sourced from `path`. Returns the number removed.
    pub fn remove_path(&mut self, path: &Path) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.watched_path == path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_cost = 0;
    }

    /// Changes the budget, evicting immediately if needed.
    pub fn set_budget(&mut self, budget: u64) {
        self.budget = budget;
        while self.total_cost > self.budget {
            let Some((_, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.total_cost -= entry.cost;
        }
    }

    pub fn set_oversize_threshold(&mut self, threshold: u64) {
        self.oversize_threshold = threshold;
    }

    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Resident cost of all entries in bytes.
    #[must_use]
    pub const fn total_cost(&self) -> u64 {
        self.total_cost
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    /// RGBA image costing exactly `kib` KiB.
    fn image_of_kib(kib: u32) -> LoadedImage {
        LoadedImage::new(DynamicImage::new_rgba8(256, kib))
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name)
    }

    #[test]
    fn test_put_and_retrieve() {
        let mut cache = ImageCache::new(1024 * 1024, u64::MAX);
        assert!(cache.put(key("a"), image_of_kib(10), Path::new("/p/a.jpg")));

        let retrieved = cache.retrieve(&key("a"));
        assert!(retrieved.is_some());
        assert_eq!(cache.total_cost(), 10 * 1024);
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let mut cache = ImageCache::new(20 * 1024, u64::MAX);
        assert!(!cache.put(key("big"), image_of_kib(50), Path::new("/p/big.jpg")));
        assert!(cache.retrieve(&key("big")).is_none());
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_threshold_below_budget_is_respected() {
        let mut cache = ImageCache::new(100 * 1024, 8 * 1024);
        assert!(!cache.put(key("a"), image_of_kib(10), Path::new("/p/a.jpg")));
        assert!(cache.put(key("b"), image_of_kib(8), Path::new("/p/b.jpg")));
    }

    #[test]
    fn test_null_image_is_not_cacheable() {
        let mut cache = ImageCache::new(1024, 1024);
        assert!(!cache.put(key("a"), LoadedImage::null(), Path::new("/p/a.jpg")));
    }

    #[test]
    fn test_budget_holds_after_every_put() {
        let budget = 100 * 1024;
        let mut cache = ImageCache::new(budget, u64::MAX);
        for (i, size) in [30, 40, 20, 50, 10, 60, 25, 35].into_iter().enumerate() {
            cache.put(
                key(&format!("k{i}")),
                image_of_kib(size),
                Path::new("/p/x.jpg"),
            );
            assert!(cache.total_cost() <= budget);
        }
    }

    #[test]
    fn test_eviction_is_insertion_ordered() {
        let mut cache = ImageCache::new(30 * 1024, u64::MAX);
        cache.put(key("a"), image_of_kib(10), Path::new("/p/a.jpg"));
        cache.put(key("b"), image_of_kib(10), Path::new("/p/b.jpg"));
        cache.put(key("c"), image_of_kib(10), Path::new("/p/c.jpg"));

        // Lookups do not promote.
        let _ = cache.retrieve(&key("a"));

        cache.put(key("d"), image_of_kib(10), Path::new("/p/d.jpg"));
        assert!(cache.retrieve(&key("a")).is_none());
        assert!(cache.retrieve(&key("b")).is_some());
        assert!(cache.retrieve(&key("d")).is_some());
    }

    #[test]
    fn test_replacing_a_key_updates_cost() {
        let mut cache = ImageCache::new(100 * 1024, u64::MAX);
        cache.put(key("a"), image_of_kib(10), Path::new("/p/a.jpg"));
        cache.put(key("a"), image_of_kib(20), Path::new("/p/a.jpg"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 20 * 1024);
    }

    #[test]
    fn test_remove_path_only_touches_matching_entries() {
        let mut cache = ImageCache::new(100 * 1024, u64::MAX);
        cache.put(key("a1"), image_of_kib(5), Path::new("/p/a.jpg"));
        cache.put(key("a2"), image_of_kib(5), Path::new("/p/a.jpg"));
        cache.put(key("b"), image_of_kib(5), Path::new("/p/b.jpg"));

        assert_eq!(cache.remove_path(Path::new("/p/a.jpg")), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 5 * 1024);
    }

    #[test]
    fn test_shrinking_budget_evicts() {
        let mut cache = ImageCache::new(100 * 1024, u64::MAX);
        cache.put(key("a"), image_of_kib(40), Path::new("/p/a.jpg"));
        cache.put(key("b"), image_of_kib(40), Path::new("/p/b.jpg"));
        cache.set_budget(50 * 1024);
        assert!(cache.total_cost() <= 50 * 1024);
        assert!(cache.retrieve(&key("b")).is_some());
    }
}
