//! Thumbnail loading for views.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::result_batcher::ResultBatcher;
use crate::domain::entities::{
    ColorManagement, LoadEvent, LoadedImage, LoadingDescription, Pixmap, Rect, ThumbnailFlags,
};
use crate::infrastructure::cache::LoadingCache;
use crate::infrastructure::tasks::{TaskServices, thumbnail_descriptions};
use crate::infrastructure::thread::{LoadSaveThread, LoadedHook, LoadingPolicy, ThreadOptions};

/// Largest thumbnail edge accepted by default.
pub const MAX_THUMBNAIL_SIZE: u32 = 512;
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 256;

/// Sizes views commonly ask for; used to find every cached variant.
const STANDARD_SIZES: [u32; 5] = [32, 64, 128, 256, 512];

/// How thumbnails are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ThumbnailSettings {
    pub size: u32,
    pub max_size: u32,
    pub highlight: bool,
    pub exif_rotate: bool,
    /// Convert thumbnails for the display profile.
    pub color_managed: bool,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_THUMBNAIL_SIZE,
            max_size: MAX_THUMBNAIL_SIZE,
            highlight: false,
            exif_rotate: true,
            color_managed: false,
        }
    }
}

impl ThumbnailSettings {
    #[must_use]
    pub fn flags(&self) -> ThumbnailFlags {
        let mut flags = ThumbnailFlags::REMOVE_ALPHA;
        flags.set(ThumbnailFlags::EXIF_ROTATE, self.exif_rotate);
        flags.set(ThumbnailFlags::HIGHLIGHT, self.highlight);
        flags
    }

    const fn color_management(&self) -> ColorManagement {
        if self.color_managed {
            ColorManagement::ConvertForDisplay
        } else {
            ColorManagement::NoConversion
        }
    }
}

/// Loader thread dedicated to thumbnails.
///
/// Results are batched: the receiver returned by [`ThumbnailLoadThread::new`]
/// gets one signal per batch and the consumer collects the batch with
/// [`ThumbnailLoadThread::harvest`]. Harvesting fills the pixmap cache, so it
/// must always happen on the same consumer thread.
pub struct ThumbnailLoadThread {
    thread: LoadSaveThread,
    settings: RwLock<ThumbnailSettings>,
    batcher: Arc<ResultBatcher<LoadingDescription, LoadedImage>>,
    subscribers: Arc<RwLock<Vec<(u64, LoadedHook)>>>,
    next_subscriber: AtomicU64,
    last_descriptions: Mutex<Vec<LoadingDescription>>,
}

impl std::fmt::Debug for ThumbnailLoadThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailLoadThread")
            .field("settings", &*self.settings.read())
            .finish_non_exhaustive()
    }
}

impl ThumbnailLoadThread {
    #[must_use]
    pub fn new(
        cache: Arc<LoadingCache>,
        services: TaskServices,
        events: mpsc::UnboundedSender<LoadEvent>,
        settings: ThumbnailSettings,
        options: ThreadOptions,
    ) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (batcher, signal) = ResultBatcher::new();
        let batcher = Arc::new(batcher);
        let subscribers: Arc<RwLock<Vec<(u64, LoadedHook)>>> = Arc::default();

        let thread = LoadSaveThread::new(cache, services, events, options);
        let hook_batcher = batcher.clone();
        let hook_subscribers = subscribers.clone();
        thread.set_loaded_hook(Some(Arc::new(move |description, image| {
            hook_batcher.insert(description.clone(), image.clone());
            for (_, subscriber) in hook_subscribers.read().iter() {
                subscriber(description, image);
            }
        })));

        let service = Self {
            thread,
            settings: RwLock::new(settings),
            batcher,
            subscribers,
            next_subscriber: AtomicU64::new(0),
            last_descriptions: Mutex::new(Vec::new()),
        };
        (service, signal)
    }

    #[must_use]
    pub fn thread(&self) -> &LoadSaveThread {
        &self.thread
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<LoadingCache> {
        self.thread.cache()
    }

    #[must_use]
    pub fn settings(&self) -> ThumbnailSettings {
        *self.settings.read()
    }

    pub fn set_settings(&self, settings: ThumbnailSettings) {
        *self.settings.write() = settings;
    }

    /// Returns `size` if it is a valid thumbnail size.
    #[must_use]
    pub fn check_size(&self, size: u32) -> Option<u32> {
        let max_size = self.settings.read().max_size;
        if size == 0 {
            warn!("Thumbnail size 0 requested");
            return None;
        }
        if size > max_size {
            warn!(size, max_size, "Thumbnail size too large");
            return None;
        }
        Some(size)
    }

    /// Description of the whole-image thumbnail of `path`.
    #[must_use]
    pub fn description(&self, path: impl Into<PathBuf>, size: u32) -> LoadingDescription {
        let settings = self.settings();
        LoadingDescription::thumbnail(path, size)
            .with_thumbnail_flags(settings.flags())
            .with_color_management(settings.color_management(), None)
    }

    /// Description of the thumbnail of the `rect` region of `path`.
    #[must_use]
    pub fn detail_description(
        &self,
        path: impl Into<PathBuf>,
        rect: Rect,
        size: u32,
    ) -> LoadingDescription {
        let settings = self.settings();
        LoadingDescription::detail_thumbnail(path, size, rect)
            .with_thumbnail_flags(settings.flags())
            .with_color_management(settings.color_management(), None)
    }

    /// Returns the cached pixmap, or schedules a load and returns `None`.
    pub fn find(&self, path: &Path, size: u32) -> Option<Pixmap> {
        let Some(size) = self.check_size(size) else {
            self.last_descriptions.lock().clear();
            return None;
        };
        self.find_description(self.description(path, size))
    }

    pub fn find_detail(&self, path: &Path, rect: Rect, size: u32) -> Option<Pixmap> {
        let Some(size) = self.check_size(size) else {
            self.last_descriptions.lock().clear();
            return None;
        };
        self.find_description(self.detail_description(path, rect, size))
    }

    fn find_description(&self, description: LoadingDescription) -> Option<Pixmap> {
        if let Some(pixmap) = self.cache().retrieve_thumbnail_pixmap(&description.cache_key()) {
            self.last_descriptions.lock().clear();
            return Some(pixmap);
        }
        *self.last_descriptions.lock() = vec![description.clone()];
        self.thread
            .load_with_policy(description, LoadingPolicy::Prepend);
        None
    }

    /// Schedules every thumbnail of `paths` that is not cached yet.
    pub fn find_group(&self, paths: &[PathBuf], size: u32) {
        let Some(size) = self.check_size(size) else {
            self.last_descriptions.lock().clear();
            return;
        };
        let cache = self.cache();
        let missing: Vec<LoadingDescription> = paths
            .iter()
            .map(|path| self.description(path.clone(), size))
            .filter(|d| cache.retrieve_thumbnail_pixmap(&d.cache_key()).is_none())
            .collect();
        self.schedule_group(missing);
    }

    /// Schedules the thumbnail of `path` even when it is cached, so that it
    /// is delivered again.
    pub fn load(&self, path: &Path, size: u32) {
        let Some(size) = self.check_size(size) else {
            self.last_descriptions.lock().clear();
            return;
        };
        let description = self.description(path, size);
        *self.last_descriptions.lock() = vec![description.clone()];
        self.thread
            .load_with_policy(description, LoadingPolicy::Prepend);
    }

    pub fn load_group(&self, paths: &[PathBuf], size: u32) {
        let Some(size) = self.check_size(size) else {
            self.last_descriptions.lock().clear();
            return;
        };
        let descriptions = paths
            .iter()
            .map(|path| self.description(path.clone(), size))
            .collect();
        self.schedule_group(descriptions);
    }

    fn schedule_group(&self, descriptions: Vec<LoadingDescription>) {
        if descriptions.is_empty() {
            self.last_descriptions.lock().clear();
            return;
        }
        *self.last_descriptions.lock() = descriptions.clone();
        self.thread.load_thumbnail_group(descriptions);
    }

    /// Loads in the background without touching the last request.
    pub fn preload(&self, path: &Path, size: u32) {
        if let Some(size) = self.check_size(size) {
            self.thread
                .load_with_policy(self.description(path, size), LoadingPolicy::Preload);
        }
    }

    pub fn preload_group(&self, paths: &[PathBuf], size: u32) {
        let Some(size) = self.check_size(size) else {
            return;
        };
        let descriptions = paths
            .iter()
            .map(|path| self.description(path.clone(), size))
            .collect();
        self.thread.preload_thumbnail_group(descriptions);
    }

    /// Descriptions scheduled by the last `find`, `find_group`, `load` or
    /// `load_group` call. Empty when that call scheduled nothing, because
    /// everything was cached or the size was rejected.
    #[must_use]
    pub fn last_descriptions(&self) -> Vec<LoadingDescription> {
        self.last_descriptions.lock().clone()
    }

    /// Collects the results delivered since the last call and caches them as
    /// pixmaps. Failed loads yield `None`.
    pub fn harvest(&self) -> Vec<(LoadingDescription, Option<Pixmap>)> {
        let cache = self.cache();
        self.batcher
            .drain()
            .into_iter()
            .map(|(description, image)| {
                let pixmap = Pixmap::from_loaded(&image);
                if let Some(pixmap) = &pixmap {
                    cache.put_thumbnail_pixmap(
                        description.cache_key(),
                        pixmap.clone(),
                        description.file_path(),
                    );
                }
                (description, pixmap)
            })
            .collect()
    }

    /// Drops every cached whole-image thumbnail variant of `path`.
    pub fn delete_thumbnail(&self, path: &Path) {
        let mut sizes = STANDARD_SIZES.to_vec();
        let settings = self.settings();
        for size in [settings.size, settings.max_size] {
            if !sizes.contains(&size) {
                sizes.push(size);
            }
        }
        let flags: Vec<ThumbnailFlags> = (0..=ThumbnailFlags::all().bits())
            .filter_map(ThumbnailFlags::from_bits)
            .collect();

        let descriptions = thumbnail_descriptions(path, &sizes, &flags);
        let mut lock = self.cache().lock();
        for description in &descriptions {
            for mode in [
                ColorManagement::NoConversion,
                ColorManagement::ConvertForDisplay,
            ] {
                let key = description.clone().with_color_management(mode, None).cache_key();
                lock.remove_thumbnail(&key);
            }
        }
        debug!(path = %path.display(), variants = descriptions.len(), "Deleted thumbnails");
    }

    /// Registers a callback receiving every result, on the loader thread.
    pub fn subscribe(&self, hook: LoadedHook) -> u64 {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, hook));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.write().retain(|(subscriber, _)| *subscriber != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::{CountingCodec, FixedMetadata};
    use crate::infrastructure::tasks::test_support::services;
    use std::sync::atomic::AtomicUsize;

    fn setup(
        codec: &Arc<CountingCodec>,
    ) -> (ThumbnailLoadThread, mpsc::UnboundedReceiver<()>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        ThumbnailLoadThread::new(
            Arc::new(LoadingCache::default()),
            services(codec.clone(), FixedMetadata::default()),
            tx,
            ThumbnailSettings::default(),
            ThreadOptions::default(),
        )
    }

    #[test]
    fn test_find_schedules_then_serves_from_pixmap_cache() {
        let codec = Arc::new(CountingCodec::new(400, 300));
        let (thumbnails, mut signal) = setup(&codec);
        let path = Path::new("/p/a.png");

        assert!(thumbnails.find(path, 128).is_none());
        thumbnails.thread().wait();
        assert!(signal.try_recv().is_ok());

        let harvested = thumbnails.harvest();
        assert_eq!(harvested.len(), 1);
        let pixmap = harvested[0].1.as_ref().unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (128, 96));

        assert!(thumbnails.find(path, 128).is_some());
        assert_eq!(codec.total_decodes(), 1);
    }

    #[test]
    fn test_cached_find_schedules_nothing() {
        let codec = Arc::new(CountingCodec::new(400, 300));
        let (thumbnails, _signal) = setup(&codec);
        let path = Path::new("/p/a.png");

        thumbnails.find(path, 64);
        assert_eq!(thumbnails.last_descriptions().len(), 1);
        thumbnails.thread().wait();
        thumbnails.harvest();

        assert!(thumbnails.find(path, 64).is_some());
        assert!(thumbnails.last_descriptions().is_empty());
    }

    #[test]
    fn test_invalid_sizes_are_rejected() {
        let codec = Arc::new(CountingCodec::new(400, 300));
        let (thumbnails, _signal) = setup(&codec);

        assert_eq!(thumbnails.check_size(0), None);
        assert_eq!(thumbnails.check_size(MAX_THUMBNAIL_SIZE + 1), None);
        assert_eq!(thumbnails.check_size(64), Some(64));

        assert!(thumbnails.find(Path::new("/p/a.png"), 0).is_none());
        assert!(!thumbnails.thread().is_running());
        assert!(thumbnails.last_descriptions().is_empty());
    }

    #[test]
    fn test_find_group_skips_cached_thumbnails() {
        let codec = Arc::new(CountingCodec::new(400, 300));
        let (thumbnails, _signal) = setup(&codec);
        let a = PathBuf::from("/p/a.png");
        let b = PathBuf::from("/p/b.png");

        thumbnails.find(&a, 64);
        thumbnails.thread().wait();
        thumbnails.harvest();

        thumbnails.find_group(&[a, b.clone()], 64);
        let scheduled = thumbnails.last_descriptions();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].file_path(), b.as_path());
        thumbnails.thread().wait();
        assert_eq!(codec.total_decodes(), 2);
    }

    #[test]
    fn test_failed_thumbnail_yields_none() {
        let codec = Arc::new(CountingCodec::new(400, 300).failing());
        let (thumbnails, _signal) = setup(&codec);

        thumbnails.find(Path::new("/p/broken.png"), 64);
        thumbnails.thread().wait();
        let harvested = thumbnails.harvest();
        assert_eq!(harvested.len(), 1);
        assert!(harvested[0].1.is_none());
    }

    #[test]
    fn test_delete_thumbnail_drops_cached_variants() {
        let codec = Arc::new(CountingCodec::new(400, 300));
        let (thumbnails, _signal) = setup(&codec);
        let path = Path::new("/p/a.png");

        thumbnails.find(path, 128);
        thumbnails.thread().wait();
        thumbnails.harvest();
        assert!(thumbnails.find(path, 128).is_some());

        thumbnails.delete_thumbnail(path);
        assert_eq!(thumbnails.cache().stats().thumbnail_pixmaps, 0);
        assert_eq!(thumbnails.cache().stats().thumbnail_images, 0);
    }

    #[test]
    fn test_subscribers_see_every_result() {
        let codec = Arc::new(CountingCodec::new(400, 300));
        let (thumbnails, _signal) = setup(&codec);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let id = thumbnails.subscribe(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        thumbnails.load_group(&[PathBuf::from("/p/a.png"), PathBuf::from("/p/b.png")], 64);
        thumbnails.thread().wait();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        thumbnails.unsubscribe(id);
        thumbnails.load(Path::new("/p/c.png"), 64);
        thumbnails.thread().wait();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_highlight_setting_changes_flags() {
        let settings = ThumbnailSettings {
            highlight: true,
            exif_rotate: false,
            ..ThumbnailSettings::default()
        };
        assert_eq!(
            settings.flags(),
            ThumbnailFlags::HIGHLIGHT | ThumbnailFlags::REMOVE_ALPHA
        );
    }
}
