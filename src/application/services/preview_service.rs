//! Preview loading for image viewers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::entities::{
    ColorManagement, LoadEvent, LoadedImage, LoadingDescription, PreviewQuality, PreviewSettings,
    RawLoading,
};
use crate::domain::ports::LoadSaveNotifier;
use crate::infrastructure::cache::LoadingCache;
use crate::infrastructure::tasks::{
    LoadSaveTask, PreviewProducer, SharedLoadingTask, TaskContext, TaskOutcome, TaskServices,
    TaskStatusCell,
};
use crate::infrastructure::thread::{LoadSaveThread, LoadingPolicy, ThreadOptions};

/// Settings shared by every preview request of a [`PreviewLoadThread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewOptions {
    pub raw_loading: RawLoading,
    pub convert_to_eight_bit: bool,
    pub exif_rotate: bool,
    /// Convert previews for the display profile.
    pub color_managed: bool,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            raw_loading: RawLoading::Automatic,
            convert_to_eight_bit: true,
            exif_rotate: true,
            color_managed: false,
        }
    }
}

/// Loader thread for previews. A new request replaces the pending one.
pub struct PreviewLoadThread {
    thread: LoadSaveThread,
    services: TaskServices,
    options: RwLock<PreviewOptions>,
}

impl std::fmt::Debug for PreviewLoadThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewLoadThread")
            .field("options", &*self.options.read())
            .finish_non_exhaustive()
    }
}

impl PreviewLoadThread {
    #[must_use]
    pub fn new(
        cache: Arc<LoadingCache>,
        services: TaskServices,
        events: mpsc::UnboundedSender<LoadEvent>,
        options: PreviewOptions,
        thread_options: ThreadOptions,
    ) -> Self {
        Self {
            thread: LoadSaveThread::new(cache, services.clone(), events, thread_options),
            services,
            options: RwLock::new(options),
        }
    }

    #[must_use]
    pub fn thread(&self) -> &LoadSaveThread {
        &self.thread
    }

    #[must_use]
    pub fn options(&self) -> PreviewOptions {
        *self.options.read()
    }

    pub fn set_options(&self, options: PreviewOptions) {
        *self.options.write() = options;
    }

    /// Description of a preview of `path` with the longest edge near `size`,
    /// or at full size when `size` is 0.
    #[must_use]
    pub fn description(
        &self,
        path: impl Into<PathBuf>,
        size: u32,
        quality: PreviewQuality,
    ) -> LoadingDescription {
        let options = self.options();
        let settings = PreviewSettings {
            quality,
            raw_loading: options.raw_loading,
            convert_to_eight_bit: options.convert_to_eight_bit,
            exif_rotate: options.exif_rotate,
        };
        let color = if options.color_managed {
            ColorManagement::ConvertForDisplay
        } else {
            ColorManagement::NoConversion
        };
        LoadingDescription::preview(path, size, settings).with_color_management(color, None)
    }

    /// Loads a fast preview of `path`.
    pub fn load(&self, path: &Path, size: u32) {
        self.load_description(self.description(path, size, PreviewQuality::FastPreview));
    }

    /// Loads a fast preview that should come close to `size`.
    pub fn load_fast_but_large(&self, path: &Path, size: u32) {
        self.load_description(self.description(path, size, PreviewQuality::FastButLargePreview));
    }

    /// Loads a full-size, full quality preview.
    pub fn load_high_quality(&self, path: &Path) {
        self.load_description(self.description(path, 0, PreviewQuality::HighQualityPreview));
    }

    pub fn load_description(&self, description: LoadingDescription) {
        debug!(%description, "Loading preview");
        self.thread
            .load_with_policy(description, LoadingPolicy::FirstRemovePrevious);
    }

    /// Produces a preview on the calling thread, still sharing the cache and
    /// running loads with other threads.
    #[must_use]
    pub fn load_synchronously(&self, path: &Path, size: u32, quality: PreviewQuality) -> LoadedImage {
        let description = self.description(path, size, quality);
        let ctx = TaskContext {
            cache: self.thread.cache().clone(),
            notifier: Arc::new(SilentNotifier),
            services: self.services.clone(),
        };
        let status = TaskStatusCell::new();
        let mut task =
            SharedLoadingTask::new(description, self.thread.access_mode(), PreviewProducer);

        let outcome = if status.begin_running() {
            task.execute(&ctx, &status)
        } else {
            task.cancelled_outcome()
        };
        status.complete();
        match outcome {
            TaskOutcome::Loaded { image, .. } => image,
            TaskOutcome::Saved { .. } => LoadedImage::null(),
        }
    }
}

/// Notifier of synchronous loads: nobody listens.
struct SilentNotifier;

impl LoadSaveNotifier for SilentNotifier {
    fn image_started_loading(&self, _description: &LoadingDescription) {}

    fn loading_progress(&self, _description: &LoadingDescription, _progress: f32) {}

    fn image_loaded(&self, _description: &LoadingDescription, _image: &LoadedImage) {}

    fn more_complete_loading_available(
        &self,
        _current: &LoadingDescription,
        _more_complete: &LoadingDescription,
    ) {
    }

    fn image_started_saving(&self, _path: &Path) {}

    fn saving_progress(&self, _path: &Path, _progress: f32) {}

    fn image_saved(&self, _path: &Path, _success: bool) {}

    fn query_send_notify_event(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::{CountingCodec, FixedMetadata};
    use crate::infrastructure::tasks::test_support::services;
    use std::time::Duration;

    fn setup(
        codec: &Arc<CountingCodec>,
    ) -> (PreviewLoadThread, mpsc::UnboundedReceiver<LoadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = PreviewLoadThread::new(
            Arc::new(LoadingCache::default()),
            services(codec.clone(), FixedMetadata::default()),
            tx,
            PreviewOptions::default(),
            ThreadOptions::default(),
        );
        (thread, rx)
    }

    fn loaded(rx: &mut mpsc::UnboundedReceiver<LoadEvent>) -> Vec<(LoadingDescription, LoadedImage)> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                LoadEvent::Loaded { description, image } => Some((description, image)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fast_preview_is_scaled_to_size() {
        let codec = Arc::new(CountingCodec::new(1000, 750));
        let (previews, mut rx) = setup(&codec);

        previews.load(Path::new("/p/a.jpg"), 512);
        previews.thread().wait();

        let results = loaded(&mut rx);
        assert_eq!(results.len(), 1);
        assert!(results[0].0.is_preview());
        assert_eq!(results[0].1.dimensions(), (512, 384));
    }

    #[test]
    fn test_new_request_replaces_pending_one() {
        let codec = Arc::new(CountingCodec::new(100, 75).with_delay(Duration::from_millis(200)));
        let (previews, mut rx) = setup(&codec);

        previews.load(Path::new("/p/a.jpg"), 64);
        previews.load(Path::new("/p/b.jpg"), 64);
        previews.thread().wait();

        let results = loaded(&mut rx);
        assert_eq!(results.len(), 2);
        for (description, image) in &results {
            let is_b = description.file_path() == Path::new("/p/b.jpg");
            assert_eq!(image.is_null(), !is_b);
        }
    }

    #[test]
    fn test_high_quality_keeps_full_size() {
        let codec = Arc::new(CountingCodec::new(300, 200));
        let (previews, mut rx) = setup(&codec);

        previews.load_high_quality(Path::new("/p/a.jpg"));
        previews.thread().wait();

        assert_eq!(loaded(&mut rx)[0].1.dimensions(), (300, 200));
    }

    #[test]
    fn test_synchronous_load_uses_cache_without_events() {
        let codec = Arc::new(CountingCodec::new(300, 200));
        let (previews, mut rx) = setup(&codec);
        let path = Path::new("/p/a.jpg");

        let first = previews.load_synchronously(path, 0, PreviewQuality::FastButLargePreview);
        let second = previews.load_synchronously(path, 0, PreviewQuality::FastButLargePreview);

        assert_eq!(first.dimensions(), (300, 200));
        assert_eq!(second.dimensions(), (300, 200));
        assert_eq!(codec.total_decodes(), 1);
        assert!(rx.try_recv().is_err());
    }
}
