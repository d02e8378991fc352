//! Port definition for image decoding and encoding.

use std::path::Path;

use image::DynamicImage;

use crate::domain::errors::{LoadError, SaveError};

/// Callback interface a codec uses while working.
pub trait LoadObserver {
    /// Reports progress in `0.0..=1.0`.
    fn progress_info(&self, progress: f32);

    /// Returns false once the caller asked to stop. Codecs should poll this and
    /// bail out with [`LoadError::Cancelled`].
    fn continue_query(&self) -> bool;
}

/// Observer that never cancels and ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl LoadObserver for NullObserver {
    fn progress_info(&self, _progress: f32) {}

    fn continue_query(&self) -> bool {
        true
    }
}

/// Port for turning files into pixels and back.
/// Implementations must be thread-safe; they are shared by all worker threads.
pub trait ImageCodecPort: Send + Sync {
    /// Decodes the file at full resolution.
    fn decode(&self, path: &Path, observer: &dyn LoadObserver) -> Result<DynamicImage, LoadError>;

    /// Decodes the file, allowing the codec to produce a smaller image whose
    /// longest edge is still at least `min_size`.
    fn decode_scaled(
        &self,
        path: &Path,
        min_size: u32,
        observer: &dyn LoadObserver,
    ) -> Result<DynamicImage, LoadError> {
        let _ = min_size;
        self.decode(path, observer)
    }

    /// Decodes RAW sensor data at half resolution.
    fn decode_raw_half(
        &self,
        path: &Path,
        observer: &dyn LoadObserver,
    ) -> Result<DynamicImage, LoadError> {
        let _ = observer;
        Err(LoadError::unsupported(path))
    }

    /// Decodes RAW sensor data at full resolution.
    fn decode_raw_full(
        &self,
        path: &Path,
        observer: &dyn LoadObserver,
    ) -> Result<DynamicImage, LoadError> {
        let _ = observer;
        Err(LoadError::unsupported(path))
    }

    /// Encodes `image` to `path` in `format` (a file extension such as `"png"`).
    fn save(
        &self,
        image: &DynamicImage,
        path: &Path,
        format: &str,
        observer: &dyn LoadObserver,
    ) -> Result<(), SaveError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Codec producing synthetic images and counting every call.
    pub struct CountingCodec {
        pub width: u32,
        pub height: u32,
        pub delay: Duration,
        pub fail: bool,
        pub raw_support: bool,
        pub decodes: AtomicUsize,
        pub scaled_decodes: AtomicUsize,
        pub raw_half_decodes: AtomicUsize,
        pub raw_full_decodes: AtomicUsize,
        pub saved: Mutex<Vec<(std::path::PathBuf, String)>>,
    }

    impl CountingCodec {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                delay: Duration::ZERO,
                fail: false,
                raw_support: true,
                decodes: AtomicUsize::new(0),
                scaled_decodes: AtomicUsize::new(0),
                raw_half_decodes: AtomicUsize::new(0),
                raw_full_decodes: AtomicUsize::new(0),
                saved: Mutex::new(Vec::new()),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        pub fn without_raw(mut self) -> Self {
            self.raw_support = false;
            self
        }

        pub fn total_decodes(&self) -> usize {
            self.decodes.load(Ordering::SeqCst)
                + self.scaled_decodes.load(Ordering::SeqCst)
                + self.raw_half_decodes.load(Ordering::SeqCst)
                + self.raw_full_decodes.load(Ordering::SeqCst)
        }

        fn produce(
            &self,
            path: &Path,
            width: u32,
            height: u32,
            observer: &dyn LoadObserver,
        ) -> Result<DynamicImage, LoadError> {
            let steps = 10u32;
            for step in 0..steps {
                if !observer.continue_query() {
                    return Err(LoadError::Cancelled);
                }
                std::thread::sleep(self.delay / steps);
                #[allow(clippy::cast_precision_loss)]
                observer.progress_info((step + 1) as f32 / steps as f32);
            }
            if self.fail {
                return Err(LoadError::decode(path, "synthetic failure"));
            }
            Ok(DynamicImage::new_rgb8(width, height))
        }
    }

    impl ImageCodecPort for CountingCodec {
        fn decode(
            &self,
            path: &Path,
            observer: &dyn LoadObserver,
        ) -> Result<DynamicImage, LoadError> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            self.produce(path, self.width, self.height, observer)
        }

        fn decode_scaled(
            &self,
            path: &Path,
            _min_size: u32,
            observer: &dyn LoadObserver,
        ) -> Result<DynamicImage, LoadError> {
            self.scaled_decodes.fetch_add(1, Ordering::SeqCst);
            self.produce(path, self.width, self.height, observer)
        }

        fn decode_raw_half(
            &self,
            path: &Path,
            observer: &dyn LoadObserver,
        ) -> Result<DynamicImage, LoadError> {
            self.raw_half_decodes.fetch_add(1, Ordering::SeqCst);
            if !self.raw_support {
                return Err(LoadError::unsupported(path));
            }
            self.produce(path, self.width / 2, self.height / 2, observer)
        }

        fn decode_raw_full(
            &self,
            path: &Path,
            observer: &dyn LoadObserver,
        ) -> Result<DynamicImage, LoadError> {
            self.raw_full_decodes.fetch_add(1, Ordering::SeqCst);
            if !self.raw_support {
                return Err(LoadError::unsupported(path));
            }
            self.produce(path, self.width, self.height, observer)
        }

        fn save(
            &self,
            _image: &DynamicImage,
            path: &Path,
            format: &str,
            _observer: &dyn LoadObserver,
        ) -> Result<(), SaveError> {
            if self.fail {
                return Err(SaveError::Encode {
                    path: path.to_path_buf(),
                    message: "synthetic failure".to_string(),
                });
            }
            self.saved
                .lock()
                .unwrap()
                .push((path.to_path_buf(), format.to_string()));
            Ok(())
        }
    }
}
