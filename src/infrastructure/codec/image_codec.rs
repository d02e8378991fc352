//! Codec backed by the `image` crate.

use std::path::Path;

use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use tracing::{debug, trace};

use crate::domain::errors::{LoadError, SaveError};
use crate::domain::ports::{ImageCodecPort, LoadObserver};

/// Decodes and encodes the formats the `image` crate was built with.
///
/// RAW files are not supported; the RAW entry points keep their
/// unsupported default so tasks fall back to embedded previews.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCrateCodec {
    fn open(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, LoadError> {
        let reader = ImageReader::open(path)
            .map_err(|e| LoadError::io(path, e))?
            .with_guessed_format()
            .map_err(|e| LoadError::io(path, e))?;
        if reader.format().is_none() {
            return Err(LoadError::unsupported(path));
        }
        Ok(reader)
    }

    fn map_error(path: &Path, error: ImageError) -> LoadError {
        match error {
            ImageError::Unsupported(_) => LoadError::unsupported(path),
            ImageError::IoError(e) => LoadError::io(path, e),
            other => LoadError::decode(path, other.to_string()),
        }
    }
}

impl ImageCodecPort for ImageCrateCodec {
    fn decode(&self, path: &Path, observer: &dyn LoadObserver) -> Result<DynamicImage, LoadError> {
        if !observer.continue_query() {
            return Err(LoadError::Cancelled);
        }
        let reader = Self::open(path)?;
        observer.progress_info(0.1);

        let image = reader.decode().map_err(|e| Self::map_error(path, e))?;
        if !observer.continue_query() {
            return Err(LoadError::Cancelled);
        }
        observer.progress_info(1.0);
        trace!(path = %path.display(), width = image.width(), height = image.height(), "Decoded");
        Ok(image)
    }

    /// Decodes, then shrinks to twice `min_size` with a fast filter.
    fn decode_scaled(
        &self,
        path: &Path,
        min_size: u32,
        observer: &dyn LoadObserver,
    ) -> Result<DynamicImage, LoadError> {
        let image = self.decode(path, observer)?;
        let bound = min_size.saturating_mul(2);
        if min_size == 0 || image.width().max(image.height()) <= bound {
            return Ok(image);
        }
        Ok(image.thumbnail(bound, bound))
    }

    fn save(
        &self,
        image: &DynamicImage,
        path: &Path,
        format: &str,
        observer: &dyn LoadObserver,
    ) -> Result<(), SaveError> {
        let Some(image_format) = ImageFormat::from_extension(format) else {
            return Err(SaveError::UnknownFormat(format.to_string()));
        };
        if !observer.continue_query() {
            return Err(SaveError::Cancelled);
        }

        let result = if image_format == ImageFormat::Jpeg && image.color().has_alpha() {
            debug!(path = %path.display(), "Dropping alpha channel for JPEG");
            DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, image_format)
        } else {
            image.save_with_format(path, image_format)
        };
        result.map_err(|e| SaveError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        observer.progress_info(1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NullObserver;
    use tempfile::TempDir;

    struct Stopped;

    impl LoadObserver for Stopped {
        fn progress_info(&self, _progress: f32) {}

        fn continue_query(&self) -> bool {
            false
        }
    }

    fn write_png(dir: &TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        DynamicImage::new_rgb8(width, height).save(&path).unwrap();
        path
    }

    #[test]
    fn test_decode_png() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "a.png", 30, 20);
        let image = ImageCrateCodec.decode(&path, &NullObserver).unwrap();
        assert_eq!((image.width(), image.height()), (30, 20));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = ImageCrateCodec.decode(&dir.path().join("missing.png"), &NullObserver);
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_unknown_content_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not an image").unwrap();
        let result = ImageCrateCodec.decode(&path, &NullObserver);
        assert!(matches!(result, Err(LoadError::Unsupported { .. })));
    }

    #[test]
    fn test_decode_honors_cancellation() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "a.png", 4, 4);
        assert!(ImageCrateCodec.decode(&path, &Stopped).unwrap_err().is_cancelled());
    }

    #[test]
    fn test_scaled_decode_keeps_requested_size() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "big.png", 800, 400);
        let image = ImageCrateCodec.decode_scaled(&path, 100, &NullObserver).unwrap();
        assert_eq!((image.width(), image.height()), (200, 100));
    }

    #[test]
    fn test_raw_is_unsupported() {
        let result = ImageCrateCodec.decode_raw_half(Path::new("/p/a.nef"), &NullObserver);
        assert!(matches!(result, Err(LoadError::Unsupported { .. })));
    }

    #[test]
    fn test_save_jpeg_from_rgba() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jpg");
        ImageCrateCodec
            .save(&DynamicImage::new_rgba8(8, 8), &path, "jpg", &NullObserver)
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_save_unknown_format() {
        let dir = TempDir::new().unwrap();
        let result = ImageCrateCodec.save(
            &DynamicImage::new_rgb8(2, 2),
            &dir.path().join("out.xyz"),
            "xyz",
            &NullObserver,
        );
        assert!(matches!(result, Err(SaveError::UnknownFormat(_))));
    }
}
