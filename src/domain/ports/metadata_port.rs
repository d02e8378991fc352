//! Port definition for file metadata extraction.

use std::path::Path;

use bytes::Bytes;
use image::DynamicImage;

use crate::domain::entities::Orientation;
use crate::domain::errors::LoadError;

/// A preview image stored inside another image file.
#[derive(Debug, Clone)]
pub struct EmbeddedPreview {
    pub width: u32,
    pub height: u32,
    /// Encoded preview bytes, usually JPEG.
    pub data: Bytes,
}

impl EmbeddedPreview {
    #[must_use]
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Decodes the embedded bytes.
    ///
    /// # Errors
    /// Returns error if the bytes are not a decodable image.
    pub fn decode(&self, path: &Path) -> Result<DynamicImage, LoadError> {
        image::load_from_memory(&self.data).map_err(|e| LoadError::decode(path, e.to_string()))
    }
}

/// Port for reading metadata that steers decoding.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataPort: Send + Sync {
    /// Largest preview embedded in the file, if any.
    fn embedded_preview(&self, path: &Path) -> Option<EmbeddedPreview>;

    /// Orientation tag of the file.
    fn orientation(&self, path: &Path) -> Orientation;

    /// Pixel size of the full-resolution original.
    fn original_size(&self, path: &Path) -> Option<(u32, u32)>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::io::Cursor;

    /// Encodes a blank image of the given size as an embedded preview.
    pub fn embedded_preview(width: u32, height: u32) -> EmbeddedPreview {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        EmbeddedPreview {
            width,
            height,
            data: Bytes::from(buf.into_inner()),
        }
    }

    /// Metadata answering the same values for every path.
    #[derive(Default)]
    pub struct FixedMetadata {
        pub preview: Option<EmbeddedPreview>,
        pub orientation: Orientation,
        pub original_size: Option<(u32, u32)>,
    }

    impl MetadataPort for FixedMetadata {
        fn embedded_preview(&self, _path: &Path) -> Option<EmbeddedPreview> {
            self.preview.clone()
        }

        fn orientation(&self, _path: &Path) -> Orientation {
            self.orientation
        }

        fn original_size(&self, _path: &Path) -> Option<(u32, u32)> {
            self.original_size
        }
    }
}
