//! Decoded image values handed between caches, tasks and consumers.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Named color profile attached to an image.
///
/// Only the identity of the profile is tracked here; converting pixel data
/// is the color-management collaborator's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IccProfile {
    description: String,
}

impl IccProfile {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    /// The standard sRGB profile.
    #[must_use]
    pub fn srgb() -> Self {
        Self::new("sRGB")
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Container format guessed from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Jpeg,
    Png,
    Tiff,
    Webp,
    Raw,
    Other,
}

const RAW_EXTENSIONS: &[&str] = &[
    "arw", "cr2", "cr3", "crw", "dng", "erf", "kdc", "mrw", "nef", "nrw", "orf", "pef", "raf",
    "raw", "rw2", "sr2", "srf", "srw", "x3f",
];

impl FileFormat {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Self::Other;
        };
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "jpe" => Self::Jpeg,
            "png" => Self::Png,
            "tif" | "tiff" => Self::Tiff,
            "webp" => Self::Webp,
            other if RAW_EXTENSIONS.contains(&other) => Self::Raw,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(self, Self::Raw)
    }
}

/// Side information carried along with decoded pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAttributes {
    /// Size of the full-resolution original, when known.
    pub original_size: Option<(u32, u32)>,
    /// The pixels come from a preview embedded in the file.
    pub from_embedded_preview: bool,
    /// Profile the pixels are currently expressed in.
    pub icc_profile: Option<IccProfile>,
    pub detected_format: Option<FileFormat>,
}

/// A decoded image, or the empty marker used for failed and cancelled loads.
///
/// Cloning shares the pixel buffer; use [`LoadedImage::deep_copy`] or
/// [`LoadedImage::detach`] before mutating.
#[derive(Clone, Default)]
pub struct LoadedImage {
    data: Option<Arc<DynamicImage>>,
    attributes: ImageAttributes,
}

impl LoadedImage {
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        Self {
            data: Some(Arc::new(image)),
            attributes: ImageAttributes::default(),
        }
    }

    /// The empty result.
    #[must_use]
    pub fn null() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: ImageAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.data.is_none()
    }

    #[must_use]
    pub fn image(&self) -> Option<&Arc<DynamicImage>> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.data.as_ref().map_or(0, |img| img.width())
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.data.as_ref().map_or(0, |img| img.height())
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    #[must_use]
    pub const fn attributes(&self) -> &ImageAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut ImageAttributes {
        &mut self.attributes
    }

    /// Resident memory cost of the pixel buffer in bytes.
    #[must_use]
    pub fn byte_cost(&self) -> u64 {
        self.data
            .as_ref()
            .map_or(0, |img| img.as_bytes().len() as u64)
    }

    /// Returns an independent copy whose buffer is not shared with `self`.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self {
            data: self
                .data
                .as_ref()
                .map(|img| Arc::new(DynamicImage::clone(img))),
            attributes: self.attributes.clone(),
        }
    }

    /// Makes sure the buffer is not shared, copying it if needed.
    pub fn detach(&mut self) {
        if let Some(img) = self.data.as_mut() {
            Arc::make_mut(img);
        }
    }

    /// Mutable access to the pixels, copying the buffer first if it is shared.
    pub fn image_mut(&mut self) -> Option<&mut DynamicImage> {
        self.data.as_mut().map(Arc::make_mut)
    }

    /// Replaces the pixels, keeping the attributes.
    pub fn replace_image(&mut self, image: DynamicImage) {
        self.data = Some(Arc::new(image));
    }

    /// True when both values point at the same pixel buffer.
    #[must_use]
    pub fn shares_buffer_with(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for LoadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("LoadedImage(null)");
        }
        f.debug_struct("LoadedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl From<DynamicImage> for LoadedImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}
