//! Display-ready thumbnail buffers owned by the consumer thread.

use std::fmt;
use std::sync::Arc;

use image::{DynamicImage, RgbaImage};

use super::LoadedImage;

/// An RGBA buffer prepared for presentation.
///
/// Pixmaps live in the thumbnail sub-cache, which only accepts inserts from the
/// consumer thread that owns it.
#[derive(Clone)]
pub struct Pixmap {
    pixels: Arc<RgbaImage>,
}

impl Pixmap {
    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        Self {
            pixels: Arc::new(image.to_rgba8()),
        }
    }

    /// Converts a loaded image; `None` for the empty result.
    #[must_use]
    pub fn from_loaded(image: &LoadedImage) -> Option<Self> {
        image.image().map(|img| Self::from_image(img))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl fmt::Debug for Pixmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pixmap({}x{})", self.width(), self.height())
    }
}
