//! Metadata read from EXIF blocks.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use bytes::Bytes;
use image::ImageReader;
use tracing::trace;

use crate::domain::entities::Orientation;
use crate::domain::ports::{EmbeddedPreview, MetadataPort};

/// Reads orientation, original size and the embedded JPEG thumbnail with
/// `kamadak-exif`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadata;

impl ExifMetadata {
    fn read(path: &Path) -> Option<exif::Exif> {
        let file = File::open(path).ok()?;
        match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
            Ok(exif) => Some(exif),
            Err(e) => {
                trace!(path = %path.display(), error = %e, "No EXIF data");
                None
            }
        }
    }

    fn uint(exif: &exif::Exif, tag: exif::Tag, ifd: exif::In) -> Option<u32> {
        exif.get_field(tag, ifd).and_then(|f| f.value.get_uint(0))
    }
}

impl MetadataPort for ExifMetadata {
    fn embedded_preview(&self, path: &Path) -> Option<EmbeddedPreview> {
        let exif = Self::read(path)?;
        let offset = Self::uint(&exif, exif::Tag::JPEGInterchangeFormat, exif::In::THUMBNAIL)?;
        let length =
            Self::uint(&exif, exif::Tag::JPEGInterchangeFormatLength, exif::In::THUMBNAIL)?;

        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(length).ok()?)?;
        let data = exif.buf().get(start..end)?;

        let (width, height) = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()?;
        Some(EmbeddedPreview {
            width,
            height,
            data: Bytes::copy_from_slice(data),
        })
    }

    fn orientation(&self, path: &Path) -> Orientation {
        Self::read(path)
            .and_then(|exif| Self::uint(&exif, exif::Tag::Orientation, exif::In::PRIMARY))
            .map_or(Orientation::Normal, Orientation::from_exif)
    }

    fn original_size(&self, path: &Path) -> Option<(u32, u32)> {
        if let Ok(size) = image::image_dimensions(path) {
            return Some(size);
        }
        let exif = Self::read(path)?;
        let width = Self::uint(&exif, exif::Tag::PixelXDimension, exif::In::PRIMARY)?;
        let height = Self::uint(&exif, exif::Tag::PixelYDimension, exif::In::PRIMARY)?;
        Some((width, height))
    }
}
