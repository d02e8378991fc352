//! Concrete decoding, metadata and color collaborators.

mod color;
mod exif_metadata;
mod image_codec;

pub use color::StaticColorManagement;
pub use exif_metadata::ExifMetadata;
pub use image_codec::ImageCrateCodec;
