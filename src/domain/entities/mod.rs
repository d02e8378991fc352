//! Domain entity definitions.

mod load_event;
mod loaded_image;
mod loading_description;
mod orientation;
mod pixmap;

pub use load_event::LoadEvent;
pub use loaded_image::{FileFormat, IccProfile, ImageAttributes, LoadedImage};
pub use loading_description::{
    CacheKey, ColorManagement, DescriptionKind, LoadingDescription, PreviewQuality,
    PreviewSettings, RawLoading, Rect, ThumbnailFlags,
};
pub use orientation::Orientation;
pub use pixmap::Pixmap;
