//! Consumer-facing loader services.

pub mod image_catcher;
pub mod preview_service;
pub mod result_batcher;
pub mod thumbnail_service;

pub use image_catcher::ThumbnailImageCatcher;
pub use preview_service::{PreviewLoadThread, PreviewOptions};
pub use result_batcher::ResultBatcher;
pub use thumbnail_service::{
    DEFAULT_THUMBNAIL_SIZE, MAX_THUMBNAIL_SIZE, ThumbnailLoadThread, ThumbnailSettings,
};
