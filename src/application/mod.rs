//! Application layer with the thumbnail and preview services.

/// Loader services used by views and tools.
pub mod services;

pub use services::{
    PreviewLoadThread, PreviewOptions, ResultBatcher, ThumbnailImageCatcher, ThumbnailLoadThread,
    ThumbnailSettings,
};
