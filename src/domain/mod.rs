//! Domain layer with request/image entities, error types and collaborator ports.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, LoadEvent, LoadedImage, LoadingDescription};
pub use errors::{LoadError, SaveError};
pub use ports::{ColorManagementPort, ImageCodecPort, LoadSaveNotifier, MetadataPort};
