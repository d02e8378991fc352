mod codec_port;
mod color_port;
mod metadata_port;
mod notifier_port;

pub use codec_port::{ImageCodecPort, LoadObserver, NullObserver};
pub use color_port::ColorManagementPort;
pub use metadata_port::{EmbeddedPreview, MetadataPort};
pub use notifier_port::LoadSaveNotifier;

#[cfg(test)]
pub mod mocks {
    pub use super::codec_port::mock::CountingCodec;
    pub use super::metadata_port::MockMetadataPort;
    pub use super::metadata_port::mock::{FixedMetadata, embedded_preview};
    pub use super::notifier_port::mock::RecordingNotifier;
}
