//! Events emitted by worker threads to their consumer.

use std::path::PathBuf;

use super::{LoadedImage, LoadingDescription};

/// Notification sent from a worker thread over its event channel.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    /// A shared load began executing.
    StartedLoading { description: LoadingDescription },
    /// Decoding progress in `0.0..=1.0`. Subject to throttling.
    Progress {
        description: LoadingDescription,
        progress: f32,
    },
    /// Final result of a load; the image is null on failure or cancellation.
    Loaded {
        description: LoadingDescription,
        image: LoadedImage,
    },
    /// A full-resolution load of a file started while a reduced one was running.
    MoreCompleteLoadingAvailable {
        current: LoadingDescription,
        more_complete: LoadingDescription,
    },
    StartedSaving { path: PathBuf },
    SavingProgress { path: PathBuf, progress: f32 },
    /// Final result of a save.
    Saved { path: PathBuf, success: bool },
}

impl LoadEvent {
    /// True for the events that end a task.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Loaded { .. } | Self::Saved { .. })
    }
}
