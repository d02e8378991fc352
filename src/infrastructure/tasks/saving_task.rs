//! Writing images to disk.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{LoadSaveTask, TaskContext, TaskOutcome, TaskStatus, TaskStatusCell, TaskType};
use crate::domain::entities::{LoadedImage, LoadingDescription};
use crate::domain::errors::SaveError;
use crate::domain::ports::{LoadObserver, LoadSaveNotifier};

/// Encodes an image to a file. Never cached or shared.
pub struct SavingTask {
    image: LoadedImage,
    path: PathBuf,
    format: String,
}

impl SavingTask {
    #[must_use]
    pub fn new(image: LoadedImage, path: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            image,
            path: path.into(),
            format: format.into(),
        }
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    fn save(&self, ctx: &TaskContext, status: &TaskStatusCell) -> Result<(), SaveError> {
        let Some(image) = self.image.image() else {
            return Err(SaveError::EmptyImage);
        };
        let observer = SavingObserver {
            notifier: ctx.notifier.as_ref(),
            status,
            path: &self.path,
        };
        ctx.services.codec.save(image, &self.path, &self.format, &observer)
    }
}

impl LoadSaveTask for SavingTask {
    fn task_type(&self) -> TaskType {
        TaskType::Saving
    }

    fn loading_description(&self) -> Option<&LoadingDescription> {
        None
    }

    fn execute(&mut self, ctx: &TaskContext, status: &TaskStatusCell) -> TaskOutcome {
        ctx.notifier.image_started_saving(&self.path);

        let success = match self.save(ctx, status) {
            Ok(()) => {
                info!(path = %self.path.display(), format = %self.format, "Image saved");
                // Cached decodes of the old file content are stale now.
                ctx.cache.invalidate(&self.path);
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot save image");
                false
            }
        };

        TaskOutcome::Saved {
            path: self.path.clone(),
            success,
        }
    }

    fn cancelled_outcome(&self) -> TaskOutcome {
        TaskOutcome::Saved {
            path: self.path.clone(),
            success: false,
        }
    }
}

struct SavingObserver<'a> {
    notifier: &'a dyn LoadSaveNotifier,
    status: &'a TaskStatusCell,
    path: &'a Path,
}

impl LoadObserver for SavingObserver<'_> {
    fn progress_info(&self, progress: f32) {
        if self.status.get() == TaskStatus::Running && self.notifier.query_send_notify_event() {
            self.notifier.saving_progress(self.path, progress);
        }
    }

    fn continue_query(&self) -> bool {
        !self.status.is_stopping()
    }
}
