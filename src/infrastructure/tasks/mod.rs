//! Units of work executed by loader threads.
//!
//! A task runs once on its thread and returns a [`TaskOutcome`]; the thread
//! turns that outcome into exactly one completion notification. Cancellation
//! is cooperative through [`TaskStatusCell`].

mod loading_task;
mod preview_task;
mod saving_task;
mod shared_loading_task;
mod thumbnail_task;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::domain::entities::{LoadedImage, LoadingDescription};
use crate::domain::ports::{
    ColorManagementPort, ImageCodecPort, LoadObserver, LoadSaveNotifier, MetadataPort,
};
use crate::infrastructure::cache::LoadingCache;

pub use loading_task::{LoadingTask, PlainProducer};
pub use preview_task::PreviewProducer;
pub use saving_task::SavingTask;
pub use shared_loading_task::{ImageProducer, SharedLoadingTask};
pub use thumbnail_task::ThumbnailProducer;
pub(crate) use thumbnail_task::thumbnail_descriptions;

/// Whether a result may share its pixel buffer with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// The consumer only reads the image; buffers are shared.
    #[default]
    ReadOnly,
    /// The consumer mutates the image and gets a private copy.
    ReadWrite,
}

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskStatus {
    Queued = 0,
    Running = 1,
    Stopping = 2,
    Completed = 3,
}

impl TaskStatus {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Completed,
        }
    }
}

/// Status shared between a task and the thread that may cancel it.
#[derive(Debug)]
pub struct TaskStatusCell(AtomicU8);

impl TaskStatusCell {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(TaskStatus::Queued as u8))
    }

    #[must_use]
    pub fn get(&self) -> TaskStatus {
        TaskStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `Queued` to `Running`. Fails if the task was stopped first.
    pub fn begin_running(&self) -> bool {
        self.0
            .compare_exchange(
                TaskStatus::Queued as u8,
                TaskStatus::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Asks the task to stop. Has no effect once it completed.
    pub fn request_stop(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
                (value != TaskStatus::Completed as u8).then_some(TaskStatus::Stopping as u8)
            });
    }

    pub fn complete(&self) {
        self.0.store(TaskStatus::Completed as u8, Ordering::Release);
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.get() == TaskStatus::Stopping
    }
}

impl Default for TaskStatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Broad category of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Loading,
    SharedLoading,
    Saving,
}

/// What a finished task reports.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Loaded {
        description: LoadingDescription,
        image: LoadedImage,
    },
    Saved {
        path: PathBuf,
        success: bool,
    },
}

impl TaskOutcome {
    /// Delivers the outcome as the final notification of its task.
    pub fn dispatch(&self, notifier: &dyn LoadSaveNotifier) {
        match self {
            Self::Loaded { description, image } => notifier.image_loaded(description, image),
            Self::Saved { path, success } => notifier.image_saved(path, *success),
        }
    }
}

/// Collaborators tasks decode and convert with.
#[derive(Clone)]
pub struct TaskServices {
    pub codec: Arc<dyn ImageCodecPort>,
    pub metadata: Arc<dyn MetadataPort>,
    pub color: Arc<dyn ColorManagementPort>,
}

/// Everything a task may touch while it runs.
pub struct TaskContext {
    pub cache: Arc<LoadingCache>,
    pub notifier: Arc<dyn LoadSaveNotifier>,
    pub services: TaskServices,
}

/// A unit of work run on a loader thread.
pub trait LoadSaveTask: Send {
    fn task_type(&self) -> TaskType;

    /// Description of a load task, `None` for saves.
    fn loading_description(&self) -> Option<&LoadingDescription>;

    /// Runs the task. The returned outcome is dispatched by the caller.
    fn execute(&mut self, ctx: &TaskContext, status: &TaskStatusCell) -> TaskOutcome;

    /// Outcome reported for a task that never got to run.
    fn cancelled_outcome(&self) -> TaskOutcome;
}

/// Observer for codecs, bound to one description.
pub(crate) struct TaskObserver<'a> {
    ctx: &'a TaskContext,
    status: &'a TaskStatusCell,
    description: &'a LoadingDescription,
}

impl<'a> TaskObserver<'a> {
    pub(crate) const fn new(
        ctx: &'a TaskContext,
        status: &'a TaskStatusCell,
        description: &'a LoadingDescription,
    ) -> Self {
        Self {
            ctx,
            status,
            description,
        }
    }
}

impl LoadObserver for TaskObserver<'_> {
    fn progress_info(&self, progress: f32) {
        if self.status.get() == TaskStatus::Running && self.ctx.notifier.query_send_notify_event() {
            self.ctx.notifier.loading_progress(self.description, progress);
        }
    }

    fn continue_query(&self) -> bool {
        !self.status.is_stopping()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let status = TaskStatusCell::new();
        assert_eq!(status.get(), TaskStatus::Queued);
        assert!(status.begin_running());
        assert!(!status.begin_running());
        status.request_stop();
        assert!(status.is_stopping());
        status.complete();
        status.request_stop();
        assert_eq!(status.get(), TaskStatus::Completed);
    }

    #[test]
    fn test_stopped_before_running_cannot_start() {
        let status = TaskStatusCell::new();
        status.request_stop();
        assert!(!status.begin_running());
    }
}
