//! Plain full-resolution loading.

use tracing::{debug, warn};

use super::shared_loading_task::ImageProducer;
use super::{LoadSaveTask, TaskContext, TaskObserver, TaskOutcome, TaskStatusCell, TaskType};
use crate::domain::entities::{FileFormat, ImageAttributes, LoadedImage, LoadingDescription};
use crate::domain::ports::LoadObserver;

/// Decodes `description`'s file at full resolution and applies its color
/// conversion. Failures yield the empty image.
pub(crate) fn decode_full(
    description: &LoadingDescription,
    ctx: &TaskContext,
    observer: &dyn LoadObserver,
) -> LoadedImage {
    let path = description.file_path();
    let format = FileFormat::from_path(path);
    let decoded = if format.is_raw() {
        ctx.services.codec.decode_raw_full(path, observer)
    } else {
        ctx.services.codec.decode(path, observer)
    };

    let image = match decoded {
        Ok(image) => image,
        Err(e) if e.is_cancelled() => {
            debug!(path = %path.display(), "Loading cancelled");
            return LoadedImage::null();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot load image");
            return LoadedImage::null();
        }
    };

    let attributes = ImageAttributes {
        original_size: Some((image.width(), image.height())),
        detected_format: Some(format),
        ..ImageAttributes::default()
    };
    let mut loaded = LoadedImage::new(image).with_attributes(attributes);
    apply_color_management(description, ctx, &mut loaded);
    loaded
}

/// Runs the description's color conversion, if any.
pub(crate) fn apply_color_management(
    description: &LoadingDescription,
    ctx: &TaskContext,
    image: &mut LoadedImage,
) {
    if description.needs_post_processing() && !image.is_null() {
        ctx.services.color.transform(
            image,
            description.color_management(),
            description.profile(),
        );
    }
}

/// Producer for full decodes shared through the cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainProducer;

impl ImageProducer for PlainProducer {
    fn produce(
        &self,
        description: &LoadingDescription,
        ctx: &TaskContext,
        observer: &dyn LoadObserver,
    ) -> LoadedImage {
        decode_full(description, ctx, observer)
    }
}

/// Loads an image without consulting or filling the cache.
pub struct LoadingTask {
    description: LoadingDescription,
}

impl LoadingTask {
    #[must_use]
    pub const fn new(description: LoadingDescription) -> Self {
        Self { description }
    }
}

impl LoadSaveTask for LoadingTask {
    fn task_type(&self) -> TaskType {
        TaskType::Loading
    }

    fn loading_description(&self) -> Option<&LoadingDescription> {
        Some(&self.description)
    }

    fn execute(&mut self, ctx: &TaskContext, status: &TaskStatusCell) -> TaskOutcome {
        ctx.notifier.image_started_loading(&self.description);
        let observer = TaskObserver::new(ctx, status, &self.description);
        let image = decode_full(&self.description, ctx, &observer);
        let image = if status.is_stopping() {
            LoadedImage::null()
        } else {
            image
        };
        TaskOutcome::Loaded {
            description: self.description.clone(),
            image,
        }
    }

    fn cancelled_outcome(&self) -> TaskOutcome {
        TaskOutcome::Loaded {
            description: self.description.clone(),
            image: LoadedImage::null(),
        }
    }
}
