//! Loading shared through the cache and the process registry.
//!
//! A request is served, in order, from the cache, from a load of the same key
//! already running on another thread, or by loading it here while other
//! threads may join.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{AccessMode, LoadSaveTask, TaskContext, TaskOutcome, TaskStatus, TaskStatusCell, TaskType};
use crate::domain::entities::{CacheKey, LoadedImage, LoadingDescription};
use crate::domain::ports::LoadObserver;
use crate::infrastructure::cache::{Listener, LoadingCache, ProcessId};

/// The part of a shared load that actually makes pixels.
pub trait ImageProducer: Send + Sync {
    /// Produces the result for `description`. Returns the empty image on
    /// failure or when `observer` asks to stop.
    fn produce(
        &self,
        description: &LoadingDescription,
        ctx: &TaskContext,
        observer: &dyn LoadObserver,
    ) -> LoadedImage;

    /// Turns an image stored under one of the description's superior lookup
    /// keys into the result for `description`.
    fn adapt_shared(
        &self,
        description: &LoadingDescription,
        image: LoadedImage,
        ctx: &TaskContext,
    ) -> LoadedImage {
        let _ = (description, ctx);
        image
    }
}

/// Deduplicating load task.
pub struct SharedLoadingTask<P> {
    description: LoadingDescription,
    access_mode: AccessMode,
    producer: P,
}

impl<P: ImageProducer> SharedLoadingTask<P> {
    /// Creates the task. Read-only requests whose result gets post-processed
    /// are upgraded to read-write.
    #[must_use]
    pub fn new(description: LoadingDescription, access_mode: AccessMode, producer: P) -> Self {
        let access_mode = if access_mode == AccessMode::ReadOnly && description.needs_post_processing()
        {
            AccessMode::ReadWrite
        } else {
            access_mode
        };
        Self {
            description,
            access_mode,
            producer,
        }
    }

    #[must_use]
    pub const fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    fn loaded(&self, image: LoadedImage) -> TaskOutcome {
        TaskOutcome::Loaded {
            description: self.description.clone(),
            image,
        }
    }

    /// Result found under `keys[index]`, made private if needed.
    fn from_lookup(&self, index: usize, image: LoadedImage, ctx: &TaskContext) -> LoadedImage {
        let mut image = if index == 0 {
            image
        } else {
            self.producer.adapt_shared(&self.description, image, ctx)
        };
        if self.access_mode == AccessMode::ReadWrite {
            image.detach();
        }
        image
    }

    /// Joins `process` and blocks until it completes or this task is stopped.
    ///
    /// Returns `None` when the owner was cancelled before handing out a result.
    fn listen(
        &self,
        ctx: &TaskContext,
        status: &TaskStatusCell,
        process: ProcessId,
    ) -> Option<LoadedImage> {
        let mut lock = ctx.cache.lock();
        let listener = lock.processes_mut().add_listener(
            process,
            Listener::new(
                self.description.clone(),
                self.access_mode,
                Arc::clone(&ctx.notifier),
            ),
        )?;
        trace!(description = %self.description, "Waiting for running load");

        while !status.is_stopping() && !lock.processes().is_completed(process) {
            lock.timed_wait();
        }

        let result = lock.processes_mut().remove_listener(process, listener);
        lock.wake_all();
        result
    }
}

impl<P: ImageProducer> LoadSaveTask for SharedLoadingTask<P> {
    fn task_type(&self) -> TaskType {
        TaskType::SharedLoading
    }

    fn loading_description(&self) -> Option<&LoadingDescription> {
        Some(&self.description)
    }

    fn execute(&mut self, ctx: &TaskContext, status: &TaskStatusCell) -> TaskOutcome {
        ctx.notifier.image_started_loading(&self.description);

        let keys = self.description.lookup_cache_keys();
        let thumbnail = self.description.is_thumbnail();

        let process = loop {
            let mut lock = ctx.cache.lock();

            let cached = keys
                .iter()
                .enumerate()
                .find_map(|(index, key)| lock.retrieve(thumbnail, key).map(|image| (index, image)));
            if let Some((index, image)) = cached {
                drop(lock);
                trace!(description = %self.description, "Served from cache");
                return self.loaded(self.from_lookup(index, image, ctx));
            }

            let running = keys.iter().enumerate().find_map(|(index, key)| {
                lock.processes()
                    .retrieve_loading_process(key)
                    .map(|process| (index, process))
            });

            let Some((index, running)) = running else {
                let process = lock.processes_mut().add_loading_process(&self.description);
                let notices = lock.processes().notify_new_loading_process(process);
                drop(lock);
                for (notifier, current) in notices {
                    notifier.more_complete_loading_available(&current, &self.description);
                }
                break process;
            };
            drop(lock);

            let result = self.listen(ctx, status, running);
            if status.is_stopping() {
                return self.cancelled_outcome();
            }
            match result {
                Some(image) if image.is_null() => return self.loaded(image),
                Some(image) => return self.loaded(self.from_lookup(index, image, ctx)),
                None => {
                    debug!(description = %self.description, "Joined load was cancelled, loading here");
                }
            }
        };

        let guard = ProcessGuard {
            cache: &ctx.cache,
            process,
            key: self.description.cache_key(),
            watched_path: self.description.file_path().to_path_buf(),
            thumbnail,
            finished: false,
        };
        let observer = SharedObserver {
            ctx,
            status,
            process,
            description: &self.description,
        };
        let image = self.producer.produce(&self.description, ctx, &observer);

        if status.is_stopping() {
            guard.finish(None);
            return self.cancelled_outcome();
        }
        guard.finish(Some(&image));

        let mut image = image;
        if self.access_mode == AccessMode::ReadWrite {
            image.detach();
        }
        self.loaded(image)
    }

    fn cancelled_outcome(&self) -> TaskOutcome {
        self.loaded(LoadedImage::null())
    }
}

/// Ownership of a registered loading process.
///
/// Finishing stores and dispatches the result, then holds the record until
/// every listener has left. Dropping an unfinished guard finishes it without a
/// result so that listeners never stay blocked.
struct ProcessGuard<'a> {
    cache: &'a LoadingCache,
    process: ProcessId,
    key: CacheKey,
    watched_path: PathBuf,
    thumbnail: bool,
    finished: bool,
}

impl ProcessGuard<'_> {
    fn finish(mut self, image: Option<&LoadedImage>) {
        self.complete(image);
    }

    fn complete(&mut self, image: Option<&LoadedImage>) {
        self.finished = true;
        let mut lock = self.cache.lock();
        lock.processes_mut().remove_loading_process(self.process);

        if let Some(image) = image {
            if !image.is_null() {
                lock.put(
                    self.thumbnail,
                    self.key.clone(),
                    image.clone(),
                    &self.watched_path,
                );
            }
            lock.processes_mut().dispatch_result(self.process, image);
        }

        lock.processes_mut().set_completed(self.process);
        lock.wake_all();

        while lock.processes().has_listeners(self.process) {
            lock.timed_wait();
        }
        lock.processes_mut().release_process(self.process);
    }
}

impl Drop for ProcessGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.complete(None);
        }
    }
}

/// Observer of the owning task: cancellation follows the task, progress goes
/// to the task's own consumer and to every listener's consumer.
struct SharedObserver<'a> {
    ctx: &'a TaskContext,
    status: &'a TaskStatusCell,
    process: ProcessId,
    description: &'a LoadingDescription,
}

impl LoadObserver for SharedObserver<'_> {
    fn progress_info(&self, progress: f32) {
        if self.status.get() != TaskStatus::Running {
            return;
        }
        if self.ctx.notifier.query_send_notify_event() {
            self.ctx.notifier.loading_progress(self.description, progress);
        }

        let listeners = self
            .ctx
            .cache
            .lock()
            .processes()
            .listener_notifiers(self.process);
        for (notifier, description) in listeners {
            if notifier.query_send_notify_event() {
                notifier.loading_progress(&description, progress);
            }
        }
    }

    fn continue_query(&self) -> bool {
        !self.status.is_stopping()
    }
}
