//! Blocking collection of thumbnails for non-interactive callers.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::thumbnail_service::ThumbnailLoadThread;
use crate::domain::entities::{LoadedImage, LoadingDescription};

struct CatcherTask {
    description: LoadingDescription,
    image: Option<LoadedImage>,
}

#[derive(Default)]
struct CatcherState {
    active: bool,
    tasks: Vec<CatcherTask>,
    /// Results that arrived before their request was enqueued.
    early: Vec<(LoadingDescription, LoadedImage)>,
}

#[derive(Default)]
struct CatcherShared {
    state: Mutex<CatcherState>,
    done: Condvar,
}

impl CatcherShared {
    fn received(&self, description: &LoadingDescription, image: &LoadedImage) {
        let mut state = self.state.lock();
        if !state.active {
            return;
        }
        let mut matched = false;
        for task in state
            .tasks
            .iter_mut()
            .filter(|task| task.image.is_none() && task.description == *description)
        {
            task.image = Some(image.clone());
            matched = true;
        }
        if !matched {
            state.early.push((description.clone(), image.clone()));
        }
        self.done.notify_all();
    }
}

/// Waits for the thumbnails requested through a [`ThumbnailLoadThread`].
///
/// Activate the catcher, submit requests on the thread, call
/// [`enqueue`](Self::enqueue) to adopt them, then block in
/// [`wait_for_thumbnails`](Self::wait_for_thumbnails).
pub struct ThumbnailImageCatcher {
    thread: Arc<ThumbnailLoadThread>,
    shared: Arc<CatcherShared>,
    subscription: u64,
}

impl ThumbnailImageCatcher {
    #[must_use]
    pub fn new(thread: Arc<ThumbnailLoadThread>) -> Self {
        let shared = Arc::new(CatcherShared::default());
        let hook_shared = shared.clone();
        let subscription = thread.subscribe(Arc::new(move |description, image| {
            hook_shared.received(description, image);
        }));
        Self {
            thread,
            shared,
            subscription,
        }
    }

    #[must_use]
    pub fn thread(&self) -> &Arc<ThumbnailLoadThread> {
        &self.thread
    }

    /// An inactive catcher ignores results and never blocks.
    pub fn set_active(&self, active: bool) {
        let mut state = self.shared.state.lock();
        state.active = active;
        if !active {
            state.early.clear();
        }
        self.shared.done.notify_all();
    }

    /// Adopts the requests last submitted on the thread. Returns the number
    /// of results being waited for.
    pub fn enqueue(&self) -> usize {
        let descriptions = self.thread.last_descriptions();
        let mut state = self.shared.state.lock();
        for description in descriptions {
            let image = state
                .early
                .iter()
                .position(|(early, _)| *early == description)
                .map(|index| state.early.swap_remove(index).1);
            state.tasks.push(CatcherTask { description, image });
        }
        state.tasks.len()
    }

    /// Blocks until every enqueued request has a result, then returns them in
    /// the order they were enqueued. Unfinished requests come back empty if
    /// the catcher is deactivated or cancelled meanwhile.
    pub fn wait_for_thumbnails(&self) -> Vec<LoadedImage> {
        let mut state = self.shared.state.lock();
        while state.active && state.tasks.iter().any(|task| task.image.is_none()) {
            self.shared.done.wait(&mut state);
        }
        let tasks = std::mem::take(&mut state.tasks);
        state.early.clear();
        trace!(count = tasks.len(), "Caught thumbnails");
        tasks
            .into_iter()
            .map(|task| task.image.unwrap_or_default())
            .collect()
    }

    /// Forgets every enqueued request.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.tasks.clear();
        state.early.clear();
        self.shared.done.notify_all();
    }
}

impl Drop for ThumbnailImageCatcher {
    fn drop(&mut self) {
        self.thread.unsubscribe(self.subscription);
        self.set_active(false);
    }
}
