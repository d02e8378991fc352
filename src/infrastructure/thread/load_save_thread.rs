//! Worker thread executing load and save tasks one after another.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use super::notifier::{LoadedHook, ThreadNotifier};
use super::queue::{QueuedTask, TaskQueue};
use super::throttle::{DEFAULT_NOTIFICATION_WINDOW, NotificationPolicy};
use crate::domain::entities::{DescriptionKind, LoadEvent, LoadedImage, LoadingDescription};
use crate::infrastructure::cache::LoadingCache;
use crate::infrastructure::tasks::{
    AccessMode, LoadSaveTask, LoadingTask, PlainProducer, PreviewProducer, SavingTask,
    SharedLoadingTask, TaskContext, TaskServices, TaskStatusCell, ThumbnailProducer,
};

/// Where a new load request goes in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingPolicy {
    /// Behind everything already waiting.
    #[default]
    Append,
    /// In front of everything already waiting.
    Prepend,
    /// Stops the current load and drops waiting loads, preloads excepted.
    FirstRemovePrevious,
    /// Background queue, run only when nothing else waits.
    Preload,
}

/// Whether plain loads go through the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingMode {
    /// Plain loads are decoded privately, neither cached nor deduplicated.
    Normal,
    #[default]
    Shared,
}

/// Settings of a [`LoadSaveThread`].
#[derive(Debug, Clone)]
pub struct ThreadOptions {
    pub name: String,
    pub access_mode: AccessMode,
    pub loading_mode: LoadingMode,
    pub notification_policy: NotificationPolicy,
    pub notification_window: Duration,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            name: "lightbox-loader".to_string(),
            access_mode: AccessMode::ReadOnly,
            loading_mode: LoadingMode::Shared,
            notification_policy: NotificationPolicy::TimeLimited,
            notification_window: DEFAULT_NOTIFICATION_WINDOW,
        }
    }
}

struct CurrentTask {
    description: Option<LoadingDescription>,
    status: Arc<TaskStatusCell>,
    preload: bool,
}

impl CurrentTask {
    fn loads(&self, description: &LoadingDescription) -> bool {
        self.description.as_ref() == Some(description) && !self.status.is_stopping()
    }
}

#[derive(Default)]
struct ThreadState {
    queue: TaskQueue,
    current: Option<CurrentTask>,
    running: bool,
    shutting_down: bool,
    handle: Option<JoinHandle<()>>,
}

struct ThreadShared {
    state: Mutex<ThreadState>,
    idle: Condvar,
    ctx: TaskContext,
    notifier: Arc<ThreadNotifier>,
    options: ThreadOptions,
}

/// A dedicated OS thread running submitted tasks in queue order.
///
/// The thread is spawned on the first submission and exits when its queue
/// runs empty. Every submitted task reports exactly one final event on the
/// channel passed to [`LoadSaveThread::new`].
pub struct LoadSaveThread {
    shared: Arc<ThreadShared>,
}

impl std::fmt::Debug for LoadSaveThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSaveThread")
            .field("name", &self.shared.options.name)
            .finish_non_exhaustive()
    }
}

impl LoadSaveThread {
    #[must_use]
    pub fn new(
        cache: Arc<LoadingCache>,
        services: TaskServices,
        events: mpsc::UnboundedSender<LoadEvent>,
        options: ThreadOptions,
    ) -> Self {
        let notifier = Arc::new(ThreadNotifier::new(
            events,
            options.notification_policy,
            options.notification_window,
        ));
        let ctx = TaskContext {
            cache,
            notifier: notifier.clone(),
            services,
        };
        Self {
            shared: Arc::new(ThreadShared {
                state: Mutex::new(ThreadState::default()),
                idle: Condvar::new(),
                ctx,
                notifier,
                options,
            }),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<LoadingCache> {
        &self.shared.ctx.cache
    }

    #[must_use]
    pub fn notifier(&self) -> &ThreadNotifier {
        &self.shared.notifier
    }

    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        self.shared.options.access_mode
    }

    /// Installs a callback run with every final load result.
    pub fn set_loaded_hook(&self, hook: Option<LoadedHook>) {
        self.shared.notifier.set_loaded_hook(hook);
    }

    pub fn set_notification_policy(&self, policy: NotificationPolicy) {
        self.shared.notifier.set_notification_policy(policy);
    }

    /// The consumer has handled the last progress event.
    pub fn notification_received(&self) {
        self.shared.notifier.notification_received();
    }

    /// Enqueues a load at the back of the queue.
    pub fn load(&self, description: LoadingDescription) {
        self.load_with_policy(description, LoadingPolicy::Append);
    }

    pub fn load_with_policy(&self, description: LoadingDescription, policy: LoadingPolicy) {
        let mut cancelled = Vec::new();
        let mut rejected = None;
        {
            let mut state = self.shared.state.lock();
            if state.shutting_down {
                rejected = Some(self.new_entry(description));
            } else {
                let current_loads = state
                    .current
                    .as_ref()
                    .is_some_and(|current| current.loads(&description));
                match policy {
                    LoadingPolicy::Append => {
                        if !current_loads && !state.queue.contains_todo(&description) {
                            let entry = self.reuse_or_create(&mut state.queue, description);
                            state.queue.push_back(entry);
                        }
                    }
                    LoadingPolicy::Prepend => {
                        if !current_loads {
                            let entry = match state.queue.take_todo(&description) {
                                Some(entry) => entry,
                                None => self.reuse_or_create(&mut state.queue, description),
                            };
                            state.queue.push_front(entry);
                        }
                    }
                    LoadingPolicy::FirstRemovePrevious => {
                        if let Some(current) = &state.current {
                            if !current.preload
                                && current.description.is_some()
                                && !current.loads(&description)
                            {
                                current.status.request_stop();
                            }
                        }
                        cancelled = state.queue.remove_todo_loads(|d| d != &description);
                        if !current_loads && !state.queue.contains_todo(&description) {
                            let entry = self.reuse_or_create(&mut state.queue, description);
                            state.queue.push_back(entry);
                        }
                    }
                    LoadingPolicy::Preload => {
                        if !current_loads
                            && !state.queue.contains_todo(&description)
                            && !state.queue.contains_background(&description)
                        {
                            let entry = self.new_entry(description);
                            state.queue.push_background(entry);
                        }
                    }
                }
                self.ensure_running(&mut state);
            }
        }
        if !cancelled.is_empty() {
            self.shared.ctx.cache.wake_all();
        }
        deliver_cancelled(&self.shared, cancelled);
        deliver_cancelled(&self.shared, rejected);
    }

    /// Enqueues a group of loads in front of the queue, keeping their order.
    pub fn load_thumbnail_group(&self, descriptions: Vec<LoadingDescription>) {
        let mut rejected = Vec::new();
        {
            let mut state = self.shared.state.lock();
            if state.shutting_down {
                rejected = descriptions
                    .into_iter()
                    .map(|d| self.new_entry(d))
                    .collect();
            } else {
                let mut group: Vec<QueuedTask> = Vec::with_capacity(descriptions.len());
                for description in descriptions {
                    let duplicate = state
                        .current
                        .as_ref()
                        .is_some_and(|current| current.loads(&description))
                        || group.iter().any(|e| e.description() == Some(&description));
                    if duplicate {
                        continue;
                    }
                    let entry = match state.queue.take_todo(&description) {
                        Some(entry) => entry,
                        None => self.reuse_or_create(&mut state.queue, description),
                    };
                    group.push(entry);
                }
                state.queue.push_front_group(group);
                self.ensure_running(&mut state);
            }
        }
        deliver_cancelled(&self.shared, rejected);
    }

    /// Enqueues a group of loads on the background queue.
    pub fn preload_thumbnail_group(&self, descriptions: Vec<LoadingDescription>) {
        for description in descriptions {
            self.load_with_policy(description, LoadingPolicy::Preload);
        }
    }

    /// Enqueues a save. Saves are never deduplicated.
    pub fn save(&self, image: LoadedImage, path: impl Into<PathBuf>, format: impl Into<String>) {
        let entry = QueuedTask::new(Box::new(SavingTask::new(image, path, format)));
        let rejected = {
            let mut state = self.shared.state.lock();
            if state.shutting_down {
                Some(entry)
            } else {
                state.queue.push_back(entry);
                self.ensure_running(&mut state);
                None
            }
        };
        deliver_cancelled(&self.shared, rejected);
    }

    /// Stops the current load of `path` and drops waiting loads of it.
    pub fn stop_loading(&self, path: &Path) {
        self.stop_matching(|d| d.file_path() == path);
    }

    /// Stops the current task and drops everything waiting.
    pub fn stop_all_tasks(&self) {
        let drained = {
            let mut state = self.shared.state.lock();
            if let Some(current) = &state.current {
                current.status.request_stop();
            }
            state.queue.drain_all()
        };
        self.shared.ctx.cache.wake_all();
        deliver_cancelled(&self.shared, drained);
    }

    fn stop_matching(&self, matches: impl Fn(&LoadingDescription) -> bool) {
        let removed = {
            let mut state = self.shared.state.lock();
            if let Some(current) = &state.current {
                if current.description.as_ref().is_some_and(&matches) {
                    current.status.request_stop();
                }
            }
            state.queue.remove_loads(&matches)
        };
        self.shared.ctx.cache.wake_all();
        deliver_cancelled(&self.shared, removed);
    }

    /// Blocks until the queue ran empty and the thread went idle.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock();
        while state.running {
            self.shared.idle.wait(&mut state);
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Cancels the current task, completes waiting tasks without running them
    /// and joins the thread. Later submissions complete immediately, empty.
    pub fn shut_down(&self) {
        let (drained, handle) = {
            let mut state = self.shared.state.lock();
            state.shutting_down = true;
            if let Some(current) = &state.current {
                current.status.request_stop();
            }
            (state.queue.drain_all(), state.handle.take())
        };
        self.shared.ctx.cache.wake_all();
        deliver_cancelled(&self.shared, drained);

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!(name = %self.shared.options.name, "Loader thread panicked");
            }
        }
    }

    fn new_entry(&self, description: LoadingDescription) -> QueuedTask {
        QueuedTask::new(self.create_task(description))
    }

    /// A queued preload of the same description is promoted instead of
    /// creating a second task.
    fn reuse_or_create(&self, queue: &mut TaskQueue, description: LoadingDescription) -> QueuedTask {
        match queue.take_background(&description) {
            Some(entry) => entry,
            None => self.new_entry(description),
        }
    }

    fn create_task(&self, description: LoadingDescription) -> Box<dyn LoadSaveTask> {
        let access_mode = self.shared.options.access_mode;
        match description.kind() {
            DescriptionKind::Thumbnail | DescriptionKind::DetailThumbnail(_) => Box::new(
                SharedLoadingTask::new(description, access_mode, ThumbnailProducer),
            ),
            DescriptionKind::Preview => Box::new(SharedLoadingTask::new(
                description,
                access_mode,
                PreviewProducer,
            )),
            DescriptionKind::Plain => match self.shared.options.loading_mode {
                LoadingMode::Shared => Box::new(SharedLoadingTask::new(
                    description,
                    access_mode,
                    PlainProducer,
                )),
                LoadingMode::Normal => Box::new(LoadingTask::new(description)),
            },
        }
    }

    fn ensure_running(&self, state: &mut ThreadState) {
        if state.running || state.queue.is_empty() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name(self.shared.options.name.clone())
            .spawn(move || run(&shared))
        {
            Ok(handle) => {
                state.running = true;
                state.handle = Some(handle);
                trace!(name = %self.shared.options.name, "Loader thread started");
            }
            Err(e) => {
                error!(name = %self.shared.options.name, error = %e, "Cannot spawn loader thread");
            }
        }
    }
}

impl Drop for LoadSaveThread {
    fn drop(&mut self) {
        self.shut_down();
    }
}

fn run(shared: &ThreadShared) {
    loop {
        let (mut task, status) = {
            let mut state = shared.state.lock();
            let Some((entry, preload)) = state.queue.pop_next() else {
                state.current = None;
                state.running = false;
                shared.idle.notify_all();
                trace!(name = %shared.options.name, "Loader thread idle");
                return;
            };
            state.current = Some(CurrentTask {
                description: entry.description().cloned(),
                status: entry.status.clone(),
                preload,
            });
            (entry.task, entry.status)
        };

        let outcome = if status.begin_running() {
            match panic::catch_unwind(AssertUnwindSafe(|| task.execute(&shared.ctx, &status))) {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(name = %shared.options.name, "Task panicked");
                    task.cancelled_outcome()
                }
            }
        } else {
            debug!(name = %shared.options.name, "Skipping task stopped before it ran");
            task.cancelled_outcome()
        };
        status.complete();
        shared.state.lock().current = None;
        outcome.dispatch(shared.notifier.as_ref());
    }
}

/// Completes tasks that will never run with their empty outcome.
fn deliver_cancelled(shared: &ThreadShared, entries: impl IntoIterator<Item = QueuedTask>) {
    for entry in entries {
        entry.status.request_stop();
        entry.status.complete();
        entry.task.cancelled_outcome().dispatch(shared.notifier.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::{CountingCodec, FixedMetadata};
    use crate::infrastructure::tasks::test_support::services;
    use image::DynamicImage;
    use std::sync::atomic::Ordering;

    fn spawn(
        cache: &Arc<LoadingCache>,
        codec: &Arc<CountingCodec>,
        options: ThreadOptions,
    ) -> (LoadSaveThread, mpsc::UnboundedReceiver<LoadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = LoadSaveThread::new(
            cache.clone(),
            services(codec.clone(), FixedMetadata::default()),
            tx,
            options,
        );
        (thread, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<LoadEvent>) -> Vec<LoadEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn loaded(events: &[LoadEvent]) -> Vec<(String, bool)> {
        events
            .iter()
            .filter_map(|event| match event {
                LoadEvent::Loaded { description, image } => Some((
                    description.file_path().display().to_string(),
                    image.is_null(),
                )),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_load_delivers_result() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(40, 30));
        let (thread, mut rx) = spawn(&cache, &codec, ThreadOptions::default());

        thread.load(LoadingDescription::plain("/p/a.png"));
        thread.wait();

        assert_eq!(loaded(&drain(&mut rx)), [("/p/a.png".to_string(), false)]);
        assert!(!thread.is_running());
    }

    #[test]
    fn test_identical_requests_are_queued_once() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(40, 30).with_delay(Duration::from_millis(100)));
        let (thread, mut rx) = spawn(&cache, &codec, ThreadOptions::default());

        for _ in 0..3 {
            thread.load(LoadingDescription::plain("/p/a.png"));
        }
        thread.wait();

        assert_eq!(loaded(&drain(&mut rx)).len(), 1);
        assert_eq!(codec.total_decodes(), 1);
    }

    #[test]
    fn test_first_remove_previous_cancels_earlier_loads() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(40, 30).with_delay(Duration::from_millis(200)));
        let (thread, mut rx) = spawn(&cache, &codec, ThreadOptions::default());

        thread.load(LoadingDescription::plain("/p/a.png"));
        thread.load(LoadingDescription::plain("/p/b.png"));
        thread.load(LoadingDescription::plain("/p/c.png"));
        thread.load_with_policy(
            LoadingDescription::plain("/p/d.png"),
            LoadingPolicy::FirstRemovePrevious,
        );
        thread.wait();

        let results = loaded(&drain(&mut rx));
        assert_eq!(results.len(), 4);
        for (path, null) in &results {
            assert_eq!(*null, path != "/p/d.png", "{path}");
        }
        assert!(codec.total_decodes() <= 2);
    }

    #[test]
    fn test_interactive_loads_run_before_preloads() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(40, 30).with_delay(Duration::from_millis(50)));
        let (thread, mut rx) = spawn(&cache, &codec, ThreadOptions::default());

        thread.load(LoadingDescription::plain("/p/x.png"));
        thread.load_with_policy(LoadingDescription::plain("/p/pre.png"), LoadingPolicy::Preload);
        thread.load(LoadingDescription::plain("/p/a.png"));
        thread.wait();

        let order: Vec<String> = loaded(&drain(&mut rx)).into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, ["/p/x.png", "/p/a.png", "/p/pre.png"]);
    }

    #[test]
    fn test_shut_down_completes_every_task_once() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(40, 30).with_delay(Duration::from_millis(200)));
        let (thread, mut rx) = spawn(&cache, &codec, ThreadOptions::default());

        for i in 0..5 {
            thread.load(LoadingDescription::plain(format!("/p/{i}.png")));
        }
        thread.shut_down();
        thread.load(LoadingDescription::plain("/p/late.png"));

        let results = loaded(&drain(&mut rx));
        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|(_, null)| *null));
        assert!(codec.total_decodes() <= 1);
    }

    #[test]
    fn test_stop_loading_only_affects_that_file() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(40, 30).with_delay(Duration::from_millis(100)));
        let (thread, mut rx) = spawn(&cache, &codec, ThreadOptions::default());

        thread.load(LoadingDescription::plain("/p/a.png"));
        thread.load(LoadingDescription::plain("/p/b.png"));
        thread.load(LoadingDescription::thumbnail("/p/b.png", 64));
        thread.stop_loading(Path::new("/p/b.png"));
        thread.wait();

        let results = loaded(&drain(&mut rx));
        assert_eq!(results.len(), 3);
        assert!(results.contains(&("/p/a.png".to_string(), false)));
        assert_eq!(results.iter().filter(|(_, null)| *null).count(), 2);
    }

    #[test]
    fn test_two_threads_share_one_decode() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(400, 300).with_delay(Duration::from_millis(200)));
        let (first, mut first_rx) = spawn(&cache, &codec, ThreadOptions::default());
        let (second, mut second_rx) = spawn(&cache, &codec, ThreadOptions::default());

        let description = LoadingDescription::thumbnail("/p/a.png", 128);
        first.load(description.clone());
        second.load(description);
        first.wait();
        second.wait();

        assert_eq!(codec.total_decodes(), 1);
        assert_eq!(loaded(&drain(&mut first_rx)).len(), 1);
        assert_eq!(loaded(&drain(&mut second_rx)).len(), 1);
        assert_eq!(cache.lock().processes().record_count(), 0);
    }

    #[test]
    fn test_progress_is_throttled() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(40, 30).with_delay(Duration::from_millis(50)));
        let (thread, mut rx) = spawn(&cache, &codec, ThreadOptions::default());

        thread.load(LoadingDescription::plain("/p/a.png"));
        thread.wait();

        let events = drain(&mut rx);
        let progress = events
            .iter()
            .filter(|e| matches!(e, LoadEvent::Progress { .. }))
            .count();
        assert!((1..=2).contains(&progress), "{progress} progress events");
        assert_eq!(loaded(&events).len(), 1);
    }

    #[test]
    fn test_normal_mode_bypasses_cache() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(40, 30));
        let options = ThreadOptions {
            loading_mode: LoadingMode::Normal,
            ..ThreadOptions::default()
        };
        let (thread, _rx) = spawn(&cache, &codec, options);

        thread.load(LoadingDescription::plain("/p/a.png"));
        thread.wait();
        thread.load(LoadingDescription::plain("/p/a.png"));
        thread.wait();

        assert_eq!(codec.decodes.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().images, 0);
    }

    #[test]
    fn test_save_reports_completion() {
        let cache = Arc::new(LoadingCache::default());
        let codec = Arc::new(CountingCodec::new(4, 4));
        let (thread, mut rx) = spawn(&cache, &codec, ThreadOptions::default());

        thread.save(LoadedImage::new(DynamicImage::new_rgb8(4, 4)), "/out/a.png", "png");
        thread.wait();

        let saved: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(LoadEvent::is_final)
            .collect();
        assert!(matches!(saved.as_slice(), [LoadEvent::Saved { success: true, .. }]));
    }
}
