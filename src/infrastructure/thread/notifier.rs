//! Forwarding of task notifications to a thread's consumer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::trace;

use super::throttle::{NotificationPolicy, NotificationThrottler};
use crate::domain::entities::{LoadEvent, LoadedImage, LoadingDescription};
use crate::domain::ports::LoadSaveNotifier;

/// Called with every final load result before its event is sent.
pub type LoadedHook = Arc<dyn Fn(&LoadingDescription, &LoadedImage) + Send + Sync>;

/// Notifier of a [`LoadSaveThread`](super::LoadSaveThread).
///
/// Turns notifications into [`LoadEvent`]s on the consumer's channel and
/// throttles progress events.
pub struct ThreadNotifier {
    events: mpsc::UnboundedSender<LoadEvent>,
    throttler: Mutex<NotificationThrottler>,
    loaded_hook: RwLock<Option<LoadedHook>>,
}

impl ThreadNotifier {
    #[must_use]
    pub fn new(
        events: mpsc::UnboundedSender<LoadEvent>,
        policy: NotificationPolicy,
        window: Duration,
    ) -> Self {
        Self {
            events,
            throttler: Mutex::new(NotificationThrottler::new(policy, window)),
            loaded_hook: RwLock::new(None),
        }
    }

    pub fn set_loaded_hook(&self, hook: Option<LoadedHook>) {
        *self.loaded_hook.write() = hook;
    }

    pub fn set_notification_policy(&self, policy: NotificationPolicy) {
        self.throttler.lock().set_policy(policy);
    }

    #[must_use]
    pub fn notification_policy(&self) -> NotificationPolicy {
        self.throttler.lock().policy()
    }

    /// The consumer has handled the last progress event.
    pub fn notification_received(&self) {
        self.throttler.lock().notification_received();
    }

    fn send(&self, event: LoadEvent) {
        if self.events.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }
}

impl LoadSaveNotifier for ThreadNotifier {
    fn image_started_loading(&self, description: &LoadingDescription) {
        self.send(LoadEvent::StartedLoading {
            description: description.clone(),
        });
    }

    fn loading_progress(&self, description: &LoadingDescription, progress: f32) {
        self.send(LoadEvent::Progress {
            description: description.clone(),
            progress,
        });
    }

    fn image_loaded(&self, description: &LoadingDescription, image: &LoadedImage) {
        if let Some(hook) = self.loaded_hook.read().as_ref() {
            hook(description, image);
        }
        self.throttler.lock().completed();
        self.send(LoadEvent::Loaded {
            description: description.clone(),
            image: image.clone(),
        });
    }

    fn more_complete_loading_available(
        &self,
        current: &LoadingDescription,
        more_complete: &LoadingDescription,
    ) {
        self.send(LoadEvent::MoreCompleteLoadingAvailable {
            current: current.clone(),
            more_complete: more_complete.clone(),
        });
    }

    fn image_started_saving(&self, path: &Path) {
        self.send(LoadEvent::StartedSaving {
            path: path.to_path_buf(),
        });
    }

    fn saving_progress(&self, path: &Path, progress: f32) {
        self.send(LoadEvent::SavingProgress {
            path: path.to_path_buf(),
            progress,
        });
    }

    fn image_saved(&self, path: &Path, success: bool) {
        self.throttler.lock().completed();
        self.send(LoadEvent::Saved {
            path: path.to_path_buf(),
            success,
        });
    }

    fn query_send_notify_event(&self) -> bool {
        self.throttler.lock().query_send()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_hook_runs_before_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = ThreadNotifier::new(tx, NotificationPolicy::Direct, Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        notifier.set_loaded_hook(Some(Arc::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        let description = LoadingDescription::thumbnail("/p/a.jpg", 64);
        notifier.image_loaded(&description, &LoadedImage::new(DynamicImage::new_rgb8(2, 2)));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(rx.try_recv(), Ok(LoadEvent::Loaded { .. })));
    }

    #[test]
    fn test_direct_policy_waits_for_acknowledgement() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let notifier = ThreadNotifier::new(tx, NotificationPolicy::Direct, Duration::ZERO);
        assert!(notifier.query_send_notify_event());
        assert!(!notifier.query_send_notify_event());
        notifier.notification_received();
        assert!(notifier.query_send_notify_event());
    }

    #[test]
    fn test_final_events_acknowledge_progress() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let notifier = ThreadNotifier::new(tx, NotificationPolicy::Direct, Duration::ZERO);
        let description = LoadingDescription::thumbnail("/p/a.jpg", 64);

        assert!(notifier.query_send_notify_event());
        notifier.image_loaded(&description, &LoadedImage::null());
        assert!(notifier.query_send_notify_event());

        notifier.image_saved(Path::new("/out/a.png"), true);
        assert!(notifier.query_send_notify_event());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let notifier = ThreadNotifier::new(tx, NotificationPolicy::default(), Duration::ZERO);
        notifier.image_saved(Path::new("/out/a.png"), true);
    }
}
