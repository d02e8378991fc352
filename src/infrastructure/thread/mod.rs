//! Worker threads and their notification plumbing.

mod load_save_thread;
mod notifier;
mod queue;
mod throttle;

pub use load_save_thread::{LoadSaveThread, LoadingMode, LoadingPolicy, ThreadOptions};
pub use notifier::{LoadedHook, ThreadNotifier};
pub use throttle::{DEFAULT_NOTIFICATION_WINDOW, NotificationPolicy, NotificationThrottler};
