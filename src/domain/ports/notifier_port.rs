//! Port through which tasks report back to the thread that runs them.

use std::path::Path;

use crate::domain::entities::{LoadedImage, LoadingDescription};

/// Receiver of task notifications.
///
/// Worker threads implement this to forward events to their consumer; a
/// listener registered on another thread's loading process carries its own
/// notifier so that progress reaches the right consumer.
pub trait LoadSaveNotifier: Send + Sync {
    fn image_started_loading(&self, description: &LoadingDescription);

    fn loading_progress(&self, description: &LoadingDescription, progress: f32);

    /// Final result of a load. Called exactly once per load task.
    fn image_loaded(&self, description: &LoadingDescription, image: &LoadedImage);

    fn more_complete_loading_available(
        &self,
        current: &LoadingDescription,
        more_complete: &LoadingDescription,
    );

    fn image_started_saving(&self, path: &Path);

    fn saving_progress(&self, path: &Path, progress: f32);

    /// Final result of a save. Called exactly once per save task.
    fn image_saved(&self, path: &Path, success: bool);

    /// Asks the throttling policy whether a progress event may be sent now.
    fn query_send_notify_event(&self) -> bool;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Notifier recording everything it receives.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub started: Mutex<Vec<LoadingDescription>>,
        pub progress: Mutex<Vec<f32>>,
        pub loaded: Mutex<Vec<(LoadingDescription, LoadedImage)>>,
        pub more_complete: Mutex<Vec<(LoadingDescription, LoadingDescription)>>,
        pub saved: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl RecordingNotifier {
        pub fn loaded_count(&self) -> usize {
            self.loaded.lock().unwrap().len()
        }
    }

    impl LoadSaveNotifier for RecordingNotifier {
        fn image_started_loading(&self, description: &LoadingDescription) {
            self.started.lock().unwrap().push(description.clone());
        }

        fn loading_progress(&self, _description: &LoadingDescription, progress: f32) {
            self.progress.lock().unwrap().push(progress);
        }

        fn image_loaded(&self, description: &LoadingDescription, image: &LoadedImage) {
            self.loaded
                .lock()
                .unwrap()
                .push((description.clone(), image.clone()));
        }

        fn more_complete_loading_available(
            &self,
            current: &LoadingDescription,
            more_complete: &LoadingDescription,
        ) {
            self.more_complete
                .lock()
                .unwrap()
                .push((current.clone(), more_complete.clone()));
        }

        fn image_started_saving(&self, _path: &Path) {}

        fn saving_progress(&self, _path: &Path, _progress: f32) {}

        fn image_saved(&self, path: &Path, success: bool) {
            self.saved.lock().unwrap().push((path.to_path_buf(), success));
        }

        fn query_send_notify_event(&self) -> bool {
            true
        }
    }
}
