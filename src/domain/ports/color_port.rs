//! Port definition for color management.

use crate::domain::entities::{ColorManagement, IccProfile, LoadedImage};

/// Port for the application's color-management settings and transforms.
pub trait ColorManagementPort: Send + Sync {
    /// Profile of the monitor thumbnails and previews are shown on.
    fn display_profile(&self) -> Option<IccProfile>;

    /// Whether thumbnails and previews should be converted for display.
    fn use_managed_previews(&self) -> bool;

    /// Converts `image` in place. `profile` overrides the display profile.
    fn transform(&self, image: &mut LoadedImage, mode: ColorManagement, profile: Option<&IccProfile>);
}
