//! Color management with fixed settings.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::entities::{ColorManagement, IccProfile, LoadedImage};
use crate::domain::ports::ColorManagementPort;

/// Display profile and managed-preview switch taken from configuration.
///
/// Converting marks the image as expressed in the target profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticColorManagement {
    pub display_profile: Option<IccProfile>,
    pub managed_previews: bool,
}

impl StaticColorManagement {
    #[must_use]
    pub const fn new(display_profile: Option<IccProfile>, managed_previews: bool) -> Self {
        Self {
            display_profile,
            managed_previews,
        }
    }

    fn target(&self, mode: ColorManagement, profile: Option<&IccProfile>) -> Option<IccProfile> {
        match mode {
            ColorManagement::NoConversion => None,
            ColorManagement::ConvertToSrgb => Some(IccProfile::srgb()),
            ColorManagement::ConvertForDisplay => Some(
                profile
                    .or(self.display_profile.as_ref())
                    .cloned()
                    .unwrap_or_else(IccProfile::srgb),
            ),
        }
    }
}

impl ColorManagementPort for StaticColorManagement {
    fn display_profile(&self) -> Option<IccProfile> {
        self.display_profile.clone()
    }

    fn use_managed_previews(&self) -> bool {
        self.managed_previews
    }

    fn transform(&self, image: &mut LoadedImage, mode: ColorManagement, profile: Option<&IccProfile>) {
        if image.is_null() {
            return;
        }
        let Some(target) = self.target(mode, profile) else {
            return;
        };
        let attributes = image.attributes_mut();
        if attributes.icc_profile.as_ref() == Some(&target) {
            return;
        }
        trace!(profile = target.description(), "Converting color profile");
        attributes.icc_profile = Some(target);
    }
}
