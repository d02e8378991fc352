//! Load request descriptors and the cache keys derived from them.

use std::fmt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::IccProfile;

/// Identity of a request, shared by the image cache and the process registry.
///
/// Two descriptions that would produce identical output map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from its string form.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short, filesystem-safe digest of the key.
    #[must_use]
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source rectangle for detail thumbnails, in oriented image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamps the rectangle to an image of the given size.
    /// Returns `None` when nothing of the rectangle lies inside the image.
    #[must_use]
    pub fn clamped_to(&self, width: u32, height: u32) -> Option<Self> {
        if self.x >= width || self.y >= height || self.is_null() {
            return None;
        }
        Some(Self {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        })
    }
}

/// Color conversion applied after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorManagement {
    #[default]
    NoConversion,
    ConvertForDisplay,
    ConvertToSrgb,
}

impl ColorManagement {
    const fn key_suffix(self) -> Option<&'static str> {
        match self {
            Self::NoConversion => None,
            Self::ConvertForDisplay => Some("display"),
            Self::ConvertToSrgb => Some("srgb"),
        }
    }
}

/// Quality tier for previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewQuality {
    /// Small and quick: embedded previews and scaled decoding are fine.
    #[default]
    FastPreview,
    /// Quick, but reasonably close to the requested size.
    FastButLargePreview,
    /// Full quality decoding.
    HighQualityPreview,
}

impl fmt::Display for PreviewQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FastPreview => write!(f, "fast"),
            Self::FastButLargePreview => write!(f, "fast-large"),
            Self::HighQualityPreview => write!(f, "high"),
        }
    }
}

/// How RAW files are decoded for high quality previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawLoading {
    /// Use an embedded preview only when it is close to half the original resolution.
    #[default]
    Automatic,
    FromEmbeddedPreview,
    FromRawHalfSize,
    FromRawFullSize,
}

impl fmt::Display for RawLoading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "auto"),
            Self::FromEmbeddedPreview => write!(f, "embedded"),
            Self::FromRawHalfSize => write!(f, "half"),
            Self::FromRawFullSize => write!(f, "full"),
        }
    }
}

/// Preview decoding settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewSettings {
    #[serde(default)]
    pub quality: PreviewQuality,
    #[serde(default)]
    pub raw_loading: RawLoading,
    /// Convert 16-bit results to 8-bit before handing them out.
    #[serde(default)]
    pub convert_to_eight_bit: bool,
    /// Apply the orientation stored in the file metadata.
    #[serde(default = "default_true")]
    pub exif_rotate: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            quality: PreviewQuality::FastPreview,
            raw_loading: RawLoading::Automatic,
            convert_to_eight_bit: false,
            exif_rotate: true,
        }
    }
}

impl PreviewSettings {
    #[must_use]
    pub fn with_quality(quality: PreviewQuality) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }
}

bitflags! {
    /// Post-processing switches for generated thumbnails.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ThumbnailFlags: u8 {
        /// Rotate according to the file's orientation tag.
        const EXIF_ROTATE = 0b0001;
        /// Draw a one pixel frame around the thumbnail.
        const HIGHLIGHT = 0b0010;
        /// Flatten away any alpha channel.
        const REMOVE_ALPHA = 0b0100;
    }
}

impl Default for ThumbnailFlags {
    fn default() -> Self {
        Self::EXIF_ROTATE | Self::REMOVE_ALPHA
    }
}

/// What a description asks to be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptionKind {
    /// Full decode of the file.
    Plain,
    /// Whole-image thumbnail.
    Thumbnail,
    /// Thumbnail of a region of the image.
    DetailThumbnail(Rect),
    /// Quality-tiered preview.
    Preview,
}

/// Immutable load request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadingDescription {
    file_path: PathBuf,
    kind: DescriptionKind,
    size: u32,
    preview_settings: PreviewSettings,
    thumbnail_flags: ThumbnailFlags,
    color_management: ColorManagement,
    profile: Option<IccProfile>,
}

impl LoadingDescription {
    /// Full decode of `path`.
    #[must_use]
    pub fn plain(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: path.into(),
            kind: DescriptionKind::Plain,
            size: 0,
            preview_settings: PreviewSettings::default(),
            thumbnail_flags: ThumbnailFlags::empty(),
            color_management: ColorManagement::NoConversion,
            profile: None,
        }
    }

    /// Whole-image thumbnail of `path` fitting in `size`×`size`.
    #[must_use]
    pub fn thumbnail(path: impl Into<PathBuf>, size: u32) -> Self {
        Self {
            kind: DescriptionKind::Thumbnail,
            size,
            thumbnail_flags: ThumbnailFlags::default(),
            ..Self::plain(path)
        }
    }

    /// Thumbnail of the `rect` region of `path`.
    #[must_use]
    pub fn detail_thumbnail(path: impl Into<PathBuf>, size: u32, rect: Rect) -> Self {
        Self {
            kind: DescriptionKind::DetailThumbnail(rect),
            ..Self::thumbnail(path, size)
        }
    }

    /// Preview of `path` with the longest edge near `size` (0 for unscaled).
    #[must_use]
    pub fn preview(path: impl Into<PathBuf>, size: u32, settings: PreviewSettings) -> Self {
        Self {
            kind: DescriptionKind::Preview,
            size,
            preview_settings: settings,
            ..Self::plain(path)
        }
    }

    /// Returns a copy requesting the given color conversion.
    #[must_use]
    pub fn with_color_management(
        mut self,
        mode: ColorManagement,
        profile: Option<IccProfile>,
    ) -> Self {
        self.color_management = mode;
        self.profile = profile;
        self
    }

    /// Returns a copy with the given thumbnail switches.
    #[must_use]
    pub fn with_thumbnail_flags(mut self, flags: ThumbnailFlags) -> Self {
        self.thumbnail_flags = flags;
        self
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    #[must_use]
    pub const fn kind(&self) -> DescriptionKind {
        self.kind
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn preview_settings(&self) -> &PreviewSettings {
        &self.preview_settings
    }

    #[must_use]
    pub const fn thumbnail_flags(&self) -> ThumbnailFlags {
        self.thumbnail_flags
    }

    #[must_use]
    pub const fn color_management(&self) -> ColorManagement {
        self.color_management
    }

    #[must_use]
    pub const fn profile(&self) -> Option<&IccProfile> {
        self.profile.as_ref()
    }

    #[must_use]
    pub const fn detail_rect(&self) -> Option<Rect> {
        match self.kind {
            DescriptionKind::DetailThumbnail(rect) => Some(rect),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_thumbnail(&self) -> bool {
        matches!(
            self.kind,
            DescriptionKind::Thumbnail | DescriptionKind::DetailThumbnail(_)
        )
    }

    #[must_use]
    pub const fn is_preview(&self) -> bool {
        matches!(self.kind, DescriptionKind::Preview)
    }

    /// True when the result is a scaled-down stand-in for the full image.
    #[must_use]
    pub const fn is_reduced_version(&self) -> bool {
        !matches!(self.kind, DescriptionKind::Plain)
    }

    /// True when a color conversion must run after decoding.
    #[must_use]
    pub fn needs_post_processing(&self) -> bool {
        self.color_management != ColorManagement::NoConversion
    }

    /// True when both descriptions load the same file with the same color handling,
    /// regardless of whether either of them is a reduced version.
    #[must_use]
    pub fn equals_ignore_reduced_version(&self, other: &Self) -> bool {
        self.file_path == other.file_path
            && self.color_management == other.color_management
            && self.profile == other.profile
    }

    fn color_suffix(&self) -> String {
        match (self.color_management.key_suffix(), &self.profile) {
            (None, _) => String::new(),
            (Some(mode), Some(profile)) => format!("-{mode}:{}", profile.description()),
            (Some(mode), None) => format!("-{mode}"),
        }
    }

    /// Key under which the result of this description is cached.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        let path = self.file_path.display();
        let color = self.color_suffix();
        let key = match self.kind {
            DescriptionKind::Plain => format!("{path}{color}"),
            DescriptionKind::Thumbnail => format!(
                "{path}-thumbnail-{}-{:x}{color}",
                self.size,
                self.thumbnail_flags.bits()
            ),
            DescriptionKind::DetailThumbnail(rect) => format!(
                "{path}-thumbnail-{}-{:x}-{},{},{}x{}{color}",
                self.size,
                self.thumbnail_flags.bits(),
                rect.x,
                rect.y,
                rect.width,
                rect.height
            ),
            DescriptionKind::Preview => {
                let settings = &self.preview_settings;
                let depth = if settings.convert_to_eight_bit { "-8bit" } else { "" };
                let rotate = if settings.exif_rotate { "" } else { "-norotate" };
                format!(
                    "{path}-preview-{}-{}-{}{depth}{rotate}{color}",
                    settings.quality, settings.raw_loading, self.size
                )
            }
        };
        CacheKey(key)
    }

    /// Keys whose cached image satisfies this description, own key first.
    ///
    /// A preview may be served from a cached full decode of the same file.
    #[must_use]
    pub fn lookup_cache_keys(&self) -> Vec<CacheKey> {
        let mut keys = vec![self.cache_key()];
        if self.is_preview() {
            let full = Self::plain(self.file_path.clone())
                .with_color_management(self.color_management, self.profile.clone());
            keys.push(full.cache_key());
        }
        keys
    }
}

impl fmt::Display for LoadingDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_key())
    }
}
