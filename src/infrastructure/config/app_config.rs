//! Engine configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::entities::{IccProfile, RawLoading};
use crate::infrastructure::cache::{
    CacheOptions, DEFAULT_THUMBNAIL_IMAGES, DEFAULT_THUMBNAIL_PIXMAPS,
};
use crate::infrastructure::codec::StaticColorManagement;
use crate::infrastructure::thread::{NotificationPolicy, ThreadOptions};

const APP_NAME: &str = "lightbox";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

const MIB: u64 = 1024 * 1024;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Engine configuration, read from `config.toml` and overridden by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache sizing.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Progress notification throttling.
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Thumbnail generation.
    #[serde(default)]
    pub thumbnails: ThumbnailsConfig,

    /// Preview generation.
    #[serde(default)]
    pub previews: PreviewsConfig,

    /// Color management.
    #[serde(default)]
    pub color: ColorConfig,
}

/// Cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Byte budget of decoded images, in MiB.
    #[serde(default = "default_image_budget_mib")]
    pub image_budget_mib: u64,

    /// Largest single decoded image kept, in MiB.
    #[serde(default = "default_image_budget_mib")]
    pub oversize_threshold_mib: u64,

    /// Number of thumbnail images kept.
    #[serde(default = "default_thumbnail_images")]
    pub thumbnail_images: usize,

    /// Number of thumbnail pixmaps kept.
    #[serde(default = "default_thumbnail_pixmaps")]
    pub thumbnail_pixmaps: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            image_budget_mib: default_image_budget_mib(),
            oversize_threshold_mib: default_image_budget_mib(),
            thumbnail_images: DEFAULT_THUMBNAIL_IMAGES,
            thumbnail_pixmaps: DEFAULT_THUMBNAIL_PIXMAPS,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn options(&self) -> CacheOptions {
        CacheOptions {
            image_budget: self.image_budget_mib.saturating_mul(MIB),
            oversize_threshold: self.oversize_threshold_mib.saturating_mul(MIB),
            thumbnail_images: self.thumbnail_images,
            thumbnail_pixmaps: self.thumbnail_pixmaps,
        }
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Throttling policy for progress events.
    #[serde(default)]
    pub policy: NotificationPolicy,

    /// Window of the time-limited policy, in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            policy: NotificationPolicy::default(),
            window_ms: default_window_ms(),
        }
    }
}

impl NotificationsConfig {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Thumbnail configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailsConfig {
    /// Default thumbnail edge.
    #[serde(default = "default_thumbnail_size")]
    pub size: u32,

    /// Largest thumbnail edge accepted.
    #[serde(default = "default_max_thumbnail_size")]
    pub max_size: u32,

    /// Draw a frame around thumbnails.
    #[serde(default)]
    pub highlight: bool,

    /// Apply the orientation stored in the file.
    #[serde(default = "default_true")]
    pub exif_rotate: bool,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            size: default_thumbnail_size(),
            max_size: default_max_thumbnail_size(),
            highlight: false,
            exif_rotate: true,
        }
    }
}

/// Preview configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewsConfig {
    /// Default preview edge, 0 for full size.
    #[serde(default = "default_preview_size")]
    pub size: u32,

    /// RAW decoding for high quality previews.
    #[serde(default)]
    pub raw_loading: RawLoading,

    /// Convert 16-bit previews to 8-bit.
    #[serde(default = "default_true")]
    pub convert_to_eight_bit: bool,

    /// Apply the orientation stored in the file.
    #[serde(default = "default_true")]
    pub exif_rotate: bool,
}

impl Default for PreviewsConfig {
    fn default() -> Self {
        Self {
            size: default_preview_size(),
            raw_loading: RawLoading::default(),
            convert_to_eight_bit: true,
            exif_rotate: true,
        }
    }
}

/// Color management configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorConfig {
    /// Convert thumbnails and previews for the display.
    #[serde(default)]
    pub managed_previews: bool,

    /// Name of the display profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_profile: Option<String>,
}

impl ColorConfig {
    #[must_use]
    pub fn color_management(&self) -> StaticColorManagement {
        StaticColorManagement::new(
            self.display_profile.as_deref().map(IccProfile::new),
            self.managed_previews,
        )
    }
}

fn default_image_budget_mib() -> u64 {
    60
}

fn default_thumbnail_images() -> usize {
    DEFAULT_THUMBNAIL_IMAGES
}

fn default_thumbnail_pixmaps() -> usize {
    DEFAULT_THUMBNAIL_PIXMAPS
}

fn default_window_ms() -> u64 {
    100
}

fn default_thumbnail_size() -> u32 {
    256
}

fn default_max_thumbnail_size() -> u32 {
    512
}

fn default_preview_size() -> u32 {
    1280
}

fn default_true() -> bool {
    true
}

use super::args::CliArgs;

impl EngineConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(budget) = args.cache_budget_mib {
            self.cache.image_budget_mib = budget;
        }
        if let Some(policy) = args.notification_policy {
            self.notifications.policy = policy;
        }
        if let Some(managed) = args.managed_previews {
            self.color.managed_previews = managed;
        }
    }

    /// Options of a loader thread called `name`.
    #[must_use]
    pub fn thread_options(&self, name: &str) -> ThreadOptions {
        ThreadOptions {
            name: name.to_string(),
            notification_policy: self.notifications.policy,
            notification_window: self.notifications.window(),
            ..ThreadOptions::default()
        }
    }

    /// Keys whose values no loader can honor.
    #[must_use]
    pub fn invalid_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.cache.oversize_threshold_mib > self.cache.image_budget_mib {
            keys.push("cache.oversize_threshold_mib");
        }
        if self.cache.thumbnail_images == 0 {
            keys.push("cache.thumbnail_images");
        }
        if self.cache.thumbnail_pixmaps == 0 {
            keys.push("cache.thumbnail_pixmaps");
        }
        if self.thumbnails.max_size == 0 {
            keys.push("thumbnails.max_size");
        }
        if self.thumbnails.size == 0 || self.thumbnails.size > self.thumbnails.max_size {
            keys.push("thumbnails.size");
        }
        keys
    }

    /// Resets every invalid key, returning the keys that changed.
    ///
    /// An oversize threshold above the budget is lowered to the budget. A
    /// thumbnail size outside `1..=max_size` falls back to the default size,
    /// capped at `max_size`.
    pub fn repair(&mut self) -> Vec<&'static str> {
        let keys = self.invalid_keys();
        for key in &keys {
            match *key {
                "cache.oversize_threshold_mib" => {
                    self.cache.oversize_threshold_mib = self.cache.image_budget_mib;
                }
                "cache.thumbnail_images" => self.cache.thumbnail_images = DEFAULT_THUMBNAIL_IMAGES,
                "cache.thumbnail_pixmaps" => {
                    self.cache.thumbnail_pixmaps = DEFAULT_THUMBNAIL_PIXMAPS;
                }
                "thumbnails.max_size" => self.thumbnails.max_size = default_max_thumbnail_size(),
                _ => {}
            }
        }
        if keys.contains(&"thumbnails.size") {
            self.thumbnails.size = default_thumbnail_size().min(self.thumbnails.max_size);
        }
        keys
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("lightbox.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}
