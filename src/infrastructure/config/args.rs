use super::app_config::LogLevel;
use crate::domain::entities::PreviewQuality;
use crate::infrastructure::thread::NotificationPolicy;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "lightbox",
    version,
    about = "Shared image, thumbnail and preview loader",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Byte budget of the decoded image cache, in MiB.
    #[arg(long, value_name = "MIB", global = true)]
    pub cache_budget_mib: Option<u64>,

    /// Throttling of progress notifications.
    #[arg(long, value_enum, global = true)]
    pub notification_policy: Option<NotificationPolicy>,

    /// Convert thumbnails and previews for the display profile.
    #[arg(long, global = true)]
    pub managed_previews: Option<bool>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate thumbnails of one or more images.
    Thumbnail {
        /// Images to read.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Thumbnail edge in pixels.
        #[arg(short, long)]
        size: Option<u32>,

        /// Draw a frame around each thumbnail.
        #[arg(long)]
        highlight: bool,

        /// Output directory.
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },

    /// Generate a preview of one image.
    Preview {
        /// Image to read.
        path: PathBuf,

        /// Preview quality.
        #[arg(short, long, value_enum, default_value_t = QualityArg::Fast)]
        quality: QualityArg,

        /// Longest edge in pixels, 0 for full size.
        #[arg(short, long)]
        size: Option<u32>,

        /// Output file.
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Print the effective configuration.
    Info {
        /// Print configuration and cache statistics as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QualityArg {
    Fast,
    Large,
    High,
}

impl From<QualityArg> for PreviewQuality {
    fn from(quality: QualityArg) -> Self {
        match quality {
            QualityArg::Fast => Self::FastPreview,
            QualityArg::Large => Self::FastButLargePreview,
            QualityArg::High => Self::HighQualityPreview,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_command() {
        let args = CliArgs::parse_from(["lightbox", "thumbnail", "a.png", "b.png", "-s", "64"]);

        match args.command {
            Command::Thumbnail {
                paths,
                size,
                highlight,
                out,
            } => {
                assert_eq!(paths, [PathBuf::from("a.png"), PathBuf::from("b.png")]);
                assert_eq!(size, Some(64));
                assert!(!highlight);
                assert_eq!(out, PathBuf::from("."));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from([
            "lightbox",
            "preview",
            "a.jpg",
            "--out",
            "b.jpg",
            "-q",
            "high",
            "--log-level",
            "debug",
        ]);

        assert_eq!(args.log_level, Some(LogLevel::Debug));
        match args.command {
            Command::Preview { quality, size, .. } => {
                assert_eq!(PreviewQuality::from(quality), PreviewQuality::HighQualityPreview);
                assert_eq!(size, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_info_json_flag() {
        let args = CliArgs::parse_from(["lightbox", "info", "--json"]);
        assert!(matches!(args.command, Command::Info { json: true }));
    }

    #[test]
    fn test_thumbnail_requires_paths() {
        assert!(CliArgs::try_parse_from(["lightbox", "thumbnail"]).is_err());
    }
}
