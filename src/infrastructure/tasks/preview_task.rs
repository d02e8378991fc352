//! Preview generation with quality tiers.

use image::DynamicImage;
use image::imageops::FilterType;
use tracing::{debug, trace, warn};

use super::loading_task::apply_color_management;
use super::shared_loading_task::ImageProducer;
use super::TaskContext;
use crate::domain::entities::{
    FileFormat, ImageAttributes, LoadedImage, LoadingDescription, PreviewQuality, RawLoading,
};
use crate::domain::errors::LoadError;
use crate::domain::ports::LoadObserver;

/// Fraction of the original resolution an embedded preview must reach to
/// replace a high quality RAW decode.
const ACCEPTABLE_EMBEDDED_RATIO: f64 = 0.48;

/// Fast previews are only scaled down when larger than this factor times the
/// requested size.
const SCALE_TOLERANCE: f64 = 1.25;

/// Produces quality-tiered previews.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewProducer;

/// Where the preview pixels come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Embedded preview whose longest edge is at least the limit, if any.
    Embedded { min_size: Option<u32> },
    RawHalf,
    RawFull,
    /// Decode that may already be scaled down to the size.
    Scaled(u32),
    Full,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fraction_of(value: u32, ratio: f64) -> u32 {
    (f64::from(value) * ratio).round() as u32
}

/// Decode attempts for `description`, in order.
fn strategy(description: &LoadingDescription, original_size: (u32, u32)) -> Vec<Source> {
    let settings = description.preview_settings();
    let size = description.size();

    if !FileFormat::from_path(description.file_path()).is_raw() {
        return match settings.quality {
            PreviewQuality::FastPreview => vec![
                Source::Embedded {
                    min_size: Some(size.saturating_add(1)),
                },
                Source::Scaled(size),
            ],
            PreviewQuality::FastButLargePreview | PreviewQuality::HighQualityPreview => {
                vec![Source::Full]
            }
        };
    }

    let (width, height) = original_size;
    match settings.quality {
        PreviewQuality::FastPreview | PreviewQuality::FastButLargePreview => {
            let best_size = width.max(height) / 2;
            let min_size = (settings.quality == PreviewQuality::FastButLargePreview)
                .then(|| size.min(best_size));
            vec![Source::Embedded { min_size }, Source::RawHalf, Source::RawFull]
        }
        PreviewQuality::HighQualityPreview => match settings.raw_loading {
            RawLoading::Automatic => {
                let acceptable = fraction_of(width, ACCEPTABLE_EMBEDDED_RATIO)
                    .max(fraction_of(height, ACCEPTABLE_EMBEDDED_RATIO));
                vec![
                    Source::Embedded {
                        min_size: Some(acceptable),
                    },
                    Source::RawHalf,
                    Source::RawFull,
                ]
            }
            RawLoading::FromEmbeddedPreview => vec![
                Source::Embedded { min_size: None },
                Source::RawHalf,
                Source::RawFull,
            ],
            RawLoading::FromRawHalfSize => vec![Source::RawHalf],
            RawLoading::FromRawFullSize => vec![Source::RawFull],
        },
    }
}

/// True when a fast preview is enough larger than requested to be scaled.
fn needs_to_scale(description: &LoadingDescription, image: &DynamicImage) -> bool {
    let size = description.size();
    description.preview_settings().quality == PreviewQuality::FastPreview
        && size > 0
        && image.width().max(image.height()) >= fraction_of(size, SCALE_TOLERANCE)
}

/// Converts images with more than eight bits per channel.
fn to_eight_bit(image: DynamicImage) -> DynamicImage {
    let color = image.color();
    if color.bytes_per_pixel() <= color.channel_count() {
        return image;
    }
    if color.has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

impl PreviewProducer {
    fn load(
        source: Source,
        description: &LoadingDescription,
        ctx: &TaskContext,
        observer: &dyn LoadObserver,
    ) -> Result<Option<DynamicImage>, LoadError> {
        let path = description.file_path();
        let codec = &ctx.services.codec;
        match source {
            Source::Embedded { min_size } => {
                let Some(preview) = ctx.services.metadata.embedded_preview(path) else {
                    return Ok(None);
                };
                if min_size.is_some_and(|min| preview.max_dimension() < min) {
                    trace!(
                        path = %path.display(),
                        width = preview.width,
                        height = preview.height,
                        "Embedded preview too small"
                    );
                    return Ok(None);
                }
                preview.decode(path).map(Some)
            }
            Source::RawHalf => codec.decode_raw_half(path, observer).map(Some),
            Source::RawFull => codec.decode_raw_full(path, observer).map(Some),
            Source::Scaled(size) => codec.decode_scaled(path, size, observer).map(Some),
            Source::Full => codec.decode(path, observer).map(Some),
        }
    }

    /// Scaling, orientation and bit depth, applied to freshly loaded and to
    /// shared images alike.
    fn finish(description: &LoadingDescription, ctx: &TaskContext, image: DynamicImage) -> DynamicImage {
        let settings = description.preview_settings();
        let mut image = image;
        if needs_to_scale(description, &image) {
            let size = description.size();
            image = image.resize(size, size, FilterType::Triangle);
        }
        if settings.exif_rotate {
            image = ctx
                .services
                .metadata
                .orientation(description.file_path())
                .apply(image);
        }
        if settings.convert_to_eight_bit {
            image = to_eight_bit(image);
        }
        image
    }
}

impl ImageProducer for PreviewProducer {
    fn produce(
        &self,
        description: &LoadingDescription,
        ctx: &TaskContext,
        observer: &dyn LoadObserver,
    ) -> LoadedImage {
        let path = description.file_path();
        let format = FileFormat::from_path(path);
        let metadata_size = ctx.services.metadata.original_size(path);

        let mut loaded = None;
        for source in strategy(description, metadata_size.unwrap_or((0, 0))) {
            if !observer.continue_query() {
                return LoadedImage::null();
            }
            match Self::load(source, description, ctx, observer) {
                Ok(Some(image)) => {
                    debug!(path = %path.display(), ?source, "Preview source");
                    loaded = Some((image, matches!(source, Source::Embedded { .. })));
                    break;
                }
                Ok(None) => {}
                Err(e) if e.is_cancelled() => return LoadedImage::null(),
                Err(e) => {
                    trace!(path = %path.display(), ?source, error = %e, "Preview source failed");
                }
            }
        }

        let Some((image, from_embedded_preview)) = loaded else {
            warn!(path = %path.display(), "Cannot extract preview");
            return LoadedImage::null();
        };
        if !observer.continue_query() {
            return LoadedImage::null();
        }

        let original_size = metadata_size.unwrap_or((image.width(), image.height()));
        let attributes = ImageAttributes {
            original_size: Some(original_size),
            from_embedded_preview,
            detected_format: Some(format),
            ..ImageAttributes::default()
        };
        let mut loaded =
            LoadedImage::new(Self::finish(description, ctx, image)).with_attributes(attributes);
        apply_color_management(description, ctx, &mut loaded);
        loaded
    }

    fn adapt_shared(
        &self,
        description: &LoadingDescription,
        image: LoadedImage,
        ctx: &TaskContext,
    ) -> LoadedImage {
        let Some(pixels) = image.image() else {
            return image;
        };
        let attributes = image.attributes().clone();
        let finished = Self::finish(description, ctx, DynamicImage::clone(pixels));
        LoadedImage::new(finished).with_attributes(attributes)
    }
}
