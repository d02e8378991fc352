//! Thumbnail generation.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, warn};

use super::loading_task::apply_color_management;
use super::shared_loading_task::ImageProducer;
use super::TaskContext;
use crate::domain::entities::{
    FileFormat, ImageAttributes, LoadedImage, LoadingDescription, ThumbnailFlags,
};
use crate::domain::ports::LoadObserver;

/// Smallest edge a thumbnail must have to get a highlight frame.
const MIN_HIGHLIGHT_SIZE: u32 = 10;

/// Produces whole-image and detail thumbnails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbnailProducer;

impl ThumbnailProducer {
    /// Source pixels: an embedded preview when one is large enough, else a
    /// decode the codec may already scale down.
    fn source(
        description: &LoadingDescription,
        ctx: &TaskContext,
        observer: &dyn LoadObserver,
    ) -> Option<(DynamicImage, bool)> {
        let path = description.file_path();
        let size = description.size();
        let whole_image = description.detail_rect().is_none();

        if whole_image {
            let preview = ctx
                .services
                .metadata
                .embedded_preview(path)
                .filter(|preview| preview.max_dimension() >= size);
            if let Some(preview) = preview {
                match preview.decode(path) {
                    Ok(image) => return Some((image, true)),
                    Err(e) => debug!(path = %path.display(), error = %e, "Unusable embedded preview"),
                }
            }
        }

        let codec = &ctx.services.codec;
        let raw = FileFormat::from_path(path).is_raw();
        let decoded = match (raw, whole_image) {
            (true, true) => codec.decode_raw_half(path, observer),
            (true, false) => codec.decode_raw_full(path, observer),
            (false, true) => codec.decode_scaled(path, size, observer),
            (false, false) => codec.decode(path, observer),
        };
        match decoded {
            Ok(image) => Some((image, false)),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot create thumbnail");
                None
            }
        }
    }
}

impl ImageProducer for ThumbnailProducer {
    fn produce(
        &self,
        description: &LoadingDescription,
        ctx: &TaskContext,
        observer: &dyn LoadObserver,
    ) -> LoadedImage {
        let path = description.file_path();
        let flags = description.thumbnail_flags();

        let Some((mut image, from_embedded_preview)) = Self::source(description, ctx, observer)
        else {
            return LoadedImage::null();
        };
        if !observer.continue_query() {
            return LoadedImage::null();
        }

        let original_size = ctx
            .services
            .metadata
            .original_size(path)
            .unwrap_or((image.width(), image.height()));

        if flags.contains(ThumbnailFlags::EXIF_ROTATE) {
            image = ctx.services.metadata.orientation(path).apply(image);
        }

        if let Some(rect) = description.detail_rect() {
            let Some(clamped) = rect.clamped_to(image.width(), image.height()) else {
                warn!(path = %path.display(), ?rect, "Detail rectangle outside of image");
                return LoadedImage::null();
            };
            image = image.crop_imm(clamped.x, clamped.y, clamped.width, clamped.height);
        }

        image = post_process(image, description.size(), flags);

        let attributes = ImageAttributes {
            original_size: Some(original_size),
            from_embedded_preview,
            detected_format: Some(FileFormat::from_path(path)),
            ..ImageAttributes::default()
        };
        let mut loaded = LoadedImage::new(image).with_attributes(attributes);
        apply_color_management(description, ctx, &mut loaded);
        loaded
    }
}

/// Scales down to `size`, then applies the alpha and highlight switches.
fn post_process(image: DynamicImage, size: u32, flags: ThumbnailFlags) -> DynamicImage {
    let mut image = if size > 0 && image.width().max(image.height()) > size {
        image.resize(size, size, FilterType::Triangle)
    } else {
        image
    };

    if flags.contains(ThumbnailFlags::REMOVE_ALPHA) && image.color().has_alpha() {
        image = DynamicImage::ImageRgb8(image.to_rgb8());
    }

    if flags.contains(ThumbnailFlags::HIGHLIGHT) {
        image = highlight(image);
    }
    image
}

/// Draws a one pixel black frame around thumbnails of at least
/// [`MIN_HIGHLIGHT_SIZE`] in both dimensions.
fn highlight(image: DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width < MIN_HIGHLIGHT_SIZE || height < MIN_HIGHLIGHT_SIZE {
        return image;
    }

    let has_alpha = image.color().has_alpha();
    let mut canvas = RgbaImage::from_pixel(width + 2, height + 2, Rgba([0, 0, 0, 255]));
    imageops::replace(&mut canvas, &image.to_rgba8(), 1, 1);
    let framed = DynamicImage::ImageRgba8(canvas);
    if has_alpha {
        framed
    } else {
        DynamicImage::ImageRgb8(framed.to_rgb8())
    }
}

/// Every thumbnail request for `path` with the given sizes and switches.
pub(crate) fn thumbnail_descriptions(
    path: &Path,
    sizes: &[u32],
    flags: &[ThumbnailFlags],
) -> Vec<LoadingDescription> {
    sizes
        .iter()
        .flat_map(|&size| {
            flags
                .iter()
                .map(move |&f| LoadingDescription::thumbnail(path, size).with_thumbnail_flags(f))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Orientation, Rect};
    use crate::domain::ports::mocks::{CountingCodec, FixedMetadata, embedded_preview};
    use crate::domain::ports::NullObserver;
    use crate::infrastructure::cache::LoadingCache;
    use crate::infrastructure::tasks::test_support::{context, services};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use test_case::test_case;

    fn produce(
        codec: &Arc<CountingCodec>,
        metadata: FixedMetadata,
        description: &LoadingDescription,
    ) -> LoadedImage {
        let (ctx, _) = context(
            Arc::new(LoadingCache::default()),
            services(codec.clone(), metadata),
        );
        ThumbnailProducer.produce(description, &ctx, &NullObserver)
    }

    #[test]
    fn test_large_embedded_preview_is_used() {
        let codec = Arc::new(CountingCodec::new(4000, 3000));
        let metadata = FixedMetadata {
            preview: Some(embedded_preview(320, 240)),
            ..FixedMetadata::default()
        };
        let image = produce(&codec, metadata, &LoadingDescription::thumbnail("/p/a.jpg", 256));

        assert_eq!(codec.total_decodes(), 0);
        assert!(image.attributes().from_embedded_preview);
        assert_eq!(image.dimensions(), (256, 192));
    }

    #[test]
    fn test_small_embedded_preview_falls_back_to_decoding() {
        let codec = Arc::new(CountingCodec::new(400, 300));
        let metadata = FixedMetadata {
            preview: Some(embedded_preview(160, 120)),
            ..FixedMetadata::default()
        };
        let image = produce(&codec, metadata, &LoadingDescription::thumbnail("/p/a.jpg", 256));

        assert_eq!(codec.scaled_decodes.load(Ordering::SeqCst), 1);
        assert!(!image.attributes().from_embedded_preview);
        assert_eq!(image.dimensions(), (256, 192));
    }

    #[test]
    fn test_small_images_are_not_upscaled() {
        let codec = Arc::new(CountingCodec::new(100, 50));
        let image = produce(
            &codec,
            FixedMetadata::default(),
            &LoadingDescription::thumbnail("/p/a.png", 256),
        );
        assert_eq!(image.dimensions(), (100, 50));
    }

    #[test]
    fn test_rotation_is_applied_before_scaling() {
        let codec = Arc::new(CountingCodec::new(400, 200));
        let metadata = FixedMetadata {
            orientation: Orientation::Rotate90,
            ..FixedMetadata::default()
        };
        let image = produce(&codec, metadata, &LoadingDescription::thumbnail("/p/a.jpg", 100));
        assert_eq!(image.dimensions(), (50, 100));
    }

    #[test]
    fn test_detail_thumbnail_crops_clamped_rect() {
        let codec = Arc::new(CountingCodec::new(200, 100));
        let description =
            LoadingDescription::detail_thumbnail("/p/a.jpg", 256, Rect::new(150, 50, 100, 100));
        let image = produce(&codec, FixedMetadata::default(), &description);

        assert_eq!(codec.decodes.load(Ordering::SeqCst), 1);
        assert_eq!(image.dimensions(), (50, 50));
    }

    #[test]
    fn test_detail_rect_outside_image_yields_empty() {
        let codec = Arc::new(CountingCodec::new(200, 100));
        let description =
            LoadingDescription::detail_thumbnail("/p/a.jpg", 256, Rect::new(300, 0, 10, 10));
        assert!(produce(&codec, FixedMetadata::default(), &description).is_null());
    }

    #[test_case(40, 30, (42, 32) ; "framed")]
    #[test_case(9, 30, (9, 30) ; "too narrow")]
    #[test_case(10, 10, (12, 12) ; "minimum size")]
    fn test_highlight_frame(width: u32, height: u32, expected: (u32, u32)) {
        let framed = post_process(
            DynamicImage::new_rgb8(width, height),
            256,
            ThumbnailFlags::HIGHLIGHT,
        );
        assert_eq!((framed.width(), framed.height()), expected);
    }

    #[test]
    fn test_alpha_is_removed() {
        let flattened = post_process(
            DynamicImage::new_rgba8(20, 20),
            256,
            ThumbnailFlags::REMOVE_ALPHA,
        );
        assert!(!flattened.color().has_alpha());
    }

    #[test]
    fn test_thumbnail_descriptions_cover_every_combination() {
        let keys = thumbnail_descriptions(
            Path::new("/p/a.jpg"),
            &[128, 256],
            &[ThumbnailFlags::default(), ThumbnailFlags::all()],
        );
        assert_eq!(keys.len(), 4);
    }
}
