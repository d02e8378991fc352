//! EXIF orientation handling.

use image::DynamicImage;

/// The eight EXIF orientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Maps the EXIF `Orientation` tag value. Unknown values mean no change.
    #[must_use]
    pub const fn from_exif(value: u32) -> Self {
        match value {
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    /// True when applying the orientation swaps width and height.
    #[must_use]
    pub const fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Returns the image as it should be displayed.
    #[must_use]
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => image,
            Self::FlipHorizontal => image.fliph(),
            Self::Rotate180 => image.rotate180(),
            Self::FlipVertical => image.flipv(),
            Self::Transpose => image.rotate90().fliph(),
            Self::Rotate90 => image.rotate90(),
            Self::Transverse => image.rotate270().fliph(),
            Self::Rotate270 => image.rotate270(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, Orientation::Normal ; "normal")]
    #[test_case(3, Orientation::Rotate180 ; "upside_down")]
    #[test_case(6, Orientation::Rotate90 ; "rotate_cw")]
    #[test_case(8, Orientation::Rotate270 ; "rotate_ccw")]
    #[test_case(42, Orientation::Normal ; "unknown_value")]
    fn test_from_exif(value: u32, expected: Orientation) {
        assert_eq!(Orientation::from_exif(value), expected);
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let img = DynamicImage::new_rgb8(40, 20);
        let rotated = Orientation::Rotate90.apply(img.clone());
        assert_eq!((rotated.width(), rotated.height()), (20, 40));
        assert!(Orientation::Rotate90.swaps_dimensions());

        let flipped = Orientation::FlipHorizontal.apply(img);
        assert_eq!((flipped.width(), flipped.height()), (40, 20));
        assert!(!Orientation::FlipHorizontal.swaps_dimensions());
    }
}
