//! Image cropping/encoding collaborator: given an image and a rectangle,
//! return an image. This module defines the interface and a concrete
//! `image`-crate backed implementation.

use crate::error::{ExamCutError, Result};
use crate::types::Rect;
use image::{DynamicImage, ImageFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Png
    }
}

pub trait ImageCropper: Send + Sync {
    fn crop(&self, image: &DynamicImage, rect: Rect) -> Result<DynamicImage>;
    fn encode(&self, image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>>;
}

#[derive(Default)]
pub struct DefaultImageCropper;

impl ImageCropper for DefaultImageCropper {
    fn crop(&self, image: &DynamicImage, rect: Rect) -> Result<DynamicImage> {
        if !rect.fits_within(image.width(), image.height()) {
            return Err(ExamCutError::InternalAssert {
                message: format!(
                    "crop rect {:?} does not fit within image {}x{}",
                    rect,
                    image.width(),
                    image.height()
                ),
            });
        }
        Ok(image.crop_imm(rect.x, rect.y, rect.w, rect.h))
    }

    fn encode(&self, image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buf, format.image_format()).map_err(|e| ExamCutError::Packaging {
            message: "failed to encode cropped image".into(),
            source: Some(Box::new(e)),
        })?;
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_out_of_bounds_is_rejected() {
        let image = DynamicImage::new_rgb8(100, 100);
        let cropper = DefaultImageCropper;
        let result = cropper.crop(&image, Rect::new(0, 0, 200, 200));
        assert!(result.is_err());
    }

    #[test]
    fn crop_and_encode_round_trips_dimensions() {
        let image = DynamicImage::new_rgb8(100, 100);
        let cropper = DefaultImageCropper;
        let cropped = cropper.crop(&image, Rect::new(10, 10, 40, 50)).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (40, 50));
        let encoded = cropper.encode(&cropped, OutputFormat::Png).unwrap();
        assert!(!encoded.is_empty());
    }
}
