use bytes::Bytes;
use image::{GenericImageView, ImageFormat};

use crate::domain::error::{ServiceError, ServiceResult};

pub const MIN_IMAGE_DIMENSION: u32 = 100;
pub const MAX_IMAGE_DIMENSION: u32 = 6000;

/// An uploaded image that decoded cleanly and fits the size bounds.
#[derive(Debug, Clone)]
pub struct CheckedImage {
    pub data: Bytes,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl CheckedImage {
    pub fn extension(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "png",
            _ => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "image/png",
            _ => "image/jpeg",
        }
    }
}

/// Accepts JPEG or PNG bytes whose width and height both lie within
/// `MIN_IMAGE_DIMENSION..=MAX_IMAGE_DIMENSION`.
pub fn check_image(data: Bytes) -> ServiceResult<CheckedImage> {
    let format = image::guess_format(&data).map_err(|_| ServiceError::InvalidImage)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(ServiceError::InvalidImage);
    }

    let decoded = image::load_from_memory_with_format(&data, format).map_err(|err| {
        tracing::debug!(error = ?err, "failed to decode uploaded image");
        ServiceError::InvalidImage
    })?;

    let (width, height) = decoded.dimensions();
    let bounds = MIN_IMAGE_DIMENSION..=MAX_IMAGE_DIMENSION;
    if !bounds.contains(&width) || !bounds.contains(&height) {
        return Err(ServiceError::InvalidImage);
    }

    Ok(CheckedImage {
        data,
        format,
        width,
        height,
    })
}
