//! Decode and validate downloaded bytes.
//!
//! Check order matters for the reported reason: undecodable bytes are
//! `Corrupt`, a decodable but disallowed format is `UnsupportedFormat`,
//! and only a decodable allowed image can be `TooSmall`.

use crate::config::FetchConfig;
use crate::types::RejectionReason;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// A decoded image awaiting optimization.
#[derive(Debug)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Stable lowercase name for a detected format.
pub fn format_name(format: ImageFormat) -> String {
    format!("{format:?}").to_lowercase()
}

/// Color mode string for a decoded image ("rgb8", "rgba8", ...).
pub fn color_mode(image: &DynamicImage) -> String {
    format!("{:?}", image.color()).to_lowercase()
}

/// Decode `bytes` and validate format and minimum dimensions.
pub fn decode_and_validate(
    bytes: &[u8],
    config: &FetchConfig,
) -> Result<DecodedImage, RejectionReason> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| RejectionReason::Corrupt)?;

    let format = reader.format().ok_or(RejectionReason::Corrupt)?;
    let image = reader.decode().map_err(|_| RejectionReason::Corrupt)?;

    let name = format_name(format);
    if !config.allowed_formats.iter().any(|f| f == &name) {
        return Err(RejectionReason::UnsupportedFormat);
    }

    let (width, height) = (image.width(), image.height());
    if width < config.min_width || height < config.min_height {
        return Err(RejectionReason::TooSmall);
    }

    Ok(DecodedImage {
        image,
        format,
        width,
        height,
    })
}
