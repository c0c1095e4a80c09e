//! Resizing oversized images and generating thumbnails.

use crate::config::{FetchConfig, ThumbnailConfig};
use crate::fetch::decode::DecodedImage;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Result of optimizing a decoded image.
pub struct OptimizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Format of `bytes`: the original format, or "jpeg" after re-encoding
    pub format: String,
}

/// Shrink and re-encode an image whose longest edge exceeds the cap.
///
/// Images within the cap pass through untouched so already-efficient
/// originals keep their format and exact bytes.
pub fn optimize(
    decoded: &DecodedImage,
    original_bytes: &[u8],
    config: &FetchConfig,
) -> OptimizedImage {
    let max = config.optimize_max_dimension;
    if decoded.width <= max && decoded.height <= max {
        return OptimizedImage {
            bytes: original_bytes.to_vec(),
            width: decoded.width,
            height: decoded.height,
            format: super::decode::format_name(decoded.format),
        };
    }

    let resized = decoded.image.thumbnail(max, max);
    let (width, height) = (resized.width(), resized.height());

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, config.optimize_quality);
    if resized.to_rgb8().write_with_encoder(encoder).is_err() {
        // Keep the original if re-encoding fails; it decoded fine
        return OptimizedImage {
            bytes: original_bytes.to_vec(),
            width: decoded.width,
            height: decoded.height,
            format: super::decode::format_name(decoded.format),
        };
    }

    debug!(
        from = %format!("{}x{}", decoded.width, decoded.height),
        to = %format!("{width}x{height}"),
        "resized oversized image"
    );

    OptimizedImage {
        bytes: buffer.into_inner(),
        width,
        height,
        format: "jpeg".to_string(),
    }
}

/// Aspect-preserving WebP thumbnail, longest edge = `config.size`.
///
/// Returns an empty vec if encoding fails; a missing thumbnail never
/// rejects the image.
pub fn thumbnail(image: &DynamicImage, config: &ThumbnailConfig) -> Vec<u8> {
    let thumb = image.thumbnail(config.size, config.size);
    let mut buffer = Cursor::new(Vec::new());
    match thumb.write_to(&mut buffer, ImageFormat::WebP) {
        Ok(()) => buffer.into_inner(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::decode::decode_and_validate;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_small_image_passes_through() {
        let bytes = png_bytes(800, 600);
        let decoded = decode_and_validate(&bytes, &FetchConfig::default()).unwrap();
        let optimized = optimize(&decoded, &bytes, &FetchConfig::default());
        assert_eq!(optimized.bytes, bytes);
        assert_eq!(optimized.format, "png");
        assert_eq!(optimized.width, 800);
    }

    #[test]
    fn test_oversized_image_resized_to_jpeg() {
        let bytes = png_bytes(4000, 2000);
        let decoded = decode_and_validate(&bytes, &FetchConfig::default()).unwrap();
        let optimized = optimize(&decoded, &bytes, &FetchConfig::default());
        assert_eq!(optimized.format, "jpeg");
        assert_eq!(optimized.width, 2048);
        assert_eq!(optimized.height, 1024);
    }

    #[test]
    fn test_thumbnail_is_webp_and_aspect_preserving() {
        let img = DynamicImage::new_rgb8(1000, 500);
        let bytes = thumbnail(&img, &ThumbnailConfig { size: 300 });
        // WebP container starts with RIFF
        assert_eq!(&bytes[0..4], b"RIFF");

        let thumb = image::load_from_memory(&bytes).unwrap();
        assert_eq!(thumb.width(), 300);
        assert_eq!(thumb.height(), 150);
    }
}
