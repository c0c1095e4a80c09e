//! EXIF extraction from downloaded bytes.

use crate::types::ExifData;
use exif::{In, Reader, Tag, Value};
use std::io::Cursor;

/// Extract EXIF data from image bytes.
///
/// Lenient: partial data is kept, and images with no EXIF container
/// (most web images) return `None` without being an error.
pub fn extract(bytes: &[u8]) -> Option<ExifData> {
    let mut cursor = Cursor::new(bytes);
    let exif = Reader::new().read_from_container(&mut cursor).ok()?;

    let data = ExifData {
        captured_at: get_datetime(&exif),
        camera_make: get_string(&exif, Tag::Make),
        camera_model: get_string(&exif, Tag::Model),
        orientation: get_u32(&exif, Tag::Orientation),
    };

    if data.captured_at.is_some()
        || data.camera_make.is_some()
        || data.camera_model.is_some()
        || data.orientation.is_some()
    {
        Some(data)
    } else {
        None
    }
}

fn get_string(exif: &exif::Exif, tag: Tag) -> Option<String> {
    exif.get_field(tag, In::PRIMARY)
        .map(|f| f.display_value().to_string().trim_matches('"').to_string())
}

fn get_u32(exif: &exif::Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)
        .and_then(|f| match &f.value {
            Value::Short(v) => v.first().map(|&x| x as u32),
            Value::Long(v) => v.first().copied(),
            _ => None,
        })
}

/// Capture datetime, preferring DateTimeOriginal over DateTime.
fn get_datetime(exif: &exif::Exif) -> Option<String> {
    exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))
        .map(|f| f.display_value().to_string().trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_exif_returns_none() {
        // Plain PNG without an EXIF container
        let img = image::DynamicImage::new_rgb8(16, 16);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        assert!(extract(&buffer.into_inner()).is_none());
    }

    #[test]
    fn test_garbage_bytes_return_none() {
        assert!(extract(b"definitely not an image").is_none());
    }
}
