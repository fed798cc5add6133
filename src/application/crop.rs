use crate::domain::{BoundingBox, DomainError};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

/// Crops are always squared off to this size so avatars stay visually
/// consistent no matter when they were generated.
pub const CROP_SIZE: u32 = 200;
pub const JPEG_QUALITY: u8 = 90;
/// Symmetric padding added around the detected rectangle, as a fraction of
/// its shorter side. Gives the crop some breathing room around the face.
const PADDING_RATIO: f64 = 0.1;

/// Cut the face region out of `image_bytes` and normalize it to a fixed
/// 200x200 JPEG.
///
/// The rectangle is expanded by `round(0.1 * min(width, height))` pixels,
/// left/top are clamped at zero first and the far edges are then clamped to
/// the image bounds. This exact order must not change: previously generated
/// avatars were framed with it.
pub fn crop_face(image_bytes: &[u8], rect: &BoundingBox) -> Result<Vec<u8>, DomainError> {
    if rect.width <= 0 || rect.height <= 0 {
        return Err(DomainError::Crop(format!(
            "degenerate face rectangle {}x{}",
            rect.width, rect.height
        )));
    }

    let img = image::load_from_memory(image_bytes)
        .map_err(|e| DomainError::Crop(format!("failed to decode source image: {}", e)))?;

    let (img_w, img_h) = (img.width() as i64, img.height() as i64);

    let padding = ((rect.width.min(rect.height) as f64) * PADDING_RATIO).round() as i64;
    let left = (rect.left - padding).max(0);
    let top = (rect.top - padding).max(0);
    let right = (left + rect.width + 2 * padding).min(img_w);
    let bottom = (top + rect.height + 2 * padding).min(img_h);

    if right <= left || bottom <= top {
        return Err(DomainError::Crop(format!(
            "face rectangle ({}, {}) {}x{} lies outside a {}x{} image",
            rect.left, rect.top, rect.width, rect.height, img_w, img_h
        )));
    }

    let cropped = img.crop_imm(
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    );
    let resized = cropped.resize_exact(CROP_SIZE, CROP_SIZE, FilterType::Lanczos3);

    let rgb = resized.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .encode(rgb.as_raw(), CROP_SIZE, CROP_SIZE, image::ExtendedColorType::Rgb8)
        .map_err(|e| DomainError::Crop(format!("failed to encode crop: {}", e)))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn test_image(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn decode(jpeg: &[u8]) -> image::DynamicImage {
        image::load_from_memory(jpeg).unwrap()
    }

    #[test]
    fn produces_fixed_size_jpeg() {
        let src = test_image(400, 300);
        let rect = BoundingBox { left: 50, top: 40, width: 100, height: 120 };

        let out = crop_face(&src, &rect).unwrap();

        // JPEG SOI marker
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
        let decoded = decode(&out);
        assert_eq!(decoded.width(), CROP_SIZE);
        assert_eq!(decoded.height(), CROP_SIZE);
    }

    #[test]
    fn deterministic_for_same_input() {
        let src = test_image(400, 300);
        let rect = BoundingBox { left: 10, top: 10, width: 100, height: 100 };

        let a = crop_face(&src, &rect).unwrap();
        let b = crop_face(&src, &rect).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn clamps_at_image_edges() {
        let src = test_image(120, 90);
        // Rectangle hugging the top-left corner: padding would go negative
        let corner = BoundingBox { left: 0, top: 0, width: 50, height: 50 };
        let out = crop_face(&src, &corner).unwrap();
        assert_eq!(decode(&out).width(), CROP_SIZE);

        // Rectangle running past the bottom-right corner
        let overhang = BoundingBox { left: 100, top: 70, width: 60, height: 60 };
        let out = crop_face(&src, &overhang).unwrap();
        assert_eq!(decode(&out).height(), CROP_SIZE);
    }

    #[test]
    fn rejects_rectangle_outside_image() {
        let src = test_image(100, 100);
        let rect = BoundingBox { left: 500, top: 500, width: 50, height: 50 };
        assert!(matches!(crop_face(&src, &rect), Err(DomainError::Crop(_))));
    }

    #[test]
    fn rejects_degenerate_rectangle() {
        let src = test_image(100, 100);
        let rect = BoundingBox { left: 10, top: 10, width: 0, height: 40 };
        assert!(matches!(crop_face(&src, &rect), Err(DomainError::Crop(_))));
    }

    #[test]
    fn rejects_undecodable_source() {
        let rect = BoundingBox { left: 0, top: 0, width: 10, height: 10 };
        assert!(matches!(
            crop_face(b"not an image", &rect),
            Err(DomainError::Crop(_))
        ));
    }
}
