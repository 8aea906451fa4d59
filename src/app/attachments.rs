use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;

use crate::domain::error::{MuralError, MuralResult};

const JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_bytes: usize,
    pub max_dimension: u32,
}

/// Decodes an uploaded image, shrinks it to fit `max_dimension` on its longest
/// side and returns it as an inline JPEG data URL.
pub fn prepare_image(data: &[u8], limits: ImageLimits) -> MuralResult<String> {
    if data.is_empty() {
        return Err(MuralError::validation("image is empty"));
    }
    if data.len() > limits.max_bytes {
        return Err(MuralError::validation(format!(
            "image must be at most {} bytes",
            limits.max_bytes
        )));
    }

    let image = image::load_from_memory(data)
        .map_err(|err| MuralError::validation(format!("unsupported image: {}", err)))?;
    let (width, height) = image.dimensions();
    let image = if width.max(height) > limits.max_dimension {
        image.resize(limits.max_dimension, limits.max_dimension, FilterType::Triangle)
    } else {
        image
    };

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&image.to_rgb8())
        .map_err(|err| MuralError::validation(format!("failed to encode image: {}", err)))?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn decode(data_url: &str) -> DynamicImage {
        let payload = data_url.strip_prefix("data:image/jpeg;base64,").unwrap();
        image::load_from_memory(&STANDARD.decode(payload).unwrap()).unwrap()
    }

    #[test]
    fn large_images_shrink_to_the_longest_side() {
        let limits = ImageLimits {
            max_bytes: 1 << 20,
            max_dimension: 40,
        };
        let url = prepare_image(&png(200, 100), limits).unwrap();
        assert_eq!(decode(&url).dimensions(), (40, 20));
    }

    #[test]
    fn small_images_keep_their_size() {
        let limits = ImageLimits {
            max_bytes: 1 << 20,
            max_dimension: 40,
        };
        let url = prepare_image(&png(10, 12), limits).unwrap();
        assert_eq!(decode(&url).dimensions(), (10, 12));
    }

    #[test]
    fn garbage_is_a_validation_error() {
        let limits = ImageLimits {
            max_bytes: 1 << 20,
            max_dimension: 40,
        };
        assert!(matches!(
            prepare_image(b"not an image", limits),
            Err(MuralError::Validation(_))
        ));
    }
}
