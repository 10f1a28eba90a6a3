/// Memory-bounded image decoding
///
/// Dimensions are probed without allocating full pixel data, then the image is
/// decoded and shrunk by the largest power-of-two factor that keeps both edges
/// at or above the minimum working size.
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader};

pub fn decode_scaled(bytes: &[u8], min_edge: u32) -> Result<DynamicImage, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?;
    let (width, height) = reader.into_dimensions()?;

    let factor = downsample_factor(width, height, min_edge);

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .decode()?;

    if factor == 1 {
        return Ok(image);
    }
    Ok(image.resize_exact(width / factor, height / factor, FilterType::Lanczos3))
}

/// Largest power of two such that both edges, divided by it, stay >= `min_edge`
fn downsample_factor(width: u32, height: u32, min_edge: u32) -> u32 {
    let mut factor = 1;
    let (mut w, mut h) = (width, height);

    while w / 2 >= min_edge && h / 2 >= min_edge {
        w /= 2;
        h /= 2;
        factor *= 2;
    }
    factor
}
