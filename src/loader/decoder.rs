//! Decoding and transformation of fetched images using the image crate.
//!
//! Images are cropped to a centered square, resized to the requested edge
//! length and optionally masked to the inscribed circle.

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use tracing::trace;

/// Decodes encoded bytes. Animated GIFs yield their first frame.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("Failed to decode GIF")?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame.context("Failed to decode GIF frame")?;
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
        return Err(anyhow!("GIF has no frames"));
    }

    match format {
        Some(fmt) => {
            image::load_from_memory_with_format(bytes, fmt).context("Failed to decode image")
        }
        None => image::load_from_memory(bytes).context("Failed to decode image"),
    }
}

/// Crops the largest centered square out of the image.
pub fn square_crop(img: &DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    img.crop_imm(x, y, side, side)
}

/// Clears every pixel outside the circle inscribed in the image, with a one
/// pixel soft edge.
pub fn circular_mask(img: &mut RgbaImage) {
    let side = img.width().min(img.height()) as f32;
    let radius = side / 2.0;
    let cx = img.width() as f32 / 2.0;
    let cy = img.height() as f32 / 2.0;

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let distance = (dx * dx + dy * dy).sqrt();
        let coverage = (radius - distance + 0.5).clamp(0.0, 1.0);
        pixel.0[3] = (pixel.0[3] as f32 * coverage).round() as u8;
    }
}

/// Decodes and transforms bytes into the pixels handed to the widget.
///
/// A `size` of zero keeps the cropped source size.
pub fn prepare(bytes: &[u8], size: u32, circular: bool) -> Result<RgbaImage> {
    let img = decode(bytes)?;
    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(anyhow!("Image has no pixels"));
    }

    let square = square_crop(&img);
    let square = if size == 0 || size == square.width() {
        square
    } else {
        square.resize_exact(size, size, FilterType::CatmullRom)
    };

    let mut rgba = square.to_rgba8();
    if circular {
        circular_mask(&mut rgba);
    }

    trace!(
        src_width,
        src_height,
        width = rgba.width(),
        circular,
        "Prepared image"
    );
    Ok(rgba)
}

#[cfg(test)]
pub(crate) fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]))
    }

    #[test]
    fn test_decode_png() {
        let bytes = encode_png(&solid(5, 3));
        let img = decode(&bytes).unwrap();
        assert_eq!(img.dimensions(), (5, 3));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode(b"definitely not an image").is_err());
    }

    #[test]
    fn test_square_crop_is_centered() {
        let mut img = solid(30, 10);
        img.put_pixel(10, 5, Rgba([0, 0, 255, 255]));
        let square = square_crop(&DynamicImage::ImageRgba8(img));
        assert_eq!(square.dimensions(), (10, 10));
        assert_eq!(square.get_pixel(0, 5), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_circular_mask_clears_corners() {
        let mut img = solid(20, 20);
        circular_mask(&mut img);
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(19, 19).0[3], 0);
        assert_eq!(img.get_pixel(10, 10).0[3], 255);
    }

    #[test]
    fn test_prepare_resizes_to_square() {
        let bytes = encode_png(&solid(64, 32));
        let img = prepare(&bytes, 16, false).unwrap();
        assert_eq!(img.dimensions(), (16, 16));
        assert_eq!(img.get_pixel(0, 0).0[3], 255);

        let circle = prepare(&bytes, 16, true).unwrap();
        assert_eq!(circle.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_prepare_without_size_keeps_cropped_size() {
        let bytes = encode_png(&solid(12, 40));
        let img = prepare(&bytes, 0, false).unwrap();
        assert_eq!(img.dimensions(), (12, 12));
    }
}
