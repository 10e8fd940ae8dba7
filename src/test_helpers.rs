//! Shared test utilities for the pixelforge test suite.
//!
//! Provides synthetic images and their encoded bytes so tests never depend
//! on fixture files.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let img = gradient_image(64, 48);
//! let bytes = png_bytes(64, 48);
//! let decoded = crate::imaging::decode(&bytes).unwrap();
//! assert_eq!(decoded.image.to_rgb8(), img.to_rgb8());
//! ```
//!
//! Mocks for the storage and model seams live next to their traits:
//! [`crate::storage::tests::MemoryStore`] and
//! [`crate::background::tests::MockModel`].

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

// =========================================================================
// Synthetic images
// =========================================================================

/// Deterministic RGB gradient with a diagonal stripe, so crops, rotations,
/// and flips all produce distinguishable output.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let b = if (x + y) % 16 < 8 { 200 } else { 40 };
        Rgb([r, g, b])
    }))
}

/// Subject on a flat background: a dark square centered on near-white.
pub fn subject_on_background(width: u32, height: u32) -> DynamicImage {
    let (x0, x1) = (width / 4, width * 3 / 4);
    let (y0, y1) = (height / 4, height * 3 / 4);
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            Rgb([30, 60, 120])
        } else {
            Rgb([245, 245, 245])
        }
    }))
}

// =========================================================================
// Encoded bytes
// =========================================================================

/// Encode an image into `format` with the `image` crate's defaults.
pub fn encode_as(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_as(&gradient_image(width, height), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_as(&gradient_image(width, height), ImageFormat::Jpeg)
}

pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    let rgba = DynamicImage::ImageRgba8(gradient_image(width, height).to_rgba8());
    encode_as(&rgba, ImageFormat::Gif)
}

pub fn tiff_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_as(&gradient_image(width, height), ImageFormat::Tiff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn encoded_helpers_sniff_as_their_format() {
        assert_eq!(image::guess_format(&png_bytes(4, 4)).unwrap(), ImageFormat::Png);
        assert_eq!(image::guess_format(&jpeg_bytes(4, 4)).unwrap(), ImageFormat::Jpeg);
        assert_eq!(image::guess_format(&gif_bytes(4, 4)).unwrap(), ImageFormat::Gif);
        assert_eq!(image::guess_format(&tiff_bytes(4, 4)).unwrap(), ImageFormat::Tiff);
    }

    #[test]
    fn gradient_is_not_uniform() {
        let img = gradient_image(32, 32);
        assert_ne!(img.get_pixel(0, 0), img.get_pixel(31, 31));
    }
}
