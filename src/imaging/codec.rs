//! Decode and encode stages.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff + decode (JPEG, PNG, WebP, GIF, TIFF) | `image::load_from_memory` |
//! | Probe dimensions without decoding pixels | `image::ImageReader::into_dimensions` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality-driven) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless) |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy, quality-driven) |

use super::params::{OutputFormat, Quality};
use crate::error::{PipelineError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

/// A decoded source image and the container format it came from.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// Sniff the container format from magic bytes.
pub fn sniff(bytes: &[u8]) -> Result<ImageFormat> {
    image::guess_format(bytes)
        .map_err(|e| PipelineError::UnsupportedInput(format!("unrecognized image data: {e}")))
}

/// Decode raw bytes into a pixel buffer.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
    if bytes.is_empty() {
        return Err(PipelineError::UnsupportedInput("empty input".into()));
    }
    let format = sniff(bytes)?;
    let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        PipelineError::UnsupportedInput(format!("failed to decode {format:?}: {e}"))
    })?;
    Ok(Decoded { image, format })
}

/// Read format and dimensions from the header only.
pub fn probe(bytes: &[u8]) -> Result<(ImageFormat, u32, u32)> {
    let format = sniff(bytes)?;
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| PipelineError::UnsupportedInput(format!("failed to read dimensions: {e}")))?;
    Ok((format, width, height))
}

/// Serialize the final pixel buffer.
///
/// `compact` selects the encoder's smallest-output settings; it is set when
/// the compress stage is active. PNG ignores `quality`.
pub fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
    compact: bool,
) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Jpeg => encode_jpeg(img, quality),
        OutputFormat::Png => encode_png(img, compact),
        OutputFormat::Webp => encode_webp(img, quality),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>> {
    // JPEG has no alpha channel.
    let rgb = if img.color().has_alpha() {
        flatten_onto_white(img)
    } else {
        img.to_rgb8()
    };
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
    DynamicImage::ImageRgb8(rgb)
        .write_with_encoder(encoder)
        .map_err(|e| PipelineError::EncodeFailed(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage, compact: bool) -> Result<Vec<u8>> {
    let normalized = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let (compression, filter) = if compact {
        (CompressionType::Best, PngFilter::Adaptive)
    } else {
        (CompressionType::Default, PngFilter::Adaptive)
    };
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression, filter);
    normalized
        .write_with_encoder(encoder)
        .map_err(|e| PipelineError::EncodeFailed(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>> {
    let (width, height) = (img.width(), img.height());
    let q = quality.value() as f32;
    let memory = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode(q)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode(q)
    };
    if memory.is_empty() {
        return Err(PipelineError::EncodeFailed(
            "WebP encoder produced no output".into(),
        ));
    }
    Ok(memory.to_vec())
}

/// Composite any alpha channel over an opaque white background.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let a = u32::from(p[3]);
        let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        image::Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}
