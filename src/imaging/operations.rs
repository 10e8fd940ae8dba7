//! Pixel stages.
//!
//! Every function here is a pure `(buffer, params) -> buffer` step. The
//! executor in [`crate::pipeline`] decides which of them run and in what
//! order; nothing here knows about requests, storage, or encoding.

use super::calculations::{
    calculate_resize_dimensions, center_crop_for_aspect, clamp_crop,
};
use super::params::{CropRect, EnhanceParams, OutputFormat, ResizeTarget, Rotation, ThumbnailSize};
use crate::error::{PipelineError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

/// Gaussian sigma used by the compress stage for lossy targets.
const COMPRESS_BLUR_SIGMA: f32 = 0.6;

/// Bits kept per channel by the compress stage for PNG targets.
const COMPRESS_PNG_BITS: u8 = 5;

/// Crop to the rectangle's intersection with the image.
pub fn crop(img: DynamicImage, rect: CropRect) -> Result<DynamicImage> {
    let clipped = clamp_crop(img.dimensions(), rect).ok_or(PipelineError::OutOfBoundsCrop)?;
    Ok(img.crop_imm(clipped.x, clipped.y, clipped.width, clipped.height))
}

/// Scale to the target size with Lanczos3. Upscaling is allowed.
///
/// Both sides must stay within `max`, including a side derived from the
/// aspect ratio, which the resolver never sees.
pub fn resize(img: DynamicImage, target: ResizeTarget, max: u32) -> Result<DynamicImage> {
    let (w, h) = calculate_resize_dimensions(img.dimensions(), target);
    if w > max {
        return Err(PipelineError::invalid(
            "width",
            "derived dimension exceeds max_dimension",
        ));
    }
    if h > max {
        return Err(PipelineError::invalid(
            "height",
            "derived dimension exceeds max_dimension",
        ));
    }
    if (w, h) == img.dimensions() {
        return Ok(img);
    }
    Ok(img.resize_exact(w, h, FilterType::Lanczos3))
}

/// Lossless quarter-turn, counter-clockwise.
pub fn rotate(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Deg90 => img.rotate270(),
        Rotation::Deg180 => img.rotate180(),
        Rotation::Deg270 => img.rotate90(),
    }
}

/// Desaturate using Rec. 709 luma, keeping an alpha channel if present.
pub fn grayscale(img: DynamicImage) -> DynamicImage {
    let gray = img.grayscale();
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(gray.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(gray.to_rgb8())
    }
}

/// Fixed boost to sharpness, contrast, and saturation.
pub fn enhance(img: DynamicImage, params: &EnhanceParams) -> DynamicImage {
    let has_alpha = img.color().has_alpha();
    let sharpened = img.unsharpen(params.sharpening.sigma, params.sharpening.threshold);
    let contrasted = sharpened.adjust_contrast(params.contrast);
    let saturated = saturate(contrasted.to_rgba8(), params.saturation);

    if has_alpha {
        DynamicImage::ImageRgba8(saturated)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(saturated).to_rgb8())
    }
}

/// Scale each pixel's distance from its own luma by `factor`.
fn saturate(mut buf: RgbaImage, factor: f32) -> RgbaImage {
    for Rgba([r, g, b, _]) in buf.pixels_mut() {
        let (rf, gf, bf) = (f32::from(*r), f32::from(*g), f32::from(*b));
        let luma = 0.2126 * rf + 0.7152 * gf + 0.0722 * bf;
        let push = |c: f32| (luma + (c - luma) * factor).round().clamp(0.0, 255.0) as u8;
        *r = push(rf);
        *g = push(gf);
        *b = push(bf);
    }
    buf
}

/// Coarse, format-aware size reduction applied before encoding.
///
/// Lossy targets lose high-frequency noise (a light blur), which DCT-style
/// encoders would otherwise spend bytes on. PNG targets lose low-order
/// bits per channel, which shortens deflate's match distances.
pub fn compress(img: DynamicImage, target: OutputFormat) -> DynamicImage {
    if target.is_lossy() {
        return img.blur(COMPRESS_BLUR_SIGMA);
    }

    let has_alpha = img.color().has_alpha();
    let mask = 0xFFu8 << (8 - COMPRESS_PNG_BITS);
    let mut buf = img.to_rgba8();
    for Rgba([r, g, b, _]) in buf.pixels_mut() {
        *r &= mask;
        *g &= mask;
        *b &= mask;
    }
    if has_alpha {
        DynamicImage::ImageRgba8(buf)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(buf).to_rgb8())
    }
}

/// Center-crop to the target aspect ratio, then scale to the exact size.
pub fn thumbnail(img: DynamicImage, size: ThumbnailSize) -> DynamicImage {
    let rect = center_crop_for_aspect(img.dimensions(), (size.width, size.height));
    let cropped = img.crop_imm(rect.x, rect.y, rect.width, rect.height);
    if cropped.dimensions() == (size.width, size.height) {
        return cropped;
    }
    cropped.resize_exact(size.width, size.height, FilterType::Lanczos3)
}
