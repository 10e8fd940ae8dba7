//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{CropRect, ResizeTarget};

/// Pixel rectangle fully inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Intersect a user crop rectangle with the image bounds.
///
/// Returns `None` when the intersection is empty, i.e. the rectangle lies
/// entirely outside the image.
///
/// # Examples
/// ```
/// # use pixelforge::imaging::calculations::{clamp_crop, PixelRect};
/// # use pixelforge::imaging::CropRect;
/// // 300x300 crop at (200, 100) on a 400x300 image keeps 200x200
/// let rect = CropRect { x: 200, y: 100, width: 300, height: 300 };
/// assert_eq!(
///     clamp_crop((400, 300), rect),
///     Some(PixelRect { x: 200, y: 100, width: 200, height: 200 })
/// );
/// ```
pub fn clamp_crop(image: (u32, u32), rect: CropRect) -> Option<PixelRect> {
    let (img_w, img_h) = (i64::from(image.0), i64::from(image.1));

    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = rect.x.saturating_add(i64::from(rect.width)).min(img_w);
    let y1 = rect.y.saturating_add(i64::from(rect.height)).min(img_h);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(PixelRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}

/// Resolve a resize target against the current image size.
///
/// When only one side is given, the other follows the source aspect ratio,
/// rounded to the nearest pixel and never smaller than 1.
pub fn calculate_resize_dimensions(source: (u32, u32), target: ResizeTarget) -> (u32, u32) {
    let (src_w, src_h) = source;

    match (target.width, target.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let h = (w as f64 * src_h as f64 / src_w as f64).round() as u32;
            (w, h.max(1))
        }
        (None, Some(h)) => {
            let w = (h as f64 * src_w as f64 / src_h as f64).round() as u32;
            (w.max(1), h)
        }
        (None, None) => source,
    }
}

/// Largest centered rectangle of the target aspect ratio inside the source.
///
/// Thumbnails crop to this rectangle first and then scale, so the output
/// is never distorted.
pub fn center_crop_for_aspect(source: (u32, u32), target: (u32, u32)) -> PixelRect {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    // Compare src_w/src_h with tgt_w/tgt_h without floating point.
    let lhs = u64::from(src_w) * u64::from(tgt_h);
    let rhs = u64::from(tgt_w) * u64::from(src_h);

    if lhs > rhs {
        // Source is wider: keep full height, trim the sides
        let w = ((u64::from(src_h) * u64::from(tgt_w)) as f64 / tgt_h as f64).round() as u32;
        let w = w.clamp(1, src_w);
        PixelRect {
            x: (src_w - w) / 2,
            y: 0,
            width: w,
            height: src_h,
        }
    } else {
        // Source is taller (or equal): keep full width, trim top and bottom
        let h = ((u64::from(src_w) * u64::from(tgt_h)) as f64 / tgt_w as f64).round() as u32;
        let h = h.clamp(1, src_h);
        PixelRect {
            x: 0,
            y: (src_h - h) / 2,
            width: src_w,
            height: h,
        }
    }
}

/// Integer glyph scale for a watermark of `chars` characters drawn with
/// `glyph_px`-pixel glyphs.
///
/// Targets a glyph height of `max(20, width / 20)` pixels, then shrinks so
/// the text plus `margin` on both sides fits the image width. Never below 1;
/// text that still does not fit is clipped by the renderer.
pub fn watermark_scale(image_width: u32, chars: usize, glyph_px: u32, margin: u32) -> u32 {
    let target_height = (image_width / 20).max(20);
    let mut scale = (target_height / glyph_px).max(1);

    let available = image_width.saturating_sub(margin * 2);
    let text_px = |s: u32| (chars as u64) * u64::from(glyph_px) * u64::from(s);
    while scale > 1 && text_px(scale) > u64::from(available) {
        scale -= 1;
    }
    scale
}
