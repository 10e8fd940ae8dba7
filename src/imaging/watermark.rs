//! Text watermark stage.
//!
//! Text is drawn with the 8×8 bitmap glyphs from `font8x8`, scaled by an
//! integer factor and anchored to the bottom-right corner. Each glyph gets a
//! translucent white fill over a translucent black outline so it reads on
//! both light and dark backgrounds. Pixels that fall outside the image are
//! clipped; the stage never fails.

use super::calculations::watermark_scale;
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

const MARGIN: u32 = 10;
const GLYPH_PX: u32 = 8;
const FILL: Rgba<u8> = Rgba([255, 255, 255, 153]);
const OUTLINE: Rgba<u8> = Rgba([0, 0, 0, 128]);

fn glyph_for(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Overlay `text` near the bottom-right corner.
pub fn watermark(img: DynamicImage, text: &str) -> DynamicImage {
    let glyphs: Vec<[u8; 8]> = text.chars().map(glyph_for).collect();
    if glyphs.is_empty() {
        return img;
    }

    let has_alpha = img.color().has_alpha();
    let (width, height) = img.dimensions();
    let scale = watermark_scale(width, glyphs.len(), GLYPH_PX, MARGIN);
    let radius = i64::from((scale / 2).max(1));

    let text_w = glyphs.len() as i64 * i64::from(GLYPH_PX * scale);
    let text_h = i64::from(GLYPH_PX * scale);
    let origin_x = i64::from(width) - i64::from(MARGIN) - text_w;
    let origin_y = i64::from(height) - i64::from(MARGIN) - text_h;

    // Mask covers the text box plus the outline radius on every side.
    let mask_w = (text_w + 2 * radius) as usize;
    let mask_h = (text_h + 2 * radius) as usize;
    let mut fill = vec![false; mask_w * mask_h];
    for my in 0..mask_h {
        for mx in 0..mask_w {
            let tx = mx as i64 - radius;
            let ty = my as i64 - radius;
            fill[my * mask_w + mx] = glyph_bit(&glyphs, tx, ty, scale, text_w, text_h);
        }
    }
    let outline = dilate(&fill, mask_w, mask_h, radius as usize);

    let mut buf = img.to_rgba8();
    for my in 0..mask_h {
        let y = origin_y - radius + my as i64;
        if y < 0 || y >= i64::from(height) {
            continue;
        }
        for mx in 0..mask_w {
            let x = origin_x - radius + mx as i64;
            if x < 0 || x >= i64::from(width) {
                continue;
            }
            let idx = my * mask_w + mx;
            let paint = if fill[idx] {
                FILL
            } else if outline[idx] {
                OUTLINE
            } else {
                continue;
            };
            blend(&mut buf, x as u32, y as u32, paint);
        }
    }

    if has_alpha {
        DynamicImage::ImageRgba8(buf)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(buf).to_rgb8())
    }
}

fn glyph_bit(glyphs: &[[u8; 8]], tx: i64, ty: i64, scale: u32, text_w: i64, text_h: i64) -> bool {
    if tx < 0 || ty < 0 || tx >= text_w || ty >= text_h {
        return false;
    }
    let cell_x = (tx / i64::from(scale)) as usize;
    let row = (ty / i64::from(scale)) as usize;
    let glyph = glyphs[cell_x / GLYPH_PX as usize];
    let col = cell_x % GLYPH_PX as usize;
    (glyph[row] >> col) & 1 == 1
}

/// Square max-filter of `radius`, done as two separable sliding-window passes.
fn dilate(mask: &[bool], w: usize, h: usize, radius: usize) -> Vec<bool> {
    let mut horiz = vec![false; w * h];
    for y in 0..h {
        let row = &mask[y * w..(y + 1) * w];
        let mut count = row[..radius.min(w)].iter().filter(|&&b| b).count();
        for x in 0..w {
            if x + radius < w && row[x + radius] {
                count += 1;
            }
            if x > radius && row[x - radius - 1] {
                count -= 1;
            }
            horiz[y * w + x] = count > 0;
        }
    }

    let mut out = vec![false; w * h];
    for x in 0..w {
        let mut count = (0..radius.min(h)).filter(|&y| horiz[y * w + x]).count();
        for y in 0..h {
            if y + radius < h && horiz[(y + radius) * w + x] {
                count += 1;
            }
            if y > radius && horiz[(y - radius - 1) * w + x] {
                count -= 1;
            }
            out[y * w + x] = count > 0;
        }
    }
    out
}

fn blend(buf: &mut RgbaImage, x: u32, y: u32, paint: Rgba<u8>) {
    let px = buf.get_pixel_mut(x, y);
    let a = u32::from(paint[3]);
    for c in 0..3 {
        px[c] = ((u32::from(px[c]) * (255 - a) + u32::from(paint[c]) * a + 127) / 255) as u8;
    }
    px[3] = px[3].max(paint[3]);
}
