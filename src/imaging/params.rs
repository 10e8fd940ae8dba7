//! Parameter types for image stages.
//!
//! These structs describe *what* a stage does, not *how*. The resolver
//! builds them from raw strings once; stages only ever see these typed
//! values.
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 85). Clamped on construction.
//! - [`OutputFormat`] — The three encodable formats (JPEG, PNG, WebP).
//! - [`Rotation`] — Quarter-turn rotations; anything else is unrepresentable.
//! - [`CropRect`] — User-space crop rectangle, may extend past the image.
//! - [`ResizeTarget`] — Width and/or height; a missing side follows the aspect ratio.
//! - [`ThumbnailSize`] — Exact thumbnail box.
//! - [`Sharpening`] / [`EnhanceParams`] — Fixed filter constants.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    /// Clamp an arbitrary signed integer, as parsed from a request.
    pub fn from_i64(value: i64) -> Self {
        Self(value.clamp(1, 100) as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Encodable output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    /// Parse a user-supplied format name (`jpeg`, `jpg`, `png`, `webp`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Output format used when the caller keeps the source format.
    ///
    /// Sources we can decode but not encode (GIF, TIFF) fall back to PNG,
    /// which is lossless and keeps any alpha channel.
    pub fn from_source(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => Self::Jpeg,
            ImageFormat::WebP => Self::Webp,
            _ => Self::Png,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// Whether the encoder honours [`Quality`].
    pub fn is_lossy(self) -> bool {
        !matches!(self, Self::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Quarter-turn rotation, counter-clockwise for positive degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees {
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn swaps_dimensions(self) -> bool {
        !matches!(self, Self::Deg180)
    }
}

/// Crop rectangle in source-image coordinates.
///
/// The origin may be negative and the extent may run past the image edge;
/// the crop stage clips it to the image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Requested output size. At least one side is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResizeTarget {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Exact thumbnail dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThumbnailSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self {
            width: 150,
            height: 150,
        }
    }
}

/// Sharpening parameters for unsharp mask.
///
/// - `sigma`: Standard deviation of the Gaussian blur (higher = more sharpening)
/// - `threshold`: Minimum brightness difference to sharpen (0 = sharpen all pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sharpening {
    pub sigma: f32,
    pub threshold: i32,
}

impl Sharpening {
    /// Sharpening applied by the enhance stage.
    pub fn enhance() -> Self {
        Self {
            sigma: 1.0,
            threshold: 2,
        }
    }
}

/// Fixed constants of the enhance stage. Not user-tunable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceParams {
    pub sharpening: Sharpening,
    /// Contrast change in percent, as `image::imageops::contrast` takes it.
    pub contrast: f32,
    /// Saturation multiplier (1.0 = unchanged).
    pub saturation: f32,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            sharpening: Sharpening::enhance(),
            contrast: 12.0,
            saturation: 1.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
        assert_eq!(Quality::from_i64(-20).value(), 1);
        assert_eq!(Quality::from_i64(1_000_000).value(), 100);
    }

    #[test]
    fn quality_default_is_85() {
        assert_eq!(Quality::default().value(), 85);
    }

    #[test]
    fn output_format_parse_accepts_aliases() {
        assert_eq!(OutputFormat::parse("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::parse("jpeg"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::parse(" Png "), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::parse("webp"), Some(OutputFormat::Webp));
        assert_eq!(OutputFormat::parse("gif"), None);
        assert_eq!(OutputFormat::parse(""), None);
    }

    #[test]
    fn output_format_from_source_falls_back_to_png() {
        assert_eq!(OutputFormat::from_source(ImageFormat::Jpeg), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_source(ImageFormat::WebP), OutputFormat::Webp);
        assert_eq!(OutputFormat::from_source(ImageFormat::Gif), OutputFormat::Png);
        assert_eq!(OutputFormat::from_source(ImageFormat::Tiff), OutputFormat::Png);
    }

    #[test]
    fn rotation_only_quarter_turns() {
        assert_eq!(Rotation::from_degrees(90), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(270), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::from_degrees(0), None);
        assert_eq!(Rotation::from_degrees(-90), None);
        assert!(Rotation::Deg90.swaps_dimensions());
        assert!(!Rotation::Deg180.swaps_dimensions());
    }

    #[test]
    fn enhance_defaults() {
        let p = EnhanceParams::default();
        assert_eq!(p.sharpening.sigma, 1.0);
        assert_eq!(p.sharpening.threshold, 2);
        assert!(p.saturation > 1.0);
    }
}
