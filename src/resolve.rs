//! Parameter resolution: raw string options → typed [`TransformSpec`].
//!
//! Resolution happens in two steps:
//!
//! 1. [`TransformRequest::parse`] performs every validation. The output
//!    format stays optional because "keep the source format" can only be
//!    decided per image.
//! 2. [`TransformRequest::resolve`] fills in the output format from the
//!    source and cannot fail.
//!
//! A batch parses once and resolves per item, so invalid shared parameters
//! fail the request before any image is read.
//!
//! ## Accepted keys
//!
//! | Key | Value |
//! |---|---|
//! | `width`, `height` | integer in `1..=max_dimension` |
//! | `crop_x`, `crop_y` | integer (may be negative) |
//! | `crop_width`, `crop_height` | positive integer; all four crop keys or none |
//! | `rotate` | `90`, `180`, or `270` |
//! | `watermark` | text, empty means none |
//! | `grayscale`, `enhance`, `compress`, `optimize` | `true` / `false` |
//! | `format` | `jpeg`, `jpg`, `png`, `webp` |
//! | `quality` | integer, clamped to `1..=100` |
//! | `size` | thumbnail `<W>x<H>` |
//! | `download` | `true` / `false`, delivery only |
//!
//! Unknown keys are ignored.

use crate::config::{EngineConfig, TransformConfig};
use crate::error::{PipelineError, Result};
use crate::imaging::{CropRect, OutputFormat, Quality, ResizeTarget, Rotation, ThumbnailSize};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Untyped request parameters as they arrive from a query string, a CLI,
/// or a preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParams(BTreeMap<String, String>);

impl RawParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lay `overrides` on top of `self`. Keys present in both take the
    /// value from `overrides`.
    pub fn overlay(mut self, overrides: &RawParams) -> Self {
        for (k, v) in &overrides.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    /// Parse one `key=value` pair, as given on the command line.
    pub fn parse_pair(pair: &str) -> Result<(String, String)> {
        match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
            _ => Err(PipelineError::invalid(pair, "expected key=value")),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Defaults and bounds the resolver applies.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvePolicy {
    pub default_quality: Quality,
    pub max_dimension: u32,
    pub max_watermark_len: usize,
    pub default_thumbnail: ThumbnailSize,
    pub max_thumbnail: u32,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ResolvePolicy {
    fn from(config: &EngineConfig) -> Self {
        let [w, h] = config.thumbnail.default_size;
        Self {
            default_quality: Quality::new(config.transform.default_quality),
            max_dimension: config.transform.max_dimension,
            max_watermark_len: config.watermark.max_length,
            default_thumbnail: ThumbnailSize {
                width: w,
                height: h,
            },
            max_thumbnail: config.thumbnail.max_size,
        }
    }
}

/// Validated transform parameters whose output format may still depend on
/// the source image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformRequest {
    pub resize: Option<ResizeTarget>,
    pub crop: Option<CropRect>,
    pub rotate: Option<Rotation>,
    pub watermark: Option<String>,
    pub grayscale: bool,
    pub enhance: bool,
    pub compress: bool,
    /// `None` keeps the source format.
    pub format: Option<OutputFormat>,
    pub quality: Quality,
    /// Bound on both output sides, including one derived from the aspect ratio.
    pub max_dimension: u32,
}

/// Fully resolved, immutable transform description.
///
/// Every absent option is a no-op stage; `format` and `quality` are always
/// concrete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformSpec {
    pub resize: Option<ResizeTarget>,
    pub crop: Option<CropRect>,
    pub rotate: Option<Rotation>,
    pub watermark: Option<String>,
    pub grayscale: bool,
    pub enhance: bool,
    pub compress: bool,
    pub format: OutputFormat,
    pub quality: Quality,
    /// Not part of the cache key; it only decides whether a resize may run.
    pub max_dimension: u32,
}

impl TransformSpec {
    /// A spec that only re-encodes.
    pub fn encode_only(format: OutputFormat, quality: Quality) -> Self {
        Self {
            resize: None,
            crop: None,
            rotate: None,
            watermark: None,
            grayscale: false,
            enhance: false,
            compress: false,
            format,
            quality,
            max_dimension: TransformConfig::default().max_dimension,
        }
    }

    /// `optimize` is shorthand for enhance + compress.
    pub fn is_optimized(&self) -> bool {
        self.enhance && self.compress
    }
}

impl TransformRequest {
    /// Validate raw parameters. Fails with the first offending key.
    pub fn parse(params: &RawParams, policy: &ResolvePolicy) -> Result<Self> {
        let resize = parse_resize(params, policy)?;
        let crop = parse_crop(params)?;

        let rotate = match parse_int(params, "rotate")? {
            Some(deg) => Some(
                Rotation::from_degrees(deg)
                    .ok_or_else(|| PipelineError::invalid("rotate", "unsupported rotation"))?,
            ),
            None => None,
        };

        let watermark = match params.get("watermark") {
            Some(text) if text.chars().count() > policy.max_watermark_len => {
                return Err(PipelineError::invalid("watermark", "watermark too long"));
            }
            Some(text) if !text.is_empty() => Some(text.to_string()),
            _ => None,
        };

        let grayscale = parse_bool(params, "grayscale")?.unwrap_or(false);
        let optimize = parse_bool(params, "optimize")?.unwrap_or(false);
        let explicit_enhance = parse_bool(params, "enhance")?;
        let explicit_compress = parse_bool(params, "compress")?;
        // Either explicit flag switches `optimize` off; explicit values win.
        let (enhance, compress) = if optimize && explicit_enhance.is_none() && explicit_compress.is_none() {
            (true, true)
        } else {
            (
                explicit_enhance.unwrap_or(false),
                explicit_compress.unwrap_or(false),
            )
        };

        let format = match params.get("format") {
            Some(value) => Some(
                OutputFormat::parse(value)
                    .ok_or_else(|| PipelineError::UnsupportedFormat(value.to_string()))?,
            ),
            None => None,
        };

        let quality = match parse_int(params, "quality")? {
            Some(q) => Quality::from_i64(q),
            None => policy.default_quality,
        };

        Ok(Self {
            resize,
            crop,
            rotate,
            watermark,
            grayscale,
            enhance,
            compress,
            format,
            quality,
            max_dimension: policy.max_dimension,
        })
    }

    /// Fix the output format against the source image.
    pub fn resolve(&self, source: ImageFormat) -> TransformSpec {
        TransformSpec {
            resize: self.resize,
            crop: self.crop,
            rotate: self.rotate,
            watermark: self.watermark.clone(),
            grayscale: self.grayscale,
            enhance: self.enhance,
            compress: self.compress,
            format: self
                .format
                .unwrap_or_else(|| OutputFormat::from_source(source)),
            quality: self.quality,
            max_dimension: self.max_dimension,
        }
    }
}

/// Parse and resolve in one step for a single image.
pub fn resolve(
    params: &RawParams,
    policy: &ResolvePolicy,
    source: ImageFormat,
) -> Result<TransformSpec> {
    Ok(TransformRequest::parse(params, policy)?.resolve(source))
}

/// How the caller wants the result delivered. Never affects output bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Serve as an attachment rather than inline.
    pub download: bool,
}

impl DeliveryOptions {
    pub fn parse(params: &RawParams) -> Result<Self> {
        Ok(Self {
            download: parse_bool(params, "download")?.unwrap_or(false),
        })
    }
}

/// Resolve the thumbnail `size` parameter, falling back to the default.
pub fn resolve_thumbnail_size(params: &RawParams, policy: &ResolvePolicy) -> Result<ThumbnailSize> {
    match params.get("size") {
        Some(value) => parse_size(value, policy.max_thumbnail),
        None => Ok(policy.default_thumbnail),
    }
}

/// Parse `<W>x<H>` with each side in `1..=max`.
pub fn parse_size(value: &str, max: u32) -> Result<ThumbnailSize> {
    let malformed = || PipelineError::invalid("size", "expected <width>x<height>");
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(malformed)?;
    let width: u32 = w.trim().parse().map_err(|_| malformed())?;
    let height: u32 = h.trim().parse().map_err(|_| malformed())?;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(PipelineError::invalid(
            "size",
            format!("each side must be between 1 and {max}"),
        ));
    }
    Ok(ThumbnailSize { width, height })
}

fn parse_int(params: &RawParams, key: &str) -> Result<Option<i64>> {
    params
        .get(key)
        .map(|v| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| PipelineError::invalid(key, "must be an integer"))
        })
        .transpose()
}

fn parse_bool(params: &RawParams, key: &str) -> Result<Option<bool>> {
    params
        .get(key)
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(PipelineError::invalid(key, "must be true or false")),
        })
        .transpose()
}

fn parse_positive(params: &RawParams, key: &str, max: u32) -> Result<Option<u32>> {
    match parse_int(params, key)? {
        None => Ok(None),
        Some(v) if v < 1 => Err(PipelineError::invalid(key, "must be positive")),
        Some(v) if v > i64::from(max) => Err(PipelineError::invalid(
            key,
            format!("must not exceed {max}"),
        )),
        Some(v) => Ok(Some(v as u32)),
    }
}

fn parse_resize(params: &RawParams, policy: &ResolvePolicy) -> Result<Option<ResizeTarget>> {
    let width = parse_positive(params, "width", policy.max_dimension)?;
    let height = parse_positive(params, "height", policy.max_dimension)?;
    if width.is_none() && height.is_none() {
        return Ok(None);
    }
    Ok(Some(ResizeTarget { width, height }))
}

fn parse_crop(params: &RawParams) -> Result<Option<CropRect>> {
    let x = parse_int(params, "crop_x")?;
    let y = parse_int(params, "crop_y")?;
    let width = parse_positive(params, "crop_width", u32::MAX)?;
    let height = parse_positive(params, "crop_height", u32::MAX)?;
    match (x, y, width, height) {
        (None, None, None, None) => Ok(None),
        (Some(x), Some(y), Some(width), Some(height)) => Ok(Some(CropRect {
            x,
            y,
            width,
            height,
        })),
        _ => Err(PipelineError::invalid("crop", "incomplete crop")),
    }
}
