//! Image stages — decode, pixel operations, encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode / probe** | `image::load_from_memory_with_format`, `ImageReader::into_dimensions` |
//! | **Crop / resize / rotate** | `crop_imm`, Lanczos3 `resize_exact`, `rotate90/180/270` |
//! | **Grayscale / enhance / compress** | `grayscale`, `unsharpen` + `adjust_contrast`, `blur` / posterize |
//! | **Watermark** | `font8x8` bitmap glyphs, alpha-blended |
//! | **Encode** | `JpegEncoder`, `PngEncoder`, `webp::Encoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for geometry math (unit testable)
//! - **Parameters**: Typed stage parameters built by the resolver
//! - **Codec**: Bytes ↔ pixel buffer
//! - **Operations**: One function per pixel stage
//! - **Watermark**: Text overlay

pub mod calculations;
pub mod codec;
pub mod operations;
mod params;
pub mod watermark;

pub use codec::{Decoded, decode, encode, probe};
pub use params::{
    CropRect, EnhanceParams, OutputFormat, Quality, ResizeTarget, Rotation, Sharpening,
    ThumbnailSize,
};
