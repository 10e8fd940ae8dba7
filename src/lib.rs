//! # Pixelforge
//!
//! A deterministic image transformation pipeline with concurrent batch
//! processing. Callers hand in raw parameters, the resolver turns them into
//! an immutable spec, and the executor runs a fixed sequence of stages over
//! the decoded pixels.
//!
//! # Architecture: Resolve → Execute → Deliver
//!
//! ```text
//! 1. Resolve   raw key/value params  →  TransformSpec   (validation, defaults)
//! 2. Execute   bytes + TransformSpec →  PipelineOutput  (decode … encode)
//! 3. Deliver   PipelineOutput        →  file, zip entry, or derived artifact
//! ```
//!
//! Validation happens once, up front. A spec that reached the executor is
//! well-formed; the only remaining failures come from the image itself
//! (undecodable, crop outside), the background model, or storage.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`resolve`] | Raw parameters → validated [`resolve::TransformSpec`] |
//! | [`presets`] | Named parameter sets from config, overridable per request |
//! | [`imaging`] | Decode, pixel stages, watermark, encode |
//! | [`pipeline`] | Stage planning and execution, thumbnails, background removal |
//! | [`background`] | Lazily loaded segmentation model with per-call timeout |
//! | [`storage`] | `Storage` trait with local-disk and HTTP object-store backends |
//! | [`asset`] | Upload ingestion into [`asset::ImageAsset`] records |
//! | [`cache`] | Content-addressed derived artifacts keyed by spec hash |
//! | [`batch`] | Bounded-pool batch runs bundled into a zip archive |
//! | [`config`] | Layered `pixelforge.toml` loading and validation |
//! | [`error`] | The shared [`error::PipelineError`] taxonomy |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Fixed Stage Order
//!
//! The stage order never depends on the order parameters were supplied:
//!
//! ```text
//! decode → crop → resize → rotate → grayscale → enhance → compress → watermark → encode
//! ```
//!
//! Crop coordinates always refer to the original image, and the watermark is
//! drawn last so it is never blurred, resized, or rotated.
//!
//! ## Deterministic Output
//!
//! The same bytes and the same spec produce byte-identical output. Every
//! stage is a pure function of its input, the encoders are deterministic,
//! and batch archives carry fixed entry timestamps. The derived-artifact
//! cache in [`cache`] depends on this.
//!
//! ## Libraries Emit, Binaries Subscribe
//!
//! The library only emits `tracing` spans and events. The `pixelforge`
//! binary installs the subscriber and maps `-v` / `RUST_LOG` to a filter.

pub mod asset;
pub mod background;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod presets;
pub mod resolve;
pub mod storage;

pub use error::{PipelineError, Result};

#[cfg(test)]
pub(crate) mod test_helpers;
