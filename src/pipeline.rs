//! Pipeline executor.
//!
//! A transform is planned as an explicit list of [`Stage`]s and then run
//! front to back over one pixel buffer. The order is fixed:
//!
//! ```text
//! decode → crop → resize → rotate → grayscale → enhance → compress → watermark → encode
//! ```
//!
//! Absent options contribute no stage. The first failing stage aborts the
//! run with its own error and no bytes are produced.
//!
//! Thumbnails and background removal reuse the same executor with their
//! own short plans (`decode → thumbnail → encode` and
//! `decode → remove_background → encode`).

use crate::asset::ImageAsset;
use crate::background::BackgroundRemover;
use crate::error::{PipelineError, Result};
use crate::imaging::codec::sniff;
use crate::imaging::{
    CropRect, EnhanceParams, OutputFormat, Quality, ResizeTarget, Rotation, ThumbnailSize,
    decode, encode, operations, watermark,
};
use crate::resolve::{TransformRequest, TransformSpec};
use crate::storage::Storage;
use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use tracing::{debug, info_span};

/// One step of an execution plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Decode,
    Crop(CropRect),
    /// `max` bounds both output sides.
    Resize { target: ResizeTarget, max: u32 },
    Rotate(Rotation),
    Grayscale,
    Enhance(EnhanceParams),
    Compress(OutputFormat),
    Watermark(String),
    Thumbnail(ThumbnailSize),
    RemoveBackground,
    Encode {
        format: OutputFormat,
        quality: Quality,
        compact: bool,
    },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Crop(_) => "crop",
            Stage::Resize { .. } => "resize",
            Stage::Rotate(_) => "rotate",
            Stage::Grayscale => "grayscale",
            Stage::Enhance(_) => "enhance",
            Stage::Compress(_) => "compress",
            Stage::Watermark(_) => "watermark",
            Stage::Thumbnail(_) => "thumbnail",
            Stage::RemoveBackground => "remove_background",
            Stage::Encode { .. } => "encode",
        }
    }
}

/// Encoded output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutput {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl PipelineOutput {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Outcome of one pipeline run: output bytes and metadata, or the error of
/// the stage that failed.
pub type PipelineResult = Result<PipelineOutput>;

/// Stage list for a resolved transform.
pub fn plan(spec: &TransformSpec) -> Vec<Stage> {
    let mut stages = vec![Stage::Decode];
    if let Some(rect) = spec.crop {
        stages.push(Stage::Crop(rect));
    }
    if let Some(target) = spec.resize {
        stages.push(Stage::Resize {
            target,
            max: spec.max_dimension,
        });
    }
    if let Some(rotation) = spec.rotate {
        stages.push(Stage::Rotate(rotation));
    }
    if spec.grayscale {
        stages.push(Stage::Grayscale);
    }
    if spec.enhance {
        stages.push(Stage::Enhance(EnhanceParams::default()));
    }
    if spec.compress {
        stages.push(Stage::Compress(spec.format));
    }
    if let Some(text) = &spec.watermark {
        stages.push(Stage::Watermark(text.clone()));
    }
    stages.push(Stage::Encode {
        format: spec.format,
        quality: spec.quality,
        compact: spec.compress,
    });
    stages
}

/// Run a plan over `bytes`.
///
/// `remover` is only consulted by a [`Stage::RemoveBackground`].
pub fn run(
    bytes: &[u8],
    stages: &[Stage],
    remover: Option<&BackgroundRemover>,
) -> PipelineResult {
    let _span = info_span!("pipeline", stages = stages.len(), input_bytes = bytes.len()).entered();
    let mut pixels: Option<DynamicImage> = None;

    for stage in stages {
        if let Stage::Decode = stage {
            let decoded = decode(bytes)?;
            debug!(
                stage = "decode",
                source = ?decoded.format,
                width = decoded.image.width(),
                height = decoded.image.height()
            );
            pixels = Some(decoded.image);
            continue;
        }

        let img = pixels
            .take()
            .ok_or_else(|| PipelineError::UnsupportedInput(format!("{} before decode", stage.name())))?;

        if let Stage::Encode {
            format,
            quality,
            compact,
        } = stage
        {
            let (width, height) = img.dimensions();
            let bytes = encode(&img, *format, *quality, *compact)?;
            debug!(stage = "encode", %format, bytes = bytes.len());
            return Ok(PipelineOutput {
                bytes,
                format: *format,
                width,
                height,
            });
        }

        let img = apply(img, stage, remover)?;
        debug!(stage = stage.name(), width = img.width(), height = img.height());
        pixels = Some(img);
    }

    Err(PipelineError::EncodeFailed("plan has no encode stage".into()))
}

fn apply(img: DynamicImage, stage: &Stage, remover: Option<&BackgroundRemover>) -> Result<DynamicImage> {
    Ok(match stage {
        Stage::Crop(rect) => operations::crop(img, *rect)?,
        Stage::Resize { target, max } => operations::resize(img, *target, *max)?,
        Stage::Rotate(rotation) => operations::rotate(img, *rotation),
        Stage::Grayscale => operations::grayscale(img),
        Stage::Enhance(params) => operations::enhance(img, params),
        Stage::Compress(format) => operations::compress(img, *format),
        Stage::Watermark(text) => watermark::watermark(img, text),
        Stage::Thumbnail(size) => operations::thumbnail(img, *size),
        Stage::RemoveBackground => {
            let remover = remover.ok_or_else(|| {
                PipelineError::ModelUnavailable("no background removal model configured".into())
            })?;
            DynamicImage::ImageRgba8(remover.remove(img)?)
        }
        Stage::Decode | Stage::Encode { .. } => img,
    })
}

/// Apply a resolved transform to raw image bytes.
pub fn execute(bytes: &[u8], spec: &TransformSpec) -> PipelineResult {
    run(bytes, &plan(spec), None)
}

/// Resolve `request` against the sniffed source format, then execute.
pub fn execute_request(bytes: &[u8], request: &TransformRequest) -> PipelineResult {
    let spec = request.resolve(sniff(bytes)?);
    execute(bytes, &spec)
}

/// Read an asset's original through storage and transform it.
pub fn execute_asset(
    storage: &dyn Storage,
    asset: &ImageAsset,
    request: &TransformRequest,
) -> PipelineResult {
    let bytes = storage.get(&asset.storage_key)?;
    execute_request(&bytes, request)
}

/// Stage list for a thumbnail in the source's output-capable format.
pub fn plan_thumbnail(size: ThumbnailSize, format: OutputFormat, quality: Quality) -> Vec<Stage> {
    vec![
        Stage::Decode,
        Stage::Thumbnail(size),
        Stage::Encode {
            format,
            quality,
            compact: false,
        },
    ]
}

/// Center-crop to the size's aspect ratio, scale to exactly `size`, and
/// encode in the source format.
pub fn thumbnail(bytes: &[u8], size: ThumbnailSize, quality: Quality) -> PipelineResult {
    let format = OutputFormat::from_source(sniff(bytes)?);
    run(bytes, &plan_thumbnail(size, format, quality), None)
}

/// Stage list for background removal.
pub fn plan_background_removal(format: OutputFormat, quality: Quality) -> Vec<Stage> {
    vec![
        Stage::Decode,
        Stage::RemoveBackground,
        Stage::Encode {
            format,
            quality,
            compact: false,
        },
    ]
}

/// Remove the background and re-encode. JPEG output flattens the new
/// alpha channel onto white.
pub fn remove_background(
    remover: &BackgroundRemover,
    bytes: &[u8],
    format: OutputFormat,
    quality: Quality,
) -> PipelineResult {
    run(bytes, &plan_background_removal(format, quality), Some(remover))
}
