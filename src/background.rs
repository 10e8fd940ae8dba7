//! Background-removal adapter.
//!
//! The segmentation model is an opaque capability behind
//! [`SegmentationModel`]: image in, per-pixel foreground mask out, may fail.
//! [`BackgroundRemover`] wraps it with the policies the rest of the engine
//! relies on:
//!
//! - **One-time load.** The model is built by a [`ModelLoader`] on first use
//!   and cached in a `OnceCell`. Concurrent first callers block until that
//!   single initialization finishes; later calls reuse it. A failed load is
//!   not cached, so the next call retries.
//! - **Failure isolation.** Inference runs on a helper thread. A panic in
//!   the model surfaces as [`PipelineError::ModelUnavailable`] instead of
//!   unwinding into the caller or a batch worker.
//! - **Timeout.** When configured, the caller waits at most that long and
//!   gets [`PipelineError::ProcessingTimeout`]. The helper thread is not
//!   cancelled; its result is dropped.
//!
//! [`BorderKeyModel`] is the built-in capability: it estimates the
//! background colour from the image border and keys out the region of that
//! colour connected to the edges.

use crate::config::BackgroundRemovalConfig;
use crate::error::{PipelineError, Result};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-pixel foreground confidence in row-major order.
/// `0` is background, `255` is foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl SegmentationMask {
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width as usize) * (height as usize)],
        }
    }
}

/// An opaque foreground segmentation capability.
pub trait SegmentationModel: Send + Sync {
    fn segment(&self, image: &DynamicImage) -> Result<SegmentationMask>;
}

/// Builds the model on first use.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn SegmentationModel>>;
}

/// Loader for the built-in [`BorderKeyModel`].
#[derive(Debug, Clone, Copy)]
pub struct BuiltinLoader {
    pub tolerance: u8,
}

impl ModelLoader for BuiltinLoader {
    fn load(&self) -> Result<Arc<dyn SegmentationModel>> {
        Ok(Arc::new(BorderKeyModel::new(self.tolerance)))
    }
}

pub struct BackgroundRemover {
    loader: Box<dyn ModelLoader>,
    model: OnceCell<Arc<dyn SegmentationModel>>,
    timeout: Option<Duration>,
}

impl BackgroundRemover {
    /// `timeout` of `None` waits for the model indefinitely.
    pub fn new(loader: Box<dyn ModelLoader>, timeout: Option<Duration>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
            timeout,
        }
    }

    /// Built-in model with the configured tolerance and timeout.
    pub fn from_config(config: &BackgroundRemovalConfig) -> Self {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        Self::new(
            Box::new(BuiltinLoader {
                tolerance: config.tolerance,
            }),
            timeout,
        )
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    fn model(&self) -> Result<Arc<dyn SegmentationModel>> {
        self.model
            .get_or_try_init(|| {
                info!("Loading background removal model");
                self.loader.load()
            })
            .map(Arc::clone)
            .map_err(|e| {
                warn!(error = %e, "background removal model failed to load");
                match e {
                    PipelineError::ModelUnavailable(_) => e,
                    other => PipelineError::ModelUnavailable(other.to_string()),
                }
            })
    }

    /// Remove the background, returning the image with an alpha channel.
    pub fn remove(&self, image: DynamicImage) -> Result<RgbaImage> {
        let model = self.model()?;
        let image = Arc::new(image);
        let mask = self.segment(model, Arc::clone(&image))?;
        if (mask.width, mask.height) != image.dimensions()
            || mask.data.len() != (mask.width as usize) * (mask.height as usize)
        {
            return Err(PipelineError::ModelUnavailable(format!(
                "model returned a {}x{} mask for a {}x{} image",
                mask.width,
                mask.height,
                image.width(),
                image.height()
            )));
        }
        Ok(apply_mask(&image, &mask))
    }

    fn segment(
        &self,
        model: Arc<dyn SegmentationModel>,
        image: Arc<DynamicImage>,
    ) -> Result<SegmentationMask> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("bg-removal".into())
            .spawn(move || {
                // The receiver may be gone after a timeout.
                let _ = tx.send(model.segment(&image));
            })
            .map_err(|e| {
                PipelineError::ModelUnavailable(format!("failed to start inference: {e}"))
            })?;

        let received = match self.timeout {
            Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    warn!(secs = limit.as_secs_f32(), "background removal timed out");
                    PipelineError::ProcessingTimeout(limit.as_secs())
                }
                RecvTimeoutError::Disconnected => model_crashed(),
            }),
            None => rx.recv().map_err(|_| model_crashed()),
        };
        received?
    }
}

fn model_crashed() -> PipelineError {
    PipelineError::ModelUnavailable("model crashed during inference".into())
}

/// Use the mask as alpha. Fully transparent pixels are zeroed.
pub fn apply_mask(image: &DynamicImage, mask: &SegmentationMask) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    for (i, px) in rgba.pixels_mut().enumerate() {
        let m = u32::from(mask.data.get(i).copied().unwrap_or(0));
        let alpha = (m * u32::from(px[3]) + 127) / 255;
        *px = if alpha == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([px[0], px[1], px[2], alpha as u8])
        };
    }
    rgba
}

/// Keys out the border-connected region close to the dominant border colour.
///
/// Pixels within `tolerance` of the background colour and connected to the
/// image edge become transparent. Foreground pixels touching that region
/// get a linear alpha ramp over the next `tolerance` of colour distance.
#[derive(Debug, Clone, Copy)]
pub struct BorderKeyModel {
    tolerance: u8,
}

impl BorderKeyModel {
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }
}

impl SegmentationModel for BorderKeyModel {
    fn segment(&self, image: &DynamicImage) -> Result<SegmentationMask> {
        let rgba = image.to_rgba8();
        let (w, h) = rgba.dimensions();
        if w == 0 || h == 0 {
            return Err(PipelineError::UnsupportedInput("empty image".into()));
        }
        let key = border_color(&rgba);
        let tol = u32::from(self.tolerance);
        let distance = |x: u32, y: u32| color_distance(rgba.get_pixel(x, y), key);

        let idx = |x: u32, y: u32| (y as usize) * (w as usize) + x as usize;
        let mut background = vec![false; (w as usize) * (h as usize)];
        let mut queue = VecDeque::new();
        for (x, y) in border_coords(w, h) {
            if !background[idx(x, y)] && distance(x, y) <= tol {
                background[idx(x, y)] = true;
                queue.push_back((x, y));
            }
        }
        while let Some((x, y)) = queue.pop_front() {
            for (nx, ny) in neighbours(x, y, w, h) {
                let i = idx(nx, ny);
                if !background[i] && distance(nx, ny) <= tol {
                    background[i] = true;
                    queue.push_back((nx, ny));
                }
            }
        }

        let mut data = vec![255u8; background.len()];
        for y in 0..h {
            for x in 0..w {
                let i = idx(x, y);
                if background[i] {
                    data[i] = 0;
                } else if tol > 0
                    && neighbours(x, y, w, h).any(|(nx, ny)| background[idx(nx, ny)])
                {
                    let d = distance(x, y).saturating_sub(tol);
                    data[i] = ((d.min(tol) * 255) / tol) as u8;
                }
            }
        }
        debug!(
            width = w,
            height = h,
            keyed = background.iter().filter(|&&b| b).count(),
            "border-key segmentation"
        );
        Ok(SegmentationMask {
            width: w,
            height: h,
            data,
        })
    }
}

/// Per-channel median of the outermost pixel ring.
fn border_color(img: &RgbaImage) -> [u8; 3] {
    let (w, h) = img.dimensions();
    let mut channels: [Vec<u8>; 3] = Default::default();
    for (x, y) in border_coords(w, h) {
        let p = img.get_pixel(x, y);
        for c in 0..3 {
            channels[c].push(p[c]);
        }
    }
    channels.map(|mut values| {
        values.sort_unstable();
        values[values.len() / 2]
    })
}

/// Chebyshev distance in RGB.
fn color_distance(p: &Rgba<u8>, key: [u8; 3]) -> u32 {
    (0..3)
        .map(|c| u32::from(p[c].abs_diff(key[c])))
        .max()
        .unwrap_or(0)
}

fn border_coords(w: u32, h: u32) -> impl Iterator<Item = (u32, u32)> {
    let top_bottom = (0..w).flat_map(move |x| [(x, 0), (x, h - 1)]);
    let sides = (1..h.saturating_sub(1)).flat_map(move |y| [(0, y), (w - 1, y)]);
    top_bottom.chain(sides)
}

fn neighbours(x: u32, y: u32, w: u32, h: u32) -> impl Iterator<Item = (u32, u32)> {
    let candidates = [
        (x.checked_sub(1), Some(y)),
        ((x + 1 < w).then_some(x + 1), Some(y)),
        (Some(x), y.checked_sub(1)),
        (Some(x), (y + 1 < h).then_some(y + 1)),
    ];
    candidates
        .into_iter()
        .filter_map(|(nx, ny)| Some((nx?, ny?)))
}
