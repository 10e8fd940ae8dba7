//! Derived-artifact cache.
//!
//! Transform outputs are stored next to the original under a key that
//! combines the asset id with a hash of the resolved spec:
//!
//! ```text
//! {owner}/{asset_id}/derived/{spec_hash}.{ext}
//! ```
//!
//! The cache is **content-addressed**: the same asset and the same
//! resolved spec always map to the same key, so a repeated request is
//! served straight from storage. Originals are immutable, so an entry
//! never goes stale; removing the asset is the only invalidation.
//!
//! - **`spec_hash`**: SHA-256 over a tagged, canonical encoding of every
//!   spec field. Optional fields write a presence byte before their
//!   payload, so `None` and a zero value never collide.
//!
//! A failed cache write is logged and the freshly computed output is
//! still returned.

use crate::asset::ImageAsset;
use crate::error::{PipelineError, Result};
use crate::imaging::probe;
use crate::pipeline::{PipelineOutput, execute};
use crate::resolve::{TransformRequest, TransformSpec};
use crate::storage::{Storage, derived_key};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};

/// Version of the hash encoding. Bump to orphan every stored artifact when
/// the encoding or a stage's output changes.
const SPEC_HASH_VERSION: u32 = 1;

/// SHA-256 of a resolved spec, returned as a hex string.
pub fn spec_hash(spec: &TransformSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"transform\0");
    hasher.update(SPEC_HASH_VERSION.to_le_bytes());

    match spec.crop {
        Some(rect) => {
            hasher.update(b"\x01");
            hasher.update(rect.x.to_le_bytes());
            hasher.update(rect.y.to_le_bytes());
            hasher.update(rect.width.to_le_bytes());
            hasher.update(rect.height.to_le_bytes());
        }
        None => hasher.update(b"\x00"),
    }
    match spec.resize {
        Some(target) => {
            hasher.update(b"\x01");
            hasher.update(target.width.unwrap_or(0).to_le_bytes());
            hasher.update(target.height.unwrap_or(0).to_le_bytes());
        }
        None => hasher.update(b"\x00"),
    }
    match spec.rotate {
        Some(rotation) => {
            hasher.update(b"\x01");
            hasher.update(rotation.degrees().to_le_bytes());
        }
        None => hasher.update(b"\x00"),
    }
    hasher.update([spec.grayscale as u8, spec.enhance as u8, spec.compress as u8]);
    match &spec.watermark {
        Some(text) => {
            hasher.update(b"\x01");
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        None => hasher.update(b"\x00"),
    }
    hasher.update(spec.format.extension().as_bytes());
    hasher.update(b"\0");
    hasher.update(spec.quality.value().to_le_bytes());

    format!("{:x}", hasher.finalize())
}

/// Storage key of the derived artifact for `asset` under `spec`.
pub fn cache_key(asset: &ImageAsset, spec: &TransformSpec) -> String {
    derived_key(
        &asset.owner_id,
        &asset.id,
        &spec_hash(spec),
        spec.format.extension(),
    )
}

/// How a cached execution was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from storage.
    Hit,
    /// Executed and stored.
    Miss,
    /// Executed, but the store failed.
    Unstored,
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheOutcome::Hit => "cached",
            CacheOutcome::Miss => "encoded",
            CacheOutcome::Unstored => "encoded (not cached)",
        })
    }
}

/// Transform an asset, reusing a stored artifact when one exists.
pub fn execute_cached(
    storage: &dyn Storage,
    asset: &ImageAsset,
    request: &TransformRequest,
) -> Result<(PipelineOutput, CacheOutcome)> {
    let source = asset.image_format().ok_or_else(|| {
        PipelineError::UnsupportedInput(format!("unknown stored format '{}'", asset.format))
    })?;
    let spec = request.resolve(source);
    let key = cache_key(asset, &spec);

    match storage.get(&key) {
        Ok(bytes) => match probe(&bytes) {
            Ok((_, width, height)) => {
                debug!(asset = %asset.id, key = %key, "derived artifact hit");
                return Ok((
                    PipelineOutput {
                        bytes,
                        format: spec.format,
                        width,
                        height,
                    },
                    CacheOutcome::Hit,
                ));
            }
            Err(e) => warn!(key = %key, error = %e, "ignoring unreadable derived artifact"),
        },
        Err(PipelineError::NotFound(_)) => {}
        Err(e) => warn!(key = %key, error = %e, "derived artifact lookup failed"),
    }

    let original = storage.get(&asset.storage_key)?;
    let output = execute(&original, &spec)?;

    let outcome = match storage.put(&key, &output.bytes) {
        Ok(_) => CacheOutcome::Miss,
        Err(e) => {
            warn!(key = %key, error = %e, "could not store derived artifact");
            CacheOutcome::Unstored
        }
    };
    Ok((output, outcome))
}
