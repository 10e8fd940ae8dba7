//! Uploaded image records.
//!
//! [`ingest`] turns uploaded bytes into an [`ImageAsset`]: it checks the
//! upload limits, sniffs the format, reads the dimensions from the header,
//! and writes the original through [`Storage`]. The record is immutable;
//! transforms always produce new bytes under a different key.

use crate::config::UploadConfig;
use crate::error::{PipelineError, Result};
use crate::imaging::probe;
use crate::storage::{Storage, original_key};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Metadata of one stored original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: String,
    pub owner_id: String,
    pub storage_key: String,
    /// Lowercase format name as sniffed from the bytes, e.g. `"jpeg"`.
    pub format: String,
    pub byte_size: usize,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
}

impl ImageAsset {
    /// Parsed source format, if the stored name is one the decoder knows.
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        image::ImageFormat::from_extension(&self.format)
    }
}

/// Canonical lowercase name of a sniffed format.
fn format_name(format: image::ImageFormat) -> String {
    format
        .extensions_str()
        .iter()
        .find(|ext| ext.len() > 3)
        .or_else(|| format.extensions_str().first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| format!("{format:?}").to_ascii_lowercase())
}

/// Validate an upload, store it, and return its record.
pub fn ingest(
    storage: &dyn Storage,
    owner_id: &str,
    bytes: &[u8],
    limits: &UploadConfig,
) -> Result<ImageAsset> {
    if owner_id.is_empty() || owner_id.contains(['/', '\\']) || matches!(owner_id, "." | "..") {
        return Err(PipelineError::invalid("owner_id", "must be one non-empty path segment"));
    }
    if bytes.is_empty() {
        return Err(PipelineError::invalid("file", "empty upload"));
    }
    if bytes.len() > limits.max_bytes {
        return Err(PipelineError::invalid(
            "file",
            format!("upload exceeds {} bytes", limits.max_bytes),
        ));
    }

    let (format, width, height) = probe(bytes)?;
    if !limits.allows(format) {
        return Err(PipelineError::UnsupportedFormat(format_name(format)));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let name = format_name(format);
    let key = original_key(owner_id, &id, &name);
    let storage_key = storage.put(&key, bytes)?;

    info!(asset = %id, owner = owner_id, format = %name, width, height, "ingested upload");

    Ok(ImageAsset {
        id,
        owner_id: owner_id.to_string(),
        storage_key,
        format: name,
        byte_size: bytes.len(),
        width,
        height,
        created_at: Utc::now(),
    })
}

/// Delete an asset's original bytes.
pub fn remove_asset(storage: &dyn Storage, asset: &ImageAsset) -> Result<()> {
    storage.delete(&asset.storage_key)?;
    info!(asset = %asset.id, "removed asset");
    Ok(())
}
