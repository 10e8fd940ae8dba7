//! Storage abstraction for original and derived image bytes.
//!
//! The [`Storage`] trait defines the three operations every backend must
//! support: put, get, and delete. The executor and the batch orchestrator
//! depend only on the trait; which backend is active never changes pipeline
//! output.
//!
//! | Backend | Where bytes live |
//! |---|---|
//! | [`LocalStore`] | Files under a root directory |
//! | [`RemoteStore`] | HTTP object store (Supabase storage path layout) |
//!
//! ## Keys
//!
//! Keys are relative, `/`-separated paths derived from the asset id:
//!
//! ```text
//! {owner}/{asset_id}/original.{ext}
//! {owner}/{asset_id}/derived/{spec_hash}.{ext}
//! ```

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{PipelineError, Result};

/// Trait for storage backends.
///
/// Implementations must be `Send + Sync`; batch workers share one instance.
pub trait Storage: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    /// Fetch the bytes stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove `key`. Removing a missing key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Whether `key` holds an object.
    fn exists(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(PipelineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Build the configured backend.
pub fn open_storage(config: &StorageConfig) -> Result<Box<dyn Storage>> {
    match config.backend {
        StorageBackend::Local => Ok(Box::new(LocalStore::new(&config.root))),
        StorageBackend::Remote => Ok(Box::new(RemoteStore::new(&config.remote)?)),
    }
}

/// Key of an asset's original upload.
pub fn original_key(owner_id: &str, asset_id: &str, ext: &str) -> String {
    format!("{owner_id}/{asset_id}/original.{ext}")
}

/// Key of a derived artifact produced by the spec with hash `spec_hash`.
pub fn derived_key(owner_id: &str, asset_id: &str, spec_hash: &str, ext: &str) -> String {
    format!("{owner_id}/{asset_id}/derived/{spec_hash}.{ext}")
}

/// Reject keys that could escape the storage root or the bucket.
pub(crate) fn check_key(key: &str) -> std::result::Result<(), String> {
    if key.is_empty() {
        return Err("empty key".into());
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(format!("key must be relative: {key}"));
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(format!("invalid key segment: {key}"));
    }
    Ok(())
}
