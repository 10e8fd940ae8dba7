//! Filesystem backend.

use super::{Storage, check_key};
use crate::error::{PipelineError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Stores each key as a file under `root`, creating parent directories on
/// demand.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> std::result::Result<PathBuf, String> {
        check_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }
}

impl Storage for LocalStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.path_for(key).map_err(PipelineError::StorageWriteFailure)?;
        let write_err = |e: io::Error| PipelineError::StorageWriteFailure(format!("{key}: {e}"));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        // Write to a sibling temp file and rename, so concurrent readers
        // never observe a partially written object.
        let tmp = path.with_file_name(format!(
            ".{}.{}.tmp",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&tmp, bytes).map_err(write_err)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }
        Ok(key.to_string())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key).map_err(PipelineError::StorageReadFailure)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PipelineError::NotFound(key.to_string()),
            _ => PipelineError::StorageReadFailure(format!("{key}: {e}")),
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key).map_err(PipelineError::StorageWriteFailure)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::StorageWriteFailure(format!("{key}: {e}"))),
        }
    }
}
