//! Batch orchestration.
//!
//! A batch is an ordered list of asset ids plus one shared
//! [`BatchOperation`]. Items fan out over a dedicated rayon pool; each
//! worker runs one item end to end (index lookup → storage read →
//! pipeline) and shares nothing mutable with the others. Results are
//! collected by input position, so the archive lists entries in the order
//! the ids were given regardless of which worker finished first.
//!
//! A failing item never aborts the batch: it is left out of the archive
//! body and recorded in `manifest.json`. Only request-level problems
//! (empty batch, too many items, invalid shared parameters) fail the call.
//!
//! ## Archive layout
//!
//! ```text
//! transformed_{id}.{ext}    one per successful transform
//! no_bg_{id}.{ext}          one per successful background removal
//! manifest.json             always present
//! ```
//!
//! Ids are flattened to a single path segment. A name already taken in the
//! archive gets the item's position appended, then a counter.

use crate::asset::{ImageAsset, ingest, remove_asset};
use crate::background::BackgroundRemover;
use crate::config::{BatchConfig, UploadConfig, effective_threads};
use crate::error::{PipelineError, Result};
use crate::imaging::{OutputFormat, Quality};
use crate::pipeline::{self, PipelineOutput};
use crate::resolve::{RawParams, ResolvePolicy, TransformRequest};
use crate::storage::Storage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const MANIFEST_NAME: &str = "manifest.json";

/// Lookup of asset records by id.
pub trait AssetIndex: Send + Sync {
    fn find(&self, id: &str) -> Option<ImageAsset>;
}

impl AssetIndex for HashMap<String, ImageAsset> {
    fn find(&self, id: &str) -> Option<ImageAsset> {
        self.get(id).cloned()
    }
}

/// The operation shared by every item of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    Transform(TransformRequest),
    RemoveBackground { format: OutputFormat, quality: Quality },
}

impl BatchOperation {
    pub fn name(&self) -> &'static str {
        match self {
            BatchOperation::Transform(_) => "transform",
            BatchOperation::RemoveBackground { .. } => "remove_background",
        }
    }

    fn entry_prefix(&self) -> &'static str {
        match self {
            BatchOperation::Transform(_) => "transformed",
            BatchOperation::RemoveBackground { .. } => "no_bg",
        }
    }
}

/// Validate shared transform parameters once for the whole batch.
pub fn resolve_batch(params: &RawParams, policy: &ResolvePolicy) -> Result<BatchOperation> {
    TransformRequest::parse(params, policy).map(BatchOperation::Transform)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub id: String,
    pub entry: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    pub kind: String,
    pub reason: String,
}

impl FailureRecord {
    fn new(id: &str, error: &PipelineError) -> Self {
        Self {
            id: id.to_string(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub operation: String,
    pub succeeded: Vec<SuccessRecord>,
    pub failed: Vec<FailureRecord>,
}

/// Finished zip archive of one batch.
#[derive(Debug, Clone)]
pub struct Archive {
    pub bytes: Vec<u8>,
    /// Entry names of successful items, in input order.
    pub entries: Vec<String>,
    /// Failed items, in input order.
    pub failures: Vec<FailureRecord>,
}

impl Archive {
    pub fn is_total_failure(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build(
        operation: &BatchOperation,
        ids: &[String],
        results: Vec<Result<PipelineOutput>>,
    ) -> Result<Self> {
        let zip_err = |e: zip::result::ZipError| PipelineError::EncodeFailed(format!("archive: {e}"));
        let io_err = |e: std::io::Error| PipelineError::EncodeFailed(format!("archive: {e}"));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut used = HashSet::new();
        let mut manifest = Manifest {
            operation: operation.name().to_string(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        for (position, (id, result)) in ids.iter().zip(results).enumerate() {
            match result {
                Ok(output) => {
                    let entry = entry_name(
                        &mut used,
                        operation.entry_prefix(),
                        id,
                        position,
                        output.format.extension(),
                    );
                    writer.start_file(entry.as_str(), options).map_err(zip_err)?;
                    writer.write_all(&output.bytes).map_err(io_err)?;
                    manifest.succeeded.push(SuccessRecord {
                        id: id.clone(),
                        entry,
                    });
                }
                Err(e) => manifest.failed.push(FailureRecord::new(id, &e)),
            }
        }

        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| PipelineError::EncodeFailed(format!("manifest: {e}")))?;
        writer.start_file(MANIFEST_NAME, options).map_err(zip_err)?;
        writer.write_all(&json).map_err(io_err)?;
        let bytes = writer.finish().map_err(zip_err)?.into_inner();

        Ok(Self {
            bytes,
            entries: manifest.succeeded.into_iter().map(|s| s.entry).collect(),
            failures: manifest.failed,
        })
    }
}

/// A zip entry name not yet in `used`.
///
/// Path separators in the id are flattened so every entry sits at the
/// archive root. A repeated name gets the item position appended, then a
/// counter, until it is unique.
fn entry_name(
    used: &mut HashSet<String>,
    prefix: &str,
    id: &str,
    position: usize,
    ext: &str,
) -> String {
    let stem = format!("{prefix}_{}", id.replace(['/', '\\'], "_"));
    let mut entry = format!("{stem}.{ext}");
    let mut attempt = 0;
    while !used.insert(entry.clone()) {
        attempt += 1;
        entry = match attempt {
            1 => format!("{stem}_{position}.{ext}"),
            n => format!("{stem}_{position}_{n}.{ext}"),
        };
    }
    entry
}

/// Reject empty and oversized batches before any work is done.
pub fn check_batch_size(count: usize, max_items: usize) -> Result<()> {
    if count == 0 {
        return Err(PipelineError::invalid("items", "empty batch"));
    }
    if count > max_items {
        return Err(PipelineError::invalid("items", "too many items"));
    }
    Ok(())
}

/// Local files stored as assets for the length of one batch run.
#[derive(Debug, Default)]
pub struct StagedUploads {
    /// Ids of the stored files, in input order.
    pub ids: Vec<String>,
    pub index: HashMap<String, ImageAsset>,
    /// Files that could not be stored, keyed by path.
    pub rejected: Vec<FailureRecord>,
}

impl StagedUploads {
    /// Ingest `files` under `owner`.
    ///
    /// The batch size is checked first. A file that cannot be read or
    /// ingested is recorded in `rejected` and the rest still go ahead.
    pub fn stage(
        storage: &dyn Storage,
        owner: &str,
        files: &[PathBuf],
        upload: &UploadConfig,
        batch: &BatchConfig,
    ) -> Result<Self> {
        check_batch_size(files.len(), batch.max_items)?;

        let mut staged = Self::default();
        for file in files {
            let label = file.display().to_string();
            let stored = std::fs::read(file)
                .map_err(|e| PipelineError::StorageReadFailure(format!("{label}: {e}")))
                .and_then(|bytes| ingest(storage, owner, &bytes, upload));
            match stored {
                Ok(asset) => {
                    staged.ids.push(asset.id.clone());
                    staged.index.insert(asset.id.clone(), asset);
                }
                Err(e) => {
                    warn!(file = %label, kind = e.kind(), reason = %e, "upload rejected");
                    staged.rejected.push(FailureRecord::new(&label, &e));
                }
            }
        }
        Ok(staged)
    }

    /// Delete every staged original. Failures are logged and counted.
    pub fn release(&self, storage: &dyn Storage) -> usize {
        let mut failed = 0;
        for id in &self.ids {
            let Some(asset) = self.index.get(id) else {
                continue;
            };
            if let Err(e) = remove_asset(storage, asset) {
                warn!(asset = %id, reason = %e, "could not remove staged upload");
                failed += 1;
            }
        }
        failed
    }
}

/// Runs batches over a bounded worker pool.
pub struct BatchOrchestrator {
    storage: Arc<dyn Storage>,
    index: Arc<dyn AssetIndex>,
    remover: Option<Arc<BackgroundRemover>>,
    pool: rayon::ThreadPool,
    max_items: usize,
}

impl BatchOrchestrator {
    pub fn new(
        config: &BatchConfig,
        storage: Arc<dyn Storage>,
        index: Arc<dyn AssetIndex>,
    ) -> Result<Self> {
        let threads = effective_threads(config);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pixelforge-batch-{i}"))
            .build()
            .map_err(|e| PipelineError::invalid("max_workers", e.to_string()))?;
        Ok(Self {
            storage,
            index,
            remover: None,
            pool,
            max_items: config.max_items,
        })
    }

    /// Enable [`BatchOperation::RemoveBackground`].
    pub fn with_remover(mut self, remover: Arc<BackgroundRemover>) -> Self {
        self.remover = Some(remover);
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `operation` over every id and bundle the results.
    pub fn run_batch(&self, ids: &[String], operation: &BatchOperation) -> Result<Archive> {
        check_batch_size(ids.len(), self.max_items)?;

        let _span = info_span!("batch", operation = operation.name(), items = ids.len()).entered();
        let results: Vec<Result<PipelineOutput>> = self.pool.install(|| {
            ids.par_iter()
                .map(|id| {
                    let result = self.run_item(id, operation);
                    match &result {
                        Ok(out) => info!(id = %id, bytes = out.len(), "batch item done"),
                        Err(e) => warn!(id = %id, kind = e.kind(), reason = %e, "batch item failed"),
                    }
                    result
                })
                .collect()
        });

        let archive = Archive::build(operation, ids, results)?;
        info!(
            succeeded = archive.entries.len(),
            failed = archive.failures.len(),
            "batch finished"
        );
        Ok(archive)
    }

    fn run_item(&self, id: &str, operation: &BatchOperation) -> Result<PipelineOutput> {
        let asset = self
            .index
            .find(id)
            .ok_or_else(|| PipelineError::NotFound(format!("asset {id}")))?;
        match operation {
            BatchOperation::Transform(request) => {
                pipeline::execute_asset(self.storage.as_ref(), &asset, request)
            }
            BatchOperation::RemoveBackground { format, quality } => {
                let remover = self.remover.as_deref().ok_or_else(|| {
                    PipelineError::ModelUnavailable("no background removal model configured".into())
                })?;
                let bytes = self.storage.get(&asset.storage_key)?;
                pipeline::remove_background(remover, &bytes, *format, *quality)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::ingest;
    use crate::background::tests::{MockBehavior, mock_remover};
    use crate::config::UploadConfig;
    use crate::imaging::decode;
    use crate::storage::tests::{MemoryStore, RecordedOp};
    use crate::test_helpers::png_bytes;
    use std::io::Read;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        index: Arc<HashMap<String, ImageAsset>>,
        ids: Vec<String>,
    }

    fn fixture(sizes: &[(u32, u32)]) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mut index = HashMap::new();
        let mut ids = Vec::new();
        for &(w, h) in sizes {
            let asset = ingest(store.as_ref(), "u", &png_bytes(w, h), &UploadConfig::default())
                .unwrap();
            ids.push(asset.id.clone());
            index.insert(asset.id.clone(), asset);
        }
        Fixture {
            store,
            index: Arc::new(index),
            ids,
        }
    }

    fn orchestrator(fx: &Fixture, config: &BatchConfig) -> BatchOrchestrator {
        BatchOrchestrator::new(config, fx.store.clone(), fx.index.clone()).unwrap()
    }

    fn transform(pairs: &[(&str, &str)]) -> BatchOperation {
        let params: RawParams = pairs.iter().copied().collect();
        resolve_batch(&params, &ResolvePolicy::default()).unwrap()
    }

    fn read_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data)
            })
            .collect()
    }

    fn manifest_of(bytes: &[u8]) -> Manifest {
        let (_, data) = read_zip(bytes)
            .into_iter()
            .find(|(name, _)| name == MANIFEST_NAME)
            .unwrap();
        serde_json::from_slice(&data).unwrap()
    }

    // =========================================================================
    // Request validation
    // =========================================================================

    #[test]
    fn empty_batch_is_rejected() {
        let fx = fixture(&[]);
        let err = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&[], &transform(&[]))
            .unwrap_err();
        assert_eq!(err, PipelineError::invalid("items", "empty batch"));
    }

    #[test]
    fn too_many_items_is_rejected() {
        let fx = fixture(&[(4, 4), (4, 4), (4, 4)]);
        let config = BatchConfig {
            max_items: 2,
            ..BatchConfig::default()
        };
        let err = orchestrator(&fx, &config)
            .run_batch(&fx.ids, &transform(&[]))
            .unwrap_err();
        assert_eq!(err, PipelineError::invalid("items", "too many items"));
    }

    #[test]
    fn invalid_shared_params_fail_before_dispatch() {
        let params: RawParams = [("rotate", "45")].into_iter().collect();
        let err = resolve_batch(&params, &ResolvePolicy::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn worker_count_follows_config() {
        let fx = fixture(&[]);
        let config = BatchConfig {
            max_workers: Some(1),
            ..BatchConfig::default()
        };
        assert_eq!(orchestrator(&fx, &config).workers(), 1);
    }

    // =========================================================================
    // Transform batches
    // =========================================================================

    #[test]
    fn unknown_id_is_recorded_and_batch_succeeds() {
        let fx = fixture(&[(10, 10), (20, 20), (30, 30)]);
        let mut ids = fx.ids.clone();
        ids.insert(2, "missing".to_string());

        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&ids, &transform(&[("format", "jpeg")]))
            .unwrap();

        assert_eq!(archive.entries.len(), 3);
        assert_eq!(archive.failures.len(), 1);
        assert_eq!(archive.failures[0].id, "missing");
        assert_eq!(archive.failures[0].kind, "not_found");
        assert!(!archive.is_total_failure());
        assert_eq!(archive.len(), 4);
    }

    #[test]
    fn entries_follow_input_order() {
        let fx = fixture(&[(10, 10), (20, 20), (30, 30), (40, 40)]);
        let mut ids = fx.ids.clone();
        ids.reverse();
        // Failing middle item.
        fx.store
            .fail_reads_for(&fx.index[&ids[1]].storage_key);

        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&ids, &transform(&[]))
            .unwrap();

        let expected: Vec<String> = [&ids[0], &ids[2], &ids[3]]
            .iter()
            .map(|id| format!("transformed_{id}.png"))
            .collect();
        assert_eq!(archive.entries, expected);
        assert_eq!(archive.failures[0].kind, "storage_read_failure");

        let names: Vec<String> = read_zip(&archive.bytes).into_iter().map(|(n, _)| n).collect();
        let mut expected_names = expected.clone();
        expected_names.push(MANIFEST_NAME.to_string());
        assert_eq!(names, expected_names);

        // Entry bytes match their own item.
        let files = read_zip(&archive.bytes);
        let first = decode(&files[0].1).unwrap();
        assert_eq!(first.image.width(), 40);
    }

    #[test]
    fn manifest_lists_successes_and_failures() {
        let fx = fixture(&[(8, 8)]);
        let ids = vec![fx.ids[0].clone(), "nope".to_string()];
        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&ids, &transform(&[("grayscale", "true")]))
            .unwrap();
        let manifest = manifest_of(&archive.bytes);
        assert_eq!(manifest.operation, "transform");
        assert_eq!(
            manifest.succeeded,
            vec![SuccessRecord {
                id: fx.ids[0].clone(),
                entry: format!("transformed_{}.png", fx.ids[0]),
            }]
        );
        assert_eq!(manifest.failed, archive.failures);
    }

    #[test]
    fn total_failure_yields_manifest_only_archive() {
        let fx = fixture(&[]);
        let ids = vec!["a".to_string(), "b".to_string()];
        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&ids, &transform(&[]))
            .unwrap();
        assert!(archive.is_total_failure());
        let files = read_zip(&archive.bytes);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, MANIFEST_NAME);
    }

    #[test]
    fn per_item_pipeline_failure_is_isolated() {
        let fx = fixture(&[(100, 100), (10, 10)]);
        let op = transform(&[
            ("crop_x", "50"),
            ("crop_y", "50"),
            ("crop_width", "10"),
            ("crop_height", "10"),
        ]);
        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&fx.ids, &op)
            .unwrap();
        assert_eq!(archive.entries.len(), 1);
        assert_eq!(archive.failures[0].kind, "out_of_bounds_crop");
        assert_eq!(archive.failures[0].id, fx.ids[1]);
    }

    #[test]
    fn duplicate_ids_get_distinct_entries() {
        let fx = fixture(&[(8, 8)]);
        let ids = vec![fx.ids[0].clone(), fx.ids[0].clone()];
        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&ids, &transform(&[]))
            .unwrap();
        assert_eq!(archive.entries.len(), 2);
        assert_ne!(archive.entries[0], archive.entries[1]);
    }

    /// The fixture's assets re-listed under caller-chosen ids.
    fn renamed(fx: &Fixture, names: &[&str]) -> Fixture {
        let index: HashMap<String, ImageAsset> = names
            .iter()
            .zip(&fx.ids)
            .map(|(name, id)| {
                let mut asset = fx.index[id].clone();
                asset.id = name.to_string();
                (asset.id.clone(), asset)
            })
            .collect();
        Fixture {
            store: fx.store.clone(),
            index: Arc::new(index),
            ids: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn suffixed_duplicate_does_not_collide_with_existing_entry() {
        let fx = renamed(&fixture(&[(8, 8), (6, 6)]), &["x", "x_2"]);
        let ids: Vec<String> = ["x_2", "x", "x"].iter().map(|s| s.to_string()).collect();
        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&ids, &transform(&[]))
            .unwrap();

        assert!(archive.failures.is_empty());
        assert_eq!(
            archive.entries,
            vec![
                "transformed_x_2.png",
                "transformed_x.png",
                "transformed_x_2_2.png",
            ]
        );
        assert_eq!(read_zip(&archive.bytes).len(), 4);
    }

    #[test]
    fn ids_with_separators_stay_at_archive_root() {
        let fx = renamed(&fixture(&[(8, 8), (6, 6)]), &["a/b", "c\\d"]);
        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&fx.ids, &transform(&[]))
            .unwrap();
        assert_eq!(archive.entries, vec!["transformed_a_b.png", "transformed_c_d.png"]);
        let manifest = manifest_of(&archive.bytes);
        assert_eq!(manifest.succeeded[0].id, "a/b");
    }

    #[test]
    fn entry_name_counts_past_taken_suffixes() {
        let mut used = HashSet::new();
        for taken in ["p_x.png", "p_x_3.png", "p_x_3_2.png"] {
            used.insert(taken.to_string());
        }
        assert_eq!(entry_name(&mut used, "p", "x", 3, "png"), "p_x_3_3.png");
        assert!(used.contains("p_x_3_3.png"));
    }

    #[test]
    fn batch_archives_are_reproducible() {
        let fx = fixture(&[(16, 16), (24, 12)]);
        let orch = orchestrator(&fx, &BatchConfig::default());
        let op = transform(&[("optimize", "true")]);
        let a = orch.run_batch(&fx.ids, &op).unwrap();
        let b = orch.run_batch(&fx.ids, &op).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    // =========================================================================
    // Staged uploads
    // =========================================================================

    fn write_files(dir: &std::path::Path, files: &[(&str, Vec<u8>)]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, bytes)| {
                let path = dir.join(name);
                std::fs::write(&path, bytes).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn staging_checks_size_before_storing_anything() {
        let store = MemoryStore::new();
        let files: Vec<PathBuf> = (0..11).map(|i| PathBuf::from(format!("{i}.png"))).collect();
        let err = StagedUploads::stage(
            &store,
            "u",
            &files,
            &UploadConfig::default(),
            &BatchConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::invalid("items", "too many items"));
        assert!(store.get_operations().is_empty());

        let err =
            StagedUploads::stage(&store, "u", &[], &UploadConfig::default(), &BatchConfig::default())
                .unwrap_err();
        assert_eq!(err, PipelineError::invalid("items", "empty batch"));
    }

    #[test]
    fn staging_records_bad_files_and_keeps_the_rest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut files = write_files(
            tmp.path(),
            &[
                ("a.png", png_bytes(8, 8)),
                ("notes.txt", b"plain text".to_vec()),
                ("b.png", png_bytes(6, 4)),
            ],
        );
        files.insert(1, tmp.path().join("missing.png"));
        let store = MemoryStore::new();

        let staged = StagedUploads::stage(
            &store,
            "u",
            &files,
            &UploadConfig::default(),
            &BatchConfig::default(),
        )
        .unwrap();

        assert_eq!(staged.ids.len(), 2);
        assert_eq!(staged.index[&staged.ids[1]].width, 6, "input order kept");
        let rejected: Vec<&str> = staged.rejected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            rejected,
            vec![
                files[1].display().to_string(),
                files[2].display().to_string(),
            ]
        );
        assert_eq!(staged.rejected[0].kind, "storage_read_failure");
    }

    #[test]
    fn release_deletes_every_staged_original() {
        let tmp = tempfile::TempDir::new().unwrap();
        let files = write_files(
            tmp.path(),
            &[("a.png", png_bytes(8, 8)), ("b.png", png_bytes(4, 4))],
        );
        let store = MemoryStore::new();
        let staged = StagedUploads::stage(
            &store,
            "u",
            &files,
            &UploadConfig::default(),
            &BatchConfig::default(),
        )
        .unwrap();

        assert_eq!(staged.release(&store), 0);
        for id in &staged.ids {
            let key = &staged.index[id].storage_key;
            assert!(store.get_operations().contains(&RecordedOp::Delete(key.clone())));
            assert!(!store.exists(key).unwrap());
        }
    }

    // =========================================================================
    // Background-removal batches
    // =========================================================================

    fn remove_bg() -> BatchOperation {
        BatchOperation::RemoveBackground {
            format: OutputFormat::Png,
            quality: Quality::default(),
        }
    }

    #[test]
    fn remove_background_entries_use_no_bg_prefix() {
        let fx = fixture(&[(8, 8), (8, 8)]);
        let remover = Arc::new(mock_remover(MockBehavior::Fill(255), None));
        let archive = orchestrator(&fx, &BatchConfig::default())
            .with_remover(remover)
            .run_batch(&fx.ids, &remove_bg())
            .unwrap();
        assert_eq!(archive.entries, vec![
            format!("no_bg_{}.png", fx.ids[0]),
            format!("no_bg_{}.png", fx.ids[1]),
        ]);
        assert_eq!(manifest_of(&archive.bytes).operation, "remove_background");
    }

    #[test]
    fn remove_background_without_remover_fails_every_item() {
        let fx = fixture(&[(8, 8)]);
        let archive = orchestrator(&fx, &BatchConfig::default())
            .run_batch(&fx.ids, &remove_bg())
            .unwrap();
        assert!(archive.is_total_failure());
        assert_eq!(archive.failures[0].kind, "model_unavailable");
    }

    #[test]
    fn remove_background_timeout_is_per_item_failure() {
        let fx = fixture(&[(8, 8), (8, 8)]);
        let remover = Arc::new(mock_remover(
            MockBehavior::Sleep(Duration::from_millis(500)),
            Some(Duration::from_millis(20)),
        ));
        let archive = orchestrator(&fx, &BatchConfig::default())
            .with_remover(remover)
            .run_batch(&fx.ids, &remove_bg())
            .unwrap();
        assert_eq!(archive.failures.len(), 2);
        assert!(archive.failures.iter().all(|f| f.kind == "processing_timeout"));
    }
}
