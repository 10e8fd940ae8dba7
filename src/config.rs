//! Engine configuration module.
//!
//! Handles loading, validating, and merging `pixelforge.toml`. Stock defaults
//! are serialized to a TOML value, the user file is merged on top key by key,
//! and the result is deserialized and validated.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [transform]
//! default_quality = 85      # Quality when the caller omits it (1-100)
//! max_dimension = 10000     # Upper bound for requested width/height
//!
//! [thumbnail]
//! default_size = [150, 150]
//! max_size = 1000           # Upper bound for each thumbnail side
//!
//! [watermark]
//! max_length = 128          # Characters
//!
//! [batch]
//! max_items = 10
//! max_workers = 4           # Omit for auto = CPU cores
//!
//! [background_removal]
//! timeout_secs = 30         # 0 disables the timeout
//! output_format = "png"
//! tolerance = 48
//!
//! [storage]
//! backend = "local"         # "local" or "remote"
//! root = "uploads"
//!
//! [storage.remote]
//! endpoint = "https://project.supabase.co"
//! bucket = "images"
//! token_env = "PIXELFORGE_STORAGE_TOKEN"
//!
//! [upload]
//! max_bytes = 16777216
//! allowed_formats = ["png", "jpeg", "gif", "webp"]
//!
//! [presets.web-small]
//! width = 640
//! format = "webp"
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse — override just the values you want:
//!
//! ```toml
//! [batch]
//! max_items = 25
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::OutputFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name looked up by the CLI.
pub const CONFIG_FILENAME: &str = "pixelforge.toml";

/// Formats an upload may be declared in. `jpg` and `tif` are aliases.
const KNOWN_UPLOAD_FORMATS: &[&str] = &["png", "jpeg", "jpg", "gif", "webp", "tiff", "tif"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `pixelforge.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub transform: TransformConfig,
    pub thumbnail: ThumbnailConfig,
    pub watermark: WatermarkConfig,
    pub batch: BatchConfig,
    pub background_removal: BackgroundRemovalConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    /// Named parameter sets, keyed by preset name.
    pub presets: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.transform.default_quality) {
            return Err(ConfigError::Validation(
                "transform.default_quality must be 1-100".into(),
            ));
        }
        if self.transform.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "transform.max_dimension must be non-zero".into(),
            ));
        }
        if self.thumbnail.max_size == 0 {
            return Err(ConfigError::Validation(
                "thumbnail.max_size must be non-zero".into(),
            ));
        }
        let [w, h] = self.thumbnail.default_size;
        if w == 0 || h == 0 || w > self.thumbnail.max_size || h > self.thumbnail.max_size {
            return Err(ConfigError::Validation(format!(
                "thumbnail.default_size must be within 1-{}",
                self.thumbnail.max_size
            )));
        }
        if self.watermark.max_length == 0 {
            return Err(ConfigError::Validation(
                "watermark.max_length must be non-zero".into(),
            ));
        }
        if self.batch.max_items == 0 {
            return Err(ConfigError::Validation(
                "batch.max_items must be at least 1".into(),
            ));
        }
        if self.batch.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "batch.max_workers must be at least 1".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Remote {
            if self.storage.remote.endpoint.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.remote.endpoint is required for the remote backend".into(),
                ));
            }
            if self.storage.remote.bucket.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.remote.bucket is required for the remote backend".into(),
                ));
            }
        }
        if self.upload.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "upload.max_bytes must be non-zero".into(),
            ));
        }
        for format in &self.upload.allowed_formats {
            if !KNOWN_UPLOAD_FORMATS.contains(&format.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::Validation(format!(
                    "upload.allowed_formats: unknown format '{format}'"
                )));
            }
        }
        for (name, params) in &self.presets {
            for (key, value) in params {
                if value.is_table() || value.is_array() {
                    return Err(ConfigError::Validation(format!(
                        "presets.{name}.{key} must be a string, integer, or boolean"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Defaults and bounds applied by the parameter resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Quality used when a request does not name one.
    pub default_quality: u32,
    /// Largest width or height a request may ask for.
    pub max_dimension: u32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            default_quality: 85,
            max_dimension: 10_000,
        }
    }
}

/// Thumbnail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    /// Size as `[width, height]` when the request has no `size`.
    pub default_size: [u32; 2],
    pub max_size: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            default_size: [150, 150],
            max_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    pub max_length: usize,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self { max_length: 128 }
    }
}

/// Batch limits and parallelism.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Largest number of items accepted in one batch.
    pub max_items: usize,
    /// Maximum number of parallel batch workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: 10,
            max_workers: None,
        }
    }
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &BatchConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Background-removal adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundRemovalConfig {
    /// Per-item inference timeout in seconds. `0` waits indefinitely.
    pub timeout_secs: u64,
    pub output_format: OutputFormat,
    /// Colour distance under which a pixel counts as background for the
    /// built-in border-key model.
    pub tolerance: u8,
}

impl Default for BackgroundRemovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            output_format: OutputFormat::Png,
            tolerance: 48,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Remote,
}

/// Where originals and derived artifacts live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory of the local backend.
    pub root: PathBuf,
    pub remote: RemoteStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: PathBuf::from("uploads"),
            remote: RemoteStorageConfig::default(),
        }
    }
}

/// HTTP object-store settings. The access token is read from the
/// environment variable named by `token_env`, never from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteStorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub token_env: String,
}

impl Default for RemoteStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: "images".to_string(),
            token_env: "PIXELFORGE_STORAGE_TOKEN".to_string(),
        }
    }
}

impl RemoteStorageConfig {
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Limits applied when ingesting an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub allowed_formats: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024,
            allowed_formats: ["png", "jpeg", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl UploadConfig {
    /// Whether any of a format's file extensions is in the allow list.
    pub fn allows(&self, format: image::ImageFormat) -> bool {
        format.extensions_str().iter().any(|ext| {
            self.allowed_formats
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Serialize `EngineConfig::default()` to a TOML value for use as the merge base.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(EngineConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EngineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `pixelforge.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixelforge Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Transform defaults and bounds
# ---------------------------------------------------------------------------
[transform]
# Encoding quality used when a request does not set `quality` (1-100).
default_quality = 85

# Largest width or height a request may ask for.
max_dimension = 10000

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
[thumbnail]
# Size as [width, height] when the request has no `size`.
default_size = [150, 150]

# Largest allowed thumbnail side.
max_size = 1000

# ---------------------------------------------------------------------------
# Watermark
# ---------------------------------------------------------------------------
[watermark]
# Longest accepted watermark text, in characters.
max_length = 128

# ---------------------------------------------------------------------------
# Batch processing
# ---------------------------------------------------------------------------
[batch]
# Largest number of items in one batch request.
max_items = 10

# Maximum parallel workers. Omit to use all CPU cores.
# Values above the core count are clamped down.
# max_workers = 4

# ---------------------------------------------------------------------------
# Background removal
# ---------------------------------------------------------------------------
[background_removal]
# Per-item timeout in seconds. 0 disables the timeout.
timeout_secs = 30

# Output format: "png", "webp", or "jpeg" (jpeg flattens onto white).
output_format = "png"

# Colour distance under which the built-in model treats a pixel as
# background (0-255).
tolerance = 48

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# "local" stores under `root`; "remote" uses the HTTP object store below.
backend = "local"
root = "uploads"

[storage.remote]
# Base URL of the object store, e.g. "https://<project>.supabase.co".
endpoint = ""
bucket = "images"
# Name of the environment variable holding the access token.
token_env = "PIXELFORGE_STORAGE_TOKEN"

# ---------------------------------------------------------------------------
# Uploads
# ---------------------------------------------------------------------------
[upload]
# Largest accepted upload in bytes (16 MiB).
max_bytes = 16777216

# Accepted source formats.
allowed_formats = ["png", "jpeg", "gif", "webp"]

# ---------------------------------------------------------------------------
# Presets
# ---------------------------------------------------------------------------
# Named parameter sets, applied with `--preset <name>`. Keys are the same
# as transform parameters; request parameters override preset values.
#
# [presets.web-small]
# width = 640
# format = "webp"
# quality = 75
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(tmp: &TempDir, content: &str) -> PathBuf {
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, content).unwrap();
        path
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn default_config_values() {
        let config = EngineConfig::default();
        assert_eq!(config.transform.default_quality, 85);
        assert_eq!(config.transform.max_dimension, 10_000);
        assert_eq!(config.thumbnail.default_size, [150, 150]);
        assert_eq!(config.thumbnail.max_size, 1000);
        assert_eq!(config.watermark.max_length, 128);
        assert_eq!(config.batch.max_items, 10);
        assert_eq!(config.batch.max_workers, None);
        assert_eq!(config.background_removal.timeout_secs, 30);
        assert_eq!(config.background_removal.output_format, OutputFormat::Png);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage.root, PathBuf::from("uploads"));
        assert_eq!(config.upload.max_bytes, 16_777_216);
        assert!(config.presets.is_empty());
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let config: EngineConfig = toml::from_str(
            r#"
[batch]
max_items = 25
"#,
        )
        .unwrap();
        assert_eq!(config.batch.max_items, 25);
        assert_eq!(config.transform.default_quality, 85);
    }

    #[test]
    fn parse_presets_with_mixed_scalars() {
        let config: EngineConfig = toml::from_str(
            r#"
[presets.web-small]
width = 640
format = "webp"
grayscale = true
"#,
        )
        .unwrap();
        let preset = &config.presets["web-small"];
        assert_eq!(preset["width"].as_integer(), Some(640));
        assert_eq!(preset["format"].as_str(), Some("webp"));
        assert!(config.validate().is_ok());
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<EngineConfig, _> = toml::from_str(
            r#"
[transform]
default_qualty = 90
"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<EngineConfig, _> = toml::from_str(
            r#"
[transfrom]
default_quality = 90
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_nested_key_rejected() {
        let result: Result<EngineConfig, _> = toml::from_str(
            r#"
[storage.remote]
url = "https://example.com"
"#,
        );
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_quality_range() {
        let mut config = EngineConfig::default();
        config.transform.default_quality = 0;
        assert!(config.validate().unwrap_err().to_string().contains("quality"));
        config.transform.default_quality = 101;
        assert!(config.validate().is_err());
        config.transform.default_quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_batch_limits() {
        let mut config = EngineConfig::default();
        config.batch.max_items = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.batch.max_workers = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_thumbnail_default_within_max() {
        let mut config = EngineConfig::default();
        config.thumbnail.default_size = [2000, 100];
        assert!(config.validate().is_err());
        config.thumbnail.default_size = [0, 100];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_remote_requires_endpoint() {
        let mut config = EngineConfig::default();
        config.storage.backend = StorageBackend::Remote;
        assert!(config.validate().unwrap_err().to_string().contains("endpoint"));

        config.storage.remote.endpoint = "https://store.example".into();
        assert!(config.validate().is_ok());

        config.storage.remote.bucket = " ".into();
        assert!(config.validate().unwrap_err().to_string().contains("bucket"));
    }

    #[test]
    fn validate_unknown_upload_format() {
        let mut config = EngineConfig::default();
        config.upload.allowed_formats.push("bmp".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_preset_rejects_nested_values() {
        let config: EngineConfig = toml::from_str(
            r#"
[presets.bad]
width = [1, 2]
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Upload allow list
    // =========================================================================

    #[test]
    fn upload_allows_by_extension_alias() {
        let config = UploadConfig::default();
        assert!(config.allows(image::ImageFormat::Jpeg));
        assert!(config.allows(image::ImageFormat::Png));
        assert!(config.allows(image::ImageFormat::Gif));
        assert!(config.allows(image::ImageFormat::WebP));
        assert!(!config.allows(image::ImageFormat::Tiff));

        let jpg_only = UploadConfig {
            allowed_formats: vec!["JPG".into()],
            ..UploadConfig::default()
        };
        assert!(jpg_only.allows(image::ImageFormat::Jpeg));
        assert!(!jpg_only.allows(image::ImageFormat::Png));
    }

    // =========================================================================
    // Worker count
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = BatchConfig::default();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = BatchConfig {
            max_workers: Some(99999),
            ..BatchConfig::default()
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = BatchConfig {
            max_workers: Some(1),
            ..BatchConfig::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[transform]
default_quality = 85
max_dimension = 10000
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[transform]
default_quality = 70
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let t = merged.get("transform").unwrap();
        assert_eq!(t.get("default_quality").unwrap().as_integer(), Some(70));
        assert_eq!(t.get("max_dimension").unwrap().as_integer(), Some(10000));
    }

    #[test]
    fn merge_toml_array_replaces() {
        let base: toml::Value = toml::from_str(r#"formats = ["png", "gif"]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"formats = ["webp"]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("formats").unwrap().as_array().unwrap().len(), 1);
    }

    // =========================================================================
    // load_config / resolve_config
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config.batch.max_items, 10);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[storage]
root = "/var/pixelforge"

[background_removal]
output_format = "webp"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/var/pixelforge"));
        assert_eq!(config.background_removal.output_format, OutputFormat::Webp);
        assert_eq!(config.background_removal.timeout_secs, 30);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "this is not valid toml [[[");
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[transform]
default_quality = 200
"#,
        );
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_config_rejects_unknown_key() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[batch]
workers = 4
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn resolve_config_with_overlay() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[thumbnail]
max_size = 500
"#,
        )
        .unwrap();
        let config = resolve_config(base, Some(overlay)).unwrap();
        assert_eq!(config.thumbnail.max_size, 500);
        assert_eq!(config.thumbnail.default_size, [150, 150]);
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: EngineConfig = toml::from_str(stock_config_toml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.transform.default_quality, 85);
        assert_eq!(config.thumbnail.default_size, [150, 150]);
        assert_eq!(config.batch.max_items, 10);
        assert_eq!(config.storage.remote.bucket, "images");
        assert_eq!(config.upload.allowed_formats, UploadConfig::default().allowed_formats);
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in [
            "[transform]",
            "[thumbnail]",
            "[watermark]",
            "[batch]",
            "[background_removal]",
            "[storage]",
            "[storage.remote]",
            "[upload]",
        ] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        for key in ["transform", "thumbnail", "batch", "storage", "upload"] {
            assert!(val.get(key).is_some(), "missing {key}");
        }
    }
}
