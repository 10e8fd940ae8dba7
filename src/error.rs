//! Failure taxonomy shared by every public entry point.
//!
//! Validation, pipeline, model, and storage failures all surface as one
//! [`PipelineError`]. The batch orchestrator records them per item using
//! [`PipelineError::kind`] as a stable tag in the archive manifest.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: String, reason: String },
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("crop rectangle lies entirely outside the image")]
    OutOfBoundsCrop,
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("encoding failed: {0}")]
    EncodeFailed(String),
    #[error("background removal model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("processing timed out after {0}s")]
    ProcessingTimeout(u64),
    #[error("storage read failed: {0}")]
    StorageReadFailure(String),
    #[error("storage write failed: {0}")]
    StorageWriteFailure(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable tag for manifests and exit-code mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::OutOfBoundsCrop => "out_of_bounds_crop",
            Self::UnsupportedInput(_) => "unsupported_input",
            Self::EncodeFailed(_) => "encode_failed",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::ProcessingTimeout(_) => "processing_timeout",
            Self::StorageReadFailure(_) => "storage_read_failure",
            Self::StorageWriteFailure(_) => "storage_write_failure",
            Self::NotFound(_) => "not_found",
        }
    }

    /// True for failures caused by the caller's parameters rather than by
    /// the image, the model, or storage.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. } | Self::UnsupportedFormat(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
