//! Error types for dataset preparation and sampling.

use std::path::PathBuf;

use thiserror::Error;

/// Dataset pipeline error types
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Source directory, audio file, cache file or patch does not exist
    #[error("Not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// File is readable but uses a layout this crate refuses to interpret
    #[error("Unsupported format in {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// File is malformed (bad magic, unparsable header, missing archive member)
    #[error("Malformed file {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// All three spectrograms are zero, so no normalization coefficient exists
    #[error("Silent spectrogram triple (peak magnitude is 0): {}", path.display())]
    Silent { path: PathBuf },

    /// Mutually exclusive or out-of-range options
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Requested row window does not fit in the cached array
    #[error(
        "Crop out of range in {}: rows [{start}, {start}+{count}) exceed {rows} available",
        path.display()
    )]
    CropOutOfRange {
        path: PathBuf,
        rows: usize,
        start: usize,
        count: usize,
    },

    /// Sample index past the end of a provider
    #[error("Sample index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Failure reported by an external spectrogram codec
    #[error(transparent)]
    Codec(#[from] anyhow::Error),
}

impl DatasetError {
    pub(crate) fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for dataset operations
pub type DatasetResult<T> = Result<T, DatasetError>;
