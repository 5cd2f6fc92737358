use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for the stem tissue pipeline
#[derive(Error, Debug)]
pub enum StemTissueError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    /// The raster does not have the channel layout the operation needs
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Size mismatch: expected {}x{}, found {}x{}", expected.0, expected.1, found.0, found.1)]
    SizeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    /// A mask that must contain foreground pixels is empty.
    /// Batch drivers recover from this one by recording a NaN row.
    #[error("Empty segmentation: {0}")]
    EmptySegmentation(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Unexpected error: {0}")]
    Other(String),
}

impl StemTissueError {
    /// Whether a batch run may record a degenerate row and carry on
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StemTissueError::EmptySegmentation(_))
    }
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, StemTissueError>;
