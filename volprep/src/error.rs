//! Error types shared by every volprep stage.

use std::path::PathBuf;

use thiserror::Error;

use crate::volume::VolumeShape;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Numeric degeneracy in {operation}: {reason}")]
    NumericDegeneracy {
        operation: &'static str,
        reason: String,
    },
}

/// Invalid parameters supplied by the caller or a config file.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Partition weights are empty")]
    EmptyWeights,

    #[error("Partition weight for bucket '{bucket}' must be positive and finite, got {weight}")]
    NonPositiveWeight { bucket: String, weight: f64 },

    #[error("Hash digit count must be at least 1")]
    ZeroDigits,

    #[error("Crop extent {crop} exceeds {axis} extent {extent}")]
    CropExceedsExtent {
        axis: &'static str,
        crop: usize,
        extent: usize,
    },

    #[error("Crop extent on {axis} must be at least 1")]
    EmptyCrop { axis: &'static str },

    #[error("Unknown content label '{0}'")]
    UnknownContentLabel(String),

    #[error("Invalid percentile range [{low}, {high}]; expected 0 <= low <= high <= 100")]
    InvalidPercentiles { low: f64, high: f64 },

    #[error("Resize factor on {axis} must be positive and finite, got {factor}")]
    InvalidResizeFactor { axis: &'static str, factor: f64 },

    #[error("Max concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("{0}")]
    Invalid(String),
}

/// Data that violates a shape or schema invariant.
#[derive(Debug, Error, PartialEq)]
pub enum DataIntegrityError {
    #[error("Sample shape mismatch: input {input:?}, target {target:?}")]
    SampleShapeMismatch {
        input: Vec<usize>,
        target: Vec<usize>,
    },

    #[error("Cannot extrude plane {plane:?} against reference {reference:?}")]
    ExtrusionMismatch {
        plane: VolumeShape,
        reference: VolumeShape,
    },

    #[error("Percentile window is empty (volume has no voxels)")]
    EmptyPercentileWindow,

    #[error("Voxel buffer of length {len} does not match shape {shape:?}")]
    VoxelCountMismatch { shape: VolumeShape, len: usize },

    #[error("Crop window {window:?} does not fit volume {shape:?}")]
    WindowOutOfBounds { window: String, shape: VolumeShape },

    #[error("Manifest is missing column '{0}'")]
    MissingColumn(String),

    #[error("Manifest row {row}: invalid value '{value}' in column '{column}'")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Column '{column}' has {actual} values, manifest has {expected} rows")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Output path '{0}' is produced by more than one manifest row")]
    DuplicateOutput(PathBuf),

    #[error("Sample index {index} out of range for {len} samples")]
    SampleIndexOutOfRange { index: usize, len: usize },

    #[error("No '{content}' channel found for file '{file}'")]
    MissingChannel { file: String, content: String },
}

/// External files that cannot be read or written.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode TIFF '{path}': {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("Failed to read CSV '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to read JSON '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{path}' is not a usable volume: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("'{path}' has no channel {channel} (found {channels})")]
    ChannelOutOfRange {
        path: PathBuf,
        channel: usize,
        channels: usize,
    },

    #[error("'{0}' not found")]
    NotFound(PathBuf),
}

impl ResourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}
