//! Run configuration for the `volprep` binary.
//!
//! Every field has a default, so an empty YAML or JSON file is a valid
//! configuration. The format is picked from the file extension.

use std::path::{Path, PathBuf};

use common::file_format::{self, FileFormatError};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ResourceError, Result};
use crate::io::ImageShape;
use crate::partition::{SplitWeights, DEFAULT_DIGITS};
use crate::pipeline::PipelineConfig;
use crate::preprocess::PreprocessConfig;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub partition: PartitionConfig,
    pub probe: ProbeConfig,
    pub preprocess: PreprocessConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub weights: SplitWeights,
    pub salt: String,
    pub digits: usize,
    /// Manifest column whose values are hashed.
    pub column: String,
    pub output_dir: PathBuf,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            weights: SplitWeights::default(),
            salt: "0".to_string(),
            digits: DEFAULT_DIGITS,
            column: "file".to_string(),
            output_dir: PathBuf::from("splits"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Full acquisition shape a file must have to be kept. `None` keeps all.
    pub expected: Option<ImageShape>,
    pub max_concurrent: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            expected: None,
            max_concurrent: 8,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = file_format::load(path).map_err(|err| load_error(path, err))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        file_format::save(self, path).map_err(|err| load_error(path, err))?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "logging level must not be empty".to_string(),
            ));
        }

        self.partition.weights.validate()?;
        if self.partition.digits == 0 {
            return Err(ConfigurationError::ZeroDigits);
        }
        if self.partition.column.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "partition column must not be empty".to_string(),
            ));
        }

        if self.probe.max_concurrent == 0 {
            return Err(ConfigurationError::ZeroConcurrency);
        }

        self.preprocess.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

fn load_error(path: &Path, err: FileFormatError) -> crate::error::Error {
    match err {
        FileFormatError::Io { source, .. } => ResourceError::io(path, source).into(),
        other => ConfigurationError::Invalid(format!("{}: {other}", path.display())).into(),
    }
}
