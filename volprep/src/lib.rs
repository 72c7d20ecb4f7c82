//! volprep - volumetric microscopy sample preparation.
//!
//! Turns raw multi-channel 3D acquisitions into paired, normalized,
//! shape-matched training samples, and partitions a dataset manifest into
//! reproducible train/valid/test subsets:
//! - Deterministic hash-split of manifest rows ([`partition`])
//! - Content-aware intensity normalization ([`normalize`])
//! - Trilinear resizing, random cropping and planar extrusion
//! - The sample pipeline tying the stages together ([`pipeline`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use volprep::{Manifest, PipelineConfig, SamplePipeline, TiffReader};
//!
//! let manifest = Manifest::read_csv("dataset.csv".as_ref())?;
//! let pipeline = SamplePipeline::from_manifest(TiffReader::new(), &manifest, PipelineConfig::default())?;
//! let sample = pipeline.get(0)?;
//! ```

pub mod config;
pub mod crop;
pub mod error;
pub mod extrude;
pub mod io;
pub mod manifest;
pub mod math;
pub mod normalize;
pub mod partition;
pub mod pipeline;
pub mod preprocess;
pub mod probe;
pub mod resize;
pub mod volume;

pub use config::Config;
pub use error::{ConfigurationError, DataIntegrityError, Error, ResourceError, Result};
pub use io::{ImageShape, MemoryReader, TiffReader, TiffWriter, VolumeReader};
pub use manifest::{ContentLabel, Manifest};
pub use partition::{hashsplit, Partition, SplitWeights};
pub use pipeline::{PipelineConfig, SampleOutput, SamplePipeline};
pub use volume::{Volume, VolumeShape};
