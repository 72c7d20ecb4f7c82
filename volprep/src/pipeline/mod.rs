//! Paired training samples: a transmitted-light input and a target channel.
//!
//! Stage order is fixed; each optional stage is switched by
//! [`PipelineConfig`]:
//!
//! read -> resize -> normalize -> input percentile clip -> renormalize
//! -> random crop (one window for both arrays) -> extrude planar target
//! -> optional leading channel axis -> pair or named output.
//!
//! Whatever stages are enabled, the emitted input and target have the same
//! shape; the pipeline checks this before returning.

mod entry;


use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::crop::{CropShape, CropWindow, RandomCropper};
use crate::error::{ConfigurationError, DataIntegrityError, Result};
use crate::extrude::extrude;
use crate::io::VolumeReader;
use crate::manifest::{ContentLabel, Manifest};
use crate::normalize::{percentile_clip, NormalizationPolicy, PercentileRange};
use crate::resize::{resize, ResizeFactor};
use crate::volume::{ChannelImage, Volume};

pub use entry::{ChannelRef, SampleEntry};

/// Key of the input array in [`SampleOutput::Named`].
pub const INPUT_NAME: &str = "Brightfield";
/// Key of the target array in [`SampleOutput::Named`].
pub const TARGET_NAME: &str = "Target";

/// Where sample channels are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLayout {
    /// Both channels live in one multi-channel acquisition file.
    #[default]
    MultiChannel,
    /// Each channel was preprocessed into its own single-channel file.
    SingleChannelFiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// `(input, target)`.
    #[default]
    Pair,
    /// `{"Brightfield": input, "Target": target}`.
    Named,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub layout: SourceLayout,
    /// Content label of the target channel, e.g. `DNA`.
    pub target_content: String,
    /// Input channel index used when a file has no transmitted-light row.
    pub input_channel: usize,
    /// Manifest column holding a separate target image path, e.g. a 2D
    /// segmentation. Overrides the target channel lookup when set.
    pub target_column: Option<String>,
    /// The target is a single plane that must be extruded to the input depth.
    pub target_is_planar: bool,
    pub resize: Option<ResizeFactor>,
    pub normalize: bool,
    pub normalization: NormalizationPolicy,
    /// Percentile clip applied to the input only.
    pub input_clip: Option<PercentileRange>,
    /// Second normalization pass over the input after clipping.
    pub renormalize: bool,
    pub crop: Option<CropShape>,
    /// Prepend a size-1 channel axis to both arrays.
    pub channel_axis: bool,
    pub output: OutputFormat,
    /// Seed for [`SamplePipeline::get`]. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: SourceLayout::MultiChannel,
            target_content: "DNA".to_string(),
            input_channel: 0,
            target_column: None,
            target_is_planar: false,
            resize: None,
            normalize: true,
            normalization: NormalizationPolicy::default(),
            input_clip: None,
            renormalize: false,
            crop: None,
            channel_axis: false,
            output: OutputFormat::Pair,
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.target_content.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "pipeline target_content must not be empty".to_string(),
            ));
        }
        if let Some(factor) = &self.resize {
            factor.validate()?;
        }
        if let Some(range) = &self.input_clip {
            range.validate()?;
        }
        if let Some(shape) = self.crop {
            RandomCropper::new(shape)?;
        }
        Ok(())
    }

    pub fn target_label(&self) -> ContentLabel {
        ContentLabel::new(self.target_content.as_str())
    }
}

/// One array of a sample, optionally viewed with a leading channel axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleArray {
    pub volume: Volume<f32>,
    pub channel_axis: bool,
}

impl SampleArray {
    /// `[Z, Y, X]`, or `[1, Z, Y, X]` with a channel axis.
    pub fn shape(&self) -> Vec<usize> {
        let dims = self.volume.shape().dims();
        if self.channel_axis {
            vec![1, dims[0], dims[1], dims[2]]
        } else {
            dims.to_vec()
        }
    }

    pub fn voxels(&self) -> &[f32] {
        self.volume.voxels()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: SampleArray,
    pub target: SampleArray,
    /// Window both arrays were cropped with, if cropping is enabled.
    pub window: Option<CropWindow>,
}

impl Sample {
    pub fn into_output(self, format: OutputFormat) -> SampleOutput {
        match format {
            OutputFormat::Pair => SampleOutput::Pair(self.input, self.target),
            OutputFormat::Named => SampleOutput::Named(BTreeMap::from([
                (INPUT_NAME.to_string(), self.input),
                (TARGET_NAME.to_string(), self.target),
            ])),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutput {
    Pair(SampleArray, SampleArray),
    Named(BTreeMap<String, SampleArray>),
}

impl SampleOutput {
    pub fn input(&self) -> Option<&SampleArray> {
        match self {
            Self::Pair(input, _) => Some(input),
            Self::Named(map) => map.get(INPUT_NAME),
        }
    }

    pub fn target(&self) -> Option<&SampleArray> {
        match self {
            Self::Pair(_, target) => Some(target),
            Self::Named(map) => map.get(TARGET_NAME),
        }
    }
}

/// Produces paired samples from a list of entries.
///
/// Sampling reads files and allocates fresh arrays only, so one pipeline
/// can serve many threads at once.
pub struct SamplePipeline<R> {
    reader: R,
    entries: Vec<SampleEntry>,
    config: PipelineConfig,
    cropper: Option<RandomCropper>,
}

impl<R: VolumeReader> SamplePipeline<R> {
    pub fn new(reader: R, entries: Vec<SampleEntry>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let cropper = config.crop.map(RandomCropper::new).transpose()?;
        Ok(Self {
            reader,
            entries,
            config,
            cropper,
        })
    }

    /// Builds one entry per manifest row carrying the configured target content.
    pub fn from_manifest(reader: R, manifest: &Manifest, config: PipelineConfig) -> Result<Self> {
        let entries = SampleEntry::from_manifest(manifest, &config)?;
        tracing::info!(
            samples = entries.len(),
            target = %config.target_content,
            layout = %config.layout,
            "Built sample pipeline"
        );
        Self::new(reader, entries, config)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Sample `index` with crop offsets drawn from `rng`.
    pub fn sample<G: Rng>(&self, index: usize, rng: &mut G) -> Result<SampleOutput> {
        Ok(self.sample_arrays(index, rng)?.into_output(self.config.output))
    }

    /// Sample `index` with a generator derived from the configured seed, so
    /// the same index always yields the same crop.
    pub fn get(&self, index: usize) -> Result<SampleOutput> {
        let mut rng = self.rng_for(index);
        self.sample(index, &mut rng)
    }

    /// [`SamplePipeline::get`] for many indices in parallel.
    pub fn get_many(&self, indices: &[usize]) -> Result<Vec<SampleOutput>> {
        indices.par_iter().map(|&index| self.get(index)).collect()
    }

    fn rng_for(&self, index: usize) -> ChaCha8Rng {
        match self.config.seed {
            Some(seed) => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(index as u64);
                rng
            }
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Runs every enabled stage and returns the unformatted sample.
    pub fn sample_arrays<G: Rng>(&self, index: usize, rng: &mut G) -> Result<Sample> {
        let entry = self
            .entries
            .get(index)
            .ok_or(DataIntegrityError::SampleIndexOutOfRange {
                index,
                len: self.entries.len(),
            })?;
        let config = &self.config;

        let input_image = self.read(&entry.input)?;
        let target_image = self.read(&entry.target)?;
        let mut input = input_image.volume;
        let mut target = target_image.volume;
        tracing::debug!(
            index,
            input = ?input.shape(),
            target = ?target.shape(),
            "Read sample channels"
        );

        if let Some(factor) = config.resize {
            input = resize(&input, factor)?;
            let target_factor = if config.target_is_planar {
                ResizeFactor::new(1.0, factor.y, factor.x)
            } else {
                factor
            };
            target = resize(&target, target_factor)?;
        }

        if config.normalize {
            input = config.normalization.normalize(&input, &entry.input.content)?;
            target = config.normalization.normalize(&target, &entry.target.content)?;
        }

        if let Some(range) = config.input_clip {
            input = percentile_clip(&input, range)?;
        }

        if config.renormalize {
            input = config.normalization.normalize(&input, &entry.input.content)?;
        }

        let mut window = None;
        if let Some(cropper) = &self.cropper {
            let (input_shape, target_shape) = (input.shape(), target.shape());
            let aligned = if config.target_is_planar {
                input_shape.same_plane(&target_shape)
            } else {
                input_shape == target_shape
            };
            if !aligned {
                return Err(DataIntegrityError::SampleShapeMismatch {
                    input: input_shape.dims().to_vec(),
                    target: target_shape.dims().to_vec(),
                }
                .into());
            }
            let drawn = cropper.draw(input.shape(), rng)?;
            input = drawn.apply(&input)?;
            target = if config.target_is_planar {
                drawn.apply_planar(&target)?
            } else {
                drawn.apply(&target)?
            };
            tracing::debug!(index, offset = ?drawn.offset, "Cropped sample");
            window = Some(drawn);
        }

        if config.target_is_planar {
            target = extrude(&target, input.shape())?;
        }

        let input = SampleArray {
            volume: input,
            channel_axis: config.channel_axis,
        };
        let target = SampleArray {
            volume: target,
            channel_axis: config.channel_axis,
        };
        ensure_same_shape(&input, &target)?;

        Ok(Sample {
            input,
            target,
            window,
        })
    }

    fn read(&self, channel: &ChannelRef) -> Result<ChannelImage> {
        match channel.channel {
            Some(index) => self.reader.read_channel(&channel.path, index),
            None => self.reader.read_single(&channel.path),
        }
    }
}

fn ensure_same_shape(input: &SampleArray, target: &SampleArray) -> Result<()> {
    let (input, target) = (input.shape(), target.shape());
    if input != target {
        return Err(DataIntegrityError::SampleShapeMismatch { input, target }.into());
    }
    Ok(())
}
