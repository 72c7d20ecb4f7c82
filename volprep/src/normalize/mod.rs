//! Content-aware intensity normalization.
//!
//! Three operations: [`zero_one`], [`center_scale`] and [`clip_normalize`]
//! (percentile clip, optional median subtraction, zero-one rescale and
//! optional quantization). [`NormalizationPolicy`] picks the operation from a
//! channel's content label.

mod quantize;


use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::error::{ConfigurationError, DataIntegrityError, Error, Result};
use crate::manifest::ContentLabel;
use crate::math::statistics::{mean_std, median_f32_mut, percentile_pair};
use crate::volume::{Volume, VolumeShape};

pub use quantize::quantize;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    /// Shift to a zero minimum and scale to a unit maximum.
    #[default]
    ZeroOne,
    /// Subtract the mean and divide by the standard deviation.
    CenterScale,
}

impl NormalizationMethod {
    pub fn apply(&self, volume: &Volume, on_degenerate: DegeneratePolicy) -> Result<Volume> {
        match self {
            Self::ZeroOne => zero_one(volume),
            Self::CenterScale => center_scale(volume, on_degenerate),
        }
    }
}

/// What [`center_scale`] does with a zero-variance volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Return the centered (all-zero) volume without scaling.
    #[default]
    Skip,
    /// Report [`Error::NumericDegeneracy`].
    Fail,
}

/// Shifts the volume to a zero minimum and divides by the shifted maximum.
///
/// A constant volume comes back all zero. Non-finite voxels are rejected.
pub fn zero_one(volume: &Volume) -> Result<Volume> {
    ensure_finite(volume, "zero_one")?;
    let Some((min, max)) = volume.min_max() else {
        return Ok(volume.clone());
    };

    let min = f64::from(min);
    let range = f64::from(max) - min;
    if range == 0.0 {
        tracing::debug!("Constant volume, zero-one scaling skipped");
        return Ok(Volume::filled(volume.shape(), 0.0));
    }

    Ok(volume.map(|v| ((f64::from(v) - min) / range) as f32))
}

/// Subtracts the mean and divides by the population standard deviation.
pub fn center_scale(volume: &Volume, on_degenerate: DegeneratePolicy) -> Result<Volume> {
    ensure_finite(volume, "center_scale")?;
    let Some((mean, std)) = mean_std(volume.voxels()) else {
        return Ok(volume.clone());
    };

    // Rounding in the mean leaves a tiny non-zero spread on constant input.
    if std == 0.0 || std <= f64::EPSILON * mean.abs() {
        return match on_degenerate {
            DegeneratePolicy::Skip => {
                tracing::debug!(mean, "Zero-variance volume, center-scale scaling skipped");
                Ok(Volume::filled(volume.shape(), 0.0))
            }
            DegeneratePolicy::Fail => Err(Error::NumericDegeneracy {
                operation: "center_scale",
                reason: format!("standard deviation is zero (mean {mean})"),
            }),
        };
    }

    Ok(volume.map(|v| ((f64::from(v) - mean) / std) as f32))
}

/// Inclusive percentile bounds in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileRange {
    pub low: f64,
    pub high: f64,
}

impl PercentileRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        let valid = (0.0..=100.0).contains(&self.low)
            && (0.0..=100.0).contains(&self.high)
            && self.low <= self.high;
        if !valid {
            return Err(ConfigurationError::InvalidPercentiles {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

impl Default for PercentileRange {
    fn default() -> Self {
        Self::new(0.0, 99.99)
    }
}

/// Clamps every voxel to the volume's own `[P_low, P_high]` percentile values.
pub fn percentile_clip(volume: &Volume, range: PercentileRange) -> Result<Volume> {
    range.validate()?;
    if volume.is_empty() {
        return Err(DataIntegrityError::EmptyPercentileWindow.into());
    }
    ensure_finite(volume, "percentile_clip")?;

    let mut scratch = Vec::with_capacity(volume.len());
    let (lo, hi) = percentile_pair(volume.voxels(), range.low, range.high, &mut scratch);
    tracing::debug!(lo, hi, "Percentile clip bounds");

    Ok(volume.map(|v| v.clamp(lo, hi)))
}

/// Element type of a clip-normalized volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDepth {
    /// Keep the `[0, 1]` floats.
    Float,
    U8,
    #[default]
    U16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipNormalizeConfig {
    pub percentiles: PercentileRange,
    pub subtract_median: bool,
    pub depth: OutputDepth,
}

impl ClipNormalizeConfig {
    /// Settings for the transmitted-light channel.
    pub fn transmitted() -> Self {
        Self {
            percentiles: PercentileRange::new(0.01, 99.99),
            subtract_median: false,
            depth: OutputDepth::U16,
        }
    }

    /// Settings for fluorescence and segmentation channels.
    pub fn fluorescence() -> Self {
        Self {
            percentiles: PercentileRange::new(0.0, 99.99),
            subtract_median: true,
            depth: OutputDepth::U16,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        self.percentiles.validate()
    }
}

impl Default for ClipNormalizeConfig {
    fn default() -> Self {
        Self::fluorescence()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClipOutput {
    Float(Volume<f32>),
    U8(Volume<u8>),
    U16(Volume<u16>),
}

impl ClipOutput {
    pub fn depth(&self) -> OutputDepth {
        match self {
            Self::Float(_) => OutputDepth::Float,
            Self::U8(_) => OutputDepth::U8,
            Self::U16(_) => OutputDepth::U16,
        }
    }

    pub fn shape(&self) -> VolumeShape {
        match self {
            Self::Float(v) => v.shape(),
            Self::U8(v) => v.shape(),
            Self::U16(v) => v.shape(),
        }
    }
}

/// Percentile clip, optional median subtraction, zero-one rescale and
/// quantization to the requested depth.
pub fn clip_normalize(volume: &Volume, config: &ClipNormalizeConfig) -> Result<ClipOutput> {
    let mut clipped = percentile_clip(volume, config.percentiles)?;

    if config.subtract_median {
        let mut scratch = clipped.voxels().to_vec();
        let median = median_f32_mut(&mut scratch);
        clipped = clipped.map(|v| (v - median).max(0.0));
    }

    let unit = zero_one(&clipped)?;
    Ok(match config.depth {
        OutputDepth::Float => ClipOutput::Float(unit),
        OutputDepth::U8 => ClipOutput::U8(quantize(&unit)),
        OutputDepth::U16 => ClipOutput::U16(quantize(&unit)),
    })
}

/// Content label to normalization lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationPolicy {
    /// Methods keyed by exact content label.
    pub rules: BTreeMap<String, NormalizationMethod>,
    /// Used for labels without a rule. `None` rejects unknown labels.
    pub fallback: Option<NormalizationMethod>,
    pub on_degenerate: DegeneratePolicy,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            rules: BTreeMap::from([(
                ContentLabel::BRIGHTFIELD.to_string(),
                NormalizationMethod::CenterScale,
            )]),
            fallback: Some(NormalizationMethod::ZeroOne),
            on_degenerate: DegeneratePolicy::Skip,
        }
    }
}

impl NormalizationPolicy {
    pub fn method_for(&self, label: &ContentLabel) -> Result<NormalizationMethod> {
        self.rules
            .get(label.as_str())
            .copied()
            .or(self.fallback)
            .ok_or_else(|| ConfigurationError::UnknownContentLabel(label.to_string()).into())
    }

    pub fn normalize(&self, volume: &Volume, label: &ContentLabel) -> Result<Volume> {
        let method = self.method_for(label)?;
        tracing::debug!(content = %label, method = %method, "Normalizing channel");
        method.apply(volume, self.on_degenerate)
    }
}

fn ensure_finite(volume: &Volume, operation: &'static str) -> Result<()> {
    if volume.all_finite() {
        return Ok(());
    }
    let count = volume.voxels().iter().filter(|v| !v.is_finite()).count();
    Err(Error::NumericDegeneracy {
        operation,
        reason: format!("{count} non-finite voxels"),
    })
}
