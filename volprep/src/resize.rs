//! Order-1 volume resampling.
//!
//! Linear interpolation applied separably along X, Y then Z. Output extents
//! are `round(extent * factor)` (ties to even, at least 1) and output samples
//! are endpoint aligned: the first and last output voxel on every axis sit on
//! the first and last input voxel. Neighbours past the edge are fetched with
//! reflect (half-sample symmetric) indexing.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};
use crate::volume::{Volume, VolumeShape, AXIS_NAMES};

/// Per-axis scale factors, Z first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "FactorRepr")]
pub struct ResizeFactor {
    pub z: f64,
    pub y: f64,
    pub x: f64,
}

/// Config files may give a single isotropic number or one value per axis.
#[derive(Deserialize)]
#[serde(untagged)]
enum FactorRepr {
    Isotropic(f64),
    PerAxis { z: f64, y: f64, x: f64 },
}

impl From<FactorRepr> for ResizeFactor {
    fn from(repr: FactorRepr) -> Self {
        match repr {
            FactorRepr::Isotropic(f) => Self::isotropic(f),
            FactorRepr::PerAxis { z, y, x } => Self::new(z, y, x),
        }
    }
}

impl ResizeFactor {
    pub const fn new(z: f64, y: f64, x: f64) -> Self {
        Self { z, y, x }
    }

    pub const fn isotropic(factor: f64) -> Self {
        Self::new(factor, factor, factor)
    }

    /// Same factor on Y and X, depth untouched.
    pub const fn planar(factor: f64) -> Self {
        Self::new(1.0, factor, factor)
    }

    pub const fn dims(&self) -> [f64; 3] {
        [self.z, self.y, self.x]
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        for (axis, factor) in AXIS_NAMES.into_iter().zip(self.dims()) {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(ConfigurationError::InvalidResizeFactor { axis, factor });
            }
        }
        Ok(())
    }

    pub fn output_shape(&self, shape: VolumeShape) -> VolumeShape {
        let dims = shape.dims();
        let factors = self.dims();
        VolumeShape::from_dims(std::array::from_fn(|i| {
            scaled_extent(dims[i], factors[i])
        }))
    }
}

fn scaled_extent(extent: usize, factor: f64) -> usize {
    if extent == 0 {
        return 0;
    }
    ((extent as f64 * factor).round_ties_even() as usize).max(1)
}

/// Resamples `volume` by `factor` with linear interpolation.
pub fn resize(volume: &Volume, factor: ResizeFactor) -> Result<Volume> {
    factor.validate()?;
    let input = volume.shape();
    let output = factor.output_shape(input);

    if output == input {
        return Ok(volume.clone());
    }
    if output.voxel_count() == 0 {
        return Ok(Volume::new(output, Vec::new()));
    }

    tracing::debug!(?input, ?output, "Resizing volume");

    let along_x = resample_x(volume.voxels(), input, output.width);
    let shape = VolumeShape::new(input.depth, input.height, output.width);
    let along_y = resample_y(&along_x, shape, output.height);
    let shape = VolumeShape::new(input.depth, output.height, output.width);
    let along_z = resample_z(&along_y, shape, output.depth);

    Ok(Volume::new(output, along_z))
}

/// Two neighbouring source samples and the weight of the upper one.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    lo: usize,
    hi: usize,
    weight: f32,
}

impl Tap {
    #[inline]
    fn blend(&self, lo: f32, hi: f32) -> f32 {
        if self.weight == 0.0 {
            lo
        } else {
            lo + (hi - lo) * self.weight
        }
    }
}

fn taps(in_len: usize, out_len: usize) -> Vec<Tap> {
    (0..out_len)
        .map(|o| {
            let source = if out_len == 1 {
                0.0
            } else {
                o as f64 * (in_len - 1) as f64 / (out_len - 1) as f64
            };
            let lo = source.floor();
            let weight = (source - lo) as f32;
            let lo = lo as isize;
            Tap {
                lo: reflect(lo, in_len),
                hi: reflect(lo + 1, in_len),
                weight,
            }
        })
        .collect()
}

/// Half-sample symmetric reflection: `-1 -> 0`, `len -> len - 1`.
#[inline]
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

fn resample_x(data: &[f32], shape: VolumeShape, out_width: usize) -> Vec<f32> {
    if out_width == shape.width {
        return data.to_vec();
    }
    let taps = taps(shape.width, out_width);
    let mut out = vec![0.0; shape.depth * shape.height * out_width];
    out.par_chunks_mut(out_width)
        .zip(data.par_chunks(shape.width))
        .for_each(|(dst, src)| {
            for (d, tap) in dst.iter_mut().zip(&taps) {
                *d = tap.blend(src[tap.lo], src[tap.hi]);
            }
        });
    out
}

fn resample_y(data: &[f32], shape: VolumeShape, out_height: usize) -> Vec<f32> {
    if out_height == shape.height {
        return data.to_vec();
    }
    let width = shape.width;
    let taps = taps(shape.height, out_height);
    let mut out = vec![0.0; shape.depth * out_height * width];
    out.par_chunks_mut(out_height * width)
        .zip(data.par_chunks(shape.plane_len()))
        .for_each(|(dst_plane, src_plane)| {
            for (dst_row, tap) in dst_plane.chunks_exact_mut(width).zip(&taps) {
                let lo = &src_plane[tap.lo * width..(tap.lo + 1) * width];
                let hi = &src_plane[tap.hi * width..(tap.hi + 1) * width];
                for ((d, &a), &b) in dst_row.iter_mut().zip(lo).zip(hi) {
                    *d = tap.blend(a, b);
                }
            }
        });
    out
}

fn resample_z(data: &[f32], shape: VolumeShape, out_depth: usize) -> Vec<f32> {
    if out_depth == shape.depth {
        return data.to_vec();
    }
    let plane_len = shape.plane_len();
    let taps = taps(shape.depth, out_depth);
    let mut out = vec![0.0; out_depth * plane_len];
    out.par_chunks_mut(plane_len)
        .zip(taps.par_iter())
        .for_each(|(dst, tap)| {
            let lo = &data[tap.lo * plane_len..(tap.lo + 1) * plane_len];
            let hi = &data[tap.hi * plane_len..(tap.hi + 1) * plane_len];
            for ((d, &a), &b) in dst.iter_mut().zip(lo).zip(hi) {
                *d = tap.blend(a, b);
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-4 * e.abs().max(1.0), "voxel {i}: {a} != {e}");
        }
    }

    #[test]
    fn test_output_shape_rounds_half_to_even() {
        let factor = ResizeFactor::isotropic(0.5);
        assert_eq!(
            factor.output_shape(VolumeShape::new(5, 7, 3)),
            VolumeShape::new(2, 4, 2)
        );
        assert_eq!(
            ResizeFactor::isotropic(0.01).output_shape(VolumeShape::new(3, 3, 3)),
            VolumeShape::new(1, 1, 1)
        );
    }

    #[test]
    fn test_identity_factor_is_noop() {
        let volume = Volume::from_fn(VolumeShape::new(2, 3, 4), |z, y, x| {
            (z * 100 + y * 10 + x) as f32
        });
        assert_eq!(resize(&volume, ResizeFactor::isotropic(1.0)).unwrap(), volume);
    }

    #[test]
    fn test_upsample_reproduces_linear_ramp() {
        let volume = Volume::new(VolumeShape::new(1, 1, 4), vec![0.0, 1.0, 2.0, 3.0]);
        let resized = resize(&volume, ResizeFactor::new(1.0, 1.0, 2.0)).unwrap();
        assert_eq!(resized.shape(), VolumeShape::new(1, 1, 8));
        let expected: Vec<f32> = (0..8).map(|o| o as f32 * 3.0 / 7.0).collect();
        assert_close(resized.voxels(), &expected);
    }

    #[test]
    fn test_downsample_keeps_corners() {
        let volume = Volume::from_fn(VolumeShape::new(5, 9, 9), |z, y, x| {
            (z * z) as f32 + (y as f32).sqrt() + 0.5 * x as f32
        });
        let resized = resize(&volume, ResizeFactor::isotropic(0.5)).unwrap();
        let out = resized.shape();
        assert_eq!(out, VolumeShape::new(2, 4, 4));
        assert_eq!(resized[(0, 0, 0)], volume[(0, 0, 0)]);
        assert!((resized[(1, 3, 3)] - volume[(4, 8, 8)]).abs() < 1e-4);
    }

    #[test]
    fn test_trilinear_function_is_exact() {
        let f = |z: f32, y: f32, x: f32| 2.0 * z - 0.5 * y + 3.0 * x + 1.0;
        let shape = VolumeShape::new(3, 4, 5);
        let volume = Volume::from_fn(shape, |z, y, x| f(z as f32, y as f32, x as f32));
        let factor = ResizeFactor::new(2.0, 1.5, 0.6);
        let resized = resize(&volume, factor).unwrap();
        let out = resized.shape();
        assert_eq!(out, VolumeShape::new(6, 6, 3));

        let scale = |o: usize, n_in: usize, n_out: usize| {
            o as f32 * (n_in - 1) as f32 / (n_out - 1) as f32
        };
        let expected = Volume::from_fn(out, |z, y, x| {
            f(scale(z, 3, 6), scale(y, 4, 6), scale(x, 5, 3))
        });
        assert_close(resized.voxels(), expected.voxels());
    }

    #[test]
    fn test_constant_volume_stays_constant() {
        let volume = Volume::filled(VolumeShape::new(4, 6, 6), 7.25);
        let resized = resize(&volume, ResizeFactor::new(0.75, 1.7, 0.3)).unwrap();
        assert!(resized.voxels().iter().all(|&v| (v - 7.25).abs() < 1e-6));
    }

    #[test]
    fn test_planar_factor_keeps_single_plane() {
        let volume = Volume::filled(VolumeShape::new(1, 10, 12), 1.0);
        let resized = resize(&volume, ResizeFactor::planar(0.5)).unwrap();
        assert_eq!(resized.shape(), VolumeShape::new(1, 5, 6));
    }

    #[test]
    fn test_reflect_indexing() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
        assert_eq!(reflect(1, 1), 0);
    }

    #[test]
    fn test_invalid_factors_are_rejected() {
        let volume = Volume::filled(VolumeShape::new(1, 2, 2), 0.0);
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = resize(&volume, ResizeFactor::new(1.0, bad, 1.0)).unwrap_err();
            assert!(matches!(
                err,
                Error::Configuration(ConfigurationError::InvalidResizeFactor { axis: "y", .. })
            ));
        }
    }

    #[test]
    fn test_factor_deserializes_from_number_or_axes() {
        let iso: ResizeFactor = serde_json::from_str("0.5").unwrap();
        assert_eq!(iso, ResizeFactor::isotropic(0.5));
        let axes: ResizeFactor =
            serde_json::from_str(r#"{"z": 1.0, "y": 0.5, "x": 0.25}"#).unwrap();
        assert_eq!(axes, ResizeFactor::new(1.0, 0.5, 0.25));
    }
}
