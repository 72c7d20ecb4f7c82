//! Random crop selection shared by every array of a sample.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, DataIntegrityError, Error, Result};
use crate::volume::{Volume, VolumeShape, AXIS_NAMES};

/// Requested crop extents, in post-resize voxels.
pub type CropShape = VolumeShape;

/// Axis-aligned box inside a volume: an offset and an extent per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropWindow {
    pub offset: [usize; 3],
    pub shape: VolumeShape,
}

impl CropWindow {
    pub const fn new(offset: [usize; 3], shape: VolumeShape) -> Self {
        Self { offset, shape }
    }

    fn fits(&self, extent: VolumeShape) -> bool {
        self.offset
            .iter()
            .zip(self.shape.dims())
            .zip(extent.dims())
            .all(|((&offset, len), extent)| offset + len <= extent)
    }

    /// Copies the windowed region out of `volume`.
    pub fn apply<T: Copy>(&self, volume: &Volume<T>) -> Result<Volume<T>> {
        let source = volume.shape();
        if !self.fits(source) {
            return Err(self.out_of_bounds(source));
        }

        let [z0, y0, x0] = self.offset;
        let mut voxels = Vec::with_capacity(self.shape.voxel_count());
        for z in z0..z0 + self.shape.depth {
            for y in y0..y0 + self.shape.height {
                let start = volume.index_of(z, y, x0);
                voxels.extend_from_slice(&volume.voxels()[start..start + self.shape.width]);
            }
        }
        Ok(Volume::new(self.shape, voxels))
    }

    /// Applies only the Y and X intervals to a single-plane volume.
    pub fn apply_planar<T: Copy>(&self, volume: &Volume<T>) -> Result<Volume<T>> {
        let source = volume.shape();
        if !source.is_planar() {
            return Err(self.out_of_bounds(source));
        }
        let planar = Self::new(
            [0, self.offset[1], self.offset[2]],
            VolumeShape::new(1, self.shape.height, self.shape.width),
        );
        planar.apply(volume)
    }

    fn out_of_bounds(&self, shape: VolumeShape) -> Error {
        DataIntegrityError::WindowOutOfBounds {
            window: format!("{self:?}"),
            shape,
        }
        .into()
    }
}

/// Draws crop windows of a fixed shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomCropper {
    shape: CropShape,
}

impl RandomCropper {
    pub fn new(shape: CropShape) -> std::result::Result<Self, ConfigurationError> {
        for (axis, extent) in AXIS_NAMES.into_iter().zip(shape.dims()) {
            if extent == 0 {
                return Err(ConfigurationError::EmptyCrop { axis });
            }
        }
        Ok(Self { shape })
    }

    pub fn shape(&self) -> CropShape {
        self.shape
    }

    /// Picks an independent uniform offset per axis in
    /// `[0, reference - crop]`. A crop as large as the reference on an axis
    /// always starts at 0 there.
    pub fn draw<R: Rng>(&self, reference: VolumeShape, rng: &mut R) -> Result<CropWindow> {
        let crop = self.shape.dims();
        let extent = reference.dims();
        let mut offset = [0usize; 3];
        for axis in 0..3 {
            if crop[axis] > extent[axis] {
                return Err(ConfigurationError::CropExceedsExtent {
                    axis: AXIS_NAMES[axis],
                    crop: crop[axis],
                    extent: extent[axis],
                }
                .into());
            }
            offset[axis] = rng.random_range(0..=extent[axis] - crop[axis]);
        }
        Ok(CropWindow::new(offset, self.shape))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn indexed(shape: VolumeShape) -> Volume {
        Volume::from_fn(shape, |z, y, x| (z * 10_000 + y * 100 + x) as f32)
    }

    #[test]
    fn test_full_extent_crop_has_zero_offset() {
        let shape = VolumeShape::new(4, 6, 8);
        let cropper = RandomCropper::new(shape).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..20 {
            let window = cropper.draw(shape, &mut rng).unwrap();
            assert_eq!(window.offset, [0, 0, 0]);
        }
    }

    #[test]
    fn test_crop_has_requested_shape_and_stays_inside() {
        let reference = VolumeShape::new(10, 32, 40);
        let crop = VolumeShape::new(3, 16, 7);
        let cropper = RandomCropper::new(crop).unwrap();
        let volume = indexed(reference);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..200 {
            let window = cropper.draw(reference, &mut rng).unwrap();
            assert!(window.offset[0] <= 7 && window.offset[1] <= 16 && window.offset[2] <= 33);
            let cropped = window.apply(&volume).unwrap();
            assert_eq!(cropped.shape(), crop);
            let [z0, y0, x0] = window.offset;
            assert_eq!(cropped[(0, 0, 0)], volume[(z0, y0, x0)]);
            assert_eq!(cropped[(2, 15, 6)], volume[(z0 + 2, y0 + 15, x0 + 6)]);
        }
    }

    #[test]
    fn test_offsets_cover_full_range() {
        let cropper = RandomCropper::new(VolumeShape::new(1, 1, 3)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let window = cropper.draw(VolumeShape::new(1, 1, 5), &mut rng).unwrap();
            seen[window.offset[2]] = true;
        }
        assert_eq!(seen, [true; 3]);
    }

    #[test]
    fn test_same_window_crops_two_arrays_identically() {
        let shape = VolumeShape::new(5, 12, 12);
        let input = indexed(shape);
        let target = input.map(|v| v * 2.0);
        let window = RandomCropper::new(VolumeShape::new(2, 5, 5))
            .unwrap()
            .draw(shape, &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();

        let a = window.apply(&input).unwrap();
        let b = window.apply(&target).unwrap();
        assert_eq!(a.map(|v| v * 2.0), b);
    }

    #[test]
    fn test_same_seed_same_window() {
        let cropper = RandomCropper::new(VolumeShape::new(2, 8, 8)).unwrap();
        let reference = VolumeShape::new(20, 64, 64);
        let a = cropper.draw(reference, &mut ChaCha8Rng::seed_from_u64(99)).unwrap();
        let b = cropper.draw(reference, &mut ChaCha8Rng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_crop_exceeding_extent_is_configuration_error() {
        let cropper = RandomCropper::new(VolumeShape::new(4, 8, 8)).unwrap();
        let err = cropper
            .draw(VolumeShape::new(4, 6, 8), &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::CropExceedsExtent {
                axis: "y",
                crop: 8,
                extent: 6
            })
        ));
    }

    #[test]
    fn test_zero_crop_extent_rejected() {
        assert_eq!(
            RandomCropper::new(VolumeShape::new(1, 0, 4)),
            Err(ConfigurationError::EmptyCrop { axis: "y" })
        );
    }

    #[test]
    fn test_apply_planar_ignores_depth_interval() {
        let plane = indexed(VolumeShape::new(1, 10, 10));
        let window = CropWindow::new([3, 2, 4], VolumeShape::new(5, 3, 3));
        let cropped = window.apply_planar(&plane).unwrap();
        assert_eq!(cropped.shape(), VolumeShape::new(1, 3, 3));
        assert_eq!(cropped[(0, 0, 0)], plane[(0, 2, 4)]);

        assert!(matches!(
            window.apply(&plane),
            Err(Error::DataIntegrity(DataIntegrityError::WindowOutOfBounds { .. }))
        ));
    }
}
