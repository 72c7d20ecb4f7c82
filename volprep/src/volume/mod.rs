//! Dense 3D voxel buffers indexed (Z, Y, X).

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::DataIntegrityError;


/// Axis names in storage order, used in error messages.
pub const AXIS_NAMES: [&str; 3] = ["z", "y", "x"];

/// Extents of a volume along Z, Y and X.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VolumeShape {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl VolumeShape {
    pub const fn new(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    pub const fn from_dims(dims: [usize; 3]) -> Self {
        Self::new(dims[0], dims[1], dims[2])
    }

    #[inline]
    pub const fn dims(&self) -> [usize; 3] {
        [self.depth, self.height, self.width]
    }

    #[inline]
    pub const fn voxel_count(&self) -> usize {
        self.depth * self.height * self.width
    }

    /// Number of voxels in one Z plane.
    #[inline]
    pub const fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// A volume with a single Z plane, i.e. a 2D image.
    #[inline]
    pub const fn is_planar(&self) -> bool {
        self.depth == 1
    }

    /// Same (Y, X) extent, ignoring depth.
    #[inline]
    pub const fn same_plane(&self, other: &Self) -> bool {
        self.height == other.height && self.width == other.width
    }
}

/// Physical voxel spacing. Carried alongside a volume, never used by transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPixelSize {
    pub z: f64,
    pub y: f64,
    pub x: f64,
}

/// Immutable voxel buffer. Every transform returns a new volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T = f32> {
    shape: VolumeShape,
    voxels: Vec<T>,
}

impl<T> Volume<T> {
    /// Wraps a voxel buffer in storage order (Z slowest, X fastest).
    ///
    /// # Panics
    ///
    /// Panics if `voxels.len()` does not match the shape.
    pub fn new(shape: VolumeShape, voxels: Vec<T>) -> Self {
        assert_eq!(
            voxels.len(),
            shape.voxel_count(),
            "voxel count must equal depth * height * width"
        );
        Self { shape, voxels }
    }

    /// Like [`Volume::new`], but reports a mismatched buffer as an error.
    pub fn try_new(shape: VolumeShape, voxels: Vec<T>) -> Result<Self, DataIntegrityError> {
        if voxels.len() != shape.voxel_count() {
            return Err(DataIntegrityError::VoxelCountMismatch {
                shape,
                len: voxels.len(),
            });
        }
        Ok(Self { shape, voxels })
    }

    #[inline]
    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    #[inline]
    pub fn voxels(&self) -> &[T] {
        &self.voxels
    }

    #[inline]
    pub fn index_of(&self, z: usize, y: usize, x: usize) -> usize {
        debug_assert!(z < self.shape.depth && y < self.shape.height && x < self.shape.width);
        (z * self.shape.height + y) * self.shape.width + x
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> &T {
        &self.voxels[self.index_of(z, y, x)]
    }

    /// The (Y, X) plane at depth `z`.
    #[inline]
    pub fn plane(&self, z: usize) -> &[T] {
        let len = self.shape.plane_len();
        &self.voxels[z * len..(z + 1) * len]
    }

    pub fn map<U, F>(&self, f: F) -> Volume<U>
    where
        T: Copy,
        F: Fn(T) -> U,
    {
        Volume {
            shape: self.shape,
            voxels: self.voxels.iter().map(|&v| f(v)).collect(),
        }
    }
}

impl<T: Clone> Volume<T> {
    pub fn filled(shape: VolumeShape, value: T) -> Self {
        Self {
            shape,
            voxels: vec![value; shape.voxel_count()],
        }
    }
}

impl Volume<f32> {
    pub fn from_fn<F>(shape: VolumeShape, f: F) -> Self
    where
        F: Fn(usize, usize, usize) -> f32,
    {
        let mut voxels = Vec::with_capacity(shape.voxel_count());
        for z in 0..shape.depth {
            for y in 0..shape.height {
                for x in 0..shape.width {
                    voxels.push(f(z, y, x));
                }
            }
        }
        Self { shape, voxels }
    }

    /// Minimum and maximum voxel value, `None` for an empty volume.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let first = *self.voxels.first()?;
        Some(
            self.voxels
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    pub fn all_finite(&self) -> bool {
        self.voxels.iter().all(|v| v.is_finite())
    }

    /// Maximum-intensity projection along Z, as a single-plane volume.
    pub fn max_projection(&self) -> Volume<f32> {
        let plane_len = self.shape.plane_len();
        let mut projection = vec![f32::NEG_INFINITY; plane_len];
        for plane in self.voxels.chunks_exact(plane_len.max(1)) {
            for (dst, &v) in projection.iter_mut().zip(plane) {
                *dst = dst.max(v);
            }
        }
        if self.shape.depth == 0 {
            projection.iter_mut().for_each(|v| *v = 0.0);
        }
        Volume::new(
            VolumeShape::new(1, self.shape.height, self.shape.width),
            projection,
        )
    }
}

impl<T> Index<(usize, usize, usize)> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, (z, y, x): (usize, usize, usize)) -> &Self::Output {
        self.get(z, y, x)
    }
}

/// One channel of an image file, as returned by a [`crate::io::VolumeReader`].
#[derive(Debug, Clone)]
pub struct ChannelImage {
    pub volume: Volume<f32>,
    pub pixel_size: Option<PhysicalPixelSize>,
}

impl ChannelImage {
    pub fn new(volume: Volume<f32>) -> Self {
        Self {
            volume,
            pixel_size: None,
        }
    }
}
