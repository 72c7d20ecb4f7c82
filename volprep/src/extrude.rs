//! Fabricating a volume from a single plane.

use crate::error::{DataIntegrityError, Result};
use crate::volume::{Volume, VolumeShape};

/// Repeats a single-plane volume `reference.depth` times along Z.
///
/// The plane's (Y, X) extent must already equal the reference's; no
/// resampling happens here.
pub fn extrude<T: Copy>(plane: &Volume<T>, reference: VolumeShape) -> Result<Volume<T>> {
    let shape = plane.shape();
    if !shape.is_planar() || !shape.same_plane(&reference) {
        return Err(DataIntegrityError::ExtrusionMismatch {
            plane: shape,
            reference,
        }
        .into());
    }

    let output = VolumeShape::new(reference.depth, shape.height, shape.width);
    let voxels = plane.voxels().repeat(reference.depth);
    Ok(Volume::new(output, voxels))
}
