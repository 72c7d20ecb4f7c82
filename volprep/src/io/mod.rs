//! Image access: reading channel volumes out of image files.

mod memory;
mod tiff_stack;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, Result};
use crate::volume::{ChannelImage, VolumeShape};

pub use memory::MemoryReader;
pub use tiff_stack::{StackDescription, TiffReader, TiffWriter};

/// Full acquisition shape of an image file: channel count plus volume extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub volume: VolumeShape,
}

impl ImageShape {
    pub const fn new(channels: usize, volume: VolumeShape) -> Self {
        Self { channels, volume }
    }

    /// `[C, Z, Y, X]`.
    pub const fn dims(&self) -> [usize; 4] {
        [
            self.channels,
            self.volume.depth,
            self.volume.height,
            self.volume.width,
        ]
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [c, z, y, x] = self.dims();
        write!(f, "{c}x{z}x{y}x{x}")
    }
}

/// Source of channel volumes. Implementations are shared across worker
/// threads and must not hold per-call mutable state.
pub trait VolumeReader: Send + Sync {
    /// Reads one channel of a multi-channel file at time point 0.
    fn read_channel(&self, path: &Path, channel: usize) -> Result<ChannelImage>;

    /// Reads the header only.
    fn probe(&self, path: &Path) -> Result<ImageShape>;

    /// Reads the sole channel of a single-channel file.
    fn read_single(&self, path: &Path) -> Result<ChannelImage> {
        let shape = self.probe(path)?;
        if shape.channels != 1 {
            return Err(ResourceError::Malformed {
                path: path.to_path_buf(),
                reason: format!("expected a single channel, found {}", shape.channels),
            }
            .into());
        }
        self.read_channel(path, 0)
    }
}
