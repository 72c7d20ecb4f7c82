use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ResourceError, Result};
use crate::io::{ImageShape, VolumeReader};
use crate::volume::{ChannelImage, Volume};

/// In-memory image files, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, Vec<ChannelImage>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file with the given channels. All channels must share a shape.
    pub fn with_file(mut self, path: impl Into<PathBuf>, channels: Vec<Volume>) -> Self {
        self.insert(path, channels);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, channels: Vec<Volume>) {
        debug_assert!(
            channels.windows(2).all(|w| w[0].shape() == w[1].shape()),
            "channels of one file must share a shape"
        );
        let channels = channels.into_iter().map(ChannelImage::new).collect();
        self.files.insert(path.into(), channels);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn file(&self, path: &Path) -> Result<&[ChannelImage]> {
        self.files
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| ResourceError::NotFound(path.to_path_buf()).into())
    }
}

impl VolumeReader for MemoryReader {
    fn read_channel(&self, path: &Path, channel: usize) -> Result<ChannelImage> {
        let channels = self.file(path)?;
        channels.get(channel).cloned().ok_or_else(|| {
            ResourceError::ChannelOutOfRange {
                path: path.to_path_buf(),
                channel,
                channels: channels.len(),
            }
            .into()
        })
    }

    fn probe(&self, path: &Path) -> Result<ImageShape> {
        let channels = self.file(path)?;
        let first = channels.first().ok_or_else(|| ResourceError::Malformed {
            path: path.to_path_buf(),
            reason: "file has no channels".to_string(),
        })?;
        Ok(ImageShape::new(channels.len(), first.volume.shape()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::volume::VolumeShape;

    #[test]
    fn test_memory_reader_serves_channels() {
        let shape = VolumeShape::new(2, 3, 4);
        let reader = MemoryReader::new().with_file(
            "/data/a.tiff",
            vec![Volume::filled(shape, 1.0), Volume::filled(shape, 2.0)],
        );

        let path = Path::new("/data/a.tiff");
        assert_eq!(reader.probe(path).unwrap(), ImageShape::new(2, shape));
        assert_eq!(reader.read_channel(path, 1).unwrap().volume.voxels()[0], 2.0);
        assert!(matches!(
            reader.read_channel(path, 2),
            Err(Error::Resource(ResourceError::ChannelOutOfRange { channel: 2, channels: 2, .. }))
        ));
        assert!(matches!(
            reader.read_single(path),
            Err(Error::Resource(ResourceError::Malformed { .. }))
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let reader = MemoryReader::new();
        assert!(matches!(
            reader.probe(Path::new("/nowhere.tiff")),
            Err(Error::Resource(ResourceError::NotFound(_)))
        ));
    }
}
