use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DataIntegrityError, Result};
use crate::manifest::{ChannelRecord, ContentLabel, Manifest, NORMALIZED_IMAGE_COLUMN};
use crate::pipeline::{PipelineConfig, SourceLayout};

/// Where one channel of a sample comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub path: PathBuf,
    /// Channel of a multi-channel file; `None` for a single-channel file.
    pub channel: Option<usize>,
    pub content: ContentLabel,
}

impl ChannelRef {
    pub fn multi(path: impl Into<PathBuf>, channel: usize, content: ContentLabel) -> Self {
        Self {
            path: path.into(),
            channel: Some(channel),
            content,
        }
    }

    pub fn single(path: impl Into<PathBuf>, content: ContentLabel) -> Self {
        Self {
            path: path.into(),
            channel: None,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleEntry {
    pub input: ChannelRef,
    pub target: ChannelRef,
}

impl SampleEntry {
    /// One entry per manifest row whose content is the configured target.
    ///
    /// The input is the transmitted-light row of the same file. With
    /// single-channel files both rows must carry a normalized image path.
    pub fn from_manifest(manifest: &Manifest, config: &PipelineConfig) -> Result<Vec<Self>> {
        let target_label = config.target_label();
        let target_rows = manifest.filter_content(&target_label)?;
        let records = manifest.channel_records()?;

        let transmitted: HashMap<&Path, &ChannelRecord> = records
            .iter()
            .filter(|r| r.content.is_transmitted())
            .map(|r| (r.file.as_path(), r))
            .collect();
        let target_paths = match &config.target_column {
            Some(column) => Some(manifest.column(column)?),
            None => None,
        };

        target_rows
            .into_iter()
            .map(|row| -> Result<Self> {
                let record = &records[row];
                let input = match config.layout {
                    SourceLayout::MultiChannel => {
                        let channel = transmitted
                            .get(record.file.as_path())
                            .map_or(config.input_channel, |r| r.channel_index);
                        ChannelRef::multi(&record.file, channel, ContentLabel::brightfield())
                    }
                    SourceLayout::SingleChannelFiles => {
                        let input = transmitted.get(record.file.as_path()).ok_or_else(|| {
                            DataIntegrityError::MissingChannel {
                                file: record.file.display().to_string(),
                                content: ContentLabel::BRIGHTFIELD.to_string(),
                            }
                        })?;
                        ChannelRef::single(normalized_path(input)?, input.content.clone())
                    }
                };

                let target = match (&target_paths, config.layout) {
                    (Some(paths), _) => ChannelRef::single(paths[row], record.content.clone()),
                    (None, SourceLayout::MultiChannel) => ChannelRef::multi(
                        &record.file,
                        record.channel_index,
                        record.content.clone(),
                    ),
                    (None, SourceLayout::SingleChannelFiles) => {
                        ChannelRef::single(normalized_path(record)?, record.content.clone())
                    }
                };

                Ok(Self { input, target })
            })
            .collect()
    }
}

fn normalized_path(record: &ChannelRecord) -> Result<&Path> {
    record
        .normalized_image
        .as_deref()
        .ok_or_else(|| {
            DataIntegrityError::MissingColumn(NORMALIZED_IMAGE_COLUMN.to_string()).into()
        })
}
