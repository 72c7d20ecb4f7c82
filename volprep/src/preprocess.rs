//! Per-channel preprocessing: every manifest row's channel is
//! clip-normalized and written as its own single-channel TIFF.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use common::parallel::try_par_map_limited;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, DataIntegrityError, ResourceError, Result};
use crate::io::{TiffWriter, VolumeReader};
use crate::manifest::{
    ChannelRecord, ContentLabel, Manifest, CHANNEL_INDEX_COLUMN, FILE_COLUMN,
    NORMALIZED_IMAGE_COLUMN,
};
use crate::normalize::{clip_normalize, ClipNormalizeConfig, ClipOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub output_dir: PathBuf,
    /// Settings for the transmitted-light channel.
    pub transmitted: ClipNormalizeConfig,
    /// Settings for every other channel.
    pub fluorescence: ClipNormalizeConfig,
    /// Files processed at once.
    pub max_concurrent: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("preprocessed"),
            transmitted: ClipNormalizeConfig::transmitted(),
            fluorescence: ClipNormalizeConfig::fluorescence(),
            max_concurrent: 4,
        }
    }
}

impl PreprocessConfig {
    pub fn settings_for(&self, content: &ContentLabel) -> &ClipNormalizeConfig {
        if content.is_transmitted() {
            &self.transmitted
        } else {
            &self.fluorescence
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        self.transmitted.validate()?;
        self.fluorescence.validate()?;
        if self.max_concurrent == 0 {
            return Err(ConfigurationError::ZeroConcurrency);
        }
        Ok(())
    }
}

/// `<output_dir>/<file stem>_channel_<index>.tif`.
pub fn output_path(output_dir: &Path, file: &Path, channel_index: usize) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{stem}_channel_{channel_index}.tif"))
}

/// Adds the normalized image column, one output path per row.
///
/// Two rows mapping to the same output (same file stem and channel) would
/// overwrite each other, so that is rejected.
pub fn plan_outputs(manifest: &Manifest, output_dir: &Path) -> Result<Manifest> {
    let files = manifest.column(FILE_COLUMN)?;
    let channels = manifest.column(CHANNEL_INDEX_COLUMN)?;

    let mut seen = HashSet::new();
    let mut outputs = Vec::with_capacity(manifest.len());
    for (row, (file, channel)) in files.into_iter().zip(channels).enumerate() {
        let channel_index: usize =
            channel.trim().parse().map_err(|_| DataIntegrityError::InvalidCell {
                row,
                column: CHANNEL_INDEX_COLUMN.to_string(),
                value: channel.to_string(),
            })?;
        let path = output_path(output_dir, Path::new(file), channel_index);
        if !seen.insert(path.clone()) {
            return Err(DataIntegrityError::DuplicateOutput(path).into());
        }
        outputs.push(path.display().to_string());
    }

    manifest.with_column(NORMALIZED_IMAGE_COLUMN, outputs)
}

/// Normalizes and writes every channel listed in `manifest`.
///
/// Returns the manifest with the normalized image column filled in. Files
/// are processed in parallel; the first error stops the run.
pub fn preprocess<R>(
    reader: &R,
    manifest: &Manifest,
    config: &PreprocessConfig,
) -> Result<Manifest>
where
    R: VolumeReader + ?Sized,
{
    config.validate()?;
    let planned = plan_outputs(manifest, &config.output_dir)?;
    let records = planned.channel_records()?;
    let files = planned.unique_files()?;

    let mut by_file: HashMap<&Path, Vec<&ChannelRecord>> = HashMap::new();
    for record in &records {
        by_file.entry(record.file.as_path()).or_default().push(record);
    }

    fs::create_dir_all(&config.output_dir)
        .map_err(|e| ResourceError::io(&config.output_dir, e))?;

    tracing::info!(
        files = files.len(),
        channels = records.len(),
        output_dir = %config.output_dir.display(),
        "Preprocessing channels"
    );

    try_par_map_limited(&files, config.max_concurrent, |file| {
        let rows = by_file.get(file.as_path()).map(Vec::as_slice).unwrap_or(&[]);
        process_file(reader, file, rows, config)
    })?;

    Ok(planned)
}

fn process_file<R>(
    reader: &R,
    file: &Path,
    records: &[&ChannelRecord],
    config: &PreprocessConfig,
) -> Result<()>
where
    R: VolumeReader + ?Sized,
{
    for record in records {
        let Some(output) = record.normalized_image.as_deref() else {
            continue;
        };
        let image = reader.read_channel(file, record.channel_index)?;
        let settings = config.settings_for(&record.content);
        let normalized = clip_normalize(&image.volume, settings).map_err(|err| {
            tracing::warn!(
                file = %file.display(),
                channel = record.channel_index,
                error = %err,
                "Failed to normalize channel"
            );
            err
        })?;

        match &normalized {
            ClipOutput::Float(v) => TiffWriter::write_f32(output, v, image.pixel_size)?,
            ClipOutput::U8(v) => TiffWriter::write_u8(output, v, image.pixel_size)?,
            ClipOutput::U16(v) => TiffWriter::write_u16(output, v, image.pixel_size)?,
        }
        tracing::debug!(
            file = %file.display(),
            channel = record.channel_index,
            content = %record.content,
            output = %output.display(),
            "Wrote normalized channel"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::io::{MemoryReader, TiffReader};
    use crate::volume::{Volume, VolumeShape};
    use common::test_utils::test_output_dir;

    fn manifest(rows: &[(&str, usize, &str)]) -> Manifest {
        let headers = ["file", "channel_index", "channel_content", "plate"]
            .map(String::from)
            .to_vec();
        let rows = rows
            .iter()
            .map(|(file, channel, content)| {
                vec![
                    file.to_string(),
                    channel.to_string(),
                    content.to_string(),
                    "3500001".to_string(),
                ]
            })
            .collect();
        Manifest::new(headers, rows).unwrap()
    }

    #[test]
    fn test_output_path_naming() {
        assert_eq!(
            output_path(Path::new("/out"), Path::new("/raw/plate/img_01.czi"), 3),
            PathBuf::from("/out/img_01_channel_3.tif")
        );
    }

    #[test]
    fn test_plan_outputs_adds_column() {
        let m = manifest(&[("/raw/a.czi", 0, "Brightfield"), ("/raw/a.czi", 4, "DNA")]);
        let planned = plan_outputs(&m, Path::new("/out")).unwrap();
        assert_eq!(
            planned.column(NORMALIZED_IMAGE_COLUMN).unwrap(),
            vec!["/out/a_channel_0.tif", "/out/a_channel_4.tif"]
        );
        assert_eq!(planned.column("plate").unwrap(), vec!["3500001"; 2]);
    }

    #[test]
    fn test_plan_outputs_rejects_colliding_names() {
        let m = manifest(&[
            ("/raw/x/a.czi", 0, "Brightfield"),
            ("/raw/y/a.czi", 0, "Brightfield"),
        ]);
        assert!(matches!(
            plan_outputs(&m, Path::new("/out")),
            Err(Error::DataIntegrity(DataIntegrityError::DuplicateOutput(_)))
        ));
    }

    #[test]
    fn test_settings_follow_content() {
        let config = PreprocessConfig::default();
        assert!(!config.settings_for(&ContentLabel::brightfield()).subtract_median);
        assert!(config.settings_for(&ContentLabel::new("DNA")).subtract_median);
        assert_eq!(config.settings_for(&ContentLabel::new("DNA")).percentiles.low, 0.0);
    }

    #[test]
    fn test_preprocess_writes_u16_channels() {
        let dir = test_output_dir("preprocess_u16");
        let shape = VolumeShape::new(3, 16, 16);
        let brightfield = Volume::from_fn(shape, |z, y, x| (z * 7 + y * 3 + x) as f32 + 100.0);
        let dna = Volume::from_fn(shape, |_, y, x| {
            if (6..10).contains(&y) && x > 8 {
                900.0
            } else {
                50.0
            }
        });
        let reader = MemoryReader::new().with_file("/raw/img.czi", vec![brightfield, dna]);

        let config = PreprocessConfig {
            output_dir: dir.clone(),
            ..PreprocessConfig::default()
        };
        let m = manifest(&[("/raw/img.czi", 0, "Brightfield"), ("/raw/img.czi", 1, "DNA")]);
        let planned = preprocess(&reader, &m, &config).unwrap();

        let tiff = TiffReader::new();
        for output in planned.column(NORMALIZED_IMAGE_COLUMN).unwrap() {
            let image = tiff.read_single(Path::new(output)).unwrap();
            assert_eq!(image.volume.shape(), shape);
            let (min, max) = image.volume.min_max().unwrap();
            assert_eq!(min, 0.0);
            assert_eq!(max, f32::from(u16::MAX));
        }

        let dna_out = tiff.read_single(&dir.join("img_channel_1.tif")).unwrap();
        // Median subtraction zeroes the flat background.
        assert_eq!(dna_out.volume[(0, 0, 0)], 0.0);
    }

    #[test]
    fn test_preprocess_surfaces_missing_file() {
        let dir = test_output_dir("preprocess_missing");
        let config = PreprocessConfig {
            output_dir: dir,
            ..PreprocessConfig::default()
        };
        let m = manifest(&[("/raw/gone.czi", 0, "Brightfield")]);
        let err = preprocess(&MemoryReader::new(), &m, &config).unwrap_err();
        assert!(matches!(err, Error::Resource(ResourceError::NotFound(_))));
    }
}
