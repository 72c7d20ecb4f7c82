//! Tabular dataset manifests.
//!
//! A manifest is a CSV table with one row per image channel. Only the
//! `file`, `channel_index` and `channel_content` columns (plus the optional
//! `normalized_single_channel_image`) have meaning here; every other column
//! is carried through untouched so subsets keep the input schema.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, DataIntegrityError, ResourceError, Result};

pub const FILE_COLUMN: &str = "file";
pub const CHANNEL_INDEX_COLUMN: &str = "channel_index";
pub const CHANNEL_CONTENT_COLUMN: &str = "channel_content";
pub const NORMALIZED_IMAGE_COLUMN: &str = "normalized_single_channel_image";

/// What a channel shows; drives the choice of normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentLabel(String);

impl ContentLabel {
    /// Label of the transmitted-light channel.
    pub const BRIGHTFIELD: &'static str = "Brightfield";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn brightfield() -> Self {
        Self::new(Self::BRIGHTFIELD)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_transmitted(&self) -> bool {
        self.0 == Self::BRIGHTFIELD
    }
}

impl fmt::Display for ContentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentLabel {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// One manifest row, reduced to the columns the pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub row: usize,
    pub file: PathBuf,
    pub channel_index: usize,
    pub content: ContentLabel,
    pub normalized_image: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Manifest {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        for (row, values) in rows.iter().enumerate() {
            if values.len() != headers.len() {
                return Err(DataIntegrityError::InvalidCell {
                    row,
                    column: "<row>".to_string(),
                    value: format!("{} fields, expected {}", values.len(), headers.len()),
                }
                .into());
            }
        }
        Ok(Self { headers, rows })
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
        let headers = reader
            .headers()
            .map_err(|e| csv_error(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(path, e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::debug!(path = %path.display(), rows = rows.len(), "Loaded manifest");
        Self::new(headers, rows)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
        writer
            .write_record(&self.headers)
            .map_err(|e| csv_error(path, e))?;
        for row in &self.rows {
            writer.write_record(row).map_err(|e| csv_error(path, e))?;
        }
        writer.flush().map_err(|e| ResourceError::io(path, e))?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> std::result::Result<usize, DataIntegrityError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataIntegrityError::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    /// Rows at `indices`, in that order, with the same columns.
    pub fn subset(&self, indices: &[usize]) -> Manifest {
        Manifest {
            headers: self.headers.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Returns a copy with `name` set to `values`, replacing an existing column.
    pub fn with_column(&self, name: &str, values: Vec<String>) -> Result<Manifest> {
        if values.len() != self.rows.len() {
            return Err(DataIntegrityError::ColumnLength {
                column: name.to_string(),
                expected: self.rows.len(),
                actual: values.len(),
            }
            .into());
        }

        let mut manifest = self.clone();
        match manifest.headers.iter().position(|h| h == name) {
            Some(index) => {
                for (row, value) in manifest.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                manifest.headers.push(name.to_string());
                for (row, value) in manifest.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(manifest)
    }

    pub fn channel_records(&self) -> Result<Vec<ChannelRecord>> {
        let file = self.column_index(FILE_COLUMN)?;
        let channel = self.column_index(CHANNEL_INDEX_COLUMN)?;
        let content = self.column_index(CHANNEL_CONTENT_COLUMN)?;
        let normalized = self.column_index(NORMALIZED_IMAGE_COLUMN).ok();

        self.rows
            .iter()
            .enumerate()
            .map(|(row, values)| {
                let channel_index = values[channel].trim().parse::<usize>().map_err(|_| {
                    DataIntegrityError::InvalidCell {
                        row,
                        column: CHANNEL_INDEX_COLUMN.to_string(),
                        value: values[channel].clone(),
                    }
                })?;
                Ok(ChannelRecord {
                    row,
                    file: PathBuf::from(&values[file]),
                    channel_index,
                    content: ContentLabel::new(values[content].clone()),
                    normalized_image: normalized
                        .map(|i| values[i].as_str())
                        .filter(|v| !v.is_empty())
                        .map(PathBuf::from),
                })
            })
            .collect()
    }

    /// Indices of rows whose content equals `label`.
    pub fn filter_content(&self, label: &ContentLabel) -> Result<Vec<usize>> {
        let rows: Vec<usize> = self
            .column(CHANNEL_CONTENT_COLUMN)?
            .into_iter()
            .enumerate()
            .filter(|(_, content)| *content == label.as_str())
            .map(|(row, _)| row)
            .collect();

        if rows.is_empty() {
            return Err(ConfigurationError::UnknownContentLabel(label.to_string()).into());
        }
        Ok(rows)
    }

    /// Distinct values of the `file` column in first-seen order.
    pub fn unique_files(&self) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        Ok(self
            .column(FILE_COLUMN)?
            .into_iter()
            .filter(|file| seen.insert(*file))
            .map(PathBuf::from)
            .collect())
    }
}

fn csv_error(path: &Path, err: csv::Error) -> ResourceError {
    if let csv::ErrorKind::Io(io) = err.kind() {
        if io.kind() == std::io::ErrorKind::NotFound {
            return ResourceError::NotFound(path.to_path_buf());
        }
    }
    ResourceError::Csv {
        path: path.to_path_buf(),
        source: err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample_manifest() -> Manifest {
        let headers = ["file", "plate", "channel_index", "channel_content"]
            .map(String::from)
            .to_vec();
        let rows = [
            ["/d/a.czi", "p1", "0", "Brightfield"],
            ["/d/a.czi", "p1", "4", "DNA"],
            ["/d/b.czi", "p2", "0", "Brightfield"],
            ["/d/b.czi", "p2", "2", "MYL2"],
        ]
        .iter()
        .map(|r| r.map(String::from).to_vec())
        .collect();
        Manifest::new(headers, rows).unwrap()
    }

    #[test]
    fn test_channel_records_parse_required_columns() {
        let records = sample_manifest().channel_records().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].file, PathBuf::from("/d/a.czi"));
        assert_eq!(records[1].channel_index, 4);
        assert_eq!(records[1].content.as_str(), "DNA");
        assert!(records[0].content.is_transmitted());
        assert_eq!(records[3].normalized_image, None);
    }

    #[test]
    fn test_bad_channel_index_is_reported_with_row() {
        let manifest = sample_manifest()
            .with_column(
                CHANNEL_INDEX_COLUMN,
                vec!["0".into(), "x".into(), "0".into(), "2".into()],
            )
            .unwrap();
        let err = manifest.channel_records().unwrap_err();
        assert!(matches!(
            err,
            Error::DataIntegrity(DataIntegrityError::InvalidCell { row: 1, .. })
        ));
    }

    #[test]
    fn test_missing_column() {
        let manifest = Manifest::new(vec!["file".into()], vec![vec!["/a".into()]]).unwrap();
        assert!(matches!(
            manifest.channel_records(),
            Err(Error::DataIntegrity(DataIntegrityError::MissingColumn(c))) if c == CHANNEL_INDEX_COLUMN
        ));
    }

    #[test]
    fn test_filter_content() {
        let manifest = sample_manifest();
        assert_eq!(
            manifest.filter_content(&ContentLabel::brightfield()).unwrap(),
            vec![0, 2]
        );
        assert!(matches!(
            manifest.filter_content(&ContentLabel::new("GFP")),
            Err(Error::Configuration(ConfigurationError::UnknownContentLabel(l))) if l == "GFP"
        ));
    }

    #[test]
    fn test_subset_keeps_schema_and_order() {
        let manifest = sample_manifest();
        let subset = manifest.subset(&[3, 0]);
        assert_eq!(subset.headers(), manifest.headers());
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.rows()[0][3], "MYL2");
        assert_eq!(subset.rows()[1][3], "Brightfield");
    }

    #[test]
    fn test_with_column_appends_or_replaces() {
        let manifest = sample_manifest();
        let values: Vec<String> = (0..4).map(|i| format!("/out/{i}.tif")).collect();
        let added = manifest
            .with_column(NORMALIZED_IMAGE_COLUMN, values.clone())
            .unwrap();
        assert_eq!(added.headers().len(), 5);
        let records = added.channel_records().unwrap();
        assert_eq!(records[2].normalized_image, Some(PathBuf::from("/out/2.tif")));

        let replaced = added
            .with_column("plate", vec!["x".into(); 4])
            .unwrap();
        assert_eq!(replaced.headers().len(), 5);
        assert_eq!(replaced.column("plate").unwrap(), vec!["x"; 4]);

        assert!(manifest.with_column("short", vec!["a".into()]).is_err());
    }

    #[test]
    fn test_unique_files_first_seen_order() {
        assert_eq!(
            sample_manifest().unique_files().unwrap(),
            vec![PathBuf::from("/d/a.czi"), PathBuf::from("/d/b.czi")]
        );
    }

    #[test]
    fn test_csv_round_trip() {
        let path = common::test_utils::test_output_path("manifest_round_trip.csv");
        let manifest = sample_manifest();
        manifest.write_csv(&path).unwrap();
        assert_eq!(Manifest::read_csv(&path).unwrap(), manifest);
    }

    #[test]
    fn test_missing_csv_is_not_found() {
        let err = Manifest::read_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, Error::Resource(ResourceError::NotFound(_))));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = Manifest::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "2".into()], vec!["3".into()]],
        );
        assert!(result.is_err());
    }
}
