//! Bulk shape probing during dataset curation.
//!
//! Probes run concurrently; a file that fails to probe is logged and
//! recorded, and the rest of the batch carries on.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use common::parallel::par_fan_in;

use crate::error::{ConfigurationError, Error, Result};
use crate::io::{ImageShape, VolumeReader};
use crate::manifest::{Manifest, FILE_COLUMN};

#[derive(Debug)]
pub struct ProbeFailure {
    pub path: PathBuf,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct ProbeReport {
    pub shapes: BTreeMap<PathBuf, ImageShape>,
    pub failures: Vec<ProbeFailure>,
}

impl ProbeReport {
    /// Paths whose full shape equals `expected`. Failed files never match.
    pub fn matching(&self, expected: ImageShape) -> BTreeSet<&Path> {
        self.shapes
            .iter()
            .filter(|(_, shape)| **shape == expected)
            .map(|(path, _)| path.as_path())
            .collect()
    }

    /// How many files were probed successfully per distinct shape.
    pub fn shape_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for shape in self.shapes.values() {
            *counts.entry(shape.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Probes every path with at most `max_concurrent` reads in flight.
pub fn probe_shapes<R>(reader: &R, paths: &[PathBuf], max_concurrent: usize) -> Result<ProbeReport>
where
    R: VolumeReader + ?Sized,
{
    if max_concurrent == 0 {
        return Err(ConfigurationError::ZeroConcurrency.into());
    }

    let fan_in = par_fan_in(paths, max_concurrent, PathBuf::clone, |path| {
        reader.probe(path)
    });

    let failures: Vec<ProbeFailure> = fan_in
        .failed
        .into_iter()
        .map(|(path, error)| {
            tracing::warn!(path = %path.display(), error = %error, "Failed to probe image");
            ProbeFailure { path, error }
        })
        .collect();

    tracing::info!(
        probed = paths.len(),
        succeeded = fan_in.succeeded.len(),
        failed = failures.len(),
        "Probed image shapes"
    );

    Ok(ProbeReport {
        shapes: fan_in.succeeded,
        failures,
    })
}

/// Keeps the manifest rows whose file has the expected shape.
pub fn filter_manifest_by_shape(
    manifest: &Manifest,
    report: &ProbeReport,
    expected: ImageShape,
) -> Result<Manifest> {
    let matching = report.matching(expected);
    let rows: Vec<usize> = manifest
        .column(FILE_COLUMN)?
        .into_iter()
        .enumerate()
        .filter(|(_, file)| matching.contains(Path::new(file)))
        .map(|(row, _)| row)
        .collect();

    tracing::info!(
        kept = rows.len(),
        dropped = manifest.len() - rows.len(),
        %expected,
        "Filtered manifest by image shape"
    );
    Ok(manifest.subset(&rows))
}
