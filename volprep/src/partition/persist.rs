//! Saving a partition next to per-bucket manifest subsets.

use std::fmt::Display;
use std::fs;
use std::path::Path;

use crate::error::{ResourceError, Result};
use crate::manifest::Manifest;
use crate::partition::{hashsplit, Partition, SplitWeights};

pub const SPLITS_FILE: &str = "splits.json";

/// Hash-splits the rows of `manifest` by the values of `column` and saves
/// `splits.json` plus one `<bucket>.csv` subset per bucket into `save_dir`.
pub fn split_and_save<S: Display>(
    manifest: &Manifest,
    column: &str,
    weights: &SplitWeights,
    salt: S,
    digits: usize,
    save_dir: &Path,
) -> Result<Partition> {
    let identifiers = manifest.column(column)?;
    let partition = hashsplit(&identifiers, weights, salt, digits)?;

    fs::create_dir_all(save_dir).map_err(|e| ResourceError::io(save_dir, e))?;
    save_splits(&partition, &save_dir.join(SPLITS_FILE))?;

    for (bucket, rows) in partition.buckets() {
        let path = save_dir.join(format!("{bucket}.csv"));
        manifest.subset(rows).write_csv(&path)?;
        tracing::info!(bucket = %bucket, rows = rows.len(), path = %path.display(), "Wrote split");
    }

    Ok(partition)
}

pub fn save_splits(partition: &Partition, path: &Path) -> Result<()> {
    let json = serde_json::to_string(partition).map_err(|source| ResourceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|e| ResourceError::io(path, e))?;
    Ok(())
}

pub fn load_splits(path: &Path) -> Result<Partition> {
    let text = fs::read_to_string(path).map_err(|e| ResourceError::io(path, e))?;
    let partition: Partition =
        serde_json::from_str(&text).map_err(|source| ResourceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Partition::from_buckets(partition.into_buckets()))
}
