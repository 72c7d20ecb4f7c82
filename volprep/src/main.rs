//! volprep CLI
//!
//! Dataset curation and sample preparation for transmitted-light to
//! fluorescence training data.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use volprep::config::Config;
use volprep::io::TiffReader;
use volprep::manifest::Manifest;
use volprep::partition::persist::split_and_save;
use volprep::pipeline::{SampleArray, SamplePipeline};
use volprep::preprocess::preprocess;
use volprep::probe::{filter_manifest_by_shape, probe_shapes};

#[derive(Parser)]
#[command(name = "volprep")]
#[command(about = "Prepare paired microscopy volumes for image-to-image training", long_about = None)]
struct Cli {
    /// YAML or JSON configuration file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, overrides the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash-split manifest rows into the configured buckets
    Split {
        manifest: PathBuf,

        /// Overrides `partition.output_dir`
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Probe image shapes and optionally keep only rows with the expected shape
    Probe {
        manifest: PathBuf,

        /// Where to write the filtered manifest (requires `probe.expected`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clip-normalize every channel into single-channel TIFFs
    Preprocess {
        manifest: PathBuf,

        /// Where to write the manifest with the normalized image column
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build samples and print their shapes
    Sample {
        manifest: PathBuf,

        #[arg(short, long, default_value_t = 0)]
        index: usize,

        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Write a configuration file with every default filled in
    GenerateConfig {
        #[arg(short, long, default_value = "volprep.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { output } = &cli.command {
        return generate_config_command(output);
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    common::log_setup::setup_logging(level, &config.logging.directory, "volprep")
        .context("Failed to initialize logging")?;

    match cli.command {
        Commands::Split {
            manifest,
            output_dir,
        } => split_command(&config, &manifest, output_dir),
        Commands::Probe { manifest, output } => probe_command(&config, &manifest, output),
        Commands::Preprocess { manifest, output } => {
            preprocess_command(&config, &manifest, &output)
        }
        Commands::Sample {
            manifest,
            index,
            count,
        } => sample_command(config, &manifest, index, count),
        Commands::GenerateConfig { .. } => Ok(()),
    }
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    Manifest::read_csv(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))
}

fn split_command(config: &Config, manifest_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let manifest = read_manifest(manifest_path)?;
    let partition = &config.partition;
    let save_dir = output_dir.unwrap_or_else(|| partition.output_dir.clone());

    let split = split_and_save(
        &manifest,
        &partition.column,
        &partition.weights,
        &partition.salt,
        partition.digits,
        &save_dir,
    )
    .context("Failed to split manifest")?;

    for (bucket, rows) in split.buckets() {
        println!("{bucket}: {} rows", rows.len());
    }
    println!("Splits written to {}", save_dir.display());
    Ok(())
}

fn probe_command(config: &Config, manifest_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let manifest = read_manifest(manifest_path)?;
    let files = manifest.unique_files()?;
    let report = probe_shapes(&TiffReader::new(), &files, config.probe.max_concurrent)?;

    println!("\n=== Shapes (CxZxYxX) ===");
    for (shape, count) in report.shape_counts() {
        println!("{shape}: {count} files");
    }
    if !report.failures.is_empty() {
        println!("\n=== Failures ===");
        for failure in &report.failures {
            println!("{}: {}", failure.path.display(), failure.error);
        }
    }

    match (output, config.probe.expected) {
        (Some(output), Some(expected)) => {
            let filtered = filter_manifest_by_shape(&manifest, &report, expected)?;
            filtered
                .write_csv(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "\nKept {} of {} rows with shape {expected} in {}",
                filtered.len(),
                manifest.len(),
                output.display()
            );
        }
        (Some(_), None) => anyhow::bail!("--output requires probe.expected in the configuration"),
        (None, _) => {}
    }
    Ok(())
}

fn preprocess_command(config: &Config, manifest_path: &Path, output: &Path) -> Result<()> {
    let manifest = read_manifest(manifest_path)?;
    let processed = preprocess(&TiffReader::new(), &manifest, &config.preprocess)
        .context("Failed to preprocess channels")?;
    processed
        .write_csv(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Normalized {} channels into {}",
        processed.len(),
        config.preprocess.output_dir.display()
    );
    Ok(())
}

fn sample_command(config: Config, manifest_path: &Path, index: usize, count: usize) -> Result<()> {
    let manifest = read_manifest(manifest_path)?;
    let pipeline = SamplePipeline::from_manifest(TiffReader::new(), &manifest, config.pipeline)?;
    if pipeline.is_empty() {
        anyhow::bail!("Manifest yields no samples");
    }

    let indices: Vec<usize> = (index..index.saturating_add(count))
        .filter(|&i| i < pipeline.len())
        .collect();
    let samples = pipeline.get_many(&indices)?;

    for (i, sample) in indices.iter().zip(&samples) {
        let (Some(input), Some(target)) = (sample.input(), sample.target()) else {
            continue;
        };
        println!("\n=== Sample {i} ===");
        print_array("input", input);
        print_array("target", target);
    }
    Ok(())
}

fn print_array(name: &str, array: &SampleArray) {
    let projection = array.volume.max_projection();
    let (min, max) = projection.min_max().unwrap_or((0.0, 0.0));
    println!(
        "{name}: shape {:?}, max projection range [{min:.4}, {max:.4}]",
        array.shape()
    );
}

fn generate_config_command(output: &Path) -> Result<()> {
    Config::default()
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}
