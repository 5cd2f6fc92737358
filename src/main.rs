use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info, warn};
use rayon::prelude::*;

use stem_tissue_rust_lib::output::write_summary_csv;
use stem_tissue_rust_lib::{get_image_files_in_dir, load_image, new_summary_table, process_image, Config, SummaryTable};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Tissue classification and radial profiles of stained stem sections")]
struct Args {
    /// Path to input file or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file (defaults are used if it does not exist)
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Number of radial distance classes (overwrites config)
    #[clap(short = 'n', long)]
    region_count: Option<u32>,

    /// Pixel size in physical units (overwrites config)
    #[clap(short, long)]
    resolution: Option<f64>,

    /// Enable debug mode (save intermediate masks)
    #[clap(short, long)]
    debug: bool,

    /// Process images one after the other
    #[clap(long)]
    sequential: bool,

    /// Write the effective configuration to this file and exit
    #[clap(long)]
    write_config: Option<PathBuf>,
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::from_file(path).with_context(|| format!("loading {}", path.display()))
    } else {
        warn!("No configuration file at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

fn run_one(
    path: &Path,
    input_root: Option<&Path>,
    config: &Config,
    summary: &SummaryTable,
    debug: bool,
) -> stem_tissue_rust_lib::Result<()> {
    let mut input_image = load_image(path)?;
    if let Some(root) = input_root {
        input_image = input_image.relative_to(root);
    }
    process_image(input_image, config, summary, debug)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = load_config(Path::new(&args.config))?;

    // Override config with command-line arguments
    if let Some(input) = args.input {
        config.input_path = input;
    }
    if let Some(output) = args.output {
        config.output_base_dir = output;
    }
    if let Some(region_count) = args.region_count {
        config.region_count = region_count;
    }
    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }
    if args.sequential {
        config.use_parallel = false;
    }

    config.validate().context("invalid configuration")?;

    if let Some(path) = args.write_config {
        config.save_to_file(&path)?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    config.validate_input_path()?;
    config.prepare_output_dirs()?;

    let start_time = Instant::now();
    let summary = new_summary_table();
    let input_path = PathBuf::from(&config.input_path);

    if input_path.is_file() {
        info!("Processing single file: {}", input_path.display());
        run_one(&input_path, None, &config, &summary, args.debug)
            .with_context(|| format!("processing {}", input_path.display()))?;
    } else if input_path.is_dir() {
        info!("Processing directory: {}", input_path.display());
        let files = get_image_files_in_dir(&input_path)?;
        info!("Found {} image files", files.len());

        let process = |path: &PathBuf| {
            run_one(path, Some(&input_path), &config, &summary, args.debug).map_err(|e| {
                error!("Error processing {}: {}", path.display(), e);
                e
            })
        };
        let failures = if config.use_parallel {
            files.par_iter().map(process).filter(|r| r.is_err()).count()
        } else {
            files.iter().map(process).filter(|r| r.is_err()).count()
        };
        if failures > 0 {
            warn!("{} of {} images failed", failures, files.len());
        }
    } else {
        bail!("{} is neither a file nor a directory", input_path.display());
    }

    let summary_path = Path::new(&config.output_base_dir).join("summary.csv");
    write_summary_csv(&summary.snapshot()?, &summary_path)?;
    info!("Summary written to {}", summary_path.display());

    let elapsed = start_time.elapsed();
    info!("Processing completed in {:.2} seconds", elapsed.as_secs_f64());

    Ok(())
}
