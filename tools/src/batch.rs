use anyhow::{bail, Context, Result};
use clap::Args;
use matnpz::convert::{Batch, ConvertOptions};
use std::path::PathBuf;

/// Convert every matching MAT-file in a folder
#[derive(Args)]
#[clap(author, version)]
pub struct BatchArgs {
    /// The folder holding the MAT-files
    #[clap(short, long, default_value = "dtu_34871-NL-Transducers/ExpD")]
    input_dir: PathBuf,

    /// Which files to convert. Patterns containing a '/' are matched recursively
    #[clap(short, long, default_value = "*.mat")]
    pattern: String,

    /// The root folder for converted datasets
    #[clap(short, long, default_value = "numpy_datasets")]
    output_dir: PathBuf,

    /// The experiment label, also used as subfolder of the output folder
    #[clap(short, long, default_value = "ExpD")]
    experiment: String,

    /// Overwrite existing outputs instead of skipping them
    #[clap(short, long)]
    force: bool,
}

pub fn batch(args: &BatchArgs) -> Result<()> {
    let batch = Batch {
        input_dir: args.input_dir.clone(),
        pattern: args.pattern.clone(),
        output_dir: args.output_dir.clone(),
        experiment: args.experiment.clone(),
    };

    let options = ConvertOptions {
        force: args.force,
        ..Default::default()
    };

    let summary = batch.run(&options).context("Could not start the batch")?;

    for converted in &summary.converted {
        println!(
            "{:<40} => {}",
            converted.sidecar.experiment_metadata.dataset_name,
            converted.npz_path.display()
        );
    }

    println!(
        "Converted {}, skipped {}, failed {}",
        summary.converted.len(),
        summary.skipped.len(),
        summary.failed.len()
    );

    if !summary.is_success() {
        for (input, _) in &summary.failed {
            println!("Failed: {}", input.display());
        }

        bail!("{} conversion(s) failed", summary.failed.len());
    }

    Ok(())
}
