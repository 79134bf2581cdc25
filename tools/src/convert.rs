use crate::utils::parse_key_value;
use anyhow::{Context, Result};
use clap::Args;
use matnpz::{
    canonical::Quantity,
    convert::{Conversion, ConvertOptions},
};
use std::path::PathBuf;

/// Convert a MAT-file into an .npz archive with a JSON sidecar
#[derive(Args)]
#[clap(author, version)]
pub struct ConvertArgs {
    /// The MAT-file to convert
    #[clap(
        short,
        long,
        default_value = "dtu_34871-NL-Transducers/ExpD/pinknoise_5Hz-2000Hz_8Vrms.mat"
    )]
    input: PathBuf,

    /// The root folder for converted datasets
    #[clap(short, long, default_value = "numpy_datasets")]
    output_dir: PathBuf,

    /// The dataset name. Defaults to the input's file name, without extension
    #[clap(short, long)]
    dataset_name: Option<String>,

    /// The experiment label, also used as subfolder of the output folder
    #[clap(short, long, default_value = "ExpD")]
    experiment: String,

    /// Overwrite existing outputs
    #[clap(short, long)]
    force: bool,

    /// Extra experiment metadata for the sidecar, e.g. --meta amplifier_gain=20
    #[clap(long = "meta", value_name = "KEY=VALUE", parse(try_from_str = parse_key_value))]
    metadata: Vec<(String, String)>,

    /// Fail unless the recording holds this quantity (voltage, current, velocity, ...)
    #[clap(long = "require", value_name = "QUANTITY")]
    required: Vec<Quantity>,
}

pub fn convert(args: ConvertArgs) -> Result<()> {
    let dataset_name = match args.dataset_name {
        Some(name) => name,
        None => args
            .input
            .file_stem()
            .context("The input path has no file name")?
            .to_string_lossy()
            .into_owned(),
    };

    let conversion = Conversion::new(args.input, args.output_dir, args.experiment, dataset_name);
    let options = ConvertOptions {
        force: args.force,
        metadata: args.metadata.into_iter().collect(),
        required: args.required,
    };

    let converted = conversion
        .run(&options)
        .with_context(|| format!("Converting {} failed", conversion.input.display()))?;

    for (name, info) in &converted.sidecar.arrays {
        println!(
            "{:<24} <= {:<24} {:<8} {:?}",
            name, info.source_field, info.dtype, info.shape
        );
    }

    for skipped in &converted.skipped {
        println!("{:<24} <= {:<24} skipped ({})", "", skipped.source, skipped.class);
    }

    println!("Wrote {}", converted.npz_path.display());
    println!("Wrote {}", converted.sidecar_path.display());

    Ok(())
}
