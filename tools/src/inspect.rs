use crate::utils::iter_files;
use anyhow::{Context, Result};
use clap::Args;
use matnpz::{canonical::Naming, flatten::flatten, mat::MatFile};
use std::path::{Path, PathBuf};

/// Inspect MAT-files, or even entire directories, for their contents
#[derive(Args)]
#[clap(author, version)]
pub struct InspectArgs {
    /// The path(s) to inspect
    path: Vec<PathBuf>,

    /// Search the folder recursively
    #[clap(short, long)]
    recursive: bool,
}

pub fn inspect(args: &InspectArgs) -> Result<()> {
    let paths: Vec<_> = iter_files(&args.path, args.recursive, &["mat"])
        .map(|entry| entry.into_path())
        .collect();

    if let Some((last, rest)) = paths.split_last() {
        for path in rest {
            print(path)?;
            println!();
        }

        print(last)?;
    }

    Ok(())
}

fn print(path: &Path) -> Result<()> {
    let file = MatFile::from_path(path)
        .with_context(|| format!("Reading {} failed", path.display()))?;

    println!(
        "{:<40}{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        file.header.text
    );

    for variable in &file.variables {
        let dims: Vec<_> = variable.value.dims().iter().map(ToString::to_string).collect();
        println!(
            "  {:<24} | {:<7} | {}",
            variable.name,
            variable.value.class_name(),
            dims.join("x")
        );
    }

    match flatten(&file) {
        Ok(flattened) => {
            for array in &flattened.arrays {
                let naming = Naming::of(&array.name);
                let unit = naming.unit().map(|unit| format!(" [{unit}]")).unwrap_or_default();
                println!("  {:<24} => {}{unit}", array.source, naming.name());
            }

            for skipped in &flattened.skipped {
                println!("  {:<24} => skipped ({})", skipped.source, skipped.class);
            }
        }
        Err(error) => println!("  Cannot be converted: {error}"),
    }

    Ok(())
}
