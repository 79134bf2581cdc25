use anyhow::{Context, Result};
use clap::Args;
use matnpz::join::{extract, verify, SplitArchive};
use std::path::PathBuf;

/// Join split archive parts, verify the result and extract it
#[derive(Args)]
#[clap(author, version)]
pub struct JoinArgs {
    /// The folder holding the parts
    dir: PathBuf,

    /// Only consider parts whose file name starts with this prefix
    #[clap(short, long)]
    prefix: Option<String>,

    /// Where to write the joined archive. Defaults to the parts' common name, inside DIR
    #[clap(short, long)]
    archive: Option<PathBuf>,

    /// The folder to extract into. Defaults to DIR
    #[clap(short, long)]
    output: Option<PathBuf>,
}

pub fn join(args: &JoinArgs) -> Result<()> {
    let parts = SplitArchive::discover(&args.dir, args.prefix.as_deref())
        .context("Could not find a complete set of archive parts")?;

    for part in parts.parts() {
        println!("{}", part.path.display());
    }

    let archive = match &args.archive {
        Some(archive) => archive.clone(),
        None => args.dir.join(parts.joined_name()),
    };

    let bytes = parts
        .join_to(&archive)
        .context("Concatenating the parts failed")?;
    println!(
        "Joined {} parts => {} ({bytes} bytes)",
        parts.parts().len(),
        archive.display()
    );

    let entries = verify(&archive).context("The joined archive did not verify")?;
    log::info!("Verified {entries} entries");

    let output = args.output.as_ref().unwrap_or(&args.dir);
    extract(&archive, output).context("Extracting the joined archive failed")?;
    println!("Extracted {entries} entries => {}", output.display());

    Ok(())
}
