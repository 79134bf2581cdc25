use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use matnpz_tools::batch::{batch, BatchArgs};
use matnpz_tools::convert::{convert, ConvertArgs};
use matnpz_tools::inspect::{inspect, InspectArgs};
use matnpz_tools::join::{join, JoinArgs};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
enum Cli {
    Join(JoinArgs),
    Convert(ConvertArgs),
    Batch(BatchArgs),
    Inspect(InspectArgs),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match Cli::parse_from(wild::args()) {
        Cli::Join(args) => join(&args),
        Cli::Convert(args) => convert(args),
        Cli::Batch(args) => batch(&args),
        Cli::Inspect(args) => inspect(&args),
    }
}
