use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;

use cli::command::{Cli, Commands};
use cli::decode::cmd_decode;
use cli::info::cmd_info;

mod byteorder;
mod cli;
mod input;
mod logging;
pub(crate) mod timestamp;
mod wav;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let multi = MultiProgress::new();
    logging::init(&cli, &multi)?;
    let pb = cli.progress.then_some(&multi);

    match cli.command {
        Commands::Decode(ref args) => cmd_decode(args, &cli, pb)?,
        Commands::Info(ref args) => cmd_info(args, &cli, pb)?,
    }

    Ok(())
}
