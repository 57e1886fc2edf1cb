use anyhow::Result;
use clap::Parser;
use iffkit::cli::Cli;
use iffkit::{config, inspect, logging};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load base configuration, then let the command line override it
    let options = config::load_config()?;
    let options = cli.merge_into_options(options)?;

    logging::init(options.log_level)?;
    log::debug!("Options: {:?}", options);

    let report = inspect::run(&cli.file, &options)?;
    println!("{}", report);
    Ok(())
}
