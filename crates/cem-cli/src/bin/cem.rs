use clap::Parser;

use cem_cli::args::CliArgs;
use cem_cli::{driver, tracing_config};

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    tracing_config::init(args.verbose);
    driver::run(args)
}
