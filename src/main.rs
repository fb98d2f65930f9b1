//! fsbench CLI: run a filesystem benchmark described by a workload profile.

use anyhow::Result;
use clap::Parser;
use fsbench::cli::{Cli, run};
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    run(&cli)?;

    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
