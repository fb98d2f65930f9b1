//! CLI surface: argument parsing and the run handler.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::engine::driver;
use crate::profile::{self, Config};
use crate::utils::setup_logging;

/// Multi-threaded filesystem benchmark driven by a declarative profile.
#[derive(Clone, Parser)]
#[command(name = "fsbench")]
#[command(version)]
#[command(about = "Populate filesets from PROFILE and drive a weighted mix of file operations.")]
pub struct Cli {
    /// Workload profile describing filesystems and thread groups.
    #[arg(value_name = "PROFILE")]
    pub profile: PathBuf,

    /// Benchmark duration override in seconds. Selects the legacy flat
    /// profile dialect when built with the `legacy-profile` feature.
    #[arg(value_name = "TIME")]
    pub time: Option<u32>,

    /// Verbose output. Default: false.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

fn load_profile(cli: &Cli) -> Result<Config> {
    match cli.time {
        #[cfg(feature = "legacy-profile")]
        Some(time) => profile::legacy::load(&cli.profile, time),
        #[cfg(not(feature = "legacy-profile"))]
        Some(time) => {
            let mut config = profile::load(&cli.profile)?;
            log::info!("benchmark time overridden to {} sec", time);
            config.time = time;
            Ok(config)
        }
        None => profile::load(&cli.profile),
    }
}

/// Parse arguments, load the profile, and run the benchmark.
pub fn run(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose);
    println!(
        "{} {} started\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = load_profile(cli)?;
    if config.time > 0 {
        println!("benchmark time = {} sec", config.time);
    } else {
        println!("Only creating the fileset, not running the benchmark.");
    }

    driver::run(config)
}
