//! Logging setup.
//!
//! Diagnostics go to stderr so they never interleave with the report on
//! stdout, and every line is stamped with seconds since process start so
//! log output lines up with the benchmark clock. `RUST_LOG` overrides the
//! defaults entirely.

use std::io::Write;
use std::time::Instant;

use colored::Colorize;
use env_logger::{Builder, Env};
use log::Level;

pub fn setup_logging(verbose: bool) {
    let own_level = if verbose { "debug" } else { "info" };
    // Our crate at the requested level, everything else quiet unless it
    // has something alarming to say.
    let default_filter = format!("{}={},warn", env!("CARGO_PKG_NAME"), own_level);

    let start = Instant::now();
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(move |buf, record| {
            let level = match record.level() {
                Level::Error => "ERROR".red().bold(),
                Level::Warn => " WARN".yellow(),
                Level::Info => " INFO".normal(),
                Level::Debug => "DEBUG".dimmed(),
                Level::Trace => "TRACE".dimmed(),
            };
            writeln!(
                buf,
                "{:9.3}s {} {}",
                start.elapsed().as_secs_f64(),
                level,
                record.args()
            )
        })
        .init();
}
