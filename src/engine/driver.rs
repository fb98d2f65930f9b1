//! Top-level driver: construct every filesystem in parallel, release the
//! thread groups together, stop them on the wall clock, and print the
//! merged report.

use std::process::Command;
use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, anyhow, bail};
use log::debug;
use nix::unistd::sync;

use crate::fsys::BenchFs;
use crate::profile::Config;
use crate::report;
use crate::utils::CpuSnapshot;
use crate::utils::tuning::Tuning;

use super::threadgroup::{self, GroupOutput};

fn run_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed)
}

/// Build every configured filesystem in its own thread: population or
/// reuse, then aging, then the benchmark op routing.
fn construct_filesystems(config: &Config, base_seed: u64) -> anyhow::Result<Vec<BenchFs>> {
    thread::scope(|s| {
        let handles: Vec<_> = config
            .filesystems
            .iter()
            .map(|fc| {
                let fc = fc.clone();
                s.spawn(move || -> anyhow::Result<BenchFs> {
                    let mut fs = BenchFs::new(fc);
                    fs.setup(base_seed)?;
                    Ok(fs)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow!("filesystem setup thread panicked")))
            })
            .collect()
    })
}

pub fn run(config: Config) -> anyhow::Result<()> {
    let base_seed = run_seed();
    debug!("run seed {:#x}", base_seed);
    report::print_config(&config);

    let setup_start = Instant::now();
    let filesystems = construct_filesystems(&config, base_seed)?;
    println!("fs setup took {} secs\n", setup_start.elapsed().as_secs());

    if config.time == 0 {
        println!("Setup complete, exiting.");
        return Ok(());
    }

    sync();
    if let Some(callout) = &config.callout {
        println!("executing callout:\n {}", callout);
        let status = Command::new("sh")
            .arg("-c")
            .arg(callout)
            .status()
            .context("spawning callout")?;
        if !status.success() {
            bail!("callout exited with {}", status);
        }
    }

    let num_groups = config.groups.len();
    // Coordinators sync with the driver here so the wall clock starts when
    // every group is ready; workers sync among themselves afterwards so
    // work starts together.
    let tg_barrier = Barrier::new(num_groups + 1);
    let worker_barrier = Barrier::new(config.total_threads());
    let stop = AtomicBool::new(false);
    let cpu_before = CpuSnapshot::now();

    let (outputs, runtime) = thread::scope(|s| -> anyhow::Result<(Vec<GroupOutput>, Duration)> {
        let handles: Vec<_> = config
            .groups
            .iter()
            .enumerate()
            .map(|(i, tg)| {
                let tg_barrier = &tg_barrier;
                let worker_barrier = &worker_barrier;
                let stop = &stop;
                let filesystems = &filesystems;
                s.spawn(move || {
                    // Workers are spawned only after this barrier releases,
                    // so the driver's clock is running before any op starts.
                    tg_barrier.wait();
                    threadgroup::run_group(
                        tg,
                        i,
                        filesystems,
                        base_seed,
                        worker_barrier,
                        stop,
                        None,
                    )
                })
            })
            .collect();

        let wall_start = Instant::now();
        tg_barrier.wait();
        println!("Starting benchmark: {} sec run", config.time);

        // Integer-second boundary on purpose; sub-second precision is
        // traded away for a synchronization-free hot path.
        while wall_start.elapsed().as_secs() < u64::from(config.time) {
            thread::sleep(Duration::from_millis(Tuning::COORDINATOR_POLL_MS));
        }
        stop.store(true, Ordering::Relaxed);

        let outputs = handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| anyhow!("threadgroup coordinator panicked"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((outputs, wall_start.elapsed()))
    })?;

    sync();
    let cpu = CpuSnapshot::now().since(&cpu_before);
    let runtime_secs = runtime.as_secs_f64();
    println!("\nBenchmark took {:.2} sec\n", runtime_secs);
    report::print_report(&outputs, runtime_secs, &cpu);
    Ok(())
}
