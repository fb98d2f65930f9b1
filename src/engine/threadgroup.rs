//! Thread groups: spawn a pool of workers, run them against the
//! filesystems, and collect their results when the stop flag trips.

use std::sync::Barrier;
use std::sync::atomic::AtomicBool;
use std::thread;

use crossbeam_channel::bounded;
use log::debug;

use crate::fsys::BenchFs;
use crate::ops::OpResults;
use crate::profile::TgConfig;
use crate::stats::StatsData;

use super::worker::{Worker, run_worker};

/// Merged results of one group's workers.
pub struct GroupOutput {
    pub results: OpResults,
    pub stats: Option<StatsData>,
}

/// Run one group to completion: spawn `num_threads` workers, let them meet
/// the shared start barrier, and sum what they send back at exit.
///
/// The caller owns the stop discipline: the driver trips `stop` for timed
/// benchmark groups, while aging groups pass `aging_util` so any worker can
/// trip it on reaching the utilization target.
pub fn run_group(
    cfg: &TgConfig,
    tg_num: usize,
    filesystems: &[BenchFs],
    base_seed: u64,
    start_barrier: &Barrier,
    stop: &AtomicBool,
    aging_util: Option<f64>,
) -> GroupOutput {
    let (tx, rx) = bounded::<(OpResults, Option<StatsData>)>(cfg.num_threads as usize);

    thread::scope(|s| {
        for thread_num in 0..cfg.num_threads {
            let tx = tx.clone();
            s.spawn(move || {
                let worker = Worker::new(cfg, tg_num, thread_num, base_seed);
                let out = run_worker(worker, filesystems, stop, start_barrier, aging_util);
                let _ = tx.send(out);
            });
        }
        drop(tx);

        // Workers drop their senders on exit; drain until the channel closes.
        let mut results = OpResults::default();
        let mut stats = cfg.stats.clone().map(StatsData::new);
        while let Ok((r, sd)) = rx.recv() {
            results.add(&r);
            if let (Some(total), Some(thread_stats)) = (stats.as_mut(), sd.as_ref()) {
                total.merge(thread_stats);
            }
        }
        debug!(
            "threadgroup {}: {} transactions collected",
            tg_num,
            results.total_ops()
        );
        GroupOutput { results, stats }
    })
}

/// Drive a filesystem's embedded aging group until the first worker sees
/// the utilization target. The group is bound to that one filesystem.
pub fn run_aging(fs: &BenchFs, cfg: &TgConfig, base_seed: u64) -> GroupOutput {
    let mut cfg = cfg.clone();
    cfg.bindfs = None;
    let stop = AtomicBool::new(false);
    let barrier = Barrier::new(cfg.num_threads as usize);
    run_group(
        &cfg,
        0,
        std::slice::from_ref(fs),
        base_seed,
        &barrier,
        &stop,
        Some(fs.desired_util()),
    )
}
