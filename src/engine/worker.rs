//! Worker threads: per-thread state and the benchmark run loop.

use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::fsys::BenchFs;
use crate::ops::{NUM_OPS, OP_TABLE, OpCode, OpOutcome, OpResults};
use crate::profile::TgConfig;
use crate::stats::StatsData;
use crate::utils::AlignedBuf;
use crate::utils::tuning::Tuning;

/// Per-thread state: RNG, scratch buffer, result tally, optional latency
/// data, and the owning group's parameters. No configuration of its own.
pub struct Worker<'a> {
    pub tg_num: usize,
    pub thread_num: u32,
    pub rng: SmallRng,
    pub buf: AlignedBuf,
    pub results: OpResults,
    pub stats: Option<StatsData>,
    pub params: &'a TgConfig,
}

impl<'a> Worker<'a> {
    /// Seeded deterministically from the run seed plus (group, thread), so
    /// a fixed run seed reproduces every thread's op sequence.
    pub fn new(params: &'a TgConfig, tg_num: usize, thread_num: u32, base_seed: u64) -> Self {
        let seed = base_seed ^ ((tg_num as u64) << 32) ^ u64::from(thread_num);
        let bufsize = params.read_blocksize.max(params.write_blocksize).max(1) as usize;
        Self {
            tg_num,
            thread_num,
            rng: SmallRng::seed_from_u64(seed),
            buf: AlignedBuf::new(bufsize, Tuning::IO_ALIGN),
            results: OpResults::default(),
            stats: params.stats.clone().map(StatsData::new),
            params,
        }
    }
}

/// Weighted op selection: draw `r` uniform in `[0, total)` and take the
/// first op whose running prefix sum exceeds it. Ties follow op-code
/// order; zero-weighted ops are never chosen.
pub fn select_op(rng: &mut SmallRng, weights: &[u32; NUM_OPS], total: u64) -> OpCode {
    debug_assert!(total > 0);
    let mut r = rng.random_range(0..total);
    for (i, &w) in weights.iter().enumerate() {
        let w = u64::from(w);
        if r < w {
            return OpCode::ALL[i];
        }
        r -= w;
    }
    unreachable!("op weights sum to zero");
}

/// The benchmark loop. Waits at the shared start barrier, then runs ops
/// until the stop flag is observed between operations; an op in flight
/// always completes. In aging mode the worker also polls utilization and
/// trips the flag itself.
///
/// The flag uses Relaxed ordering on purpose: a stale read delays stop by
/// at most one op and avoids bus-locking in the hot path.
pub fn run_worker(
    mut w: Worker<'_>,
    filesystems: &[BenchFs],
    stop: &AtomicBool,
    start_barrier: &Barrier,
    aging_util: Option<f64>,
) -> (OpResults, Option<StatsData>) {
    let total_weight = w.params.sum_weights();
    let bindfs = w.params.bindfs.map(|i| i as usize);

    start_barrier.wait();
    loop {
        let fs = match bindfs {
            Some(i) => &filesystems[i],
            None if filesystems.len() == 1 => &filesystems[0],
            None => &filesystems[w.rng.random_range(0..filesystems.len())],
        };
        let op = select_op(&mut w.rng, &w.params.weights, total_weight);
        if (OP_TABLE[op as usize].run)(&mut w, fs) == OpOutcome::Done {
            w.results.ops[op as usize] += 1;
            w.results.op_weight[op as usize] += u64::from(w.params.weights[op as usize]);
        }

        if w.params.op_delay > 0 {
            std::thread::sleep(Duration::from_micros(u64::from(w.params.op_delay)));
        }
        if let Some(desired) = aging_util {
            let util = fs.utilization().unwrap_or_else(|e| {
                log::error!("{:#}", e);
                std::process::exit(1);
            });
            if util >= desired {
                stop.store(true, Ordering::Relaxed);
            }
        }
        if stop.load(Ordering::Relaxed) {
            break;
        }
    }
    (w.results, w.stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(usize, u32)]) -> [u32; NUM_OPS] {
        let mut w = [0u32; NUM_OPS];
        for &(i, v) in pairs {
            w[i] = v;
        }
        w
    }

    #[test]
    fn select_op_only_picks_weighted_ops() {
        let w = weights(&[(0, 3), (5, 1)]);
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..500 {
            let op = select_op(&mut rng, &w, 4);
            assert!(matches!(op, OpCode::Read | OpCode::Delete));
        }
    }

    #[test]
    fn select_op_respects_weighting() {
        let w = weights(&[(0, 90), (2, 10)]);
        let mut rng = SmallRng::seed_from_u64(7);
        let mut reads = 0u32;
        for _ in 0..10_000 {
            if select_op(&mut rng, &w, 100) == OpCode::Read {
                reads += 1;
            }
        }
        // 90% expected; allow generous slack for a 10k sample.
        assert!((8500..=9500).contains(&reads), "reads = {}", reads);
    }

    #[test]
    fn select_op_single_weight_is_deterministic() {
        let w = weights(&[(9, 5)]);
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(select_op(&mut rng, &w, 5), OpCode::WriteAll);
        }
    }
}
