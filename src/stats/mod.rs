//! Per-syscall latency statistics.
//!
//! Each worker owns a [`StatsData`]; recording is a plain in-memory update
//! with no cross-thread synchronization. The shared [`StatsConfig`] (bucket
//! edges, ignore mask) is immutable once the benchmark starts. Aggregation
//! happens after join by merging worker data into group data and group data
//! into the grand total.

/// Syscalls we collect latency for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Syscall {
    Open = 0,
    Read,
    Write,
    Create,
    Lseek,
    Unlink,
    Close,
}

pub const NUM_SYSCALLS: usize = 7;

impl Syscall {
    pub const ALL: [Syscall; NUM_SYSCALLS] = [
        Syscall::Open,
        Syscall::Read,
        Syscall::Write,
        Syscall::Create,
        Syscall::Lseek,
        Syscall::Unlink,
        Syscall::Close,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Syscall::Open => "open",
            Syscall::Read => "read",
            Syscall::Write => "write",
            Syscall::Create => "create",
            Syscall::Lseek => "lseek",
            Syscall::Unlink => "unlink",
            Syscall::Close => "close",
        }
    }

    pub fn from_name(name: &str) -> Option<Syscall> {
        Syscall::ALL.into_iter().find(|s| s.name() == name)
    }
}

/// One latency interval in microseconds, half-open: `min <= v < max`.
/// `max == 0` marks an uninitialized bucket and matches nothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bucket {
    pub min_us: u32,
    pub max_us: u32,
}

impl Bucket {
    pub fn contains(&self, v: u32) -> bool {
        self.max_us != 0 && v >= self.min_us && v < self.max_us
    }
}

/// What to collect, shared read-only among all threads of a group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatsConfig {
    buckets: Vec<Bucket>,
    /// Bit per syscall; set bits are not recorded.
    ignore_mask: u32,
}

impl StatsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bucket(&mut self, min_us: u32, max_us: u32) {
        self.buckets.push(Bucket { min_us, max_us });
    }

    pub fn ignore_syscall(&mut self, sys: Syscall) {
        self.ignore_mask |= 1 << (sys as u32);
    }

    pub fn is_ignored(&self, sys: Syscall) -> bool {
        self.ignore_mask & (1 << (sys as u32)) != 0
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }
}

/// Latency tallies for one thread (or one merged aggregate).
#[derive(Clone, Debug)]
pub struct StatsData {
    pub config: StatsConfig,
    pub counts: [u32; NUM_SYSCALLS],
    /// Cumulative sums of microseconds.
    pub totals: [u64; NUM_SYSCALLS],
    pub mins: [u64; NUM_SYSCALLS],
    pub maxs: [u64; NUM_SYSCALLS],
    /// Per-syscall bucket counters, `buckets[syscall][bucket]`.
    pub buckets: Vec<Vec<u32>>,
}

impl StatsData {
    pub fn new(config: StatsConfig) -> Self {
        let nbuckets = config.buckets().len();
        Self {
            config,
            counts: [0; NUM_SYSCALLS],
            totals: [0; NUM_SYSCALLS],
            mins: [u64::MAX; NUM_SYSCALLS],
            maxs: [0; NUM_SYSCALLS],
            buckets: vec![vec![0; nbuckets]; NUM_SYSCALLS],
        }
    }

    /// Record one sample in microseconds. No-op for ignored syscalls.
    /// Samples outside every bucket still count toward the aggregate totals.
    pub fn record(&mut self, sys: Syscall, elapsed_us: u32) {
        if self.config.is_ignored(sys) {
            return;
        }
        let i = sys as usize;
        self.counts[i] += 1;
        self.totals[i] += u64::from(elapsed_us);
        self.mins[i] = self.mins[i].min(u64::from(elapsed_us));
        self.maxs[i] = self.maxs[i].max(u64::from(elapsed_us));
        // First matching bucket wins.
        for (b, bucket) in self.config.buckets().iter().enumerate() {
            if bucket.contains(elapsed_us) {
                self.buckets[i][b] += 1;
                break;
            }
        }
    }

    /// Sum `src` into `self`: counts, totals and bucket counters add,
    /// min/max combine pointwise. Associative and commutative.
    pub fn merge(&mut self, src: &StatsData) {
        for i in 0..NUM_SYSCALLS {
            self.counts[i] += src.counts[i];
            self.totals[i] += src.totals[i];
            self.mins[i] = self.mins[i].min(src.mins[i]);
            self.maxs[i] = self.maxs[i].max(src.maxs[i]);
            for (b, n) in src.buckets[i].iter().enumerate() {
                self.buckets[i][b] += n;
            }
        }
    }

    /// Mean latency in microseconds for one syscall, 0.0 when unseen.
    pub fn mean_us(&self, sys: Syscall) -> f64 {
        let i = sys as usize;
        if self.counts[i] == 0 {
            0.0
        } else {
            self.totals[i] as f64 / f64::from(self.counts[i])
        }
    }
}
