//! CPU time accounting for the end-of-run report.

use nix::sys::resource::{Usage, UsageWho, getrusage};

/// User/system CPU seconds consumed by this process and its children at one
/// point in time. Subtract two snapshots to get the benchmark's share.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuSnapshot {
    pub user_secs: f64,
    pub system_secs: f64,
}

fn secs(tv: nix::sys::time::TimeVal) -> f64 {
    tv.tv_sec() as f64 + tv.tv_usec() as f64 / 1_000_000.0
}

fn usage_secs(u: &Usage) -> (f64, f64) {
    (secs(u.user_time()), secs(u.system_time()))
}

impl CpuSnapshot {
    /// Snapshot rusage for self plus children.
    pub fn now() -> Self {
        let mut snap = CpuSnapshot::default();
        for who in [UsageWho::RUSAGE_SELF, UsageWho::RUSAGE_CHILDREN] {
            if let Ok(u) = getrusage(who) {
                let (user, system) = usage_secs(&u);
                snap.user_secs += user;
                snap.system_secs += system;
            }
        }
        snap
    }

    /// CPU seconds spent between `earlier` and `self`.
    pub fn since(&self, earlier: &CpuSnapshot) -> CpuSnapshot {
        CpuSnapshot {
            user_secs: self.user_secs - earlier.user_secs,
            system_secs: self.system_secs - earlier.system_secs,
        }
    }
}
