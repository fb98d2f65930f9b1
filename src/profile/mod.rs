//! Workload profiles: the declarative description of filesystems and
//! thread groups that drives a benchmark run.

pub mod bind;
#[cfg(feature = "legacy-profile")]
pub mod legacy;
pub mod parser;

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use thiserror::Error;

pub use bind::{Config, FsConfig, FsFlags, SizeWeight, TgConfig, validate_group};

use crate::ops::OpCode;
use crate::stats::Syscall;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("threadgroup {index}: {msg}")]
    Group { index: usize, msg: String },
    #[error("filesystem {index}: {msg}")]
    Filesystem { index: usize, msg: String },
}

/// Read, parse and validate a sectioned profile.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    let raw = parser::parse(&text)?;
    Ok(bind::bind(&raw)?)
}

/// Parse and validate profile text directly (tests and the legacy shim).
pub fn parse_str(text: &str) -> Result<Config, ProfileError> {
    bind::bind(&parser::parse(text)?)
}

impl Config {
    /// Render back into profile syntax. Parsing the output yields an equal
    /// `Config`: the serialization is a fixed point for recognized keys.
    pub fn to_profile_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "time={}", self.time);
        if let Some(callout) = &self.callout {
            let _ = writeln!(out, "callout={callout}");
        }
        let all = |flag: FsFlags| self.filesystems.iter().all(|fs| fs.flags.contains(flag));
        let directio = all(FsFlags::DIRECTIO);
        if directio {
            let _ = writeln!(out, "directio=1");
        }
        if all(FsFlags::ALIGNIO4K) && !directio {
            let _ = writeln!(out, "alignio=1");
        }
        if all(FsFlags::LIBCIO) {
            let _ = writeln!(out, "bufferio=1");
        }

        for fs in &self.filesystems {
            let _ = writeln!(out, "[filesystem]");
            let _ = writeln!(out, "\tlocation={}", fs.basedir.display());
            let _ = writeln!(out, "\tnum_files={}", fs.num_files);
            let _ = writeln!(out, "\tnum_dirs={}", fs.num_dirs);
            let _ = writeln!(out, "\tmin_filesize={}", fs.min_filesize);
            let _ = writeln!(out, "\tmax_filesize={}", fs.max_filesize);
            let _ = writeln!(out, "\tcreate_blocksize={}", fs.create_blocksize);
            let _ = writeln!(out, "\tage_blocksize={}", fs.age_blocksize);
            if fs.flags.contains(FsFlags::REUSE_FS) {
                let _ = writeln!(out, "\treuse=1");
            }
            if fs.desired_util > 0.0 {
                let _ = writeln!(out, "\tdesired_util={}", fs.desired_util);
            }
            if fs.init_util > 0.0 {
                let _ = writeln!(out, "\tinit_util={}", fs.init_util);
            }
            if fs.init_size > 0 {
                let _ = writeln!(out, "\tinit_size={}", fs.init_size);
            }
            for sw in &fs.size_weights {
                let _ = writeln!(out, "\tsize_weight {} {}", sw.size, sw.weight);
            }
            if let Some(aging) = &fs.aging {
                let _ = writeln!(out, "\tagefs=1");
                write_tg(&mut out, aging, "\t");
            }
            let _ = writeln!(out, "[end]");
        }

        for tg in &self.groups {
            write_tg(&mut out, tg, "");
        }
        out
    }
}

fn write_tg(out: &mut String, tg: &TgConfig, indent: &str) {
    let _ = writeln!(out, "{indent}[threadgroup]");
    let _ = writeln!(out, "{indent}\tnum_threads={}", tg.num_threads);
    if let Some(bind) = tg.bindfs {
        let _ = writeln!(out, "{indent}\tbindfs={bind}");
    }
    for op in OpCode::ALL {
        let w = tg.weight(op);
        if w > 0 {
            let _ = writeln!(out, "{indent}\t{}={}", op.weight_key(), w);
        }
    }
    if tg.read_random {
        let _ = writeln!(out, "{indent}\tread_random=1");
    }
    if tg.read_skip {
        let _ = writeln!(out, "{indent}\tread_skip=1");
    }
    if tg.read_size > 0 {
        let _ = writeln!(out, "{indent}\tread_size={}", tg.read_size);
    }
    if tg.read_blocksize > 0 {
        let _ = writeln!(out, "{indent}\tread_blocksize={}", tg.read_blocksize);
    }
    if tg.read_skipsize > 0 {
        let _ = writeln!(out, "{indent}\tread_skipsize={}", tg.read_skipsize);
    }
    if tg.write_random {
        let _ = writeln!(out, "{indent}\twrite_random=1");
    }
    if tg.write_size > 0 {
        let _ = writeln!(out, "{indent}\twrite_size={}", tg.write_size);
    }
    if tg.write_blocksize > 0 {
        let _ = writeln!(out, "{indent}\twrite_blocksize={}", tg.write_blocksize);
    }
    if tg.fsync_file {
        let _ = writeln!(out, "{indent}\tfsync_file=1");
    }
    if tg.op_delay > 0 {
        let _ = writeln!(out, "{indent}\top_delay={}", tg.op_delay);
    }
    if let Some(stats) = &tg.stats {
        let _ = writeln!(out, "{indent}\t[stats]");
        let _ = writeln!(out, "{indent}\t\tenable_stats=1");
        for sys in Syscall::ALL {
            if stats.is_ignored(sys) {
                let _ = writeln!(out, "{indent}\t\tignore={}", sys.name());
            }
        }
        for bucket in stats.buckets() {
            let _ = writeln!(
                out,
                "{indent}\t\tbucket {} {}",
                bucket.min_us as f64 / 1000.0,
                bucket.max_us as f64 / 1000.0
            );
        }
        let _ = writeln!(out, "{indent}\t[end]");
    }
    let _ = writeln!(out, "{indent}[end]");
}
