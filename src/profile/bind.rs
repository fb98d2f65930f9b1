//! Binding from the raw parsed profile to the typed configuration model,
//! with the validation pass that rejects unrunnable workloads before any
//! disk activity.

use std::path::PathBuf;

use bitflags::bitflags;

use super::ProfileError;
use super::parser::{ProfileValue, RawFs, RawProfile, RawTg};
use crate::ops::{NUM_OPS, OpCode};
use crate::stats::{StatsConfig, Syscall};
use crate::utils::tuning::Defaults;

bitflags! {
    /// Per-filesystem behavior switches.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FsFlags: u32 {
        /// Rebuild the catalog from an existing on-disk fileset.
        const REUSE_FS = 1 << 0;
        /// Open benchmark I/O with O_DIRECT.
        const DIRECTIO = 1 << 1;
        /// Hand 4 KiB-aligned buffers to read/write.
        const ALIGNIO4K = 1 << 2;
        /// Buffered (libc-style) I/O; excludes O_DIRECT.
        const LIBCIO = 1 << 3;
    }
}

/// One entry of the weighted file-size distribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizeWeight {
    pub size: u64,
    pub weight: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FsConfig {
    pub basedir: PathBuf,
    pub num_files: u32,
    pub num_dirs: u32,
    pub min_filesize: u64,
    pub max_filesize: u64,
    pub create_blocksize: u32,
    pub age_blocksize: u32,
    pub desired_util: f64,
    pub init_util: f64,
    pub init_size: u64,
    pub size_weights: Vec<SizeWeight>,
    pub flags: FsFlags,
    pub aging: Option<TgConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TgConfig {
    pub num_threads: u32,
    /// Filesystem index this group is bound to; `None` floats over all.
    pub bindfs: Option<u32>,
    pub weights: [u32; NUM_OPS],
    pub read_random: bool,
    pub read_skip: bool,
    pub read_size: u64,
    pub read_blocksize: u32,
    pub read_skipsize: u32,
    pub write_random: bool,
    pub write_size: u64,
    pub write_blocksize: u32,
    pub fsync_file: bool,
    /// Microseconds slept between operations.
    pub op_delay: u32,
    pub stats: Option<StatsConfig>,
}

impl TgConfig {
    pub fn weight(&self, op: OpCode) -> u32 {
        self.weights[op as usize]
    }

    pub fn sum_weights(&self) -> u64 {
        self.weights.iter().map(|&w| u64::from(w)).sum()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Benchmark duration in seconds; 0 means setup-only.
    pub time: u32,
    pub callout: Option<String>,
    pub filesystems: Vec<FsConfig>,
    pub groups: Vec<TgConfig>,
}

impl Config {
    pub fn total_threads(&self) -> usize {
        self.groups.iter().map(|g| g.num_threads as usize).sum()
    }
}

fn group_err(index: usize, msg: impl Into<String>) -> ProfileError {
    ProfileError::Group {
        index,
        msg: msg.into(),
    }
}

fn fs_err(index: usize, msg: impl Into<String>) -> ProfileError {
    ProfileError::Filesystem {
        index,
        msg: msg.into(),
    }
}

fn bind_stats(raw: &RawTg, index: usize) -> Result<Option<StatsConfig>, ProfileError> {
    let Some(stats) = &raw.stats else {
        return Ok(None);
    };
    if !stats.boolean("enable_stats").unwrap_or(false) {
        return Ok(None);
    }
    let mut cfg = StatsConfig::new();
    for value in stats.list("ignore") {
        if let ProfileValue::Str(name) = value {
            let sys = Syscall::from_name(name)
                .ok_or_else(|| group_err(index, format!("unknown syscall `{name}` in stats ignore")))?;
            cfg.ignore_syscall(sys);
        }
    }
    // Buckets are written in milliseconds and stored as microseconds.
    for value in stats.list("bucket") {
        if let ProfileValue::Range(min_ms, max_ms) = value {
            cfg.add_bucket((min_ms * 1000.0) as u32, (max_ms * 1000.0) as u32);
        }
    }
    Ok(Some(cfg))
}

fn bind_tg(raw: &RawTg, index: usize) -> Result<TgConfig, ProfileError> {
    let opts = &raw.options;
    let mut weights = [0u32; NUM_OPS];
    for op in OpCode::ALL {
        weights[op as usize] = opts.u32(op.weight_key()).unwrap_or(0);
    }
    Ok(TgConfig {
        num_threads: opts.u32("num_threads").unwrap_or(0),
        bindfs: opts.u32("bindfs"),
        weights,
        read_random: opts.boolean("read_random").unwrap_or(false),
        read_skip: opts.boolean("read_skip").unwrap_or(false),
        read_size: opts.u64("read_size").unwrap_or(0),
        read_blocksize: opts.u32("read_blocksize").unwrap_or(0),
        read_skipsize: opts.u32("read_skipsize").unwrap_or(0),
        write_random: opts.boolean("write_random").unwrap_or(false),
        write_size: opts.u64("write_size").unwrap_or(0),
        write_blocksize: opts.u32("write_blocksize").unwrap_or(0),
        fsync_file: opts.boolean("fsync_file").unwrap_or(false),
        op_delay: opts.u32("op_delay").unwrap_or(0),
        stats: bind_stats(raw, index)?,
    })
}

/// The per-group validation pass. `num_filesystems` bounds `bindfs`;
/// aging groups pass `None` and skip the binding check.
pub fn validate_group(
    tg: &TgConfig,
    index: usize,
    num_filesystems: Option<usize>,
) -> Result<(), ProfileError> {
    if tg.num_threads == 0 {
        return Err(group_err(index, "num_threads must be at least 1"));
    }
    if tg.sum_weights() == 0 {
        return Err(group_err(
            index,
            "a threadgroup must have at least one weighted operation",
        ));
    }
    let needs_read = OpCode::ALL
        .iter()
        .any(|op| op.needs_read_blocksize() && tg.weight(*op) > 0);
    if needs_read && tg.read_blocksize == 0 {
        return Err(group_err(
            index,
            "read and readall operations require a read_blocksize",
        ));
    }
    let needs_write = OpCode::ALL
        .iter()
        .any(|op| op.needs_write_blocksize() && tg.weight(*op) > 0);
    if needs_write && tg.write_blocksize == 0 {
        return Err(group_err(
            index,
            "write, create, append and writeall operations require a write_blocksize",
        ));
    }
    if tg.read_random && tg.read_skip {
        return Err(group_err(
            index,
            "read_random and read_skip are mutually exclusive",
        ));
    }
    if tg.read_skip && tg.read_skipsize == 0 {
        return Err(group_err(
            index,
            "read_skip requires a nonzero read_skipsize",
        ));
    }
    if let (Some(n), Some(bind)) = (num_filesystems, tg.bindfs)
        && bind as usize >= n
    {
        return Err(group_err(
            index,
            format!("bindfs={bind} does not name a filesystem (have {n})"),
        ));
    }
    Ok(())
}

fn bind_fs(raw: &RawFs, index: usize, global_flags: FsFlags) -> Result<FsConfig, ProfileError> {
    let opts = &raw.options;
    let basedir = opts
        .string("location")
        .ok_or_else(|| fs_err(index, "missing required `location`"))?;

    let mut flags = global_flags;
    if opts.boolean("reuse").unwrap_or(false) {
        flags |= FsFlags::REUSE_FS;
    }

    let min_filesize = opts.u64("min_filesize").unwrap_or(0);
    let max_filesize = opts.u64("max_filesize").unwrap_or(min_filesize);
    if max_filesize < min_filesize {
        return Err(fs_err(index, "max_filesize is smaller than min_filesize"));
    }

    let mut size_weights = Vec::new();
    for value in opts.list("size_weight") {
        if let ProfileValue::SizeWeight(size, weight) = value {
            size_weights.push(SizeWeight {
                size: *size,
                weight: *weight,
            });
        }
    }
    if size_weights.iter().map(|sw| u64::from(sw.weight)).sum::<u64>() == 0 && !size_weights.is_empty() {
        return Err(fs_err(index, "size_weight entries must carry nonzero weight"));
    }

    let agefs = opts.boolean("agefs").unwrap_or(false);
    let desired_util = opts.double("desired_util").unwrap_or(0.0);
    let aging = if agefs {
        let raw_age = raw
            .aging
            .as_ref()
            .ok_or_else(|| fs_err(index, "agefs=1 but no nested [threadgroup] describes the aging workload"))?;
        if !(0.0..=1.0).contains(&desired_util) || desired_util == 0.0 {
            return Err(fs_err(index, "agefs=1 requires desired_util in (0, 1]"));
        }
        let tg = bind_tg(raw_age, index)?;
        validate_group(&tg, index, None)?;
        // Aging runs before the metadir registry exists; directory metaops
        // only make sense in the measured mix.
        if tg.weight(OpCode::Metaop) > 0 || tg.weight(OpCode::Createdir) > 0 {
            return Err(fs_err(
                index,
                "aging threadgroups cannot weight metaop or createdir",
            ));
        }
        Some(tg)
    } else {
        if raw.aging.is_some() {
            log::warn!(
                "filesystem {}: nested threadgroup ignored because agefs is not set",
                index
            );
        }
        None
    };

    Ok(FsConfig {
        basedir: PathBuf::from(basedir),
        num_files: opts.u32("num_files").unwrap_or(0),
        num_dirs: opts.u32("num_dirs").unwrap_or(Defaults::NUM_DIRS).max(1),
        min_filesize,
        max_filesize,
        create_blocksize: opts
            .u32("create_blocksize")
            .filter(|&v| v > 0)
            .unwrap_or(Defaults::CREATE_BLOCKSIZE),
        age_blocksize: opts
            .u32("age_blocksize")
            .filter(|&v| v > 0)
            .unwrap_or(Defaults::AGE_BLOCKSIZE),
        desired_util,
        init_util: opts.double("init_util").unwrap_or(0.0),
        init_size: opts.u64("init_size").unwrap_or(0),
        size_weights,
        flags,
        aging,
    })
}

/// Bind and validate the whole raw profile.
pub fn bind(raw: &RawProfile) -> Result<Config, ProfileError> {
    let mut global_flags = FsFlags::empty();
    if raw.global.boolean("directio").unwrap_or(false) {
        global_flags |= FsFlags::DIRECTIO | FsFlags::ALIGNIO4K;
    }
    if raw.global.boolean("bufferio").unwrap_or(false) {
        global_flags |= FsFlags::LIBCIO;
    }
    if raw.global.boolean("alignio").unwrap_or(false) {
        global_flags |= FsFlags::ALIGNIO4K;
    }

    let filesystems = raw
        .filesystems
        .iter()
        .enumerate()
        .map(|(i, fs)| bind_fs(fs, i, global_flags))
        .collect::<Result<Vec<_>, _>>()?;
    if filesystems.is_empty() {
        return Err(ProfileError::Parse {
            line: 0,
            msg: "profile declares no [filesystem] section".into(),
        });
    }

    let groups = raw
        .groups
        .iter()
        .enumerate()
        .map(|(i, tg)| bind_tg(tg, i))
        .collect::<Result<Vec<_>, _>>()?;
    if groups.is_empty() {
        return Err(ProfileError::Parse {
            line: 0,
            msg: "profile declares no [threadgroup] section".into(),
        });
    }
    for (i, tg) in groups.iter().enumerate() {
        validate_group(tg, i, Some(filesystems.len()))?;
    }

    Ok(Config {
        time: raw.global.u32("time").unwrap_or(0),
        callout: raw.global.string("callout").map(str::to_owned),
        filesystems,
        groups,
    })
}
