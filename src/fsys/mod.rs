//! Per-filesystem state and lifecycle: initial population, reuse of an
//! existing fileset, aging to a utilization target, and the per-op fileset
//! routing the setup hooks install.

use anyhow::{Context, bail};
use log::{debug, info};
use nix::sys::statvfs::statvfs;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::catalog::Fileset;
use crate::ops::{NUM_OPS, OP_TABLE, OpCode, fileops};
use crate::profile::{FsConfig, FsFlags};
use crate::utils::AlignedBuf;
use crate::utils::tuning::Tuning;

/// Which fileset an op is pointed at. Bench setup points everything at the
/// data fileset (metaops at the registry); aging setup redirects
/// create/append/delete at the fill fileset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilesetTarget {
    Data,
    Fill,
    Meta,
}

/// One benchmark filesystem: configuration, its filesets, and the per-op
/// target table. Immutable once setup finishes and worker threads start.
pub struct BenchFs {
    cfg: FsConfig,
    data: Fileset,
    fill: Fileset,
    meta: Fileset,
    op_target: [FilesetTarget; NUM_OPS],
    meta_ready: bool,
}

impl BenchFs {
    pub fn new(cfg: FsConfig) -> Self {
        let data = Fileset::new(cfg.basedir.clone(), "data", cfg.num_dirs);
        let fill = Fileset::new(cfg.basedir.clone(), "fill", cfg.num_dirs);
        let meta = Fileset::new(cfg.basedir.join("metadir"), "dir", 0);
        let mut op_target = [FilesetTarget::Data; NUM_OPS];
        op_target[OpCode::Metaop as usize] = FilesetTarget::Meta;
        op_target[OpCode::Createdir as usize] = FilesetTarget::Meta;
        Self {
            cfg,
            data,
            fill,
            meta,
            op_target,
            meta_ready: false,
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.cfg
    }

    pub fn data(&self) -> &Fileset {
        &self.data
    }

    pub fn fill(&self) -> &Fileset {
        &self.fill
    }

    pub fn meta(&self) -> &Fileset {
        &self.meta
    }

    pub fn target(&self, op: OpCode) -> &Fileset {
        match self.op_target[op as usize] {
            FilesetTarget::Data => &self.data,
            FilesetTarget::Fill => &self.fill,
            FilesetTarget::Meta => &self.meta,
        }
    }

    pub fn set_op_target(&mut self, op: OpCode, target: FilesetTarget) {
        self.op_target[op as usize] = target;
    }

    /// True when benchmark I/O should carry O_DIRECT.
    pub fn directio(&self) -> bool {
        self.cfg.flags.contains(FsFlags::DIRECTIO) && !self.cfg.flags.contains(FsFlags::LIBCIO)
    }

    pub fn desired_util(&self) -> f64 {
        self.cfg.desired_util
    }

    /// Chunk size for the create op: aging creates use the age blocksize.
    pub fn create_blocksize_for(&self, op: OpCode) -> u32 {
        if self.op_target[op as usize] == FilesetTarget::Fill {
            self.cfg.age_blocksize
        } else {
            self.cfg.create_blocksize
        }
    }

    /// Draw a file size from the weighted distribution when configured,
    /// else uniformly from `[min_filesize, max_filesize]`.
    pub fn draw_filesize(&self, rng: &mut SmallRng) -> u64 {
        if !self.cfg.size_weights.is_empty() {
            let total: u64 = self
                .cfg
                .size_weights
                .iter()
                .map(|sw| u64::from(sw.weight))
                .sum();
            let mut r = rng.random_range(0..total);
            for sw in &self.cfg.size_weights {
                let w = u64::from(sw.weight);
                if r < w {
                    return sw.size;
                }
                r -= w;
            }
            unreachable!("size weights sum to zero");
        }
        if self.cfg.max_filesize <= self.cfg.min_filesize {
            self.cfg.min_filesize
        } else {
            rng.random_range(self.cfg.min_filesize..=self.cfg.max_filesize)
        }
    }

    fn mean_filesize(&self) -> u64 {
        if !self.cfg.size_weights.is_empty() {
            let total: u64 = self
                .cfg
                .size_weights
                .iter()
                .map(|sw| u64::from(sw.weight))
                .sum();
            let weighted: u128 = self
                .cfg
                .size_weights
                .iter()
                .map(|sw| u128::from(sw.size) * u128::from(sw.weight))
                .sum();
            (weighted / u128::from(total.max(1))) as u64
        } else {
            (self.cfg.min_filesize + self.cfg.max_filesize) / 2
        }
    }

    /// Fraction of the volume in use, per statvfs.
    pub fn utilization(&self) -> anyhow::Result<f64> {
        let vfs = statvfs(&self.cfg.basedir)
            .with_context(|| format!("statvfs {}", self.cfg.basedir.display()))?;
        let blocks = vfs.blocks() as u64;
        if blocks == 0 {
            return Ok(0.0);
        }
        let free = vfs.blocks_free() as u64;
        Ok((blocks - free) as f64 / blocks as f64)
    }

    fn capacity_bytes(&self) -> anyhow::Result<u64> {
        let vfs = statvfs(&self.cfg.basedir)
            .with_context(|| format!("statvfs {}", self.cfg.basedir.display()))?;
        Ok(vfs.blocks() as u64 * vfs.fragment_size() as u64)
    }

    /// Starting file count: `num_files`, unless `init_size`/`init_util`
    /// derive it from a byte target and the mean file size.
    fn effective_start_files(&self) -> anyhow::Result<u64> {
        let mut init_size = self.cfg.init_size;
        if self.cfg.init_util > 0.0 {
            init_size = (self.cfg.init_util * self.capacity_bytes()? as f64) as u64;
        }
        if init_size > 0 {
            Ok(init_size / self.mean_filesize().max(1))
        } else {
            Ok(u64::from(self.cfg.num_files))
        }
    }

    /// Build or adopt the on-disk state, run the aging workload if
    /// configured, then install the benchmark op routing.
    pub fn setup(&mut self, base_seed: u64) -> anyhow::Result<()> {
        let reusing = self.cfg.flags.contains(FsFlags::REUSE_FS) && self.cfg.basedir.is_dir();
        if reusing {
            self.reuse()?;
        } else {
            self.populate(base_seed)?;
        }
        self.age(base_seed)?;
        for op in OpCode::ALL {
            (OP_TABLE[op as usize].bench_setup)(self, op);
        }
        Ok(())
    }

    fn populate(&mut self, base_seed: u64) -> anyhow::Result<()> {
        let basedir = self.cfg.basedir.clone();
        if basedir.exists() {
            info!("recreating fileset at {}", basedir.display());
            std::fs::remove_dir_all(&basedir)
                .with_context(|| format!("clearing {}", basedir.display()))?;
        }
        self.data.build_dirs()?;
        self.fill.build_dirs()?;

        let count = self.effective_start_files()?;
        debug!("populating {} with {} files", basedir.display(), count);
        let mut rng = SmallRng::seed_from_u64(base_seed);
        let mut buf = AlignedBuf::new(self.cfg.create_blocksize as usize, Tuning::IO_ALIGN);
        for _ in 0..count {
            let size = self.draw_filesize(&mut rng);
            let guard = self.data.add_file(size)?;
            fileops::write_file_contents(&guard.name, size, self.cfg.create_blocksize, &mut buf, None);
        }
        Ok(())
    }

    /// Adopt an existing fileset: the tree must contain exactly our own
    /// subtrees, and every data file must be readable with a size inside
    /// the configured range.
    fn reuse(&mut self) -> anyhow::Result<()> {
        let basedir = &self.cfg.basedir;
        let num_dirs = self.cfg.num_dirs;
        for entry in std::fs::read_dir(basedir)
            .with_context(|| format!("reading {}", basedir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let conformant = name == "metadir"
                || prefixed_index(&name, "data").is_some_and(|i| i < num_dirs)
                || prefixed_index(&name, "fill").is_some_and(|i| i < num_dirs);
            if !conformant {
                bail!(
                    "cannot reuse {}: unexpected entry `{}`",
                    basedir.display(),
                    name
                );
            }
        }

        let (min, max) = (self.cfg.min_filesize, self.cfg.max_filesize);
        self.data.grab_old_fileset(|path| {
            let size = std::fs::metadata(path)
                .with_context(|| format!("stat {}", path.display()))?
                .len();
            if size < min || size > max {
                bail!(
                    "file {} has size {} outside [{}, {}]",
                    path.display(),
                    size,
                    min,
                    max
                );
            }
            Ok(size)
        })?;
        // Fill files carry whatever sizes aging left them with.
        self.fill.grab_old_fileset(|path| {
            Ok(std::fs::metadata(path)
                .with_context(|| format!("stat {}", path.display()))?
                .len())
        })?;
        info!(
            "reusing fileset at {}: {} data files, {} fill files",
            basedir.display(),
            self.data.num_live(),
            self.fill.num_live()
        );
        Ok(())
    }

    fn age(&mut self, base_seed: u64) -> anyhow::Result<()> {
        let Some(aging) = self.cfg.aging.clone() else {
            return Ok(());
        };
        let desired = self.cfg.desired_util;
        if self.utilization()? >= desired {
            info!(
                "{} already at the desired {:.1}% utilization, skipping aging",
                self.cfg.basedir.display(),
                desired * 100.0
            );
            return Ok(());
        }

        for op in OpCode::ALL {
            if let Some(hook) = OP_TABLE[op as usize].age_setup {
                hook(self, op);
            }
        }
        // One starter file so an append/delete-weighted aging mix has a
        // target before the first create lands.
        if self.fill.num_live() == 0 {
            let mut rng = SmallRng::seed_from_u64(base_seed.rotate_left(17));
            let size = self.draw_filesize(&mut rng);
            let mut buf = AlignedBuf::new(self.cfg.age_blocksize as usize, Tuning::IO_ALIGN);
            let guard = self.fill.add_file(size)?;
            fileops::write_file_contents(&guard.name, size, self.cfg.age_blocksize, &mut buf, None);
        }

        info!(
            "aging {} to {:.1}% utilization",
            self.cfg.basedir.display(),
            desired * 100.0
        );
        let output = crate::engine::threadgroup::run_aging(self, &aging, base_seed);
        debug!(
            "aging finished after {} transactions",
            output.results.total_ops()
        );
        Ok(())
    }

    /// Create (or adopt) the metadir registry. Idempotent; both metaops
    /// hooks call it. Seeds a few directories so a metaop-weighted group
    /// has rename targets before the first createdir.
    pub fn ensure_metadir(&mut self) {
        if self.meta_ready {
            return;
        }
        let result = if self.meta.basedir().is_dir() {
            self.meta.grab_old_fileset(|_| Ok(0))
        } else {
            self.meta.build_dirs()
        };
        if let Err(e) = result {
            log::error!("metadir setup failed: {:#}", e);
            std::process::exit(1);
        }
        if self.meta.num_live() == 0 {
            for _ in 0..Tuning::METADIR_SEED {
                match self.meta.add_file(0) {
                    Ok(guard) => crate::utils::fh::mkdir(&guard.name),
                    Err(e) => {
                        log::error!("metadir setup failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        }
        self.meta_ready = true;
    }
}

fn prefixed_index(name: &str, prefix: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
