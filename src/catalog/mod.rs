//! Shared fileset catalog: the thread-safe registry of files currently on
//! disk for one fileset.
//!
//! Entry numbers are stable but reusable: deleting a file parks its slot
//! (number and name intact) on a FIFO hole pool, and the next `add_file`
//! recycles it before allocating a fresh number. One reader/writer lock
//! protects the index and hole pool together; each entry carries its own
//! lock protecting name and size, and the on-disk file they describe.
//!
//! Lock order is always catalog-then-entry, and the choose paths never
//! block on an entry while holding the catalog lock (try-lock + retry), so
//! `remove_file` may safely take the catalog lock while its caller holds
//! the entry lock.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use rand::Rng;
use rand::rngs::SmallRng;
use thiserror::Error;
use walkdir::WalkDir;

use crate::utils::tuning::Tuning;

/// One catalog entry: the mutable state of a live (or parked) file.
/// `num` never changes once assigned; `name` is derived from it.
#[derive(Debug)]
pub struct FileSlot {
    pub num: u32,
    pub name: PathBuf,
    pub size: u64,
}

pub type FileRef = Arc<RwLock<FileSlot>>;
pub type FileReadGuard = ArcRwLockReadGuard<RawRwLock, FileSlot>;
pub type FileWriteGuard = ArcRwLockWriteGuard<RawRwLock, FileSlot>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("fileset `{0}` has no live files; the operation mix needs at least one")]
    Empty(String),
    #[error("file name `{0}` exceeds the maximum component length")]
    NameTooLong(String),
}

struct Inner {
    /// Live entries in arbitrary order for O(1) uniform choice.
    live: Vec<(u32, FileRef)>,
    /// `num` -> position in `live`.
    index_of: HashMap<u32, usize>,
    /// Freed slots awaiting reuse, oldest first.
    holes: VecDeque<FileRef>,
    /// High-water count: live + holes. Fresh numbers allocate from here.
    listsize: u32,
}

/// Catalog plus naming scheme for one on-disk fileset.
///
/// Files live at `basedir/<basename><num % numsubdirs>/<basename><num>`;
/// with `numsubdirs == 0` the layout is flat (`basedir/<basename><num>`),
/// which the metaops directory registry uses.
pub struct Fileset {
    basedir: PathBuf,
    basename: String,
    numsubdirs: u32,
    inner: RwLock<Inner>,
}

impl Fileset {
    pub fn new(basedir: impl Into<PathBuf>, basename: impl Into<String>, numsubdirs: u32) -> Self {
        Self {
            basedir: basedir.into(),
            basename: basename.into(),
            numsubdirs,
            inner: RwLock::new(Inner {
                live: Vec::new(),
                index_of: HashMap::new(),
                holes: VecDeque::new(),
                listsize: 0,
            }),
        }
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn numsubdirs(&self) -> u32 {
        self.numsubdirs
    }

    /// Create the base directory and the fixed subdirectory fan-out.
    pub fn build_dirs(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.basedir)
            .with_context(|| format!("creating {}", self.basedir.display()))?;
        for i in 0..self.numsubdirs {
            let dir = self.basedir.join(format!("{}{}", self.basename, i));
            std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    /// Path for entry `num` under the current naming scheme.
    pub fn format_name(&self, num: u32) -> PathBuf {
        if self.numsubdirs == 0 {
            self.basedir.join(format!("{}{}", self.basename, num))
        } else {
            self.basedir
                .join(format!("{}{}", self.basename, num % self.numsubdirs))
                .join(format!("{}{}", self.basename, num))
        }
    }

    /// Allocate an entry of `size` bytes and return it write-locked. Prefers
    /// recycling the oldest hole; otherwise assigns the next fresh number.
    /// The caller must create the path on disk before releasing the lock.
    pub fn add_file(&self, size: u64) -> Result<FileWriteGuard, CatalogError> {
        let mut inner = self.inner.write();

        if let Some(arc) = inner.holes.pop_front() {
            // The deleting thread may still be releasing this slot's lock;
            // it no longer needs the catalog lock, so blocking here is safe.
            let mut guard = arc.write_arc();
            guard.size = size;
            let pos = inner.live.len();
            inner.live.push((guard.num, arc));
            inner.index_of.insert(guard.num, pos);
            return Ok(guard);
        }

        let num = inner.listsize;
        let name = self.format_name(num);
        if name
            .file_name()
            .is_some_and(|n| n.len() > Tuning::MAX_NAME_LEN)
        {
            return Err(CatalogError::NameTooLong(
                name.file_name().unwrap_or_default().to_string_lossy().into_owned(),
            ));
        }
        let arc: FileRef = Arc::new(RwLock::new(FileSlot { num, name, size }));
        let guard = arc.write_arc();
        inner.listsize += 1;
        let pos = inner.live.len();
        inner.live.push((num, arc));
        inner.index_of.insert(num, pos);
        Ok(guard)
    }

    /// Remove a write-locked entry from the index and park its slot on the
    /// hole pool. The caller removes the path from disk under the same lock.
    /// `listsize` is unchanged.
    pub fn remove_file(&self, guard: &FileWriteGuard) {
        let arc = ArcRwLockWriteGuard::rwlock(guard).clone();
        let mut inner = self.inner.write();
        let pos = inner
            .index_of
            .remove(&guard.num)
            .expect("removed entry must be live");
        inner.live.swap_remove(pos);
        if pos < inner.live.len() {
            let moved = inner.live[pos].0;
            inner.index_of.insert(moved, pos);
        }
        inner.holes.push_back(arc);
    }

    /// Pick a live entry uniformly and return it read-locked.
    pub fn choose_reader(&self, rng: &mut SmallRng) -> Result<FileReadGuard, CatalogError> {
        loop {
            {
                let inner = self.inner.read();
                if inner.live.is_empty() {
                    return Err(CatalogError::Empty(self.basename.clone()));
                }
                let i = rng.random_range(0..inner.live.len());
                if let Some(guard) = inner.live[i].1.try_read_arc() {
                    return Ok(guard);
                }
            }
            // Contended entry; drop the catalog lock before trying again so
            // the holder can run remove_file without a lock-order inversion.
            std::thread::yield_now();
        }
    }

    /// Pick a live entry uniformly and return it write-locked.
    pub fn choose_writer(&self, rng: &mut SmallRng) -> Result<FileWriteGuard, CatalogError> {
        loop {
            {
                let inner = self.inner.read();
                if inner.live.is_empty() {
                    return Err(CatalogError::Empty(self.basename.clone()));
                }
                let i = rng.random_range(0..inner.live.len());
                if let Some(guard) = inner.live[i].1.try_write_arc() {
                    return Ok(guard);
                }
            }
            std::thread::yield_now();
        }
    }

    /// Restore the canonical name of a write-locked entry from its number.
    /// Used after an operation rotates the on-disk name without rotating the
    /// number.
    pub fn rename_file(&self, guard: &mut FileWriteGuard) {
        guard.name = self.format_name(guard.num);
    }

    pub fn num_live(&self) -> usize {
        self.inner.read().live.len()
    }

    pub fn num_holes(&self) -> usize {
        self.inner.read().holes.len()
    }

    /// High-water count (live + holes).
    pub fn listsize(&self) -> u32 {
        self.inner.read().listsize
    }

    /// Live `(num, name, size)` triples sorted by number. Entry locks are
    /// taken one at a time; callers use this only when no writer is active
    /// (setup, teardown, tests).
    pub fn snapshot(&self) -> Vec<(u32, PathBuf, u64)> {
        let inner = self.inner.read();
        let mut out: Vec<_> = inner
            .live
            .iter()
            .map(|(num, arc)| {
                let slot = arc.read();
                (*num, slot.name.clone(), slot.size)
            })
            .collect();
        out.sort_by_key(|(num, _, _)| *num);
        out
    }

    fn parse_numbered(&self, name: &str) -> Option<u32> {
        let digits = name.strip_prefix(&self.basename)?;
        if digits.is_empty() {
            return None;
        }
        digits.parse().ok()
    }

    /// Rebuild the catalog from an existing on-disk tree.
    ///
    /// Enumerates this fileset's own subtree: each `<basename><i>` fan-out
    /// directory must exist and hold only `<basename><num>` files at their
    /// derived locations. `validate` is called per file to learn (and vet)
    /// its on-disk size. Numbers missing below the high-water mark become
    /// holes, so numbering behaves exactly as it did in the run that left
    /// the fileset behind. Sibling filesets sharing the base directory are
    /// the lifecycle manager's concern, not ours.
    pub fn grab_old_fileset(
        &self,
        mut validate: impl FnMut(&Path) -> anyhow::Result<u64>,
    ) -> anyhow::Result<()> {
        let mut found: Vec<(u32, u64)> = Vec::new();

        let mut scan_dir = |dir: &Path,
                            want_file: bool,
                            found: &mut Vec<(u32, u64)>|
         -> anyhow::Result<()> {
            for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
                let entry = entry.with_context(|| format!("walking fileset {}", dir.display()))?;
                let path = entry.path();
                if want_file && !entry.file_type().is_file() {
                    bail!("unexpected entry {}", path.display());
                }
                let num = entry
                    .file_name()
                    .to_str()
                    .and_then(|name| self.parse_numbered(name))
                    .with_context(|| format!("unexpected entry {}", path.display()))?;
                if path != self.format_name(num) {
                    bail!(
                        "{} is not at its derived location {}",
                        path.display(),
                        self.format_name(num).display()
                    );
                }
                let size = validate(path)?;
                found.push((num, size));
            }
            Ok(())
        };

        if self.numsubdirs == 0 {
            // Flat registry (metadir): entries may be directories.
            scan_dir(&self.basedir, false, &mut found)?;
        } else {
            for i in 0..self.numsubdirs {
                let dir = self.basedir.join(format!("{}{}", self.basename, i));
                if !dir.is_dir() {
                    bail!("fileset subdirectory {} is missing", dir.display());
                }
                scan_dir(&dir, true, &mut found)?;
            }
        }

        found.sort_by_key(|(num, _)| *num);
        if found.windows(2).any(|w| w[0].0 == w[1].0) {
            bail!("duplicate file number in {}", self.basedir.display());
        }

        let highwater = found.last().map(|(num, _)| num + 1).unwrap_or(0);
        let mut inner = self.inner.write();
        inner.live.clear();
        inner.index_of.clear();
        inner.holes.clear();
        inner.listsize = highwater;

        let live_nums: std::collections::HashSet<u32> =
            found.iter().map(|(num, _)| *num).collect();
        for (num, size) in found {
            let name = self.format_name(num);
            let arc: FileRef = Arc::new(RwLock::new(FileSlot { num, name, size }));
            let pos = inner.live.len();
            inner.live.push((num, arc));
            inner.index_of.insert(num, pos);
        }
        for num in 0..highwater {
            if !live_nums.contains(&num) {
                let name = self.format_name(num);
                inner
                    .holes
                    .push_back(Arc::new(RwLock::new(FileSlot { num, name, size: 0 })));
            }
        }
        Ok(())
    }
}
