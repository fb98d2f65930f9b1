//! Handlers for the file-level operations.
//!
//! Every handler picks its file through the owning fileset's lock protocol,
//! performs the I/O through the timed wrappers in [`crate::utils::fh`], and
//! accumulates byte counts in the worker's results. A failed syscall aborts
//! the run; a benchmark whose I/O failed has nothing to report.
//!
//! An empty fileset is fatal unless the group's mix can repopulate it
//! (create is weighted), in which case the op reports [`OpOutcome::Skipped`]
//! and the worker moves on without counting a transaction.

use std::io::SeekFrom;
use std::path::Path;

use rand::Rng;

use crate::catalog::{CatalogError, FileReadGuard, FileWriteGuard, Fileset};
use crate::engine::worker::Worker;
use crate::fsys::BenchFs;
use crate::ops::{OpCode, OpOutcome};
use crate::stats::StatsData;
use crate::utils::AlignedBuf;
use crate::utils::fh;

fn fatal_catalog(err: &CatalogError) -> ! {
    log::error!("{}", err);
    std::process::exit(1);
}

/// `None` when the set is transiently empty and the mix can refill it.
fn choose_reader(w: &mut Worker<'_>, set: &Fileset) -> Option<FileReadGuard> {
    match set.choose_reader(&mut w.rng) {
        Ok(guard) => Some(guard),
        Err(CatalogError::Empty(_)) if w.params.weight(OpCode::Create) > 0 => None,
        Err(e) => fatal_catalog(&e),
    }
}

fn choose_writer(w: &mut Worker<'_>, set: &Fileset) -> Option<FileWriteGuard> {
    match set.choose_writer(&mut w.rng) {
        Ok(guard) => Some(guard),
        Err(CatalogError::Empty(_)) if w.params.weight(OpCode::Create) > 0 => None,
        Err(e) => fatal_catalog(&e),
    }
}

/// Block-aligned offset uniform over `[0, filesize - blocksize]`, in units
/// of `blocksize`. Files smaller than one block are addressed at 0.
fn aligned_offset(rng: &mut rand::rngs::SmallRng, filesize: u64, blocksize: u64) -> u64 {
    if blocksize == 0 || filesize <= blocksize {
        return 0;
    }
    let blocks = (filesize - blocksize) / blocksize + 1;
    rng.random_range(0..blocks) * blocksize
}

/// Write a brand-new file of `size` bytes in `blocksize` chunks from the
/// scratch buffer. Shared between the create op and initial population.
pub(crate) fn write_file_contents(
    path: &Path,
    size: u64,
    blocksize: u32,
    buf: &mut AlignedBuf,
    mut stats: Option<&mut StatsData>,
) -> u64 {
    let bs = u64::from(blocksize.max(1));
    buf.ensure(bs as usize);
    let mut f = fh::open_create(path, stats.as_deref_mut());
    let mut remaining = size;
    while remaining > 0 {
        let n = bs.min(remaining) as usize;
        fh::write_chunk(&mut f, &buf.as_mut_slice()[..n], path, stats.as_deref_mut());
        remaining -= n as u64;
    }
    fh::close(f, stats.as_deref_mut());
    size
}

pub fn op_read(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    read_common(w, fs, OpCode::Read, false)
}

/// Sequential read of the whole file regardless of `read_size`.
pub fn op_readall(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    read_common(w, fs, OpCode::ReadAll, true)
}

fn read_common(w: &mut Worker<'_>, fs: &BenchFs, op: OpCode, whole_file: bool) -> OpOutcome {
    let set = fs.target(op);
    let Some(guard) = choose_reader(w, set) else {
        return OpOutcome::Skipped;
    };
    let bs = u64::from(w.params.read_blocksize);
    w.buf.ensure(bs as usize);

    let filesize = guard.size;
    let want = if whole_file || w.params.read_size == 0 {
        filesize
    } else {
        w.params.read_size.min(filesize)
    };

    let mut f = fh::open_read(&guard.name, fs.directio(), w.stats.as_mut());
    if !whole_file && w.params.read_random {
        let mut remaining = want;
        while remaining > 0 {
            let offset = aligned_offset(&mut w.rng, filesize, bs);
            let n = bs.min(remaining).min(filesize - offset);
            if n == 0 {
                break;
            }
            fh::seek(&mut f, SeekFrom::Start(offset), &guard.name, w.stats.as_mut());
            fh::read_chunk(
                &mut f,
                &mut w.buf.as_mut_slice()[..n as usize],
                &guard.name,
                w.stats.as_mut(),
            );
            w.results.read_bytes += n;
            remaining = remaining.saturating_sub(bs);
        }
    } else if !whole_file && w.params.read_skip {
        let skip = i64::from(w.params.read_skipsize);
        let mut pos = 0u64;
        let mut remaining = want;
        while remaining > 0 && pos < filesize {
            let n = bs.min(remaining).min(filesize - pos);
            fh::read_chunk(
                &mut f,
                &mut w.buf.as_mut_slice()[..n as usize],
                &guard.name,
                w.stats.as_mut(),
            );
            w.results.read_bytes += n;
            remaining -= n;
            pos += n;
            if remaining > 0 {
                fh::seek(&mut f, SeekFrom::Current(skip), &guard.name, w.stats.as_mut());
                pos += skip as u64;
            }
        }
    } else {
        let mut remaining = want;
        while remaining > 0 {
            let n = bs.min(remaining);
            fh::read_chunk(
                &mut f,
                &mut w.buf.as_mut_slice()[..n as usize],
                &guard.name,
                w.stats.as_mut(),
            );
            w.results.read_bytes += n;
            remaining -= n;
        }
    }
    fh::close(f, w.stats.as_mut());
    OpOutcome::Done
}

pub fn op_write(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    let set = fs.target(OpCode::Write);
    let Some(guard) = choose_writer(w, set) else {
        return OpOutcome::Skipped;
    };
    let bs = u64::from(w.params.write_blocksize);
    w.buf.ensure(bs as usize);

    let filesize = guard.size;
    // Overwrite only: never grow the file.
    let total = w.params.write_size.min(filesize);

    let mut f = fh::open_write(&guard.name, fs.directio(), w.stats.as_mut());
    if w.params.write_random {
        let mut remaining = total;
        while remaining > 0 {
            let offset = aligned_offset(&mut w.rng, filesize, bs);
            let n = bs.min(remaining).min(filesize - offset);
            if n == 0 {
                break;
            }
            fh::seek(&mut f, SeekFrom::Start(offset), &guard.name, w.stats.as_mut());
            fh::write_chunk(
                &mut f,
                &w.buf.as_mut_slice()[..n as usize],
                &guard.name,
                w.stats.as_mut(),
            );
            w.results.write_bytes += n;
            remaining = remaining.saturating_sub(bs);
        }
    } else {
        write_sequential(w, &mut f, &guard.name, total, bs);
    }
    if w.params.fsync_file {
        fh::fsync(&f, &guard.name);
    }
    fh::close(f, w.stats.as_mut());
    OpOutcome::Done
}

pub fn op_writeall(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    writeall_common(w, fs, OpCode::WriteAll, false)
}

pub fn op_writeall_fsync(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    writeall_common(w, fs, OpCode::WriteAllFsync, true)
}

/// Sequential overwrite of the entire file in place.
fn writeall_common(w: &mut Worker<'_>, fs: &BenchFs, op: OpCode, sync: bool) -> OpOutcome {
    let set = fs.target(op);
    let Some(guard) = choose_writer(w, set) else {
        return OpOutcome::Skipped;
    };
    let bs = u64::from(w.params.write_blocksize);
    w.buf.ensure(bs as usize);

    let mut f = fh::open_write(&guard.name, fs.directio(), w.stats.as_mut());
    let total = guard.size;
    write_sequential(w, &mut f, &guard.name, total, bs);
    if sync || w.params.fsync_file {
        fh::fsync(&f, &guard.name);
    }
    fh::close(f, w.stats.as_mut());
    OpOutcome::Done
}

fn write_sequential(w: &mut Worker<'_>, f: &mut std::fs::File, path: &Path, total: u64, bs: u64) {
    let mut remaining = total;
    while remaining > 0 {
        let n = bs.min(remaining);
        fh::write_chunk(f, &w.buf.as_mut_slice()[..n as usize], path, w.stats.as_mut());
        w.results.write_bytes += n;
        remaining -= n;
    }
}

pub fn op_create(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    let set = fs.target(OpCode::Create);
    let size = fs.draw_filesize(&mut w.rng);
    let blocksize = fs.create_blocksize_for(OpCode::Create);
    let guard = match set.add_file(size) {
        Ok(guard) => guard,
        Err(e) => fatal_catalog(&e),
    };
    let written = write_file_contents(&guard.name, size, blocksize, &mut w.buf, w.stats.as_mut());
    w.results.write_bytes += written;
    OpOutcome::Done
}

pub fn op_append(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    let set = fs.target(OpCode::Append);
    let Some(mut guard) = choose_writer(w, set) else {
        return OpOutcome::Skipped;
    };
    let bs = u64::from(w.params.write_blocksize);
    w.buf.ensure(bs as usize);

    let mut f = fh::open_append(&guard.name, fs.directio(), w.stats.as_mut());
    let total = w.params.write_size;
    write_sequential(w, &mut f, &guard.name, total, bs);
    if w.params.fsync_file {
        fh::fsync(&f, &guard.name);
    }
    fh::close(f, w.stats.as_mut());
    guard.size += total;
    OpOutcome::Done
}

pub fn op_delete(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    let set = fs.target(OpCode::Delete);
    let Some(guard) = choose_writer(w, set) else {
        return OpOutcome::Skipped;
    };
    fh::unlink(&guard.name, w.stats.as_mut());
    set.remove_file(&guard);
    OpOutcome::Done
}

pub fn op_stat(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    let set = fs.target(OpCode::Stat);
    let Some(guard) = choose_reader(w, set) else {
        return OpOutcome::Skipped;
    };
    fh::stat(&guard.name);
    OpOutcome::Done
}

pub fn op_open_close(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    let set = fs.target(OpCode::OpenClose);
    let Some(guard) = choose_reader(w, set) else {
        return OpOutcome::Skipped;
    };
    let f = fh::open_read(&guard.name, fs.directio(), w.stats.as_mut());
    fh::close(f, w.stats.as_mut());
    OpOutcome::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn aligned_offset_stays_in_bounds_and_aligned() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let off = aligned_offset(&mut rng, 10_000, 4096);
            assert_eq!(off % 4096, 0);
            assert!(off <= 10_000 - 4096);
        }
    }

    #[test]
    fn aligned_offset_small_file_is_zero() {
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(aligned_offset(&mut rng, 100, 4096), 0);
        assert_eq!(aligned_offset(&mut rng, 4096, 4096), 0);
    }
}
