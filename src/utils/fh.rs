//! File-handle helpers: thin syscall wrappers with optional latency timing.
//!
//! Any failure here invalidates the measurement, so these abort the process
//! with a diagnostic naming the path and operation instead of propagating.
//! Latency is recorded per call when the worker carries a [`StatsData`].

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Instant;

use crate::stats::{StatsData, Syscall};

fn fatal(op: &str, path: &Path, err: &std::io::Error) -> ! {
    log::error!("{} failed on {}: {}", op, path.display(), err);
    std::process::exit(1);
}

fn timed<T>(stats: Option<&mut StatsData>, sys: Syscall, f: impl FnOnce() -> T) -> T {
    match stats {
        Some(sd) => {
            let start = Instant::now();
            let out = f();
            sd.record(sys, start.elapsed().as_micros() as u32);
            out
        }
        None => f(),
    }
}

fn direct_flags(options: &mut OpenOptions, directio: bool) {
    if directio {
        options.custom_flags(libc::O_DIRECT);
    }
}

pub fn open_read(path: &Path, directio: bool, stats: Option<&mut StatsData>) -> File {
    let mut options = OpenOptions::new();
    options.read(true);
    direct_flags(&mut options, directio);
    timed(stats, Syscall::Open, || options.open(path))
        .unwrap_or_else(|e| fatal("open for read", path, &e))
}

pub fn open_write(path: &Path, directio: bool, stats: Option<&mut StatsData>) -> File {
    let mut options = OpenOptions::new();
    options.write(true);
    direct_flags(&mut options, directio);
    timed(stats, Syscall::Open, || options.open(path))
        .unwrap_or_else(|e| fatal("open for write", path, &e))
}

pub fn open_append(path: &Path, directio: bool, stats: Option<&mut StatsData>) -> File {
    let mut options = OpenOptions::new();
    options.append(true);
    direct_flags(&mut options, directio);
    timed(stats, Syscall::Open, || options.open(path))
        .unwrap_or_else(|e| fatal("open for append", path, &e))
}

/// Create is always a buffered open; direct I/O does not apply to the
/// initial population of a file.
pub fn open_create(path: &Path, stats: Option<&mut StatsData>) -> File {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(true);
    timed(stats, Syscall::Create, || options.open(path))
        .unwrap_or_else(|e| fatal("create", path, &e))
}

/// Read exactly `buf.len()` bytes. Short reads are fatal; callers size the
/// chunk so it never crosses EOF.
pub fn read_chunk(f: &mut File, buf: &mut [u8], path: &Path, stats: Option<&mut StatsData>) {
    timed(stats, Syscall::Read, || f.read_exact(buf))
        .unwrap_or_else(|e| fatal("read", path, &e));
}

pub fn write_chunk(f: &mut File, buf: &[u8], path: &Path, stats: Option<&mut StatsData>) {
    timed(stats, Syscall::Write, || f.write_all(buf))
        .unwrap_or_else(|e| fatal("write", path, &e));
}

pub fn seek(f: &mut File, pos: SeekFrom, path: &Path, stats: Option<&mut StatsData>) {
    // Seeking nowhere is not worth a syscall.
    if matches!(pos, SeekFrom::Current(0)) {
        return;
    }
    timed(stats, Syscall::Lseek, || f.seek(pos)).unwrap_or_else(|e| fatal("seek", path, &e));
}

pub fn fsync(f: &File, path: &Path) {
    f.sync_all().unwrap_or_else(|e| fatal("fsync", path, &e));
}

pub fn close(f: File, stats: Option<&mut StatsData>) {
    timed(stats, Syscall::Close, || drop(f));
}

pub fn unlink(path: &Path, stats: Option<&mut StatsData>) {
    timed(stats, Syscall::Unlink, || fs::remove_file(path))
        .unwrap_or_else(|e| fatal("unlink", path, &e));
}

pub fn mkdir(path: &Path) {
    fs::create_dir(path).unwrap_or_else(|e| fatal("mkdir", path, &e));
}

pub fn rename(from: &Path, to: &Path) {
    fs::rename(from, to).unwrap_or_else(|e| fatal("rename", from, &e));
}

/// Size reported by stat.
pub fn stat(path: &Path) -> u64 {
    fs::metadata(path)
        .unwrap_or_else(|e| fatal("stat", path, &e))
        .len()
}
