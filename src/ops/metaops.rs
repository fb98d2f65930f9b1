//! Directory metadata operations against the metadir registry.

use std::path::{Path, PathBuf};

use crate::engine::worker::Worker;
use crate::fsys::BenchFs;
use crate::ops::{OpCode, OpOutcome};
use crate::utils::fh;

/// `<name>.<suffix>` alongside the original.
fn rotated(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Carry one registry directory through a fixed rename rotation, stat-ing
/// at each station, and land it back on its canonical name. Exercises
/// rename/stat against other metaops and createdirs on the same registry.
pub fn op_metaop(w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    let set = fs.target(OpCode::Metaop);
    // The registry is seeded at setup; empty means setup was broken.
    let mut guard = match set.choose_writer(&mut w.rng) {
        Ok(g) => g,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let orig = guard.name.clone();
    let r1 = rotated(&orig, "r1");
    let r2 = rotated(&orig, "r2");

    fh::rename(&orig, &r1);
    fh::stat(&r1);
    fh::rename(&r1, &r2);
    fh::stat(&r2);
    fh::rename(&r2, &orig);

    set.rename_file(&mut guard);
    OpOutcome::Done
}

/// Add a directory with the registry's next (or recycled) numeric suffix.
pub fn op_createdir(_w: &mut Worker<'_>, fs: &BenchFs) -> OpOutcome {
    let set = fs.target(OpCode::Createdir);
    let guard = match set.add_file(0) {
        Ok(g) => g,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    fh::mkdir(&guard.name);
    OpOutcome::Done
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_names_stay_in_parent() {
        let p = PathBuf::from("/base/metadir/dir3");
        assert_eq!(rotated(&p, "r1"), PathBuf::from("/base/metadir/dir3.r1"));
        assert_eq!(rotated(&p, "r2"), PathBuf::from("/base/metadir/dir3.r2"));
    }
}
