use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use fsbench::catalog::{CatalogError, Fileset};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tempfile::TempDir;

fn rng() -> SmallRng {
    SmallRng::seed_from_u64(0xfeed)
}

// --- numbering and the hole pool ---

#[test]
fn test_fresh_numbers_are_dense() {
    let set = Fileset::new("/tmp/unused", "data", 2);
    for expect in 0..4u32 {
        let guard = set.add_file(10).unwrap();
        assert_eq!(guard.num, expect);
    }
    assert_eq!(set.listsize(), 4);
    assert_eq!(set.num_live(), 4);
    assert_eq!(set.num_holes(), 0);
}

#[test]
fn test_remove_then_add_reuses_the_number() {
    let set = Fileset::new("/tmp/unused", "data", 2);
    for _ in 0..4 {
        set.add_file(10).unwrap();
    }
    let mut r = rng();

    let guard = set.choose_writer(&mut r).unwrap();
    let freed = guard.num;
    let freed_name = guard.name.clone();
    set.remove_file(&guard);
    drop(guard);

    assert_eq!(set.num_live(), 3);
    assert_eq!(set.num_holes(), 1);
    assert_eq!(set.listsize(), 4, "listsize is a high-water mark");

    let guard = set.add_file(99).unwrap();
    assert_eq!(guard.num, freed);
    assert_eq!(guard.name, freed_name);
    assert_eq!(guard.size, 99);
    drop(guard);
    assert_eq!(set.num_holes(), 0);
    assert_eq!(set.listsize(), 4);
}

#[test]
fn test_fresh_allocation_resumes_past_holes() {
    let set = Fileset::new("/tmp/unused", "data", 2);
    for _ in 0..3 {
        set.add_file(1).unwrap();
    }
    let mut r = rng();
    let guard = set.choose_writer(&mut r).unwrap();
    let freed = guard.num;
    set.remove_file(&guard);
    drop(guard);

    // First add recycles the hole, second allocates the next fresh number.
    let a = set.add_file(1).unwrap().num;
    let b = set.add_file(1).unwrap().num;
    assert_eq!(a, freed);
    assert_eq!(b, 3);
    assert_eq!(set.listsize(), 4);
}

#[test]
fn test_choose_on_empty_fileset_signals_empty() {
    let set = Fileset::new("/tmp/unused", "data", 2);
    let mut r = rng();
    assert!(matches!(
        set.choose_reader(&mut r),
        Err(CatalogError::Empty(_))
    ));
    assert!(matches!(
        set.choose_writer(&mut r),
        Err(CatalogError::Empty(_))
    ));
}

// --- naming ---

#[test]
fn test_names_fan_out_by_number_modulo_dirs() {
    let set = Fileset::new("/base", "data", 3);
    let mut names = Vec::new();
    for _ in 0..5 {
        names.push(set.add_file(0).unwrap().name.clone());
    }
    assert_eq!(names[0], PathBuf::from("/base/data0/data0"));
    assert_eq!(names[1], PathBuf::from("/base/data1/data1"));
    assert_eq!(names[2], PathBuf::from("/base/data2/data2"));
    assert_eq!(names[3], PathBuf::from("/base/data0/data3"));
    assert_eq!(names[4], PathBuf::from("/base/data1/data4"));
}

#[test]
fn test_flat_layout_when_no_subdirs() {
    let set = Fileset::new("/base/metadir", "dir", 0);
    let guard = set.add_file(0).unwrap();
    assert_eq!(guard.name, PathBuf::from("/base/metadir/dir0"));
}

#[test]
fn test_rename_file_restores_canonical_name() {
    let set = Fileset::new("/base", "data", 2);
    let mut guard = set.add_file(0).unwrap();
    let canonical = guard.name.clone();
    guard.name = PathBuf::from("/base/data0/data0.r1");
    set.rename_file(&mut guard);
    assert_eq!(guard.name, canonical);
}

#[test]
fn test_live_names_stay_unique_under_churn() {
    let set = Fileset::new("/tmp/unused", "data", 4);
    let mut r = rng();
    for _ in 0..16 {
        set.add_file(1).unwrap();
    }
    for _ in 0..200 {
        let guard = set.choose_writer(&mut r).unwrap();
        set.remove_file(&guard);
        drop(guard);
        set.add_file(1).unwrap();
    }
    let snapshot = set.snapshot();
    let names: HashSet<_> = snapshot.iter().map(|(_, name, _)| name.clone()).collect();
    assert_eq!(names.len(), snapshot.len());
    assert_eq!(set.num_live() + set.num_holes(), set.listsize() as usize);
}

// --- concurrency ---

#[test]
fn test_concurrent_create_read_delete_smoke() {
    let dir = TempDir::new().unwrap();
    let set = Fileset::new(dir.path().join("fs"), "data", 2);
    set.build_dirs().unwrap();
    for _ in 0..8 {
        let guard = set.add_file(64).unwrap();
        fs::write(&guard.name, vec![7u8; 64]).unwrap();
    }

    std::thread::scope(|s| {
        for t in 0..4u64 {
            let set = &set;
            s.spawn(move || {
                let mut r = SmallRng::seed_from_u64(t);
                for i in 0..200 {
                    match i % 3 {
                        0 => {
                            let guard = set.add_file(64).unwrap();
                            fs::write(&guard.name, vec![7u8; 64]).unwrap();
                        }
                        1 => {
                            if let Ok(guard) = set.choose_reader(&mut r) {
                                let data = fs::read(&guard.name).unwrap();
                                assert_eq!(data.len() as u64, guard.size);
                            }
                        }
                        _ => {
                            if let Ok(guard) = set.choose_writer(&mut r) {
                                fs::remove_file(&guard.name).unwrap();
                                set.remove_file(&guard);
                            }
                        }
                    }
                }
            });
        }
    });

    // Every live entry must exist on disk at its recorded size; the
    // high-water invariant must survive the churn.
    for (_, name, size) in set.snapshot() {
        assert_eq!(fs::metadata(&name).unwrap().len(), size);
    }
    assert_eq!(set.num_live() + set.num_holes(), set.listsize() as usize);
}

// --- grab_old_fileset ---

fn populated_set(dir: &TempDir) -> Fileset {
    let set = Fileset::new(dir.path().join("fs"), "data", 2);
    set.build_dirs().unwrap();
    for i in 0..6u64 {
        let guard = set.add_file(100 + i).unwrap();
        fs::write(&guard.name, vec![0u8; (100 + i) as usize]).unwrap();
    }
    set
}

#[test]
fn test_grab_old_fileset_roundtrip() {
    let dir = TempDir::new().unwrap();
    let set = populated_set(&dir);

    // Punch two holes so the rebuild has gaps to reconstruct.
    let mut r = rng();
    let mut removed = HashSet::new();
    while removed.len() < 2 {
        let guard = set.choose_writer(&mut r).unwrap();
        fs::remove_file(&guard.name).unwrap();
        removed.insert(guard.num);
        set.remove_file(&guard);
    }
    let before = set.snapshot();
    let highwater = before.last().map(|(num, _, _)| num + 1).unwrap();

    let rebuilt = Fileset::new(dir.path().join("fs"), "data", 2);
    rebuilt
        .grab_old_fileset(|path| Ok(fs::metadata(path)?.len()))
        .unwrap();

    assert_eq!(rebuilt.snapshot(), before);
    assert_eq!(rebuilt.listsize(), highwater);
    assert_eq!(
        rebuilt.num_holes() as u32,
        highwater - before.len() as u32,
        "numbers missing below the high-water mark become holes"
    );
}

#[test]
fn test_grab_reuses_reconstructed_holes() {
    let dir = TempDir::new().unwrap();
    let set = populated_set(&dir);
    let mut r = rng();
    let guard = set.choose_writer(&mut r).unwrap();
    let freed = guard.num;
    fs::remove_file(&guard.name).unwrap();
    set.remove_file(&guard);
    drop(guard);
    let was_last = freed == 5;

    let rebuilt = Fileset::new(dir.path().join("fs"), "data", 2);
    rebuilt
        .grab_old_fileset(|path| Ok(fs::metadata(path)?.len()))
        .unwrap();
    if was_last {
        // The hole was above the rebuilt high-water mark; the number is
        // re-issued as a fresh allocation instead.
        assert_eq!(rebuilt.num_holes(), 0);
    }
    let guard = rebuilt.add_file(1).unwrap();
    assert_eq!(guard.num, freed);
}

#[test]
fn test_grab_rejects_missing_fanout_dir() {
    let dir = TempDir::new().unwrap();
    let _set = populated_set(&dir);

    // Ask for a wider fan-out than the tree was built with.
    let rebuilt = Fileset::new(dir.path().join("fs"), "data", 4);
    assert!(
        rebuilt
            .grab_old_fileset(|path| Ok(fs::metadata(path)?.len()))
            .is_err()
    );
}

#[test]
fn test_grab_rejects_stray_file_in_subdir() {
    let dir = TempDir::new().unwrap();
    let _set = populated_set(&dir);
    fs::write(dir.path().join("fs/data0/junk.txt"), b"nope").unwrap();

    let rebuilt = Fileset::new(dir.path().join("fs"), "data", 2);
    assert!(
        rebuilt
            .grab_old_fileset(|path| Ok(fs::metadata(path)?.len()))
            .is_err()
    );
}

#[test]
fn test_grab_propagates_validator_failure() {
    let dir = TempDir::new().unwrap();
    let _set = populated_set(&dir);

    let rebuilt = Fileset::new(dir.path().join("fs"), "data", 2);
    let result = rebuilt.grab_old_fileset(|_| anyhow::bail!("size out of range"));
    assert!(result.is_err());
}
