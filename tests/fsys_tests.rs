use std::fs;
use std::path::Path;

use fsbench::fsys::BenchFs;
use fsbench::profile::{FsConfig, FsFlags, SizeWeight};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tempfile::TempDir;

fn base_config(basedir: &Path) -> FsConfig {
    FsConfig {
        basedir: basedir.to_path_buf(),
        num_files: 6,
        num_dirs: 2,
        min_filesize: 4096,
        max_filesize: 4096,
        create_blocksize: 4096,
        age_blocksize: 4096,
        desired_util: 0.0,
        init_util: 0.0,
        init_size: 0,
        size_weights: Vec::new(),
        flags: FsFlags::empty(),
        aging: None,
    }
}

#[test]
fn test_populate_creates_the_configured_fileset() {
    let dir = TempDir::new().unwrap();
    let basedir = dir.path().join("bench");
    let mut fs = BenchFs::new(base_config(&basedir));
    fs.setup(1).unwrap();

    assert_eq!(fs.data().num_live(), 6);
    assert_eq!(fs.data().num_holes(), 0);
    assert_eq!(fs.data().listsize(), 6);

    for (_, name, size) in fs.data().snapshot() {
        assert_eq!(size, 4096);
        assert_eq!(fs::metadata(&name).unwrap().len(), 4096);
        assert!(name.starts_with(basedir.join("data0")) || name.starts_with(basedir.join("data1")));
    }
    // Bench hooks prepared the metaops registry.
    assert!(basedir.join("metadir").is_dir());
    assert!(fs.meta().num_live() > 0);
    // The aging fileset directories exist even without an aging workload.
    assert!(basedir.join("fill0").is_dir());
}

#[test]
fn test_populate_clears_a_previous_tree() {
    let dir = TempDir::new().unwrap();
    let basedir = dir.path().join("bench");
    fs::create_dir_all(basedir.join("leftovers")).unwrap();
    fs::write(basedir.join("leftovers/file"), b"x").unwrap();

    let mut fs = BenchFs::new(base_config(&basedir));
    fs.setup(1).unwrap();
    assert!(!basedir.join("leftovers").exists());
    assert_eq!(fs.data().num_live(), 6);
}

#[test]
fn test_reuse_adopts_existing_fileset_without_recreating() {
    let dir = TempDir::new().unwrap();
    let basedir = dir.path().join("bench");
    let mut first = BenchFs::new(base_config(&basedir));
    first.setup(1).unwrap();
    let before = first.data().snapshot();
    drop(first);

    let mut cfg = base_config(&basedir);
    cfg.flags |= FsFlags::REUSE_FS;
    let mut second = BenchFs::new(cfg);
    second.setup(2).unwrap();

    assert_eq!(second.data().num_live(), 6);
    assert_eq!(second.data().snapshot(), before);
}

#[test]
fn test_reuse_rejects_stray_entries() {
    let dir = TempDir::new().unwrap();
    let basedir = dir.path().join("bench");
    let mut first = BenchFs::new(base_config(&basedir));
    first.setup(1).unwrap();
    drop(first);
    fs::write(basedir.join("intruder"), b"x").unwrap();

    let mut cfg = base_config(&basedir);
    cfg.flags |= FsFlags::REUSE_FS;
    let mut second = BenchFs::new(cfg);
    assert!(second.setup(2).is_err());
}

#[test]
fn test_reuse_rejects_out_of_range_sizes() {
    let dir = TempDir::new().unwrap();
    let basedir = dir.path().join("bench");
    let mut first = BenchFs::new(base_config(&basedir));
    first.setup(1).unwrap();
    drop(first);

    let mut cfg = base_config(&basedir);
    cfg.min_filesize = 8192;
    cfg.max_filesize = 8192;
    cfg.flags |= FsFlags::REUSE_FS;
    let mut second = BenchFs::new(cfg);
    assert!(second.setup(2).is_err());
}

#[test]
fn test_draw_filesize_uniform_stays_in_range() {
    let dir = TempDir::new().unwrap();
    let mut cfg = base_config(&dir.path().join("bench"));
    cfg.min_filesize = 1000;
    cfg.max_filesize = 2000;
    let fs = BenchFs::new(cfg);
    let mut rng = SmallRng::seed_from_u64(3);
    for _ in 0..1000 {
        let size = fs.draw_filesize(&mut rng);
        assert!((1000..=2000).contains(&size));
    }
}

#[test]
fn test_draw_filesize_honors_weight_table() {
    let dir = TempDir::new().unwrap();
    let mut cfg = base_config(&dir.path().join("bench"));
    cfg.size_weights = vec![
        SizeWeight {
            size: 512,
            weight: 3,
        },
        SizeWeight {
            size: 8192,
            weight: 1,
        },
    ];
    let fs = BenchFs::new(cfg);
    let mut rng = SmallRng::seed_from_u64(3);
    let mut small = 0u32;
    let mut large = 0u32;
    for _ in 0..2000 {
        match fs.draw_filesize(&mut rng) {
            512 => small += 1,
            8192 => large += 1,
            other => panic!("unexpected size {}", other),
        }
    }
    // 3:1 weighting; allow slack for a 2k sample.
    assert!(small > large * 2, "small={} large={}", small, large);
}

#[test]
fn test_init_size_derives_start_file_count() {
    let dir = TempDir::new().unwrap();
    let basedir = dir.path().join("bench");
    let mut cfg = base_config(&basedir);
    cfg.num_files = 999;
    cfg.init_size = 10 * 4096;
    let mut fs = BenchFs::new(cfg);
    fs.setup(1).unwrap();
    // init_size / mean filesize wins over num_files.
    assert_eq!(fs.data().num_live(), 10);
}

#[test]
fn test_aging_skipped_when_volume_already_at_target() {
    let dir = TempDir::new().unwrap();
    let basedir = dir.path().join("bench");
    let mut cfg = base_config(&basedir);
    // Any real volume with a fileset on it is above this target.
    cfg.desired_util = 1e-9;
    cfg.aging = Some(fsbench::profile::TgConfig {
        num_threads: 1,
        bindfs: None,
        weights: {
            let mut w = [0u32; fsbench::ops::NUM_OPS];
            w[fsbench::ops::OpCode::Create as usize] = 1;
            w
        },
        read_random: false,
        read_skip: false,
        read_size: 0,
        read_blocksize: 0,
        read_skipsize: 0,
        write_random: false,
        write_size: 0,
        write_blocksize: 4096,
        fsync_file: false,
        op_delay: 0,
        stats: None,
    });
    let mut fs = BenchFs::new(cfg);
    fs.setup(1).unwrap();
    // Aging never ran, so the fill fileset stayed empty.
    assert_eq!(fs.fill().num_live(), 0);
    assert_eq!(fs.data().num_live(), 6);
}

#[test]
fn test_utilization_reports_a_sane_fraction() {
    let dir = TempDir::new().unwrap();
    let basedir = dir.path().join("bench");
    let mut fs = BenchFs::new(base_config(&basedir));
    fs.setup(1).unwrap();
    let util = fs.utilization().unwrap();
    assert!((0.0..=1.0).contains(&util));
}
