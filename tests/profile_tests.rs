use fsbench::ops::OpCode;
use fsbench::profile::{FsFlags, parse_str};
use fsbench::stats::Syscall;

const FULL_PROFILE: &str = r#"
# global options
time=30
callout=echo ready

[filesystem]
	location=/tmp/bench
	num_files=128
	num_dirs=4
	min_filesize=4096
	max_filesize=65536
	create_blocksize=8192
	age_blocksize=2048
	reuse=1
[end]

[threadgroup]
	num_threads=4
	read_weight=4
	read_blocksize=4096
	write_weight=2
	write_size=4096
	write_blocksize=4096
	op_delay=100
	[stats]
		enable_stats=1
		ignore=close
		bucket 0.0 0.5
		bucket 0.5 5.0
	[end]
[end]
"#;

#[test]
fn test_parse_full_profile() {
    let config = parse_str(FULL_PROFILE).unwrap();
    assert_eq!(config.time, 30);
    assert_eq!(config.callout.as_deref(), Some("echo ready"));

    assert_eq!(config.filesystems.len(), 1);
    let fs = &config.filesystems[0];
    assert_eq!(fs.basedir, std::path::PathBuf::from("/tmp/bench"));
    assert_eq!(fs.num_files, 128);
    assert_eq!(fs.num_dirs, 4);
    assert_eq!(fs.min_filesize, 4096);
    assert_eq!(fs.max_filesize, 65536);
    assert_eq!(fs.create_blocksize, 8192);
    assert_eq!(fs.age_blocksize, 2048);
    assert!(fs.flags.contains(FsFlags::REUSE_FS));
    assert!(fs.aging.is_none());

    assert_eq!(config.groups.len(), 1);
    let tg = &config.groups[0];
    assert_eq!(tg.num_threads, 4);
    assert_eq!(tg.weight(OpCode::Read), 4);
    assert_eq!(tg.weight(OpCode::Write), 2);
    assert_eq!(tg.weight(OpCode::Delete), 0);
    assert_eq!(tg.op_delay, 100);

    let stats = tg.stats.as_ref().unwrap();
    assert!(stats.is_ignored(Syscall::Close));
    assert!(!stats.is_ignored(Syscall::Read));
    // Buckets arrive in milliseconds and are stored as microseconds.
    assert_eq!(stats.buckets().len(), 2);
    assert_eq!(stats.buckets()[0].min_us, 0);
    assert_eq!(stats.buckets()[0].max_us, 500);
    assert_eq!(stats.buckets()[1].min_us, 500);
    assert_eq!(stats.buckets()[1].max_us, 5000);
}

#[test]
fn test_parse_serialize_parse_is_fixed_point() {
    let config = parse_str(FULL_PROFILE).unwrap();
    let round_tripped = parse_str(&config.to_profile_string()).unwrap();
    assert_eq!(config, round_tripped);
}

#[test]
fn test_nested_threadgroup_becomes_aging_workload() {
    let text = r#"
time=10
[filesystem]
	location=/tmp/bench
	num_files=16
	min_filesize=4096
	max_filesize=4096
	agefs=1
	desired_util=0.4
	[threadgroup]
		num_threads=2
		create_weight=2
		delete_weight=1
		write_blocksize=4096
	[end]
[end]
[threadgroup]
	num_threads=1
	read_weight=1
	read_blocksize=4096
[end]
"#;
    let config = parse_str(text).unwrap();
    let aging = config.filesystems[0].aging.as_ref().unwrap();
    assert_eq!(aging.num_threads, 2);
    assert_eq!(aging.weight(OpCode::Create), 2);
    assert_eq!(aging.weight(OpCode::Delete), 1);
    // The aging group is not a top-level group.
    assert_eq!(config.groups.len(), 1);

    let round_tripped = parse_str(&config.to_profile_string()).unwrap();
    assert_eq!(config, round_tripped);
}

#[test]
fn test_size_weight_entries_accumulate() {
    let text = r#"
time=1
[filesystem]
	location=/tmp/bench
	num_files=4
	min_filesize=4096
	max_filesize=4096
	size_weight 4096 3
	size_weight 65536 1
[end]
[threadgroup]
	num_threads=1
	read_weight=1
	read_blocksize=4096
[end]
"#;
    let config = parse_str(text).unwrap();
    let weights = &config.filesystems[0].size_weights;
    assert_eq!(weights.len(), 2);
    assert_eq!((weights[0].size, weights[0].weight), (4096, 3));
    assert_eq!((weights[1].size, weights[1].weight), (65536, 1));
}

#[test]
fn test_global_directio_implies_aligned_io_everywhere() {
    let text = r#"
time=1
directio=1
[filesystem]
	location=/tmp/a
	num_files=1
	min_filesize=4096
	max_filesize=4096
[end]
[filesystem]
	location=/tmp/b
	num_files=1
	min_filesize=4096
	max_filesize=4096
[end]
[threadgroup]
	num_threads=1
	read_weight=1
	read_blocksize=4096
[end]
"#;
    let config = parse_str(text).unwrap();
    for fs in &config.filesystems {
        assert!(fs.flags.contains(FsFlags::DIRECTIO | FsFlags::ALIGNIO4K));
    }
}

#[test]
fn test_repeated_single_valued_key_keeps_last() {
    let text = r#"
time=5
time=9
[filesystem]
	location=/tmp/bench
	num_files=1
	min_filesize=1
	max_filesize=1
[end]
[threadgroup]
	num_threads=1
	stat_weight=1
[end]
"#;
    let config = parse_str(text).unwrap();
    assert_eq!(config.time, 9);
}

#[test]
fn test_unrecognized_and_deprecated_keys_are_ignored() {
    let text = r#"
time=1
num_filesystems=2
no_such_option=1
[filesystem]
	location=/tmp/bench
	num_files=1
	min_filesize=1
	max_filesize=1
[end]
[threadgroup]
	num_threads=1
	stat_weight=1
[end]
"#;
    assert!(parse_str(text).is_ok());
}

fn minimal_with_tg(tg_body: &str) -> String {
    format!(
        "time=1\n[filesystem]\n\tlocation=/tmp/bench\n\tnum_files=4\n\tmin_filesize=4096\n\tmax_filesize=4096\n[end]\n[threadgroup]\n{tg_body}\n[end]\n"
    )
}

#[test]
fn test_group_without_weights_is_rejected() {
    let text = minimal_with_tg("\tnum_threads=1");
    assert!(parse_str(&text).is_err());
}

#[test]
fn test_read_ops_require_read_blocksize() {
    let text = minimal_with_tg("\tnum_threads=1\n\tread_weight=1");
    assert!(parse_str(&text).is_err());
}

#[test]
fn test_write_ops_require_write_blocksize() {
    let text = minimal_with_tg("\tnum_threads=1\n\tcreate_weight=1");
    assert!(parse_str(&text).is_err());
    let text = minimal_with_tg("\tnum_threads=1\n\twriteall_weight=1");
    assert!(parse_str(&text).is_err());
}

#[test]
fn test_read_random_and_read_skip_are_mutually_exclusive() {
    let text = minimal_with_tg(
        "\tnum_threads=1\n\tread_weight=1\n\tread_blocksize=4096\n\tread_random=1\n\tread_skip=1\n\tread_skipsize=4096",
    );
    assert!(parse_str(&text).is_err());
}

#[test]
fn test_read_skip_requires_skipsize() {
    let text =
        minimal_with_tg("\tnum_threads=1\n\tread_weight=1\n\tread_blocksize=4096\n\tread_skip=1");
    assert!(parse_str(&text).is_err());
}

#[test]
fn test_bindfs_must_name_a_filesystem() {
    let text = minimal_with_tg("\tnum_threads=1\n\tstat_weight=1\n\tbindfs=3");
    assert!(parse_str(&text).is_err());
    let text = minimal_with_tg("\tnum_threads=1\n\tstat_weight=1\n\tbindfs=0");
    assert!(parse_str(&text).is_ok());
}

#[test]
fn test_missing_location_is_rejected() {
    let text = "time=1\n[filesystem]\n\tnum_files=1\n[end]\n[threadgroup]\n\tnum_threads=1\n\tstat_weight=1\n[end]\n";
    assert!(parse_str(text).is_err());
}

#[test]
fn test_agefs_requires_nested_group_and_util() {
    let no_group = "time=1\n[filesystem]\n\tlocation=/tmp/b\n\tnum_files=1\n\tmin_filesize=1\n\tmax_filesize=1\n\tagefs=1\n\tdesired_util=0.5\n[end]\n[threadgroup]\n\tnum_threads=1\n\tstat_weight=1\n[end]\n";
    assert!(parse_str(no_group).is_err());

    let no_util = "time=1\n[filesystem]\n\tlocation=/tmp/b\n\tnum_files=1\n\tmin_filesize=1\n\tmax_filesize=1\n\tagefs=1\n\t[threadgroup]\n\t\tnum_threads=1\n\t\tcreate_weight=1\n\t\twrite_blocksize=4096\n\t[end]\n[end]\n[threadgroup]\n\tnum_threads=1\n\tstat_weight=1\n[end]\n";
    assert!(parse_str(no_util).is_err());
}

#[test]
fn test_aging_group_cannot_weight_metaops() {
    // The metadir registry is only set up for the measured run; an aging
    // mix reaching for it is a configuration error, not a crash.
    for weight_key in ["meta_weight", "createdir_weight"] {
        let text = format!(
            "time=1\n[filesystem]\n\tlocation=/tmp/b\n\tnum_files=1\n\tmin_filesize=1\n\tmax_filesize=1\n\tagefs=1\n\tdesired_util=0.5\n\t[threadgroup]\n\t\tnum_threads=1\n\t\tcreate_weight=1\n\t\t{weight_key}=1\n\t\twrite_blocksize=4096\n\t[end]\n[end]\n[threadgroup]\n\tnum_threads=1\n\tstat_weight=1\n[end]\n"
        );
        assert!(parse_str(&text).is_err(), "{weight_key} must be rejected");
    }
}

#[test]
fn test_unterminated_section_is_rejected() {
    let text = "time=1\n[filesystem]\n\tlocation=/tmp/b\n";
    assert!(parse_str(text).is_err());
}

#[test]
fn test_bool_options_only_accept_zero_or_one() {
    let text = "time=1\ndirectio=2\n";
    assert!(parse_str(text).is_err());
}

#[test]
fn test_profile_without_sections_is_rejected() {
    assert!(parse_str("time=1\n").is_err());
}

#[cfg(feature = "legacy-profile")]
mod legacy {
    use fsbench::ops::OpCode;
    use fsbench::profile::legacy;

    #[test]
    fn test_flat_dialect_builds_one_fs_and_one_group() {
        let text = "location=/tmp/bench\nnum_files=8\nmin_filesize=4096\nmax_filesize=4096\nnum_threads=2\nread_weight=1\nread_blocksize=4096\n";
        let config = legacy::parse_str(text, 15).unwrap();
        assert_eq!(config.time, 15);
        assert_eq!(config.filesystems.len(), 1);
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].weight(OpCode::Read), 1);
    }
}
