//! The historical flat profile dialect, kept behind the `legacy-profile`
//! feature. One filesystem and one thread group, described by the same key
//! names as the sectioned dialect but without sections; the benchmark
//! duration comes from the command line rather than the file.

use std::path::Path;

use anyhow::Context;
use log::warn;

use super::bind::{Config, validate_group};
use super::parser::{self, RawProfile};
use super::{ProfileError, bind};

/// Load a flat profile. Every non-comment line is `key=value` (or the
/// space-separated `size_weight` form); filesystem keys and threadgroup
/// keys may be freely interleaved.
pub fn load(path: &Path, time_override: u32) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    Ok(parse_str(&text, time_override)?)
}

pub fn parse_str(text: &str, time_override: u32) -> Result<Config, ProfileError> {
    // Reuse the sectioned machinery by wrapping the flat key stream in a
    // synthetic [filesystem] and [threadgroup]. Keys are routed by which
    // section's option table knows them.
    let mut fs_lines = String::new();
    let mut tg_lines = String::new();
    let mut global_lines = String::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let key = line
            .split(['=', ' ', '\t'])
            .next()
            .unwrap_or_default()
            .trim();
        if is_fs_key(key) {
            fs_lines.push_str(line);
            fs_lines.push('\n');
        } else if is_tg_key(key) {
            tg_lines.push_str(line);
            tg_lines.push('\n');
        } else if is_global_key(key) {
            global_lines.push_str(line);
            global_lines.push('\n');
        } else {
            warn!("legacy profile line {}: unrecognized option `{}`", i + 1, key);
        }
    }

    let synthetic = format!(
        "{global_lines}[filesystem]\n{fs_lines}[end]\n[threadgroup]\n{tg_lines}[end]\n"
    );
    let raw: RawProfile = parser::parse(&synthetic)?;
    let mut config = bind::bind(&raw)?;
    config.time = time_override;
    for (i, tg) in config.groups.iter().enumerate() {
        validate_group(tg, i, Some(config.filesystems.len()))?;
    }
    Ok(config)
}

fn is_fs_key(key: &str) -> bool {
    matches!(
        key,
        "location"
            | "num_files"
            | "num_dirs"
            | "reuse"
            | "min_filesize"
            | "max_filesize"
            | "create_blocksize"
            | "age_blocksize"
            | "desired_util"
            | "size_weight"
            | "init_util"
            | "init_size"
    )
}

fn is_global_key(key: &str) -> bool {
    matches!(
        key,
        "time" | "verbose" | "directio" | "bufferio" | "alignio" | "callout"
    )
}

fn is_tg_key(key: &str) -> bool {
    key.ends_with("_weight")
        || matches!(
            key,
            "num_threads"
                | "bindfs"
                | "read_random"
                | "read_skip"
                | "read_size"
                | "read_blocksize"
                | "read_skipsize"
                | "write_random"
                | "write_size"
                | "write_blocksize"
                | "fsync_file"
                | "op_delay"
        )
}
