//! Line parser for the sectioned profile dialect.
//!
//! The grammar is INI-like with explicit terminators: top-level `key=value`
//! assignments plus `[filesystem]`/`[threadgroup]`/`[stats]` sections closed
//! by `[end]`. A `[threadgroup]` nested in a `[filesystem]` is that
//! filesystem's aging workload; `[stats]` nests in a `[threadgroup]`. Empty
//! lines and lines starting with `#` are skipped. Each section has a fixed
//! option table; unrecognized keys are warned about and ignored, deprecated
//! keys warn.

use std::collections::HashMap;

use log::warn;

use super::ProfileError;

/// Typed value as stored while parsing; the binder narrows these further.
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileValue {
    U32(u32),
    U64(u64),
    Bool(bool),
    Str(String),
    Double(f64),
    Range(f64, f64),
    SizeWeight(u64, u32),
}

#[derive(Clone, Copy, Debug)]
enum ValueKind {
    U32,
    U64,
    Bool,
    Str,
    Double,
    /// Space form: `key <min> <max>` (doubles).
    Range,
    /// Space form: `key <size> <weight>`.
    SizeWeight,
    Deprecated,
}

/// Parsed options of one section. Repeated single-valued keys keep the last
/// occurrence; list-valued keys (`size_weight`, `bucket`, `ignore`)
/// accumulate.
#[derive(Clone, Debug, Default)]
pub struct RawOptions {
    map: HashMap<String, Vec<ProfileValue>>,
}

impl RawOptions {
    fn push(&mut self, key: &str, value: ProfileValue) {
        self.map.entry(key.to_owned()).or_default().push(value);
    }

    fn last(&self, key: &str) -> Option<&ProfileValue> {
        self.map.get(key).and_then(|v| v.last())
    }

    pub fn u32(&self, key: &str) -> Option<u32> {
        match self.last(key)? {
            ProfileValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.last(key)? {
            ProfileValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        match self.last(key)? {
            ProfileValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        match self.last(key)? {
            ProfileValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn double(&self, key: &str) -> Option<f64> {
        match self.last(key)? {
            ProfileValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// All stored occurrences of a list-valued key, oldest first.
    pub fn list(&self, key: &str) -> &[ProfileValue] {
        self.map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone, Debug, Default)]
pub struct RawTg {
    pub options: RawOptions,
    pub stats: Option<RawOptions>,
    pub line: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RawFs {
    pub options: RawOptions,
    pub aging: Option<RawTg>,
    pub line: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RawProfile {
    pub global: RawOptions,
    pub filesystems: Vec<RawFs>,
    pub groups: Vec<RawTg>,
}

const GLOBAL_OPTIONS: &[(&str, ValueKind)] = &[
    ("num_filesystems", ValueKind::Deprecated),
    ("num_threadgroups", ValueKind::Deprecated),
    ("verbose", ValueKind::Bool),
    ("time", ValueKind::U32),
    ("directio", ValueKind::Bool),
    ("bufferio", ValueKind::Bool),
    ("alignio", ValueKind::Bool),
    ("callout", ValueKind::Str),
];

const FS_OPTIONS: &[(&str, ValueKind)] = &[
    ("location", ValueKind::Str),
    ("num_files", ValueKind::U32),
    ("num_dirs", ValueKind::U32),
    ("reuse", ValueKind::Bool),
    ("min_filesize", ValueKind::U64),
    ("max_filesize", ValueKind::U64),
    ("create_blocksize", ValueKind::U32),
    ("age_blocksize", ValueKind::U32),
    ("desired_util", ValueKind::Double),
    ("agefs", ValueKind::Bool),
    ("size_weight", ValueKind::SizeWeight),
    ("init_util", ValueKind::Double),
    ("init_size", ValueKind::U64),
];

const TG_OPTIONS: &[(&str, ValueKind)] = &[
    ("bindfs", ValueKind::U32),
    ("num_threads", ValueKind::U32),
    ("read_weight", ValueKind::U32),
    ("readall_weight", ValueKind::U32),
    ("write_weight", ValueKind::U32),
    ("create_weight", ValueKind::U32),
    ("append_weight", ValueKind::U32),
    ("delete_weight", ValueKind::U32),
    ("meta_weight", ValueKind::U32),
    ("createdir_weight", ValueKind::U32),
    ("stat_weight", ValueKind::U32),
    ("writeall_weight", ValueKind::U32),
    ("writeall_fsync_weight", ValueKind::U32),
    ("open_close_weight", ValueKind::U32),
    ("read_random", ValueKind::Bool),
    ("read_skip", ValueKind::Bool),
    ("read_size", ValueKind::U64),
    ("read_blocksize", ValueKind::U32),
    ("read_skipsize", ValueKind::U32),
    ("write_random", ValueKind::Bool),
    ("write_size", ValueKind::U64),
    ("write_blocksize", ValueKind::U32),
    ("fsync_file", ValueKind::Bool),
    ("op_delay", ValueKind::U32),
];

const STATS_OPTIONS: &[(&str, ValueKind)] = &[
    ("enable_stats", ValueKind::Bool),
    ("ignore", ValueKind::Str),
    ("bucket", ValueKind::Range),
];

/// Content lines with their 1-based numbers; blanks and comments skipped.
struct Lines<'a> {
    iter: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.lines().enumerate(),
        }
    }

    fn next_content(&mut self) -> Option<(usize, &'a str)> {
        for (i, line) in self.iter.by_ref() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Some((i + 1, line));
        }
        None
    }
}

fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn parse_err(line: usize, msg: impl Into<String>) -> ProfileError {
    ProfileError::Parse {
        line,
        msg: msg.into(),
    }
}

fn parse_u64(value: &str, line: usize, key: &str) -> Result<u64, ProfileError> {
    value
        .parse()
        .map_err(|_| parse_err(line, format!("`{key}` expects an unsigned integer, got `{value}`")))
}

fn parse_double(value: &str, line: usize, key: &str) -> Result<f64, ProfileError> {
    value
        .parse()
        .map_err(|_| parse_err(line, format!("`{key}` expects a number, got `{value}`")))
}

/// Match one line against a section's option table and store the value.
/// Unknown keys warn and are skipped, like the original tool.
fn set_option(
    line: &str,
    lineno: usize,
    table: &[(&str, ValueKind)],
    opts: &mut RawOptions,
) -> Result<(), ProfileError> {
    let (key, value) = match line.split_once('=') {
        Some((k, v)) => (k.trim(), v.trim()),
        None => match line.split_once(char::is_whitespace) {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (line, ""),
        },
    };

    let Some((_, kind)) = table.iter().find(|(name, _)| *name == key) else {
        warn!("profile line {}: unrecognized option `{}`", lineno, key);
        return Ok(());
    };

    let parsed = match kind {
        ValueKind::U32 => {
            let v = parse_u64(value, lineno, key)?;
            let v = u32::try_from(v)
                .map_err(|_| parse_err(lineno, format!("`{key}` value {v} exceeds 32 bits")))?;
            ProfileValue::U32(v)
        }
        ValueKind::U64 => ProfileValue::U64(parse_u64(value, lineno, key)?),
        ValueKind::Bool => match value {
            "0" => ProfileValue::Bool(false),
            "1" => ProfileValue::Bool(true),
            other => {
                return Err(parse_err(
                    lineno,
                    format!("`{key}` expects 0 or 1, got `{other}`"),
                ));
            }
        },
        ValueKind::Str => ProfileValue::Str(value.to_owned()),
        ValueKind::Double => ProfileValue::Double(parse_double(value, lineno, key)?),
        ValueKind::Range => {
            let mut parts = value.split_whitespace();
            let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(parse_err(lineno, format!("`{key}` expects two numbers")));
            };
            ProfileValue::Range(
                parse_double(a, lineno, key)?,
                parse_double(b, lineno, key)?,
            )
        }
        ValueKind::SizeWeight => {
            let mut parts = value.split_whitespace();
            let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(parse_err(
                    lineno,
                    format!("`{key}` expects `<size> <weight>`"),
                ));
            };
            let size = parse_u64(a, lineno, key)?;
            let weight = u32::try_from(parse_u64(b, lineno, key)?)
                .map_err(|_| parse_err(lineno, format!("`{key}` weight exceeds 32 bits")))?;
            ProfileValue::SizeWeight(size, weight)
        }
        ValueKind::Deprecated => {
            warn!("profile line {}: option `{}` is deprecated and ignored", lineno, key);
            return Ok(());
        }
    };
    opts.push(key, parsed);
    Ok(())
}

fn parse_stats(lines: &mut Lines<'_>, open_line: usize) -> Result<RawOptions, ProfileError> {
    let mut opts = RawOptions::default();
    while let Some((lineno, line)) = lines.next_content() {
        match section_header(line) {
            Some("end") => return Ok(opts),
            Some(other) => {
                return Err(parse_err(
                    lineno,
                    format!("section `[{other}]` cannot nest inside [stats]"),
                ));
            }
            None => set_option(line, lineno, STATS_OPTIONS, &mut opts)?,
        }
    }
    Err(parse_err(open_line, "[stats] section is missing its [end]"))
}

fn parse_tg(lines: &mut Lines<'_>, open_line: usize) -> Result<RawTg, ProfileError> {
    let mut tg = RawTg {
        line: open_line,
        ..Default::default()
    };
    while let Some((lineno, line)) = lines.next_content() {
        match section_header(line) {
            Some("end") => return Ok(tg),
            Some("stats") => tg.stats = Some(parse_stats(lines, lineno)?),
            Some(other) => {
                return Err(parse_err(
                    lineno,
                    format!("section `[{other}]` cannot nest inside [threadgroup]"),
                ));
            }
            None => set_option(line, lineno, TG_OPTIONS, &mut tg.options)?,
        }
    }
    Err(parse_err(open_line, "[threadgroup] section is missing its [end]"))
}

fn parse_fs(lines: &mut Lines<'_>, open_line: usize) -> Result<RawFs, ProfileError> {
    let mut fs = RawFs {
        line: open_line,
        ..Default::default()
    };
    while let Some((lineno, line)) = lines.next_content() {
        match section_header(line) {
            Some("end") => return Ok(fs),
            Some("threadgroup") => fs.aging = Some(parse_tg(lines, lineno)?),
            Some(other) => {
                return Err(parse_err(
                    lineno,
                    format!("section `[{other}]` cannot nest inside [filesystem]"),
                ));
            }
            None => set_option(line, lineno, FS_OPTIONS, &mut fs.options)?,
        }
    }
    Err(parse_err(open_line, "[filesystem] section is missing its [end]"))
}

/// Parse the sectioned dialect into its raw form.
pub fn parse(text: &str) -> Result<RawProfile, ProfileError> {
    let mut profile = RawProfile::default();
    let mut lines = Lines::new(text);
    while let Some((lineno, line)) = lines.next_content() {
        match section_header(line) {
            Some("filesystem") => profile.filesystems.push(parse_fs(&mut lines, lineno)?),
            Some("threadgroup") => profile.groups.push(parse_tg(&mut lines, lineno)?),
            Some("end") => return Err(parse_err(lineno, "[end] without an open section")),
            Some(other) => return Err(parse_err(lineno, format!("unknown section `[{other}]`"))),
            None => set_option(line, lineno, GLOBAL_OPTIONS, &mut profile.global)?,
        }
    }
    Ok(profile)
}
