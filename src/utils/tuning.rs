//! Benchmark tuning constants and defaults in one place.

/// Defaults applied when the profile leaves a knob unset.
pub struct Defaults;

impl Defaults {
    /// Chunk size for writing out newly created files (bytes).
    pub const CREATE_BLOCKSIZE: u32 = 4096;
    /// Chunk size for files written by the aging workload (bytes).
    pub const AGE_BLOCKSIZE: u32 = 4096;
    /// Number of subdirectories per fileset when `num_dirs` is unset.
    pub const NUM_DIRS: u32 = 1;
}

/// Engine tuning knobs.
pub struct Tuning;

impl Tuning {
    /// Buffer alignment required for direct I/O.
    pub const IO_ALIGN: usize = 4096;
    /// How often a group coordinator re-checks the elapsed-time stop
    /// predicate (the predicate itself only resolves whole seconds).
    pub const COORDINATOR_POLL_MS: u64 = 250;
    /// Directories seeded under `metadir` at setup so a metaop-weighted
    /// group always has a rename target before the first createdir lands.
    pub const METADIR_SEED: u32 = 16;
    /// Longest permitted file name component in a fileset.
    pub const MAX_NAME_LEN: usize = 255;
}
