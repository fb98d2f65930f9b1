//! Shared utilities: logging, tuning constants, aligned I/O buffers,
//! timed syscall wrappers, CPU accounting.

pub mod buffer;
pub mod fh;
pub mod logger;
pub mod rusage;
pub mod tuning;

pub use buffer::AlignedBuf;
pub use logger::setup_logging;
pub use rusage::CpuSnapshot;
pub use tuning::Defaults;
