//! The operation table: one descriptor per benchmark transaction type.
//!
//! The table is immutable after program start. Each descriptor carries the
//! handler, the setup hooks that point the op at the right fileset for the
//! benchmark and aging phases, and an optional formatter used when a group
//! runs an exclusive mix of that op.

pub mod fileops;
pub mod metaops;

use crate::engine::worker::Worker;
use crate::fsys::{BenchFs, FilesetTarget};

pub const NUM_OPS: usize = 12;

/// The twelve transaction types, in weight-tie order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum OpCode {
    Read = 0,
    ReadAll,
    Write,
    Create,
    Append,
    Delete,
    Metaop,
    Createdir,
    Stat,
    WriteAll,
    WriteAllFsync,
    OpenClose,
}

impl OpCode {
    pub const ALL: [OpCode; NUM_OPS] = [
        OpCode::Read,
        OpCode::ReadAll,
        OpCode::Write,
        OpCode::Create,
        OpCode::Append,
        OpCode::Delete,
        OpCode::Metaop,
        OpCode::Createdir,
        OpCode::Stat,
        OpCode::WriteAll,
        OpCode::WriteAllFsync,
        OpCode::OpenClose,
    ];

    pub fn name(self) -> &'static str {
        OP_TABLE[self as usize].name
    }

    pub fn from_name(name: &str) -> Option<OpCode> {
        OpCode::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Profile key carrying this op's weight.
    pub fn weight_key(self) -> &'static str {
        match self {
            OpCode::Read => "read_weight",
            OpCode::ReadAll => "readall_weight",
            OpCode::Write => "write_weight",
            OpCode::Create => "create_weight",
            OpCode::Append => "append_weight",
            OpCode::Delete => "delete_weight",
            OpCode::Metaop => "meta_weight",
            OpCode::Createdir => "createdir_weight",
            OpCode::Stat => "stat_weight",
            OpCode::WriteAll => "writeall_weight",
            OpCode::WriteAllFsync => "writeall_fsync_weight",
            OpCode::OpenClose => "open_close_weight",
        }
    }

    pub fn needs_read_blocksize(self) -> bool {
        matches!(self, OpCode::Read | OpCode::ReadAll)
    }

    pub fn needs_write_blocksize(self) -> bool {
        matches!(
            self,
            OpCode::Write
                | OpCode::Create
                | OpCode::Append
                | OpCode::WriteAll
                | OpCode::WriteAllFsync
        )
    }
}

/// Per-thread (and merged) transaction tallies.
#[derive(Clone, Debug, Default)]
pub struct OpResults {
    pub ops: [u64; NUM_OPS],
    pub op_weight: [u64; NUM_OPS],
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl OpResults {
    pub fn add(&mut self, src: &OpResults) {
        self.read_bytes += src.read_bytes;
        self.write_bytes += src.write_bytes;
        for i in 0..NUM_OPS {
            self.ops[i] += src.ops[i];
            self.op_weight[i] += src.op_weight[i];
        }
    }

    pub fn total_ops(&self) -> u64 {
        self.ops.iter().sum()
    }

    pub fn total_weight(&self) -> u64 {
        self.op_weight.iter().sum()
    }

    /// True when `op` is the only op that ran (exclusive mix).
    pub fn is_exclusive(&self, op: OpCode) -> bool {
        self.ops[op as usize] != 0 && self.total_ops() == self.ops[op as usize]
    }
}

/// What one handler invocation did. `Skipped` means the op found nothing to
/// operate on (fileset transiently empty under create/delete churn) and must
/// not be counted as a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpOutcome {
    Done,
    Skipped,
}

pub type OpHandler = fn(&mut Worker<'_>, &BenchFs) -> OpOutcome;
pub type SetupHook = fn(&mut BenchFs, OpCode);
/// Formats the report lines for an exclusive mix of the op.
pub type ExclusivePrint = fn(&OpResults, f64, OpCode) -> String;

pub struct OpDescriptor {
    pub code: OpCode,
    pub name: &'static str,
    pub run: OpHandler,
    pub exclusive_print: Option<ExclusivePrint>,
    pub bench_setup: SetupHook,
    pub age_setup: Option<SetupHook>,
}

/// Benchmark setup: the op works against the data fileset.
fn fop_bench(fs: &mut BenchFs, op: OpCode) {
    fs.set_op_target(op, FilesetTarget::Data);
}

/// Aging setup: the op works against the fill fileset instead.
fn fop_age(fs: &mut BenchFs, op: OpCode) {
    fs.set_op_target(op, FilesetTarget::Fill);
}

/// Metaops setup: point the op at the directory registry and make sure the
/// metadir tree exists with a few seed entries.
fn metaops_metadir(fs: &mut BenchFs, op: OpCode) {
    fs.set_op_target(op, FilesetTarget::Meta);
    fs.ensure_metadir();
}

fn read_exl(results: &OpResults, runtime: f64, op: OpCode) -> String {
    bytes_exl("Read", results.read_bytes, results.ops[op as usize], runtime)
}

fn write_exl(results: &OpResults, runtime: f64, op: OpCode) -> String {
    bytes_exl("Write", results.write_bytes, results.ops[op as usize], runtime)
}

fn bytes_exl(kind: &str, bytes: u64, ops: u64, runtime: f64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    format!(
        "{kind}: {ops} transactions, {mb:.2} MB moved\n{kind} Throughput: {:.2} MB/sec",
        mb / runtime
    )
}

pub static OP_TABLE: [OpDescriptor; NUM_OPS] = [
    OpDescriptor {
        code: OpCode::Read,
        name: "read",
        run: fileops::op_read,
        exclusive_print: Some(read_exl),
        bench_setup: fop_bench,
        age_setup: None,
    },
    OpDescriptor {
        code: OpCode::ReadAll,
        name: "readall",
        run: fileops::op_readall,
        exclusive_print: Some(read_exl),
        bench_setup: fop_bench,
        age_setup: None,
    },
    OpDescriptor {
        code: OpCode::Write,
        name: "write",
        run: fileops::op_write,
        exclusive_print: Some(write_exl),
        bench_setup: fop_bench,
        age_setup: None,
    },
    OpDescriptor {
        code: OpCode::Create,
        name: "create",
        run: fileops::op_create,
        exclusive_print: Some(write_exl),
        bench_setup: fop_bench,
        age_setup: Some(fop_age),
    },
    OpDescriptor {
        code: OpCode::Append,
        name: "append",
        run: fileops::op_append,
        exclusive_print: Some(write_exl),
        bench_setup: fop_bench,
        age_setup: Some(fop_age),
    },
    OpDescriptor {
        code: OpCode::Delete,
        name: "delete",
        run: fileops::op_delete,
        exclusive_print: None,
        bench_setup: fop_bench,
        age_setup: Some(fop_age),
    },
    OpDescriptor {
        code: OpCode::Metaop,
        name: "metaop",
        run: metaops::op_metaop,
        exclusive_print: None,
        bench_setup: metaops_metadir,
        age_setup: None,
    },
    OpDescriptor {
        code: OpCode::Createdir,
        name: "createdir",
        run: metaops::op_createdir,
        exclusive_print: None,
        bench_setup: metaops_metadir,
        age_setup: None,
    },
    OpDescriptor {
        code: OpCode::Stat,
        name: "stat",
        run: fileops::op_stat,
        exclusive_print: None,
        bench_setup: fop_bench,
        age_setup: None,
    },
    OpDescriptor {
        code: OpCode::WriteAll,
        name: "writeall",
        run: fileops::op_writeall,
        exclusive_print: Some(write_exl),
        bench_setup: fop_bench,
        age_setup: None,
    },
    OpDescriptor {
        code: OpCode::WriteAllFsync,
        name: "writeall_fsync",
        run: fileops::op_writeall_fsync,
        exclusive_print: Some(write_exl),
        bench_setup: fop_bench,
        age_setup: None,
    },
    OpDescriptor {
        code: OpCode::OpenClose,
        name: "open_close",
        run: fileops::op_open_close,
        exclusive_print: None,
        bench_setup: fop_bench,
        age_setup: None,
    },
];
