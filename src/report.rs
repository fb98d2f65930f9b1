//! Stdout report: configuration summaries, per-group transaction tables,
//! latency tables, CPU utilization. Everything user-facing that is not a
//! log line lives here.

use colored::Colorize;

use crate::engine::threadgroup::GroupOutput;
use crate::ops::{OP_TABLE, OpCode, OpResults};
use crate::profile::{Config, FsConfig, TgConfig};
use crate::stats::{StatsData, Syscall};
use crate::utils::CpuSnapshot;

/// Pre-run summary of what the profile asked for.
pub fn print_config(config: &Config) {
    for fs in &config.filesystems {
        print_fs_config(fs);
    }
    for (i, tg) in config.groups.iter().enumerate() {
        print_tg_config(tg, i);
    }
}

fn print_fs_config(fs: &FsConfig) {
    println!("FileSystem {}", fs.basedir.display());
    println!("==========");
    println!("\tnum_files        = {}", fs.num_files);
    println!("\tnum_dirs         = {}", fs.num_dirs);
    println!(
        "\tfile sizes       = {} to {} bytes",
        fs.min_filesize, fs.max_filesize
    );
    println!("\tcreate blocksize = {}", fs.create_blocksize);
    if fs.aging.is_some() {
        println!(
            "\taging            = on (target {:.1}% utilization, {} byte blocks)",
            fs.desired_util * 100.0,
            fs.age_blocksize
        );
    }
    if !fs.flags.is_empty() {
        println!("\tflags            = {:?}", fs.flags);
    }
    println!();
}

fn print_tg_config(tg: &TgConfig, index: usize) {
    println!("ThreadGroup {}", index);
    println!("================");
    println!("\tnum_threads      = {}", tg.num_threads);
    if let Some(bind) = tg.bindfs {
        println!("\tbindfs           = {}", bind);
    }
    for op in OpCode::ALL {
        let w = tg.weight(op);
        if w > 0 {
            println!("\t{:16} = {}", op.weight_key(), w);
        }
    }
    if tg.read_blocksize > 0 {
        println!("\tread_blocksize   = {}", tg.read_blocksize);
    }
    if tg.write_blocksize > 0 {
        println!("\twrite_blocksize  = {}", tg.write_blocksize);
    }
    if tg.op_delay > 0 {
        println!("\top_delay         = {} us", tg.op_delay);
    }
    if tg.stats.is_some() {
        println!("\tlatency stats    = on");
    }
    println!();
}

/// One group's (or the grand total's) transaction table.
pub fn print_results(results: &OpResults, runtime: f64) {
    let total_ops = results.total_ops();
    if total_ops == 0 {
        println!("no transactions completed");
        return;
    }
    let total_weight = results.total_weight().max(1);

    println!(
        "{:>20}   {:>12}   {:>10}   {:>8}   {:>11}",
        "Op Name", "Transactions", "Trans/sec", "% Trans", "% Op Weight"
    );
    println!(
        "{:>20}   {:>12}   {:>10}   {:>8}   {:>11}",
        "=======", "============", "=========", "=======", "==========="
    );
    for op in OpCode::ALL {
        let n = results.ops[op as usize];
        if n == 0 {
            continue;
        }
        let desc = &OP_TABLE[op as usize];
        if results.is_exclusive(op)
            && let Some(exl) = desc.exclusive_print
        {
            println!("{}", exl(results, runtime, op));
            continue;
        }
        let op_pcnt = 100.0 * n as f64 / total_ops as f64;
        let weight_pcnt = 100.0 * results.op_weight[op as usize] as f64 / total_weight as f64;
        println!(
            "{:>20} : {:>12}   {:>10.2}   {:>7.3}%   {:>10.3}%",
            desc.name,
            n,
            n as f64 / runtime,
            op_pcnt,
            weight_pcnt
        );
    }
    println!("-");
    println!("{:.2} Transactions per Second", total_ops as f64 / runtime);
}

/// Latency table: one row per recorded syscall, one trailing column per
/// configured bucket.
pub fn print_stats(sd: &StatsData) {
    println!();
    println!("{}", "Syscall latency (ms)".bold());
    print!(
        "{:>10} {:>10} {:>10} {:>10} {:>10}",
        "syscall", "count", "avg", "min", "max"
    );
    for bucket in sd.config.buckets() {
        print!(
            " {:>14}",
            format!(
                "[{},{})",
                bucket.min_us as f64 / 1000.0,
                bucket.max_us as f64 / 1000.0
            )
        );
    }
    println!();
    for sys in Syscall::ALL {
        if sd.config.is_ignored(sys) {
            continue;
        }
        let i = sys as usize;
        let count = sd.counts[i];
        let min_ms = if count == 0 { 0.0 } else { sd.mins[i] as f64 / 1000.0 };
        print!(
            "{:>10} {:>10} {:>10.3} {:>10.3} {:>10.3}",
            sys.name(),
            count,
            sd.mean_us(sys) / 1000.0,
            min_ms,
            sd.maxs[i] as f64 / 1000.0
        );
        for b in 0..sd.config.buckets().len() {
            print!(" {:>14}", sd.buckets[i][b]);
        }
        println!();
    }
}

fn print_cpu(cpu: &CpuSnapshot, runtime: f64) {
    println!();
    println!("{:.1}% User   Time", 100.0 * cpu.user_secs / runtime);
    println!("{:.1}% System Time", 100.0 * cpu.system_secs / runtime);
    println!(
        "{:.1}% CPU Utilization",
        100.0 * (cpu.user_secs + cpu.system_secs) / runtime
    );
}

/// The full post-run report: per-group tables, grand total when more than
/// one group ran, CPU accounting last.
pub fn print_report(outputs: &[GroupOutput], runtime: f64, cpu: &CpuSnapshot) {
    let mut total = OpResults::default();
    for (i, out) in outputs.iter().enumerate() {
        if outputs.len() == 1 {
            println!("{}", "Total Results".bold());
        } else {
            println!("{}", format!("ThreadGroup {}", i).bold());
        }
        println!("===============");
        print_results(&out.results, runtime);
        if let Some(stats) = &out.stats {
            print_stats(stats);
        }
        println!();
        total.add(&out.results);
    }
    if outputs.len() > 1 {
        println!("{}", "Total Results".bold());
        println!("===============");
        print_results(&total, runtime);
        println!();
    }
    print_cpu(cpu, runtime);
}
