//! Latency accounting and the console report.

use std::time::Duration;

use bytesize::ByteSize;
use kvbench_workload::OperationKind;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

/// What a single executed action amounted to.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    /// Records touched successfully.
    pub entries: u64,
    /// Value bytes moved.
    pub bytes: u64,
    /// Keys that turned out not to exist.
    pub misses: u64,
    /// Reads whose contents did not match what was written.
    pub mismatches: u64,
    /// Whether the engine failed the operation outright.
    pub failed: bool,
}

#[derive(Default)]
struct OpMetrics {
    timing: DDSketch,
    entries: u64,
    bytes: u64,
    misses: u64,
    mismatches: u64,
    failures: u64,
}

/// Per-operation-kind sketches and counters, shared by the workers of one
/// workload behind a mutex and merged into run totals afterwards.
#[derive(Default)]
pub(crate) struct Metrics {
    ops: [OpMetrics; 9],
}

impl Metrics {
    pub fn record(&mut self, kind: OperationKind, outcome: &Outcome, elapsed: Duration) {
        let metrics = &mut self.ops[kind as usize];
        metrics.timing.add(elapsed.as_secs_f64());
        metrics.entries += outcome.entries;
        metrics.bytes += outcome.bytes;
        metrics.misses += outcome.misses;
        metrics.mismatches += outcome.mismatches;
        metrics.failures += u64::from(outcome.failed);
    }

    pub fn merge(&mut self, other: &Metrics) {
        for (into, from) in self.ops.iter_mut().zip(&other.ops) {
            into.timing
                .merge(&from.timing)
                .expect("sketch parameters should match");
            into.entries += from.entries;
            into.bytes += from.bytes;
            into.misses += from.misses;
            into.mismatches += from.mismatches;
            into.failures += from.failures;
        }
    }

    /// Reads that came back with different bytes than were written.
    pub fn mismatches(&self) -> u64 {
        self.ops.iter().map(|metrics| metrics.mismatches).sum()
    }

    /// Operations the engine failed outright.
    pub fn failures(&self) -> u64 {
        self.ops.iter().map(|metrics| metrics.failures).sum()
    }
}

pub(crate) fn print_workload(name: &str, concurrency: usize, metrics: &Metrics, elapsed: Duration) {
    println!();
    println!(
        "{} {} (concurrency: {}, took {:.2?})",
        "## Workload".bold(),
        name.bold().blue(),
        concurrency.bold(),
        elapsed
    );
    print_metrics(metrics, elapsed);
}

pub(crate) fn print_totals(metrics: &Metrics, elapsed: Duration, disk_bytes: u64) {
    println!();
    println!("{}", "## TOTALS".bold());
    print_metrics(metrics, elapsed);
    println!("  on disk: {}", ByteSize::b(disk_bytes).bold());
}

fn print_metrics(metrics: &Metrics, elapsed: Duration) {
    for kind in OperationKind::ALL {
        let op = &metrics.ops[kind as usize];
        if op.timing.count() == 0 {
            continue;
        }
        print!(
            "{} ({} ops, {} entries",
            kind.label().to_uppercase().bold().green(),
            op.timing.count().bold(),
            op.entries
        );
        if op.misses > 0 {
            print!(", {} misses", op.misses);
        }
        if op.mismatches > 0 {
            print!(
                ", {}",
                format!("{} MISMATCHES", op.mismatches).bold().red()
            );
        }
        if op.failures > 0 {
            print!(", {}", format!("{} FAILURES", op.failures).bold().red());
        }
        println!(")");
        print_ops(&op.timing, elapsed);
        print_throughput(op.bytes, elapsed);
        print_percentiles(&op.timing, Duration::from_secs_f64);
    }
}

fn print_percentiles<T: std::fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let avg = map(sketch.sum().unwrap() / ops as f64);
    let p50 = map(sketch.quantile(0.5).unwrap().unwrap());
    let p90 = map(sketch.quantile(0.9).unwrap().unwrap());
    let p99 = map(sketch.quantile(0.99).unwrap().unwrap());
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / duration.as_secs_f64();
    print!("  {:.2} operations/s", ops_ps.bold());
}

fn print_throughput(total: u64, duration: Duration) {
    let throughput = (total as f64 / duration.as_secs_f64()) as u64;
    println!(", {:.2}/s", ByteSize::b(throughput).bold());
}
