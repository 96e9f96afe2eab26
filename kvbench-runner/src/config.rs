//! Configuration for the kvbench driver.
//!
//! A benchmark run is described by a YAML file selecting the engine and
//! listing the workloads to run against it:
//!
//! ```yaml
//! store:
//!   type: filesystem
//!   path: /tmp/kvbench
//!
//! seed: 42
//!
//! workloads:
//!   - name: read-heavy
//!     records: 100000
//!     operations: 1000000
//!     concurrency: 8
//!     value_sizes:
//!       p50: 256B
//!       p99: 4KiB
//!     key_distribution: zipfian
//!     weights:
//!       upserts: 5
//!       reads: 95
//! ```
//!
//! Omitting `seed` gives every run fresh randomness; setting it makes runs
//! reproducible. Weights left out default to zero, so a workload only issues
//! the operations it names.

use std::path::PathBuf;
use std::time::Duration;

use bytesize::ByteSize;
use kvbench_workload::KeyDistribution;
use serde::Deserialize;

/// Top-level configuration of a benchmark run.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The engine under test.
    pub store: StoreKind,
    /// Seed for reproducible runs; fresh randomness if omitted.
    #[serde(default)]
    pub seed: Option<u64>,
    /// The workloads to run, in order.
    pub workloads: Vec<WorkloadConfig>,
}

/// Engine selection.
///
/// The `type` field in YAML determines which variant is used.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreKind {
    /// The in-memory reference engine (type `"memory"`).
    Memory,
    /// The file-per-record reference engine (type `"filesystem"`).
    FileSystem {
        /// Directory the engine stores records under.
        path: PathBuf,
    },
}

/// One workload entry.
#[derive(Clone, Debug, Deserialize)]
pub struct WorkloadConfig {
    /// Name used in logs, reports and `--filter`.
    pub name: String,
    /// Records preloaded before the run phase.
    pub records: u64,
    /// Operation budget of the run phase.
    pub operations: u64,
    /// Worker count; defaults to the number of CPUs.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Value size distribution.
    pub value_sizes: ValueSizes,
    /// How keys are chosen for operations on existing records.
    #[serde(default)]
    pub key_distribution: KeyDistributionConfig,
    /// Skew of the Zipfian-based key distributions.
    #[serde(default = "default_theta")]
    pub theta: f64,
    /// The ratio between operation kinds.
    pub weights: Weights,
    /// Records touched by batched operations.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Records touched by range selects and scans.
    #[serde(default = "default_scan_length")]
    pub scan_length: u64,
    /// Optional wall-clock cap on the run phase.
    #[serde(default, with = "humantime_serde")]
    pub time_limit: Option<Duration>,
}

/// Distribution of value sizes, given as percentiles of a log-normal.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ValueSizes {
    /// Median value size.
    pub p50: ByteSize,
    /// 99th-percentile value size.
    pub p99: ByteSize,
}

/// Key distribution selection.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDistributionConfig {
    /// Every populated key is equally likely.
    Uniform,
    /// Skewed towards a stable set of hot keys.
    #[default]
    Zipfian,
    /// Zipfian popularity with the hot keys scattered across the space.
    Scrambled,
    /// Skewed towards the most recently inserted keys.
    Latest,
}

impl From<KeyDistributionConfig> for KeyDistribution {
    fn from(config: KeyDistributionConfig) -> Self {
        match config {
            KeyDistributionConfig::Uniform => KeyDistribution::Uniform,
            KeyDistributionConfig::Zipfian => KeyDistribution::Zipfian,
            KeyDistributionConfig::Scrambled => KeyDistribution::Scrambled,
            KeyDistributionConfig::Latest => KeyDistribution::Latest,
        }
    }
}

/// Relative weights of the operation kinds; omitted weights are zero.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Weights {
    /// Weight of single-record upserts.
    #[serde(default)]
    pub upserts: u8,
    /// Weight of single-record updates.
    #[serde(default)]
    pub updates: u8,
    /// Weight of removes.
    #[serde(default)]
    pub removes: u8,
    /// Weight of single-record reads.
    #[serde(default)]
    pub reads: u8,
    /// Weight of read-modify-write round trips.
    #[serde(default)]
    pub read_modify_writes: u8,
    /// Weight of batched upserts.
    #[serde(default)]
    pub batch_upserts: u8,
    /// Weight of batched reads.
    #[serde(default)]
    pub batch_reads: u8,
    /// Weight of ordered range selects.
    #[serde(default)]
    pub range_selects: u8,
    /// Weight of ordered scans.
    #[serde(default)]
    pub scans: u8,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_theta() -> f64 {
    kvbench_workload::DEFAULT_THETA
}

fn default_batch_size() -> usize {
    128
}

fn default_scan_length() -> u64 {
    100
}
