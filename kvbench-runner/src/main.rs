//! This is a benchmark binary which drives key-value storage engines through
//! a uniform operation interface under configurable workloads.
//!
//! A run is described by a YAML file (see [`config`]) naming the engine and a
//! list of workloads. Each workload preloads a key space, then issues a
//! weighted mix of operations with keys drawn from a configurable
//! distribution, by default a Zipfian: a few keys are hot and the rest form
//! a long tail, the way real caches and databases are hit.
//!
//! Per-operation latencies are recorded in DDSketches and printed as a
//! console report at the end of the run.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;

use anyhow::{Context, bail};
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, WorkloadConfig};

mod config;
mod report;
mod runner;

/// Benchmark driver for key-value storage engines.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: PathBuf,

    /// comma-separated workload names to run, in order (default: all)
    #[argh(option)]
    pub filter: Option<String>,
}

/// Keeps the order the filter names the workloads in.
fn filter_workloads(workloads: Vec<WorkloadConfig>, filter: &str) -> Vec<WorkloadConfig> {
    let mut filtered = Vec::new();
    for token in filter.split(',').map(str::trim) {
        for workload in &workloads {
            if workload.name == token {
                filtered.push(workload.clone());
            }
        }
    }
    filtered
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Args = argh::from_env();

    let config_file = std::fs::File::open(&args.config).context("failed to open config file")?;
    let mut config: Config =
        serde_yaml::from_reader(config_file).context("failed to parse config YAML")?;

    if config.workloads.is_empty() {
        bail!("config lists no workloads");
    }
    if let Some(filter) = &args.filter {
        config.workloads = filter_workloads(config.workloads, filter);
        if config.workloads.is_empty() {
            bail!("filter {filter:?} matches no workload");
        }
    }

    runner::run(config).await
}
