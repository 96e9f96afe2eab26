//! Run workloads concurrently against a store and print metrics.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::join_all;
use kvbench_store::{Store, StoreConfig, StoreError};
use kvbench_workload::{Action, OperationKind, OperationWeights, Workload};

use crate::config::{Config, StoreKind, WorkloadConfig};
use crate::report::{self, Metrics, Outcome};

/// Records handed to `bulk_load` per call during the preload phase.
const LOAD_BATCH: usize = 512;

/// Runs every workload in `config` against the configured engine, printing a
/// per-workload report and a totals section.
pub async fn run(config: Config) -> Result<()> {
    let store = match &config.store {
        StoreKind::Memory => kvbench_store::open(StoreConfig::Memory).await?,
        StoreKind::FileSystem { path } => {
            kvbench_store::open(StoreConfig::FileSystem {
                path: path.as_path(),
            })
            .await?
        }
    };
    tracing::info!(engine = store.name(), "opened store");

    let mut totals = Metrics::default();
    let mut total_elapsed = Duration::ZERO;
    for workload_config in &config.workloads {
        let (metrics, elapsed) =
            run_workload(Arc::clone(&store), workload_config, config.seed).await?;
        report::print_workload(
            &workload_config.name,
            workload_config.concurrency,
            &metrics,
            elapsed,
        );
        totals.merge(&metrics);
        total_elapsed += elapsed;
    }

    store.flush().await?;
    let disk_bytes = store.size_on_disk().await?;
    report::print_totals(&totals, total_elapsed, disk_bytes);

    if totals.mismatches() > 0 || totals.failures() > 0 {
        tracing::warn!(
            mismatches = totals.mismatches(),
            failures = totals.failures(),
            "run finished with errors"
        );
    }
    Ok(())
}

/// Preloads one workload's records, then drives its operation mix to
/// completion, one worker task per shard.
async fn run_workload(
    store: Arc<dyn Store>,
    config: &WorkloadConfig,
    seed: Option<u64>,
) -> Result<(Metrics, Duration)> {
    let shards = build_shards(config, seed);

    let records: u64 = shards.iter().map(Workload::records).sum();
    tracing::info!(workload = %config.name, records, "preloading");
    let preload_started = Instant::now();
    let loaders: Vec<_> = shards
        .into_iter()
        .map(|mut shard| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                while let Some(batch) = shard.next_load_batch(LOAD_BATCH) {
                    let pairs = batch
                        .into_iter()
                        .map(|(key, payload)| (key, payload.bytes()))
                        .collect();
                    store.bulk_load(pairs).await?;
                }
                Ok::<_, StoreError>(shard)
            })
        })
        .collect();
    let mut shards = Vec::with_capacity(loaders.len());
    for loader in join_all(loaders).await {
        shards.push(loader.expect("loader task should not panic")?);
    }
    tracing::info!(
        workload = %config.name,
        elapsed = ?preload_started.elapsed(),
        "preload finished"
    );

    let metrics = Arc::new(Mutex::new(Metrics::default()));
    let deadline = config.time_limit.map(|limit| Instant::now() + limit);
    let started = Instant::now();
    let workers: Vec<_> = shards
        .into_iter()
        .map(|shard| {
            let store = Arc::clone(&store);
            let metrics = Arc::clone(&metrics);
            tokio::spawn(run_worker(store, shard, metrics, deadline))
        })
        .collect();
    for worker in join_all(workers).await {
        worker.expect("worker task should not panic");
    }
    let elapsed = started.elapsed();

    let metrics = Arc::try_unwrap(metrics)
        .map_err(|_| ())
        .expect("worker tasks have finished")
        .into_inner()
        .unwrap();
    Ok((metrics, elapsed))
}

fn build_shards(config: &WorkloadConfig, seed: Option<u64>) -> Vec<Workload> {
    let weights = &config.weights;
    let mut builder = Workload::builder(config.name.as_str())
        .records(config.records)
        .operations(config.operations)
        .concurrency(config.concurrency)
        .size_distribution(config.value_sizes.p50.0, config.value_sizes.p99.0)
        .key_distribution(config.key_distribution.into())
        .theta(config.theta)
        .weights(OperationWeights {
            upsert: weights.upserts,
            update: weights.updates,
            remove: weights.removes,
            read: weights.reads,
            read_modify_write: weights.read_modify_writes,
            batch_upsert: weights.batch_upserts,
            batch_read: weights.batch_reads,
            range_select: weights.range_selects,
            scan: weights.scans,
        })
        .batch_size(config.batch_size)
        .scan_length(config.scan_length);
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    builder.build_sharded()
}

async fn run_worker(
    store: Arc<dyn Store>,
    mut workload: Workload,
    metrics: Arc<Mutex<Metrics>>,
    deadline: Option<Instant>,
) {
    while let Some(action) = workload.next_action() {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        let kind = kind_of(&action);
        let started = Instant::now();
        let outcome = execute(&*store, action).await;
        let elapsed = started.elapsed();
        metrics.lock().unwrap().record(kind, &outcome, elapsed);
    }
}

fn kind_of(action: &Action) -> OperationKind {
    match action {
        Action::Upsert { .. } => OperationKind::Upsert,
        Action::Update { .. } => OperationKind::Update,
        Action::Remove { .. } => OperationKind::Remove,
        Action::Read { .. } => OperationKind::Read,
        Action::ReadModifyWrite { .. } => OperationKind::ReadModifyWrite,
        Action::BatchUpsert { .. } => OperationKind::BatchUpsert,
        Action::BatchRead { .. } => OperationKind::BatchRead,
        Action::RangeSelect { .. } => OperationKind::RangeSelect,
        Action::Scan { .. } => OperationKind::Scan,
    }
}

async fn execute(store: &dyn Store, action: Action) -> Outcome {
    let mut outcome = Outcome::default();
    match action {
        Action::Upsert { key, value } => {
            let bytes = value.bytes();
            let len = bytes.len() as u64;
            match store.upsert(key, bytes).await {
                Ok(()) => {
                    outcome.entries = 1;
                    outcome.bytes = len;
                }
                Err(err) => fail(&mut outcome, "upsert", err),
            }
        }
        Action::Update { key, value } => {
            let bytes = value.bytes();
            let len = bytes.len() as u64;
            match store.update(key, bytes).await {
                Ok(()) => {
                    outcome.entries = 1;
                    outcome.bytes = len;
                }
                Err(err) if err.is_not_found() => outcome.misses = 1,
                Err(err) => fail(&mut outcome, "update", err),
            }
        }
        Action::Remove { key } => match store.remove(key).await {
            Ok(()) => outcome.entries = 1,
            Err(err) if err.is_not_found() => outcome.misses = 1,
            Err(err) => fail(&mut outcome, "remove", err),
        },
        Action::Read { key, expected } => match store.read(key).await {
            Ok(value) => {
                outcome.bytes = value.len() as u64;
                if value == expected.bytes() {
                    outcome.entries = 1;
                } else {
                    tracing::warn!(key, "contents do not match what was written");
                    outcome.mismatches = 1;
                }
            }
            Err(err) if err.is_not_found() => outcome.misses = 1,
            Err(err) => fail(&mut outcome, "read", err),
        },
        Action::ReadModifyWrite { key, value } => match store.read(key).await {
            Ok(read) => {
                let bytes = value.bytes();
                let len = bytes.len() as u64;
                match store.upsert(key, bytes).await {
                    Ok(()) => {
                        outcome.entries = 2;
                        outcome.bytes = read.len() as u64 + len;
                    }
                    Err(err) => fail(&mut outcome, "read_modify_write", err),
                }
            }
            Err(err) if err.is_not_found() => outcome.misses = 1,
            Err(err) => fail(&mut outcome, "read_modify_write", err),
        },
        Action::BatchUpsert { pairs } => {
            let entries = pairs.len() as u64;
            let pairs: Vec<_> = pairs
                .into_iter()
                .map(|(key, payload)| (key, payload.bytes()))
                .collect();
            let bytes: u64 = pairs.iter().map(|(_, value)| value.len() as u64).sum();
            match store.batch_upsert(pairs).await {
                Ok(()) => {
                    outcome.entries = entries;
                    outcome.bytes = bytes;
                }
                Err(err) => fail(&mut outcome, "batch_upsert", err),
            }
        }
        Action::BatchRead { keys } => match store.batch_read(&keys).await {
            Ok(values) => {
                for value in values {
                    match value {
                        Some(value) => {
                            outcome.entries += 1;
                            outcome.bytes += value.len() as u64;
                        }
                        None => outcome.misses += 1,
                    }
                }
            }
            Err(err) => fail(&mut outcome, "batch_read", err),
        },
        Action::RangeSelect { start, len } => {
            match store.range_select(start, len as usize).await {
                Ok(values) => {
                    outcome.entries = values.len() as u64;
                    outcome.bytes = values.iter().map(|value| value.len() as u64).sum();
                }
                Err(err) => fail(&mut outcome, "range_select", err),
            }
        }
        Action::Scan { start, len } => match store.scan(start, len as usize).await {
            Ok(bytes) => outcome.bytes = bytes,
            Err(err) => fail(&mut outcome, "scan", err),
        },
    }
    outcome
}

fn fail(outcome: &mut Outcome, operation: &'static str, err: StoreError) {
    tracing::warn!(operation, error = %err, "store operation failed");
    outcome.failed = true;
}
