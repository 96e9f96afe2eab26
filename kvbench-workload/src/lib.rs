//! Workload generation for key-value store benchmarks.
//!
//! The crate has two halves. The [`generator`] and [`zipfian`] modules contain
//! the value sources: a shared [`Generator`](generator::Generator) contract
//! ("produce one value per call, remember the last one") and its
//! implementations, most importantly the [`Zipfian`](zipfian::Zipfian)
//! sampler that produces the skewed key popularity (a few hot keys, a long
//! tail) that makes benchmark results meaningful.
//!
//! The [`workload`] module composes those sources into a [`Workload`]: a
//! weighted mix of store operations with keys drawn from a configurable
//! distribution and value payloads that are deterministic per key, so reads
//! can be verified against what was written.
//!
//! A workload can be split into per-worker shards. Every shard owns its own
//! generators and RNG state, so concurrent workers never contend on shared
//! mutable sampler state.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod generator;
pub mod workload;
pub mod zipfian;

pub use crate::generator::{Counter, Generator, UniformF64, UniformRange};
pub use crate::workload::{
    Action, KeyDistribution, OperationKind, OperationWeights, Payload, Workload, WorkloadBuilder,
};
pub use crate::zipfian::{DEFAULT_THETA, MAX_ITEMS, ScrambledZipfian, Zipfian};
