//! The workload model: a weighted mix of store operations over a sharded key
//! space.
//!
//! A [`Workload`] is built once from a [`WorkloadBuilder`] and then split
//! into one shard per worker. Each shard owns an exclusive slice of the key
//! space together with its own RNG, key chooser and insert counter, so
//! workers never touch shared mutable generator state.
//!
//! Value payloads are deterministic per key: the payload for a key can be
//! recreated from the key alone, which lets the driver verify reads against
//! the bytes that were written without retaining them.

use std::thread::available_parallelism;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rand_distr::weighted::WeightedIndex;
use rand_distr::{Distribution, LogNormal};

use crate::generator::{Counter, Generator, UniformF64, UniformRange};
use crate::zipfian::{DEFAULT_THETA, ScrambledZipfian, Zipfian};

/// Upper bound on generated value sizes, to keep the log-normal tail from
/// producing pathological allocations.
const MAX_VALUE_LEN: usize = 4 * 1024 * 1024;

/// The kinds of operations a workload can issue.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationKind {
    /// Insert or overwrite a single record.
    Upsert,
    /// Overwrite a record that must already exist.
    Update,
    /// Delete a record.
    Remove,
    /// Read a single record.
    Read,
    /// Read a record, then write it back.
    ReadModifyWrite,
    /// Insert or overwrite a batch of records.
    BatchUpsert,
    /// Read a batch of records.
    BatchRead,
    /// Materialize an ordered slice of records.
    RangeSelect,
    /// Traverse an ordered slice of records without materializing it.
    Scan,
}

impl OperationKind {
    /// Every operation kind, in the order weights are assigned.
    pub const ALL: [OperationKind; 9] = [
        OperationKind::Upsert,
        OperationKind::Update,
        OperationKind::Remove,
        OperationKind::Read,
        OperationKind::ReadModifyWrite,
        OperationKind::BatchUpsert,
        OperationKind::BatchRead,
        OperationKind::RangeSelect,
        OperationKind::Scan,
    ];

    /// Label used in logs and the console report.
    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Upsert => "upsert",
            OperationKind::Update => "update",
            OperationKind::Remove => "remove",
            OperationKind::Read => "read",
            OperationKind::ReadModifyWrite => "read_modify_write",
            OperationKind::BatchUpsert => "batch_upsert",
            OperationKind::BatchRead => "batch_read",
            OperationKind::RangeSelect => "range_select",
            OperationKind::Scan => "scan",
        }
    }
}

/// Relative weights of the operation kinds. Only the ratios matter.
#[derive(Clone, Copy, Debug)]
pub struct OperationWeights {
    /// Weight of single-record upserts.
    pub upsert: u8,
    /// Weight of single-record updates.
    pub update: u8,
    /// Weight of removes.
    pub remove: u8,
    /// Weight of single-record reads.
    pub read: u8,
    /// Weight of read-modify-write round trips.
    pub read_modify_write: u8,
    /// Weight of batched upserts.
    pub batch_upsert: u8,
    /// Weight of batched reads.
    pub batch_read: u8,
    /// Weight of ordered range selects.
    pub range_select: u8,
    /// Weight of ordered scans.
    pub scan: u8,
}

impl OperationWeights {
    fn as_array(&self) -> [u8; 9] {
        [
            self.upsert,
            self.update,
            self.remove,
            self.read,
            self.read_modify_write,
            self.batch_upsert,
            self.batch_read,
            self.range_select,
            self.scan,
        ]
    }
}

impl Default for OperationWeights {
    /// A read-heavy mix: 95% reads, 5% upserts.
    fn default() -> Self {
        Self {
            upsert: 5,
            update: 0,
            remove: 0,
            read: 95,
            read_modify_write: 0,
            batch_upsert: 0,
            batch_read: 0,
            range_select: 0,
            scan: 0,
        }
    }
}

/// How keys are chosen for operations that address existing records.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum KeyDistribution {
    /// Every populated key is equally likely.
    Uniform,
    /// Skewed towards a stable set of hot keys at the start of the space.
    #[default]
    Zipfian,
    /// Zipfian popularity, with the hot keys scattered across the space.
    Scrambled,
    /// Skewed towards the most recently inserted keys.
    Latest,
}

/// Randomized record contents, reproducible from the stored seed.
///
/// Cloning is cheap; the bytes are only materialized by [`bytes`](Self::bytes).
#[derive(Clone, Debug)]
pub struct Payload {
    seed: u64,
    len: usize,
}

impl Payload {
    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Materializes the payload bytes.
    pub fn bytes(&self) -> Bytes {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut buf = vec![0u8; self.len];
        rng.fill_bytes(&mut buf);
        buf.into()
    }
}

/// One concrete operation drawn from the workload.
#[derive(Debug)]
pub enum Action {
    /// Insert or overwrite `key` with `value`.
    Upsert {
        /// The key to write.
        key: u64,
        /// The value to write.
        value: Payload,
    },
    /// Overwrite `key`, which is expected to exist.
    Update {
        /// The key to overwrite.
        key: u64,
        /// The value to write.
        value: Payload,
    },
    /// Delete `key`.
    Remove {
        /// The key to delete.
        key: u64,
    },
    /// Read `key` and verify the result against `expected`.
    Read {
        /// The key to read.
        key: u64,
        /// The payload the key was written with.
        expected: Payload,
    },
    /// Read `key`, then write `value` back.
    ReadModifyWrite {
        /// The key to read and rewrite.
        key: u64,
        /// The value to write back.
        value: Payload,
    },
    /// Insert or overwrite a batch of records.
    BatchUpsert {
        /// Key/value pairs to write.
        pairs: Vec<(u64, Payload)>,
    },
    /// Read a batch of records.
    BatchRead {
        /// Keys to read.
        keys: Vec<u64>,
    },
    /// Materialize up to `len` ordered records starting at `start`.
    RangeSelect {
        /// First key of the range.
        start: u64,
        /// Number of records to select.
        len: u64,
    },
    /// Traverse up to `len` ordered records starting at `start`.
    Scan {
        /// First key of the traversal.
        start: u64,
        /// Number of records to traverse.
        len: u64,
    },
}

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    name: String,
    seed: u64,
    records: u64,
    operations: u64,
    concurrency: usize,
    start_key: u64,

    p50_size: u64,
    p99_size: u64,

    key_distribution: KeyDistribution,
    theta: f64,
    weights: OperationWeights,
    batch_size: usize,
    scan_length: u64,
}

impl WorkloadBuilder {
    /// A reproducible seed for every random choice the workload makes.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The number of records preloaded before the run phase.
    pub fn records(mut self, records: u64) -> Self {
        self.records = records;
        self
    }

    /// The total operation budget of the run phase.
    pub fn operations(mut self, operations: u64) -> Self {
        self.operations = operations;
        self
    }

    /// The number of worker shards [`build_sharded`](Self::build_sharded)
    /// produces.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The first key of the workload's key space.
    pub fn start_key(mut self, start_key: u64) -> Self {
        self.start_key = start_key;
        self
    }

    /// Distribution of value sizes, given as the p50 and p99 of a log-normal.
    pub fn size_distribution(mut self, p50: u64, p99: u64) -> Self {
        self.p50_size = p50;
        self.p99_size = p99;
        self
    }

    /// How keys are chosen for operations on existing records.
    pub fn key_distribution(mut self, distribution: KeyDistribution) -> Self {
        self.key_distribution = distribution;
        self
    }

    /// The skew parameter of the Zipfian-based key distributions.
    pub fn theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    /// The ratio between the operation kinds.
    pub fn weights(mut self, weights: OperationWeights) -> Self {
        self.weights = weights;
        self
    }

    /// The number of records touched by batched operations.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The number of records touched by range selects and scans.
    pub fn scan_length(mut self, scan_length: u64) -> Self {
        self.scan_length = scan_length.max(1);
        self
    }

    /// Creates a single workload covering the whole key space.
    pub fn build(self) -> Workload {
        self.build_shard(0, 1)
    }

    /// Creates one workload shard per configured worker. Shards own disjoint
    /// slices of the key space and divide the operation budget between them.
    pub fn build_sharded(self) -> Vec<Workload> {
        let shards = self.concurrency;
        (0..shards).map(|index| self.build_shard(index, shards)).collect()
    }

    fn build_shard(&self, index: usize, shards: usize) -> Workload {
        let records = self.records / shards as u64;
        assert!(
            records >= 2,
            "workload {:?} needs at least two records per worker",
            self.name
        );
        let operations = (self.operations / shards as u64).max(1);
        let start_key = self.start_key + index as u64 * records;
        // Fresh inserts go above every shard's preload range, in per-shard
        // bands sized to the most keys a shard can hand out, so concurrent
        // workers never collide on a key.
        let insert_band = operations.saturating_mul(self.batch_size as u64);
        let insert_base = self.start_key + self.records + index as u64 * insert_band;
        // Spread the shard seeds across the space so neighboring shards do
        // not replay each other's sequences.
        let seed = self
            .seed
            .wrapping_add((u64::MAX / shards as u64).wrapping_mul(index as u64));
        let mut rng = SmallRng::seed_from_u64(seed);
        let chooser_seed = rng.next_u64();
        let value_seed = rng.next_u64();

        // Inspired by <https://stats.stackexchange.com/a/649432>
        let mu = (self.p50_size.max(1) as f64).ln();
        let sigma = ((self.p99_size.max(1) as f64).ln() - mu) / 2.3263;
        let size_distribution =
            LogNormal::new(mu, sigma).expect("value size percentiles should be valid");

        let keys = match self.key_distribution {
            KeyDistribution::Uniform => {
                KeyChooser::Uniform(UniformRange::new(0, records - 1, chooser_seed))
            }
            KeyDistribution::Zipfian => KeyChooser::Zipfian(Zipfian::with_source(
                UniformF64::from_seed(chooser_seed),
                0,
                records - 1,
                self.theta,
            )),
            KeyDistribution::Scrambled => KeyChooser::Scrambled(ScrambledZipfian::with_source(
                UniformF64::from_seed(chooser_seed),
                0,
                records - 1,
                self.theta,
            )),
            KeyDistribution::Latest => KeyChooser::Latest(Zipfian::with_source(
                UniformF64::from_seed(chooser_seed),
                0,
                records - 1,
                self.theta,
            )),
        };

        Workload {
            name: self.name.clone(),
            operations,
            records,
            start_key,
            insert_base,
            populated: records,
            loaded: 0,
            rng,
            op_distribution: WeightedIndex::new(self.weights.as_array())
                .expect("at least one operation weight must be nonzero"),
            size_distribution,
            keys,
            insert_offsets: Counter::new(records),
            value_seed,
            batch_size: self.batch_size,
            scan_length: self.scan_length,
        }
    }
}

/// How keys are drawn for operations that address existing records. All
/// variants choose an offset below the currently populated count, so the
/// Zipfian samplers grow their normalization state as inserts land.
#[derive(Clone, Debug)]
enum KeyChooser {
    Uniform(UniformRange),
    Zipfian(Zipfian),
    Scrambled(ScrambledZipfian),
    Latest(Zipfian),
}

impl KeyChooser {
    fn choose(&mut self, populated: u64) -> u64 {
        match self {
            KeyChooser::Uniform(uniform) => uniform.generate_with(populated),
            KeyChooser::Zipfian(zipfian) => zipfian.generate_with(populated),
            KeyChooser::Scrambled(scrambled) => scrambled.generate_with(populated),
            // Rank 0 is the hottest, so mirror it onto the newest key.
            KeyChooser::Latest(zipfian) => populated - 1 - zipfian.generate_with(populated),
        }
    }
}

/// One worker's slice of a benchmark workload.
#[derive(Debug)]
pub struct Workload {
    name: String,
    operations: u64,
    records: u64,
    start_key: u64,
    insert_base: u64,
    /// Keys assigned so far: the preload range plus every insert handed out.
    populated: u64,
    loaded: u64,

    rng: SmallRng,
    op_distribution: WeightedIndex<u8>,
    size_distribution: LogNormal<f64>,
    keys: KeyChooser,
    /// Offsets (not keys) of fresh inserts; mapped through `key_at`.
    insert_offsets: Counter,
    value_seed: u64,

    batch_size: usize,
    scan_length: u64,
}

impl Workload {
    /// Constructs a new workload builder with the given name.
    pub fn builder(name: impl Into<String>) -> WorkloadBuilder {
        WorkloadBuilder {
            name: name.into(),
            seed: rand::random(),
            records: 10_000,
            operations: 100_000,
            concurrency: available_parallelism().map(|n| n.get()).unwrap_or(1),
            start_key: 0,

            p50_size: 256,
            p99_size: 4 * 1024,

            key_distribution: KeyDistribution::default(),
            theta: DEFAULT_THETA,
            weights: OperationWeights::default(),
            batch_size: 128,
            scan_length: 100,
        }
    }

    /// Name of the workload for identification in logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of records this shard preloads.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// The remaining operation budget of this shard.
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// Yields the next chunk of records for the preload phase, at most
    /// `max` at a time, or `None` once the shard is fully loaded.
    pub fn next_load_batch(&mut self, max: usize) -> Option<Vec<(u64, Payload)>> {
        if self.loaded >= self.records {
            return None;
        }
        let n = (self.records - self.loaded).min(max as u64);
        let mut batch = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let key = self.start_key + self.loaded;
            self.loaded += 1;
            batch.push((key, self.payload_for(key)));
        }
        Some(batch)
    }

    /// Draws the next operation, or `None` once the operation budget is
    /// spent. Expects the preload phase to have completed.
    pub fn next_action(&mut self) -> Option<Action> {
        if self.operations == 0 {
            return None;
        }
        self.operations -= 1;

        let kind = OperationKind::ALL[self.op_distribution.sample(&mut self.rng)];
        Some(match kind {
            OperationKind::Upsert => {
                let key = self.next_insert_key();
                Action::Upsert {
                    key,
                    value: self.payload_for(key),
                }
            }
            OperationKind::Update => {
                let key = self.choose_key();
                Action::Update {
                    key,
                    value: self.payload_for(key),
                }
            }
            OperationKind::Remove => Action::Remove {
                key: self.choose_key(),
            },
            OperationKind::Read => {
                let key = self.choose_key();
                Action::Read {
                    key,
                    expected: self.payload_for(key),
                }
            }
            OperationKind::ReadModifyWrite => {
                let key = self.choose_key();
                Action::ReadModifyWrite {
                    key,
                    value: self.payload_for(key),
                }
            }
            OperationKind::BatchUpsert => {
                let mut pairs = Vec::with_capacity(self.batch_size);
                for _ in 0..self.batch_size {
                    let key = self.next_insert_key();
                    pairs.push((key, self.payload_for(key)));
                }
                Action::BatchUpsert { pairs }
            }
            OperationKind::BatchRead => {
                let mut keys = Vec::with_capacity(self.batch_size);
                for _ in 0..self.batch_size {
                    keys.push(self.choose_key());
                }
                Action::BatchRead { keys }
            }
            OperationKind::RangeSelect => Action::RangeSelect {
                start: self.choose_key(),
                len: self.scan_length,
            },
            OperationKind::Scan => Action::Scan {
                start: self.choose_key(),
                len: self.scan_length,
            },
        })
    }

    /// The payload `key` was (or will be) written with. Reads recreate it to
    /// verify store contents.
    pub fn payload_for(&self, key: u64) -> Payload {
        let seed = self.value_seed ^ key.wrapping_mul(0x9E3779B97F4A7C15);
        let mut rng = SmallRng::seed_from_u64(seed);
        let len = self
            .size_distribution
            .sample(&mut rng)
            .clamp(1.0, MAX_VALUE_LEN as f64) as usize;
        Payload { seed, len }
    }

    /// Maps a logical offset in `[0, populated)` to a concrete key: the
    /// preload range first, then this shard's insert band.
    fn key_at(&self, offset: u64) -> u64 {
        if offset < self.records {
            self.start_key + offset
        } else {
            self.insert_base + (offset - self.records)
        }
    }

    fn choose_key(&mut self) -> u64 {
        let offset = self.keys.choose(self.populated);
        self.key_at(offset)
    }

    fn next_insert_key(&mut self) -> u64 {
        let offset = self.insert_offsets.generate();
        self.populated += 1;
        self.key_at(offset)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn read_only(records: u64) -> WorkloadBuilder {
        Workload::builder("test")
            .seed(42)
            .records(records)
            .operations(1_000)
            .weights(OperationWeights {
                upsert: 0,
                read: 100,
                ..OperationWeights::default()
            })
    }

    #[test]
    fn read_only_workload_yields_reads_in_range() {
        for distribution in [
            KeyDistribution::Uniform,
            KeyDistribution::Zipfian,
            KeyDistribution::Scrambled,
            KeyDistribution::Latest,
        ] {
            let mut workload = read_only(1_000).key_distribution(distribution).build();
            let mut drawn = 0;
            while let Some(action) = workload.next_action() {
                match action {
                    Action::Read { key, .. } => {
                        assert!(key < 1_000, "{distribution:?} escaped the key space: {key}")
                    }
                    other => panic!("unexpected action {other:?}"),
                }
                drawn += 1;
            }
            assert_eq!(drawn, 1_000);
        }
    }

    #[test]
    fn reads_verify_against_loaded_payloads() {
        let mut workload = read_only(100).build();
        let mut written = HashMap::new();
        while let Some(batch) = workload.next_load_batch(32) {
            for (key, payload) in batch {
                written.insert(key, payload.bytes());
            }
        }
        assert_eq!(written.len(), 100);

        for _ in 0..200 {
            let Some(Action::Read { key, expected }) = workload.next_action() else {
                panic!("expected a read");
            };
            assert_eq!(written[&key], expected.bytes());
        }
    }

    #[test]
    fn load_batches_cover_the_shard_exactly_once() {
        let mut workload = read_only(100).build();
        let mut keys = Vec::new();
        while let Some(batch) = workload.next_load_batch(7) {
            assert!(batch.len() <= 7);
            for (key, payload) in batch {
                assert!(!payload.is_empty());
                keys.push(key);
            }
        }
        assert_eq!(keys, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn shards_own_disjoint_key_slices() {
        let shards = read_only(100)
            .operations(10_000)
            .concurrency(4)
            .build_sharded();
        assert_eq!(shards.len(), 4);
        for (index, mut shard) in shards.into_iter().enumerate() {
            assert_eq!(shard.records(), 25);
            assert_eq!(shard.operations(), 2_500);
            let mut keys = Vec::new();
            while let Some(batch) = shard.next_load_batch(100) {
                keys.extend(batch.into_iter().map(|(key, _)| key));
            }
            let start = index as u64 * 25;
            assert_eq!(keys, (start..start + 25).collect::<Vec<_>>());
        }
    }

    #[test]
    fn inserts_hand_out_fresh_sequential_keys() {
        let mut workload = Workload::builder("test")
            .seed(1)
            .records(10)
            .operations(5)
            .weights(OperationWeights {
                upsert: 1,
                read: 0,
                ..OperationWeights::default()
            })
            .build();
        for expected in 10..15 {
            match workload.next_action() {
                Some(Action::Upsert { key, .. }) => assert_eq!(key, expected),
                other => panic!("unexpected action {other:?}"),
            }
        }
        assert!(workload.next_action().is_none());
        assert_eq!(workload.populated, 15);
    }

    #[test]
    fn sharded_inserts_never_collide() {
        let shards = Workload::builder("test")
            .seed(1)
            .records(100)
            .operations(10)
            .concurrency(2)
            .batch_size(1)
            .weights(OperationWeights {
                upsert: 1,
                read: 0,
                ..OperationWeights::default()
            })
            .build_sharded();
        let mut seen = std::collections::HashSet::new();
        for mut shard in shards {
            while let Some(Action::Upsert { key, .. }) = shard.next_action() {
                // Fresh keys stay clear of every shard's preload range.
                assert!(key >= 100);
                assert!(seen.insert(key), "key {key} handed out twice");
            }
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn batches_respect_the_configured_size() {
        let mut workload = Workload::builder("test")
            .seed(1)
            .records(10)
            .operations(4)
            .batch_size(3)
            .weights(OperationWeights {
                upsert: 0,
                read: 0,
                batch_upsert: 1,
                batch_read: 1,
                ..OperationWeights::default()
            })
            .build();
        while let Some(action) = workload.next_action() {
            match action {
                Action::BatchUpsert { pairs } => assert_eq!(pairs.len(), 3),
                Action::BatchRead { keys } => assert_eq!(keys.len(), 3),
                other => panic!("unexpected action {other:?}"),
            }
        }
    }

    #[test]
    fn value_sizes_follow_the_requested_median() {
        let workload = Workload::builder("test")
            .seed(7)
            .records(10)
            .size_distribution(256, 4 * 1024)
            .build();
        let mut sizes: Vec<_> = (0..1_000).map(|key| workload.payload_for(key).len()).collect();
        sizes.sort_unstable();
        let median = sizes[sizes.len() / 2];
        assert!(
            (128..=512).contains(&median),
            "median value size {median} is far from the requested p50"
        );
    }

    #[test]
    fn payloads_are_deterministic_per_key() {
        let a = read_only(100).build();
        let b = read_only(100).build();
        for key in 0..100 {
            assert_eq!(a.payload_for(key).bytes(), b.payload_for(key).bytes());
        }
    }
}
