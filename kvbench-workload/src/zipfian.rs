//! Zipfian sampling over an integer key space.
//!
//! The sampler implements the order-statistics approximation from
//! "Quickly Generating Billion-Record Synthetic Databases", Gray et al.,
//! SIGMOD 1994. A uniform draw is mapped through a closed-form inverse CDF
//! for the tail, with the two most popular ranks handled exactly. The
//! normalization constant ζ(N, θ) is maintained incrementally: growing the
//! item count only sums the newly added range, so a stream of samples over a
//! non-decreasing key space pays the O(N) normalization cost once in total.
//!
//! The approximation is not a perfect Zipf distribution; for very large item
//! counts the tail is bent. It is meant to skew benchmark workloads, not to
//! do statistics.

use crate::generator::{Generator, UniformF64};

/// Default skew. Values closer to 1 produce a steeper popularity curve.
pub const DEFAULT_THETA: f64 = 0.99;

/// Largest supported item count. Above this the inverse-CDF approximation is
/// no longer numerically trustworthy, and indices would approach the integer
/// domain's edge.
pub const MAX_ITEMS: u64 = u64::MAX >> 24;

/// Generalized harmonic sum ζ over `(from, to]`: Σ i^(−θ) for
/// `i = from + 1 ..= to`, accumulated on top of `acc`.
///
/// Plain summation on purpose: the cost is proportional to the range summed,
/// which is what makes incremental extension cheap.
fn zeta(from: u64, to: u64, theta: f64, acc: f64) -> f64 {
    let mut sum = acc;
    for i in from + 1..=to {
        sum += 1.0 / (i as f64).powf(theta);
    }
    sum
}

/// Normalization-correction term for the inverse-CDF branch. A pure function
/// of the current count and the cached ζ values; recomputed together with
/// every ζ change so it can never go stale on its own.
fn eta(count: u64, theta: f64, zeta_2: f64, zeta_n: f64) -> f64 {
    (1.0 - (2.0 / count as f64).powf(1.0 - theta)) / (1.0 - zeta_2 / zeta_n)
}

fn validate(count: u64, theta: f64) {
    assert!(
        count >= 2 && count < MAX_ITEMS,
        "item count {count} outside supported range [2, {MAX_ITEMS})"
    );
    assert!(
        theta > 0.0 && theta < 1.0,
        "theta {theta} outside supported range (0, 1)"
    );
}

/// Zipfian generator over the inclusive key range `[base, base + count - 1]`,
/// where `base` is the most popular index, `base + 1` the second most
/// popular, and so on.
///
/// The sampler owns its uniform source and is single-threaded by design; use
/// one instance per concurrent worker instead of sharing one behind a lock.
#[derive(Clone, Debug)]
pub struct Zipfian<U = UniformF64> {
    uniform: U,
    base: u64,
    /// Current item count. ζ below is always the exact harmonic sum for this
    /// count.
    count: u64,
    theta: f64,
    alpha: f64,
    zeta_2: f64,
    zeta_n: f64,
    eta: f64,
    allow_count_decrease: bool,
    /// Harmonic terms summed by re-normalization since construction.
    terms_summed: u64,
    last: u64,
}

impl Zipfian<UniformF64> {
    /// Creates a sampler over `[0, items_count - 1]` with the default θ.
    pub fn new(items_count: u64, seed: u64) -> Self {
        Self::with_range(0, items_count.saturating_sub(1), seed)
    }

    /// Creates a sampler over `[min, max]` with the default θ.
    pub fn with_range(min: u64, max: u64, seed: u64) -> Self {
        Self::with_source(UniformF64::from_seed(seed), min, max, DEFAULT_THETA)
    }
}

impl<U: Generator<f64>> Zipfian<U> {
    /// Creates a sampler over `[min, max]` drawing uniform samples from
    /// `uniform`. Computes ζ(N, θ) with the full O(N) recurrence.
    pub fn with_source(uniform: U, min: u64, max: u64, theta: f64) -> Self {
        assert!(max >= min, "invalid range [{min}, {max}]");
        let count = max - min + 1;
        validate(count, theta);
        let zeta_n = zeta(0, count, theta, 0.0);
        Self::with_zeta(uniform, min, max, theta, zeta_n)
    }

    /// Creates a sampler from a precomputed ζ(N, θ), skipping the O(N)
    /// initial sum. The caller is responsible for `zeta_n` actually being the
    /// harmonic sum for `max - min + 1` items; a wrong value skews the
    /// distribution.
    pub fn with_zeta(uniform: U, min: u64, max: u64, theta: f64, zeta_n: f64) -> Self {
        assert!(max >= min, "invalid range [{min}, {max}]");
        let count = max - min + 1;
        validate(count, theta);
        let zeta_2 = zeta(0, 2, theta, 0.0);
        let mut zipfian = Self {
            uniform,
            base: min,
            count,
            theta,
            alpha: 1.0 / (1.0 - theta),
            zeta_2,
            zeta_n,
            eta: eta(count, theta, zeta_2, zeta_n),
            allow_count_decrease: false,
            terms_summed: 0,
            last: min,
        };
        // Populate `last` so the accessor is valid from the start.
        zipfian.generate();
        zipfian
    }

    /// Permits `generate_with` calls with a smaller count than previously
    /// seen. A shrink triggers a full ζ recomputation over the smaller range;
    /// without this opt-in a shrinking count panics. Stale ζ is never reused
    /// either way, since that would silently change the distribution.
    pub fn allow_count_decrease(mut self, allow: bool) -> Self {
        self.allow_count_decrease = allow;
        self
    }

    /// The current item count.
    pub fn items(&self) -> u64 {
        self.count
    }

    /// The skew parameter.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Samples an index from `[base, base + count - 1]`.
    ///
    /// `count` may exceed the count used so far; ζ is then extended by
    /// summing only the added range, and the sampler's stored count grows to
    /// match, so later no-arg [`generate`](Generator::generate) calls sample
    /// the grown key space.
    pub fn generate_with(&mut self, count: u64) -> u64 {
        assert!(
            count >= 2 && count < MAX_ITEMS,
            "item count {count} outside supported range [2, {MAX_ITEMS})"
        );
        if count != self.count {
            if count > self.count {
                self.zeta_n = zeta(self.count, count, self.theta, self.zeta_n);
                self.terms_summed += count - self.count;
            } else {
                assert!(
                    self.allow_count_decrease,
                    "item count shrank from {} to {count} on a sampler built without shrink support",
                    self.count
                );
                self.zeta_n = zeta(0, count, self.theta, 0.0);
                self.terms_summed += count;
            }
            self.count = count;
            self.eta = eta(count, self.theta, self.zeta_2, self.zeta_n);
        }

        let u = self.uniform.generate();
        let uz = u * self.zeta_n;

        self.last = if uz < 1.0 {
            self.base
        } else if uz < 1.0 + 0.5f64.powf(self.theta) {
            self.base + 1
        } else {
            let scale = (self.eta * u - self.eta + 1.0).powf(self.alpha);
            self.base + (count as f64 * scale) as u64
        };
        self.last
    }
}

impl<U: Generator<f64>> Generator<u64> for Zipfian<U> {
    fn generate(&mut self) -> u64 {
        let count = self.count;
        self.generate_with(count)
    }

    fn last(&self) -> u64 {
        self.last
    }
}

/// Zipfian generator whose ranks are scattered across the key space.
///
/// The popularity curve is the same as [`Zipfian`]'s, but the hot items are
/// spread out by hashing the rank, so engines see skew without contiguous
/// hot-key locality.
#[derive(Clone, Debug)]
pub struct ScrambledZipfian<U = UniformF64> {
    zipfian: Zipfian<U>,
    base: u64,
    last: u64,
}

impl ScrambledZipfian<UniformF64> {
    /// Creates a generator over `[0, items_count - 1]` with the default θ.
    pub fn new(items_count: u64, seed: u64) -> Self {
        Self::with_range(0, items_count.saturating_sub(1), seed)
    }

    /// Creates a generator over `[min, max]` with the default θ.
    pub fn with_range(min: u64, max: u64, seed: u64) -> Self {
        Self::with_source(UniformF64::from_seed(seed), min, max, DEFAULT_THETA)
    }
}

impl<U: Generator<f64>> ScrambledZipfian<U> {
    /// Creates a generator over `[min, max]` drawing uniform samples from
    /// `uniform`.
    pub fn with_source(uniform: U, min: u64, max: u64, theta: f64) -> Self {
        assert!(max >= min, "invalid range [{min}, {max}]");
        let count = max - min + 1;
        let mut scrambled = Self {
            zipfian: Zipfian::with_source(uniform, 0, count - 1, theta),
            base: min,
            last: min,
        };
        scrambled.last = scrambled.base + fnv1a64(scrambled.zipfian.last()) % count;
        scrambled
    }

    /// Samples an index from `[base, base + count - 1]`, growing the
    /// underlying rank space like [`Zipfian::generate_with`].
    pub fn generate_with(&mut self, count: u64) -> u64 {
        let rank = self.zipfian.generate_with(count);
        self.last = self.base + fnv1a64(rank) % count;
        self.last
    }
}

impl<U: Generator<f64>> Generator<u64> for ScrambledZipfian<U> {
    fn generate(&mut self) -> u64 {
        let count = self.zipfian.items();
        self.generate_with(count)
    }

    fn last(&self) -> u64 {
        self.last
    }
}

/// 64-bit FNV-1a over the little-endian bytes of `x`.
fn fnv1a64(x: u64) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for byte in x.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Uniform source replaying a fixed script, for golden-value tests that
    /// are independent of the underlying PRNG.
    struct Scripted {
        values: Vec<f64>,
        next: usize,
        last: f64,
    }

    impl Scripted {
        fn new(values: &[f64]) -> Self {
            Self {
                values: values.to_vec(),
                next: 0,
                last: 0.0,
            }
        }
    }

    impl Generator<f64> for Scripted {
        fn generate(&mut self) -> f64 {
            self.last = self.values[self.next];
            self.next += 1;
            self.last
        }

        fn last(&self) -> f64 {
            self.last
        }
    }

    #[test]
    fn samples_stay_in_range() {
        for theta in [0.2, 0.5, DEFAULT_THETA] {
            let uniform = UniformF64::from_seed(99);
            let mut zipfian = Zipfian::with_source(uniform, 5, 25, theta);
            for _ in 0..10_000 {
                let v = zipfian.generate();
                assert!((5..=25).contains(&v), "{v} escaped [5, 25]");
            }
        }
    }

    #[test]
    fn scripted_source_gives_reproducible_indices() {
        // The first script entry feeds the construction-time draw.
        let script = Scripted::new(&[0.5, 0.0, 0.2, 0.35, 0.511, 0.999999]);
        let mut zipfian = Zipfian::with_source(script, 0, 9, 0.99);
        assert_eq!(zipfian.last(), 1);

        // u = 0.0 makes uz exactly 0, which must map to the hottest index.
        assert_eq!(zipfian.generate(), 0);
        // uz ~= 0.59, still below 1.
        assert_eq!(zipfian.generate(), 0);
        // uz ~= 1.03, inside [1, 1 + 2^-0.99).
        assert_eq!(zipfian.generate(), 1);
        // uz just past the second-rank cutoff lands in the tail branch.
        let v = zipfian.generate();
        assert!(v > 1, "tail branch must not produce a top-2 rank, got {v}");
        assert_eq!(v, 2);
        // u -> 1 approaches uz = zeta(N) from below: the maximum index.
        assert_eq!(zipfian.generate(), 9);
    }

    #[test]
    fn last_reports_the_most_recent_sample() {
        let mut zipfian = Zipfian::new(1_000, 7);
        for _ in 0..1_000 {
            let v = zipfian.generate();
            assert_eq!(v, zipfian.last());
            // Accessor-only calls must not disturb it.
            let _ = zipfian.theta();
            let _ = zipfian.items();
            assert_eq!(v, zipfian.last());
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Zipfian::new(10_000, 1234);
        let mut b = Zipfian::new(10_000, 1234);
        for _ in 0..1_000 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn growth_extends_zeta_instead_of_recomputing() {
        let uniform = UniformF64::from_seed(5);
        let mut zipfian = Zipfian::with_source(uniform, 0, 99, DEFAULT_THETA);
        assert_eq!(zipfian.terms_summed, 0);

        for count in 101..=1_000 {
            zipfian.generate_with(count);
        }

        // Work is proportional to the total growth, not calls x count.
        assert_eq!(zipfian.terms_summed, 900);
        assert_eq!(zipfian.items(), 1_000);
        // Left-to-right extension accumulates the exact same sum as a single
        // pass over [1, 1000].
        assert_eq!(zipfian.zeta_n, zeta(0, 1_000, DEFAULT_THETA, 0.0));
    }

    #[test]
    fn growth_in_jumps_costs_the_same() {
        let uniform = UniformF64::from_seed(5);
        let mut zipfian = Zipfian::with_source(uniform, 0, 99, DEFAULT_THETA);
        for count in [500, 500, 800, 1_000, 1_000] {
            zipfian.generate_with(count);
        }
        assert_eq!(zipfian.terms_summed, 900);
    }

    #[test]
    fn grown_count_sticks_for_no_arg_generate() {
        let uniform = UniformF64::from_seed(11);
        let mut zipfian = Zipfian::with_source(uniform, 0, 9, DEFAULT_THETA);
        zipfian.generate_with(100);
        assert_eq!(zipfian.items(), 100);
        // Must not panic as a shrink, and must stay in the grown range.
        for _ in 0..1_000 {
            assert!(zipfian.generate() < 100);
        }
    }

    #[test]
    #[should_panic(expected = "shrank")]
    fn shrinking_count_panics_by_default() {
        let uniform = UniformF64::from_seed(3);
        let mut zipfian = Zipfian::with_source(uniform, 0, 99, DEFAULT_THETA);
        zipfian.generate_with(50);
    }

    #[test]
    fn shrinking_recomputes_zeta_when_opted_in() {
        let uniform = UniformF64::from_seed(3);
        let mut zipfian =
            Zipfian::with_source(uniform, 0, 99, DEFAULT_THETA).allow_count_decrease(true);
        zipfian.generate_with(200);
        zipfian.generate_with(100);
        assert_eq!(zipfian.items(), 100);
        // 100 terms of growth plus a 100-term recomputation.
        assert_eq!(zipfian.terms_summed, 200);
        assert_eq!(zipfian.zeta_n, zeta(0, 100, DEFAULT_THETA, 0.0));
    }

    #[test]
    #[should_panic(expected = "outside supported range")]
    fn rejects_single_item_spaces() {
        Zipfian::new(1, 0);
    }

    #[test]
    #[should_panic(expected = "theta")]
    fn rejects_theta_one() {
        Zipfian::with_source(UniformF64::from_seed(0), 0, 9, 1.0);
    }

    #[test]
    #[should_panic(expected = "theta")]
    fn rejects_theta_zero() {
        Zipfian::with_source(UniformF64::from_seed(0), 0, 9, 0.0);
    }

    #[test]
    fn precomputed_zeta_matches_the_full_recurrence() {
        let zeta_n = zeta(0, 1_000, DEFAULT_THETA, 0.0);
        let mut a = Zipfian::with_zeta(UniformF64::from_seed(21), 0, 999, DEFAULT_THETA, zeta_n);
        let mut b = Zipfian::with_source(UniformF64::from_seed(21), 0, 999, DEFAULT_THETA);
        for _ in 0..1_000 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn hottest_rank_gets_its_theoretical_share() {
        const N: u64 = 1_000;
        const DRAWS: usize = 1_000_000;

        let mut zipfian = Zipfian::new(N, 2024);
        let mut counts = vec![0u64; N as usize];
        for _ in 0..DRAWS {
            counts[zipfian.generate() as usize] += 1;
        }

        // Rank 0 is produced exactly when uz < 1, so its probability is
        // 1 / zeta(N, theta).
        let expected = 1.0 / zeta(0, N, DEFAULT_THETA, 0.0);
        let observed = counts[0] as f64 / DRAWS as f64;
        let deviation = (observed - expected).abs() / expected;
        assert!(
            deviation < 0.05,
            "rank 0 share {observed:.4} deviates {deviation:.3} from {expected:.4}"
        );

        // Popularity must fall off monotonically where the gaps dwarf noise.
        assert!(counts[0] > counts[1]);
        assert!(counts[1] > counts[2]);
        let head: u64 = counts[..10].iter().sum();
        let middle: u64 = counts[500..510].iter().sum();
        let tail: u64 = counts[990..].iter().sum();
        assert!(head > middle);
        assert!(middle > tail);
    }

    #[test]
    fn scrambled_stays_in_range_and_reproduces() {
        let mut a = ScrambledZipfian::with_range(100, 199, 77);
        let mut b = ScrambledZipfian::with_range(100, 199, 77);
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..1_000 {
            let v = a.generate();
            assert!((100..=199).contains(&v));
            assert_eq!(v, b.generate());
            assert_eq!(v, a.last());
            distinct.insert(v);
        }
        // Scrambling must not collapse the key space.
        assert!(distinct.len() > 10);
    }
}
