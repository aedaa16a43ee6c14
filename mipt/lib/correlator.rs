//! Squared Z-correlator sums
//! ```text
//! S2 = Σ_{i,j} ⟨Z_i Z_j⟩²
//! S4 = Σ_{i,j,k,l} ⟨Z_i Z_j Z_k Z_l⟩²
//! ```
//! over all ordered tuples of physical sites.
//!
//! Two strategies are available:
//! - [`Strategy::Batched`] uses `Z² = 1` to reduce every ordered tuple to the
//!   set of sites that appear an odd number of times. A 4-tuple reduces to the
//!   empty set, a pair, or a quad of distinct sites, so each distinct pair
//!   `i < j` and quad `i < j < k < l` is evaluated once, by the batched
//!   correlator of the tensor network, and weighted by the number of ordered
//!   tuples that reduce to it:
//!   ```text
//!   ∅     : L + 3 L (L - 1)   (S4)    L   (S2)
//!   {i, j}: 12 (L - 2) + 8    (S4)    2   (S2)
//!   quad  : 24                (S4)
//!   ```
//! - [`Strategy::Manual`] visits every ordered tuple by its linear index,
//!   copies the state, applies each Z in ascending site order with
//!   re-truncation after every application, and takes the overlap with the
//!   original. It is slower, but has a fixed memory footprint and can be run
//!   over index ranges (see [`manual_sum`]).
//!
//! Both work through the tuples in chunks of bounded size and report progress
//! to an [`Observer`] after each chunk. Failed evaluations are skipped and
//! counted, never fatal.

use std::ops::Range;
use itertools::Itertools;
use serde::{ Deserialize, Serialize };
use tracing::warn;
use tensor_net::{ ops::ZMAT, MPSResult, Truncation, C64, MPS };
use crate::{
    binder::Moments,
    chain::Chain,
    error::{ ConfigError, TrialError },
    observe::{ ChunkProgress, Observer, TupleKind },
};

/// Correlator evaluation strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Symmetry-reduced batched evaluation.
    Batched,
    /// Tuple-by-tuple evaluation.
    Manual,
    /// `Batched` for chains of at most `manual_above` sites, `Manual` beyond.
    Auto { manual_above: usize },
}

impl Default for Strategy {
    fn default() -> Self { Self::Auto { manual_above: 64 } }
}

impl Strategy {
    /// Resolve `Auto` for a chain of `l` sites.
    pub fn resolve(self, l: usize) -> Self {
        match self {
            Self::Auto { manual_above } if l > manual_above => Self::Manual,
            Self::Auto { .. } => Self::Batched,
            other => other,
        }
    }
}

/// Settings for correlator evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Evaluation strategy.
    pub strategy: Strategy,
    /// Maximum number of tuples held in memory at once.
    pub chunk: usize,
    /// Floor for the Binder denominator.
    pub eps: f64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self { strategy: Strategy::default(), chunk: 50_000, eps: 1e-12 }
    }
}

impl CorrelatorConfig {
    /// Fails on a zero chunk size or a non-positive or non-finite epsilon.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk == 0 { return Err(ConfigError::ZeroChunk); }
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(ConfigError::BadEpsilon(self.eps));
        }
        Ok(())
    }
}

/// Accumulated correlator sums.
///
/// `evaluated` and `skipped` count ordered tuples across both sums, so that
/// `evaluated + skipped = L² + L⁴` once both sums are complete.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correlators {
    /// Number of physical sites.
    pub l: usize,
    /// Σ ⟨Z_i Z_j⟩².
    pub s2: f64,
    /// Σ ⟨Z_i Z_j Z_k Z_l⟩².
    pub s4: f64,
    /// Ordered tuples that contributed.
    pub evaluated: u64,
    /// Ordered tuples whose evaluation failed.
    pub skipped: u64,
}

impl Correlators {
    /// Create a new, empty accumulator for `l` sites.
    pub fn new(l: usize) -> Self {
        Self { l, s2: 0.0, s4: 0.0, evaluated: 0, skipped: 0 }
    }

    /// Return the size-normalized moments.
    pub fn moments(&self) -> Moments { Moments::from_sums(self.l, self.s2, self.s4) }

    /// Return the Binder cumulant with denominator floor `eps`.
    pub fn binder(&self, eps: f64) -> f64 { self.moments().binder(eps) }

    /// Return `true` if no tuple was skipped.
    pub fn is_complete(&self) -> bool { self.skipped == 0 }
}

/// Compute the correlator sums of `state` over the physical sites of `chain`.
///
/// A copy of the state is centered on the middle of the chain and normalized
/// first. Only that preparation can fail; failures of individual tuples or
/// chunks are logged, skipped, and counted.
pub fn correlators<O>(
    state: &MPS,
    chain: &Chain,
    config: &CorrelatorConfig,
    trunc: Truncation,
    observer: &O,
) -> Result<Correlators, TrialError>
where O: Observer + ?Sized
{
    let mut psi = state.clone();
    psi.orthogonalize(chain.center())?;
    psi.normalize()?;
    let l = chain.l();
    let chunk = config.chunk.max(1);
    match config.strategy.resolve(l) {
        Strategy::Manual => {
            let mut acc = Correlators::new(l);
            let pairs =
                manual_sum(
                    &psi, l, Order::Two, 0 .. Order::Two.count(l),
                    chunk, trunc, observer,
                );
            let quads =
                manual_sum(
                    &psi, l, Order::Four, 0 .. Order::Four.count(l),
                    chunk, trunc, observer,
                );
            acc.s2 = pairs.sum;
            acc.s4 = quads.sum;
            acc.evaluated = pairs.evaluated + quads.evaluated;
            acc.skipped = pairs.skipped + quads.skipped;
            Ok(acc)
        },
        _ => Ok(batched(&mut psi, l, chunk, observer)),
    }
}

// value of every set in a chunk; `None` for failures
fn eval_chunk<S>(psi: &mut MPS, sets: &[S]) -> Vec<Option<f64>>
where S: AsRef<[usize]>
{
    match psi.correlators(&ZMAT, sets) {
        Ok(vals) => {
            vals.into_iter()
                .map(|v| (v.re.is_finite() && v.im.is_finite()).then_some(v.re))
                .collect()
        },
        Err(err) => {
            warn!(%err, len = sets.len(), "skipping correlator chunk");
            vec![None; sets.len()]
        },
    }
}

fn batched<O>(psi: &mut MPS, l: usize, chunk: usize, observer: &O) -> Correlators
where O: Observer + ?Sized
{
    let mut acc = Correlators::new(l);
    let lu = l as u64;
    let lf = l as f64;

    // tuples that reduce to the empty set
    acc.s2 += lf;
    acc.s4 += lf + 3.0 * lf * (lf - 1.0);
    acc.evaluated += lu + lu + 3 * lu * lu.saturating_sub(1);

    let w2: u64 = 2;
    let w4: u64 = 12 * lu.saturating_sub(2) + 8;
    let npairs = lu * lu.saturating_sub(1) / 2;
    let mut buf2: Vec<[usize; 2]> = Vec::with_capacity(chunk.min(npairs as usize));
    let mut pairs = (0..l).tuple_combinations::<(usize, usize)>().map(|(i, j)| [i, j]);
    let mut done: u64 = 0;
    loop {
        buf2.clear();
        buf2.extend(pairs.by_ref().take(chunk));
        if buf2.is_empty() { break; }
        for v in eval_chunk(psi, &buf2) {
            match v {
                Some(c) => {
                    let c2 = c * c;
                    acc.s2 += w2 as f64 * c2;
                    acc.s4 += w4 as f64 * c2;
                    acc.evaluated += w2 + w4;
                },
                None => { acc.skipped += w2 + w4; },
            }
        }
        done += buf2.len() as u64;
        observer.chunk(ChunkProgress { kind: TupleKind::Pair, done, total: npairs });
    }
    drop(buf2);

    let w4: u64 = 24;
    let nquads = choose4(lu);
    let mut buf4: Vec<[usize; 4]> = Vec::with_capacity(chunk.min(nquads as usize));
    let mut quads =
        (0..l).tuple_combinations::<(usize, usize, usize, usize)>()
        .map(|(i, j, k, m)| [i, j, k, m]);
    let mut done: u64 = 0;
    loop {
        buf4.clear();
        buf4.extend(quads.by_ref().take(chunk));
        if buf4.is_empty() { break; }
        for v in eval_chunk(psi, &buf4) {
            match v {
                Some(c) => {
                    acc.s4 += w4 as f64 * c * c;
                    acc.evaluated += w4;
                },
                None => { acc.skipped += w4; },
            }
        }
        done += buf4.len() as u64;
        observer.chunk(ChunkProgress { kind: TupleKind::Quad, done, total: nquads });
    }
    acc
}

fn choose4(n: u64) -> u64 {
    if n < 4 { return 0; }
    n * (n - 1) / 2 * (n - 2) / 3 * (n - 3) / 4
}

/// Tuple length for the manual strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    /// Ordered pairs, contributing to S2.
    Two,
    /// Ordered 4-tuples, contributing to S4.
    Four,
}

impl Order {
    /// Return the tuple length.
    pub fn arity(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Four => 4,
        }
    }

    /// Return the number of ordered tuples over `l` sites.
    pub fn count(self, l: usize) -> u64 { (l as u64).pow(self.arity() as u32) }

    fn kind(self) -> TupleKind {
        match self {
            Self::Two => TupleKind::Pair,
            Self::Four => TupleKind::Quad,
        }
    }
}

/// Decompose a linear index into a tuple of site indices, most significant
/// first.
pub fn tuple_at(mut idx: u64, l: usize, out: &mut [usize]) {
    let base = l as u64;
    for slot in out.iter_mut().rev() {
        *slot = (idx % base) as usize;
        idx /= base;
    }
}

/// Partial result of [`manual_sum`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualSum {
    /// Sum of squared correlators.
    pub sum: f64,
    /// Tuples that contributed.
    pub evaluated: u64,
    /// Tuples whose evaluation failed.
    pub skipped: u64,
}

impl ManualSum {
    /// Combine with the result of another range.
    pub fn merge(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            evaluated: self.evaluated + other.evaluated,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Evaluate `⟨ψ| Z... |ψ⟩` by applying each Z to a copy of `psi`.
///
/// Sites are visited in ascending order, with the bond to the right of each
/// re-truncated after the Z is applied.
pub fn manual_correlator(psi: &MPS, sites: &[usize], trunc: Truncation)
    -> MPSResult<C64>
{
    let mut sorted = sites.to_vec();
    sorted.sort_unstable();
    let mut phi = psi.clone();
    if let Some(&first) = sorted.first() { phi.orthogonalize(first)?; }
    for &k in sorted.iter() {
        phi.apply_op1(k, &ZMAT)?;
        if k + 1 < phi.n() { phi.compress_bond(k, trunc)?; }
    }
    psi.inner(&phi)
}

/// Sum squared correlators over the ordered tuples with linear indices in
/// `range`, `chunk` tuples at a time.
///
/// `psi` should be normalized. Ranges can be evaluated separately and
/// combined with [`ManualSum::merge`].
pub fn manual_sum<O>(
    psi: &MPS,
    l: usize,
    order: Order,
    range: Range<u64>,
    chunk: usize,
    trunc: Truncation,
    observer: &O,
) -> ManualSum
where O: Observer + ?Sized
{
    let mut acc = ManualSum::default();
    let total = order.count(l).min(range.end).saturating_sub(range.start);
    let end = range.start + total;
    let step = chunk.max(1) as u64;
    let mut tuple = vec![0_usize; order.arity()];
    let mut done: u64 = 0;
    let mut start = range.start;
    while start < end {
        let stop = (start + step).min(end);
        for idx in start..stop {
            tuple_at(idx, l, &mut tuple);
            match manual_correlator(psi, &tuple, trunc) {
                Ok(v) if v.re.is_finite() => {
                    acc.sum += v.re * v.re;
                    acc.evaluated += 1;
                },
                Ok(v) => {
                    warn!(?tuple, value = %v, "skipping non-finite correlator");
                    acc.skipped += 1;
                },
                Err(err) => {
                    warn!(?tuple, %err, "skipping correlator");
                    acc.skipped += 1;
                },
            }
        }
        done += stop - start;
        observer.chunk(ChunkProgress { kind: order.kind(), done, total });
        start = stop;
    }
    acc
}
