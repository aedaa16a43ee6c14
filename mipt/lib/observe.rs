//! Progress checkpoints.
//!
//! The simulation core calls into an [`Observer`] at fixed points (after each
//! time layer, after each correlator chunk, after each trial) and asks it
//! between trials whether to stop. Nothing in the core depends on what an
//! observer does with this.

use std::sync::atomic::{ AtomicBool, Ordering };
use tracing::{ debug, trace };

/// The kind of correlator tuples being accumulated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TupleKind {
    /// Two-point tuples `(i, j)`.
    Pair,
    /// Four-point tuples `(i, j, k, l)`.
    Quad,
}

/// Progress through a correlator sum.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Which sum.
    pub kind: TupleKind,
    /// Number of items processed so far.
    pub done: u64,
    /// Total number of items.
    pub total: u64,
}

/// How a trial ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrialStatus {
    /// The trial produced a valid result.
    Completed,
    /// The trial was abandoned and will be excluded from averages.
    Invalid,
}

/// Receiver for progress checkpoints.
///
/// All methods default to doing nothing. Observers are shared across the
/// worker threads of an ensemble, so they must be `Sync`.
pub trait Observer: Sync {
    /// Called after the `t`-th time layer of a trajectory.
    fn layer(&self, _t: usize, _max_bond_dim: usize) { }

    /// Called after each chunk of correlator tuples.
    fn chunk(&self, _progress: ChunkProgress) { }

    /// Called after the `k`-th trial of an ensemble.
    fn trial(&self, _k: usize, _status: TrialStatus) { }

    /// Polled before each trial starts; trials that haven't started when this
    /// returns `true` are skipped.
    fn interrupted(&self) -> bool { false }
}

/// Ignores every checkpoint.
#[derive(Copy, Clone, Debug, Default)]
pub struct Silent;

impl Observer for Silent { }

/// Forwards checkpoints to [`tracing`] at `trace` (layers) and `debug` (chunks
/// and trials) levels.
#[derive(Copy, Clone, Debug, Default)]
pub struct Logged;

impl Observer for Logged {
    fn layer(&self, t: usize, max_bond_dim: usize) {
        trace!(t, max_bond_dim, "layer done");
    }

    fn chunk(&self, progress: ChunkProgress) {
        debug!(
            kind = ?progress.kind,
            done = progress.done,
            total = progress.total,
            "correlator chunk done",
        );
    }

    fn trial(&self, k: usize, status: TrialStatus) {
        debug!(trial = k, ?status, "trial done");
    }
}

/// Wraps another observer with a stop flag that can be raised from elsewhere
/// to interrupt an ensemble between trials.
#[derive(Debug)]
pub struct Interruptible<'a, O: ?Sized> {
    inner: &'a O,
    flag: &'a AtomicBool,
}

impl<'a, O: Observer + ?Sized> Interruptible<'a, O> {
    /// Create a new wrapper.
    pub fn new(inner: &'a O, flag: &'a AtomicBool) -> Self { Self { inner, flag } }

    /// Raise the stop flag.
    pub fn stop(&self) { self.flag.store(true, Ordering::Relaxed); }
}

impl<'a, O: Observer + ?Sized> Observer for Interruptible<'a, O> {
    fn layer(&self, t: usize, max_bond_dim: usize) {
        self.inner.layer(t, max_bond_dim);
    }

    fn chunk(&self, progress: ChunkProgress) { self.inner.chunk(progress); }

    fn trial(&self, k: usize, status: TrialStatus) { self.inner.trial(k, status); }

    fn interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.inner.interrupted()
    }
}
