//! The Binder cumulant of the ZZ order parameter.
//!
//! With the size-normalized moments `M2 = S2 / L²` and `M4 = S4 / L⁴` of the
//! correlator sums (see [`correlator`][crate::correlator]),
//! ```text
//! B = 1 - M4 / (3 M2²)
//! ```
//! where the denominator is floored at a small `eps`. Since `M4 ≥ 0`, `B ≤ 1`.

use serde::{ Deserialize, Serialize };
use tensor_net::{ Truncation, MPS };
use crate::{
    chain::Chain,
    correlator::{ self, CorrelatorConfig },
    error::TrialError,
    observe::Observer,
};

/// Size-normalized second and fourth moments.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    /// `S2 / L²`
    pub m2: f64,
    /// `S4 / L⁴`
    pub m4: f64,
}

impl Moments {
    /// Normalize raw correlator sums over `l` sites.
    pub fn from_sums(l: usize, s2: f64, s4: f64) -> Self {
        let l2 = (l * l) as f64;
        Self { m2: s2 / l2, m4: s4 / (l2 * l2) }
    }

    /// Compute the Binder cumulant, flooring the denominator at `eps`.
    pub fn binder(&self, eps: f64) -> f64 {
        1.0 - self.m4 / (3.0 * self.m2 * self.m2).max(eps)
    }
}

/// Compute the Binder cumulant from raw correlator sums over `l` sites.
pub fn binder(l: usize, s2: f64, s4: f64, eps: f64) -> f64 {
    Moments::from_sums(l, s2, s4).binder(eps)
}

/// Per-trial result of the estimator.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialStats {
    /// Binder cumulant.
    pub b: f64,
    /// Σ ⟨Z_i Z_j⟩².
    pub s2: f64,
    /// Σ ⟨Z_i Z_j Z_k Z_l⟩².
    pub s4: f64,
    /// Ordered correlator tuples that failed to evaluate.
    pub skipped: u64,
}

/// Evaluate the Binder cumulant of a single terminal state.
///
/// Fails only if the state cannot be normalized; tuple-level failures are
/// counted in [`TrialStats::skipped`].
pub fn estimate<O>(
    state: &MPS,
    chain: &Chain,
    config: &CorrelatorConfig,
    trunc: Truncation,
    observer: &O,
) -> Result<TrialStats, TrialError>
where O: Observer + ?Sized
{
    let corr = correlator::correlators(state, chain, config, trunc, observer)?;
    Ok(TrialStats {
        b: corr.binder(config.eps),
        s2: corr.s2,
        s4: corr.s4,
        skipped: corr.skipped,
    })
}
