//! Error types.
//!
//! [`ConfigError`]s are fatal and surface at construction time. Everything that
//! can go wrong inside a single trajectory or correlator evaluation is a
//! [`TrialError`], which the ensemble averagers absorb into invalid markers.

use thiserror::Error;
use tensor_net::MPSError;
use crate::evolve::Target;

/// Fatal errors in run setup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("a chain needs at least one physical site")]
    EmptyChain,

    #[error("bond operators need at least 2 sites, but the chain has {0}")]
    TooFewSites(usize),

    #[error("measurement strength {name} must be finite, got {value}")]
    BadStrength { name: &'static str, value: f64 },

    #[error("probability must be in [0, 1], got {0}")]
    BadProbability(f64),

    #[error("maximum bond dimension must be at least 1")]
    ZeroBondDim,

    #[error("truncation cutoff must be finite and non-negative, got {0}")]
    BadCutoff(f64),

    #[error("tolerance must be finite and non-negative, got {0}")]
    BadTolerance(f64),

    #[error("flooring epsilon must be finite and positive, got {0}")]
    BadEpsilon(f64),

    #[error("correlator chunk size must be at least 1")]
    ZeroChunk,

    #[error("Kraus operators were built for {built} sites, but the chain has {chain}")]
    KrausMismatch { built: usize, chain: usize },
}

/// Reasons a single trial is abandoned.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("both measurement branches vanished at layer {layer} on {target}")]
    Collapse { layer: usize, target: Target },

    #[error("tensor network error: {0}")]
    Substrate(#[from] MPSError),

    #[error("trial result is not finite")]
    NonFinite,
}

impl TrialError {
    /// Return `true` if `self` is `Collapse`.
    pub fn is_collapse(&self) -> bool { matches!(self, Self::Collapse { .. }) }
}
