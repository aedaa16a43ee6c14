//! Stochastic evolution of a chain under repeated layers of weak measurements.
//!
//! Each time layer applies, in order,
//! 1. an X measurement on every physical site, left to right;
//! 2. a ZZ measurement on every bond, in the order given by [`BondOrder`].
//!
//! How one of the two Kraus operators is chosen at each step is delegated to a
//! [`Selector`]; the stepping loop itself ([`Evolution::run`]) is shared by
//! every policy. After each step the state is re-centered on the rightmost
//! acted-on site and renormalized.

use std::fmt;
use nalgebra as na;
use rand::Rng;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use tracing::debug;
use tensor_net::{
    ops::{ LocalState, XMAT, ZZMAT },
    MPSError,
    MPSResult,
    Truncation,
    C64,
    MPS,
};
use crate::{
    chain::Chain,
    error::{ ConfigError, TrialError },
    kraus::{ KrausPair, KrausSet, Outcome },
    observe::Observer,
};

/// Where a measurement acts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// A single site.
    Site(usize),
    /// The bond between sites `b` and `b + 1`.
    Bond(usize),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Site(k) => write!(f, "site {}", k),
            Self::Bond(b) => write!(f, "bond ({}, {})", b, b + 1),
        }
    }
}

/// Order in which the ZZ measurements of a layer visit the bonds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondOrder {
    /// Two sublayers: first every bond starting on an even site `(0, 1), (2,
    /// 3), ...`, then every bond starting on an odd site `(1, 2), (3, 4),
    /// ...`.
    #[default]
    Brickwork,
    /// A single left-to-right sweep over all bonds.
    Sweep,
}

impl BondOrder {
    /// Return the bond indices of a chain of `l` sites in visiting order.
    pub fn bonds(self, l: usize) -> Vec<usize> {
        let nbonds = l.saturating_sub(1);
        match self {
            Self::Brickwork => {
                (0..nbonds).step_by(2)
                    .chain((1..nbonds).step_by(2))
                    .collect()
            },
            Self::Sweep => (0..nbonds).collect(),
        }
    }
}

/// Evolution settings shared by every policy.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of time layers. `None` defaults to twice the number of physical
    /// sites.
    pub steps: Option<usize>,
    /// Order of the bond measurements within a layer.
    pub bonds: BondOrder,
    /// Maximum bond dimension.
    pub maxdim: usize,
    /// Relative discarded-weight cutoff; see [`Truncation`].
    pub cutoff: f64,
    /// A step whose two branch probabilities are both below this value
    /// abandons the trajectory.
    pub collapse_tol: f64,
    /// Keep the outcome of every measurement.
    pub record: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            steps: None,
            bonds: BondOrder::Brickwork,
            maxdim: 256,
            cutoff: 1e-12,
            collapse_tol: 1e-12,
            record: false,
        }
    }
}

impl EvolutionConfig {
    /// Return the truncation policy.
    pub fn trunc(&self) -> Truncation { Truncation::new(self.maxdim, self.cutoff) }

    /// Return the number of time layers for `chain`.
    pub fn steps_for(&self, chain: &Chain) -> usize {
        self.steps.unwrap_or(2 * chain.l())
    }

    /// Fails on a zero bond dimension or a negative or non-finite cutoff or
    /// tolerance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maxdim == 0 { return Err(ConfigError::ZeroBondDim); }
        if !self.cutoff.is_finite() || self.cutoff < 0.0 {
            return Err(ConfigError::BadCutoff(self.cutoff));
        }
        if !self.collapse_tol.is_finite() || self.collapse_tol < 0.0 {
            return Err(ConfigError::BadTolerance(self.collapse_tol));
        }
        Ok(())
    }
}

/// Failure of a single stochastic step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("both measurement branches have vanishing probability")]
    Collapse,

    #[error(transparent)]
    Substrate(#[from] MPSError),
}

/// Apply `op` to `state` at `target`.
pub fn act(state: &mut MPS, op: &na::DMatrix<C64>, target: Target) -> MPSResult<()> {
    match target {
        Target::Site(k) => { state.apply_op1(k, op)?; },
        Target::Bond(b) => { state.apply_op2(b, op)?; },
    }
    Ok(())
}

/// Apply `op` to a copy of `state` at `target`.
pub fn branch(state: &MPS, op: &na::DMatrix<C64>, target: Target) -> MPSResult<MPS> {
    let mut phi = state.clone();
    act(&mut phi, op, target)?;
    Ok(phi)
}

// a zero norm here means the chosen branch carried no weight after all
fn renormalize(state: &mut MPS) -> Result<(), StepError> {
    match state.normalize() {
        Ok(_) => Ok(()),
        Err(MPSError::ZeroNorm) => Err(StepError::Collapse),
        Err(err) => Err(err.into()),
    }
}

/// Strategy for choosing which Kraus operator of a pair is applied.
///
/// Implementors apply the chosen operator to `state` and leave it normalized.
pub trait Selector: Sync {
    /// Perform one weak measurement, returning its outcome.
    ///
    /// Fails with [`StepError::Collapse`] if the step leaves no probability
    /// mass above `tol`.
    fn select<R>(
        &self,
        state: &mut MPS,
        pair: &KrausPair,
        target: Target,
        tol: f64,
        rng: &mut R,
    ) -> Result<Outcome, StepError>
    where R: Rng + ?Sized;
}

/// Sample the outcome from the Born rule.
///
/// Both branches are computed; outcome `Zero` is chosen with probability `p0
/// / (p0 + p1)`. If the total is not positive, `Zero` is kept without drawing
/// a random number.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BornRule;

impl Selector for BornRule {
    fn select<R>(
        &self,
        state: &mut MPS,
        pair: &KrausPair,
        target: Target,
        tol: f64,
        rng: &mut R,
    ) -> Result<Outcome, StepError>
    where R: Rng + ?Sized
    {
        let phi0 = branch(state, &pair.k0, target)?;
        let phi1 = branch(state, &pair.k1, target)?;
        // NaN clamps to zero
        let p0 = phi0.norm_sq().max(0.0);
        let p1 = phi1.norm_sq().max(0.0);
        if p0 < tol && p1 < tol { return Err(StepError::Collapse); }
        let total = p0 + p1;
        let (mut chosen, outcome) =
            if total <= 0.0 || rng.gen::<f64>() < p0 / total {
                (phi0, Outcome::Zero)
            } else {
                (phi1, Outcome::One)
            };
        renormalize(&mut chosen)?;
        *state = chosen;
        Ok(outcome)
    }
}

/// Always apply `K1`, making the trajectory deterministic.
///
/// `K1 ∝ 1 - λ O` is the branch weighted toward the -1 eigenspace of the
/// measured observable; see [`kraus`][crate::kraus].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ForcedOutcome;

impl Selector for ForcedOutcome {
    fn select<R>(
        &self,
        state: &mut MPS,
        pair: &KrausPair,
        target: Target,
        tol: f64,
        _rng: &mut R,
    ) -> Result<Outcome, StepError>
    where R: Rng + ?Sized
    {
        act(state, &pair.k1, target)?;
        let p1 = state.norm_sq();
        if p1.is_nan() || p1 < tol { return Err(StepError::Collapse); }
        renormalize(state)?;
        Ok(Outcome::One)
    }
}

/// Follow another selector with a dephasing channel: with probability `p`, an
/// X flip on the measured site or a ZZ flip on the measured bond.
///
/// No random number is drawn for `p <= 0`, so `Dephased { inner, p: 0.0 }`
/// reproduces `inner` exactly on the same stream.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Dephased<S> {
    /// The underlying selector.
    pub inner: S,
    /// Flip probability.
    pub p: f64,
}

impl<S: Selector> Selector for Dephased<S> {
    fn select<R>(
        &self,
        state: &mut MPS,
        pair: &KrausPair,
        target: Target,
        tol: f64,
        rng: &mut R,
    ) -> Result<Outcome, StepError>
    where R: Rng + ?Sized
    {
        let outcome = self.inner.select(state, pair, target, tol, rng)?;
        if self.p > 0.0 && rng.gen::<f64>() < self.p {
            let flip: &na::DMatrix<C64> =
                match target {
                    Target::Site(_) => &XMAT,
                    Target::Bond(_) => &ZZMAT,
                };
            act(state, flip, target)?;
            renormalize(state)?;
        }
        Ok(outcome)
    }
}

/// Config-level choice of [`Selector`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Policy {
    /// [`BornRule`].
    #[default]
    Sampled,
    /// [`ForcedOutcome`].
    Forced,
    /// [`BornRule`] followed by dephasing with flip probability `p`.
    Dephased { p: f64 },
}

impl Policy {
    /// Fails if a dephasing probability is outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Dephased { p } if !(0.0..=1.0).contains(p) => {
                Err(ConfigError::BadProbability(*p))
            },
            _ => Ok(()),
        }
    }

    /// Return `true` if `self` uses no randomness.
    pub fn is_deterministic(&self) -> bool { matches!(self, Self::Forced) }
}

impl Selector for Policy {
    fn select<R>(
        &self,
        state: &mut MPS,
        pair: &KrausPair,
        target: Target,
        tol: f64,
        rng: &mut R,
    ) -> Result<Outcome, StepError>
    where R: Rng + ?Sized
    {
        match self {
            Self::Sampled => BornRule.select(state, pair, target, tol, rng),
            Self::Forced => ForcedOutcome.select(state, pair, target, tol, rng),
            Self::Dephased { p } => {
                Dephased { inner: BornRule, p: *p }
                    .select(state, pair, target, tol, rng)
            },
        }
    }
}

/// The outcomes of a single time layer: sites first, then bonds in visiting
/// order.
pub type MeasLayer = Vec<Outcome>;

/// The outcomes of every time layer.
pub type MeasRecord = Vec<MeasLayer>;

/// The end of a single trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    /// Final, normalized state.
    pub state: MPS,
    /// Measurement outcomes, if recording was requested.
    pub record: Option<MeasRecord>,
    /// Number of layers run.
    pub layers: usize,
}

/// Driver for single trajectories.
///
/// Holds a shared reference to the run's Kraus operators, so one `Evolution`
/// can serve any number of (concurrent) trials.
#[derive(Clone, Debug)]
pub struct Evolution<'a> {
    chain: Chain,
    kraus: &'a KrausSet,
    config: EvolutionConfig,
    bonds: Vec<usize>,
}

impl<'a> Evolution<'a> {
    /// Create a new driver.
    ///
    /// Fails if `config` is invalid or `kraus` was built for a different
    /// chain.
    pub fn new(chain: Chain, kraus: &'a KrausSet, config: EvolutionConfig)
        -> Result<Self, ConfigError>
    {
        config.validate()?;
        if kraus.nsites() != chain.l() {
            return Err(ConfigError::KrausMismatch {
                built: kraus.nsites(), chain: chain.l() });
        }
        let bonds = config.bonds.bonds(chain.l());
        Ok(Self { chain, kraus, config, bonds })
    }

    /// Return the chain.
    pub fn chain(&self) -> Chain { self.chain }

    /// Return the evolution settings.
    pub fn config(&self) -> &EvolutionConfig { &self.config }

    /// Return the truncation policy.
    pub fn trunc(&self) -> Truncation { self.config.trunc() }

    /// Return the number of time layers per trajectory.
    pub fn steps(&self) -> usize { self.config.steps_for(&self.chain) }

    /// Run a single trajectory from the product state with every site in
    /// `initial`.
    ///
    /// Fails if any step collapses or the tensor network operations fail.
    pub fn run<S, R, O>(
        &self,
        initial: LocalState,
        selector: &S,
        rng: &mut R,
        observer: &O,
    ) -> Result<Trajectory, TrialError>
    where
        S: Selector,
        R: Rng + ?Sized,
        O: Observer + ?Sized,
    {
        let mut state = self.chain.product_state(initial, self.trunc())?;
        self.run_from(&mut state, selector, rng, observer)
            .map(|record| {
                Trajectory { state, record, layers: self.steps() }
            })
    }

    /// Like [`run`][Self::run], but evolving a given state in place and
    /// returning only the measurement record.
    pub fn run_from<S, R, O>(
        &self,
        state: &mut MPS,
        selector: &S,
        rng: &mut R,
        observer: &O,
    ) -> Result<Option<MeasRecord>, TrialError>
    where
        S: Selector,
        R: Rng + ?Sized,
        O: Observer + ?Sized,
    {
        state.set_trunc(self.trunc());
        let tol = self.config.collapse_tol;
        let mut record: Option<MeasRecord> = self.config.record.then(Vec::new);
        let mut layer: MeasLayer =
            Vec::with_capacity(self.chain.l() + self.bonds.len());
        for t in 0 .. self.steps() {
            layer.clear();
            let targets =
                self.chain.sites().map(Target::Site)
                .chain(self.bonds.iter().copied().map(Target::Bond));
            for target in targets {
                let pair =
                    match target {
                        Target::Site(k) => self.kraus.site(k),
                        Target::Bond(b) => self.kraus.bond(b),
                    };
                let outcome =
                    selector.select(state, pair, target, tol, rng)
                    .map_err(|err| match err {
                        StepError::Collapse => {
                            debug!(layer = t, %target, "trajectory collapsed");
                            TrialError::Collapse { layer: t, target }
                        },
                        StepError::Substrate(err) => TrialError::Substrate(err),
                    })?;
                layer.push(outcome);
            }
            if let Some(rcd) = record.as_mut() { rcd.push(layer.clone()); }
            observer.layer(t, state.max_bond_dim());
        }
        Ok(record)
    }
}
