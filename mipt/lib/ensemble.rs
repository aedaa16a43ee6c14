//! Trial ensembles for the Binder cumulant.
//!
//! Every trial runs one trajectory from the all-up product state, then
//! evaluates the correlator sums of its terminal state. Two estimators are
//! reported, and they are not interchangeable:
//! - `b`, the ensemble-averaged Binder cumulant, formed from the trial means
//!   of `S2` and `S4`;
//! - `b_mean_of_trials` and `b_std_of_trials`, statistics of the per-trial
//!   cumulants.
//!
//! Trials that collapse or whose correlators cannot be evaluated are invalid
//! and excluded from both.

use rayon::iter::{ IntoParallelIterator, ParallelIterator };
use serde::{ Deserialize, Serialize };
use tracing::{ debug, info };
use tensor_net::ops::LocalState;
use crate::{
    binder::{ self, TrialStats },
    chain::Chain,
    correlator::CorrelatorConfig,
    error::{ ConfigError, TrialError },
    evolve::{ Evolution, EvolutionConfig, Policy },
    kraus::{ KrausSet, Strengths },
    observe::{ Observer, TrialStatus },
    stats::{ trial_rng, RunningStats },
};

/// Settings for a Binder ensemble.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinderConfig {
    /// Number of physical sites.
    pub l: usize,
    /// Pad the chain with a trailing dummy site.
    pub dummy: bool,
    /// Measurement strengths.
    pub strengths: Strengths,
    /// Outcome selection policy.
    pub policy: Policy,
    /// Trajectory settings.
    pub evolution: EvolutionConfig,
    /// Correlator settings.
    pub correlator: CorrelatorConfig,
    /// Number of trials.
    pub ntrials: usize,
    /// Base seed for the per-trial random streams; `None` draws every stream
    /// from system entropy.
    pub seed: Option<u64>,
    /// Run trials on the global rayon pool.
    pub parallel: bool,
}

impl BinderConfig {
    /// Create a new config with default settings for everything but the chain
    /// size and measurement strengths.
    pub fn new(l: usize, strengths: Strengths) -> Self {
        Self {
            l,
            dummy: false,
            strengths,
            policy: Policy::default(),
            evolution: EvolutionConfig::default(),
            correlator: CorrelatorConfig::default(),
            ntrials: 1000,
            seed: None,
            parallel: true,
        }
    }

    /// Build the chain.
    pub fn chain(&self) -> Result<Chain, ConfigError> {
        if self.dummy { Chain::with_dummy(self.l) } else { Chain::new(self.l) }
    }

    /// Check every sub-config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chain()?;
        self.strengths.validate()?;
        self.policy.validate()?;
        self.evolution.validate()?;
        self.correlator.validate()?;
        Ok(())
    }
}

/// Result of a Binder ensemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinderEnsemble {
    /// Binder cumulant of the trial-averaged moments.
    #[serde(rename = "B")]
    pub b: f64,
    /// Mean of the per-trial cumulants.
    #[serde(rename = "B_mean_of_trials")]
    pub b_mean_of_trials: f64,
    /// Sample standard deviation of the per-trial cumulants.
    #[serde(rename = "B_std_of_trials")]
    pub b_std_of_trials: f64,
    /// Trial mean of `S2`.
    #[serde(rename = "S2_bar")]
    pub s2_bar: f64,
    /// Trial mean of `S4`.
    #[serde(rename = "S4_bar")]
    pub s4_bar: f64,
    /// Number of trials requested.
    pub ntrials: usize,
    /// Number of valid trials.
    pub ntrials_completed: usize,
    /// Ordered correlator tuples skipped across all valid trials.
    pub skipped_tuples: u64,
    /// Per-trial results in trial order; `None` marks an invalid trial.
    pub trials: Vec<Option<TrialStats>>,
}

impl BinderEnsemble {
    /// The result of an ensemble with no valid trials.
    pub fn degenerate(ntrials: usize) -> Self {
        Self {
            b: f64::NAN,
            b_mean_of_trials: f64::NAN,
            b_std_of_trials: f64::NAN,
            s2_bar: f64::NAN,
            s4_bar: f64::NAN,
            ntrials,
            ntrials_completed: 0,
            skipped_tuples: 0,
            trials: vec![None; ntrials],
        }
    }

    /// Reduce per-trial results over a chain of `l` sites, flooring the
    /// ensemble Binder denominator at `eps`.
    pub fn reduce(l: usize, eps: f64, trials: Vec<Option<TrialStats>>) -> Self {
        let ntrials = trials.len();
        let valid: Vec<&TrialStats> = trials.iter().flatten().collect();
        if valid.is_empty() {
            return Self { trials, ..Self::degenerate(ntrials) };
        }
        let s2: RunningStats = valid.iter().map(|t| t.s2).collect();
        let s4: RunningStats = valid.iter().map(|t| t.s4).collect();
        let b: RunningStats = valid.iter().map(|t| t.b).collect();
        let skipped_tuples: u64 = valid.iter().map(|t| t.skipped).sum();
        Self {
            b: binder::binder(l, s2.mean(), s4.mean(), eps),
            b_mean_of_trials: b.mean(),
            b_std_of_trials: b.std(),
            s2_bar: s2.mean(),
            s4_bar: s4.mean(),
            ntrials,
            ntrials_completed: valid.len(),
            skipped_tuples,
            trials,
        }
    }

    /// Return `true` if no trial was valid.
    pub fn is_degenerate(&self) -> bool { self.ntrials_completed == 0 }
}

/// Run a single Binder trial.
///
/// Fails if the trajectory collapses or its terminal state cannot be
/// prepared for correlator evaluation.
pub fn binder_trial<O>(
    engine: &Evolution<'_>,
    config: &BinderConfig,
    k: usize,
    observer: &O,
) -> Result<TrialStats, TrialError>
where O: Observer + ?Sized
{
    let mut rng = trial_rng(config.seed, k);
    let traj = engine.run(LocalState::Up, &config.policy, &mut rng, observer)?;
    let chain = engine.chain();
    binder::estimate(
        &traj.state, &chain, &config.correlator, engine.trunc(), observer)
}

/// Run a Binder ensemble.
///
/// Fails only on an invalid config. Trials not yet started when `observer`
/// reports an interruption are left out like invalid trials.
pub fn run_binder<O>(config: &BinderConfig, observer: &O)
    -> Result<BinderEnsemble, ConfigError>
where O: Observer + ?Sized
{
    config.validate()?;
    let chain = config.chain()?;
    let kraus = KrausSet::new(&chain, config.strengths)?;
    let engine = Evolution::new(chain, &kraus, config.evolution)?;

    let do_trial = |k: usize| -> Option<TrialStats> {
        if observer.interrupted() {
            debug!(trial = k, "skipping trial after interrupt");
            return None;
        }
        let res =
            binder_trial(&engine, config, k, observer)
            .and_then(|stats| {
                if stats.b.is_finite() {
                    Ok(stats)
                } else {
                    Err(TrialError::NonFinite)
                }
            });
        match res {
            Ok(stats) => {
                observer.trial(k, TrialStatus::Completed);
                Some(stats)
            },
            Err(err) => {
                debug!(trial = k, %err, "invalid trial");
                observer.trial(k, TrialStatus::Invalid);
                None
            },
        }
    };
    let trials: Vec<Option<TrialStats>> =
        if config.parallel {
            (0..config.ntrials).into_par_iter().map(do_trial).collect()
        } else {
            (0..config.ntrials).map(do_trial).collect()
        };

    let res = BinderEnsemble::reduce(chain.l(), config.correlator.eps, trials);
    info!(
        l = chain.l(),
        lambda_x = config.strengths.lambda_x,
        lambda_zz = config.strengths.lambda_zz,
        b = res.b,
        completed = res.ntrials_completed,
        ntrials = res.ntrials,
        skipped_tuples = res.skipped_tuples,
        "binder ensemble done",
    );
    Ok(res)
}
