//! Bipartite entanglement of terminal states.
//!
//! Every trial runs one Born-rule trajectory from the all-plus product state.
//! For each cut `c` in `1..L`, splitting the chain into sites `0..c` and
//! `c..L`, the von Neumann entropy (in bits) of the Schmidt spectrum across
//! bond `c - 1` is recorded. Cuts `0` and `L` are not real bipartitions and
//! have zero entropy.

use rayon::iter::{ IntoParallelIterator, ParallelIterator };
use serde::{ Deserialize, Serialize };
use tracing::{ debug, info };
use tensor_net::{ ops::LocalState, MPSResult, MPS };
use crate::{
    chain::Chain,
    error::{ ConfigError, TrialError },
    evolve::{ BornRule, Evolution, EvolutionConfig },
    kraus::{ KrausSet, Strengths },
    observe::{ Observer, TrialStatus },
    stats::{ trial_rng, RunningStats },
};

/// Settings for an entropy ensemble.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntropyConfig {
    /// Number of physical sites.
    pub l: usize,
    /// Pad the chain with a trailing dummy site.
    pub dummy: bool,
    /// Measurement strengths.
    pub strengths: Strengths,
    /// Trajectory settings.
    pub evolution: EvolutionConfig,
    /// Number of trials.
    pub ntrials: usize,
    /// Base seed for the per-trial random streams.
    pub seed: Option<u64>,
    /// Run trials on the global rayon pool.
    pub parallel: bool,
    /// Schmidt values at or below this magnitude are dropped.
    pub threshold: f64,
    /// Regularizer inside the logarithm.
    pub eps: f64,
}

impl EntropyConfig {
    /// Create a new config with default settings for everything but the chain
    /// size and measurement strengths.
    pub fn new(l: usize, strengths: Strengths) -> Self {
        Self {
            l,
            dummy: false,
            strengths,
            evolution: EvolutionConfig::default(),
            ntrials: 1000,
            seed: None,
            parallel: true,
            threshold: 1e-12,
            eps: 1e-30,
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
        self.evolution.validate()?;
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::BadTolerance(self.threshold));
        }
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(ConfigError::BadEpsilon(self.eps));
        }
        Ok(())
    }
}

/// Compute the von Neumann entropy `-Σ p log2(p + eps)` of a Schmidt
/// spectrum.
///
/// The spectrum is normalized to unit ℓ2 norm first; values with magnitude at
/// or below `threshold` are dropped. An empty or all-zero spectrum has zero
/// entropy.
pub fn von_neumann(svals: &[f64], threshold: f64, eps: f64) -> f64 {
    let norm: f64 = svals.iter().map(|s| s * s).sum::<f64>().sqrt();
    if norm <= 0.0 || !norm.is_finite() { return 0.0; }
    svals.iter()
        .map(|s| s.abs() / norm)
        .filter(|s| *s > threshold)
        .map(|s| {
            let p = s * s;
            -p * (p + eps).log2()
        })
        .sum()
}

/// Compute the entropy across cut `c` of a chain, i.e. between physical sites
/// `c - 1` and `c`.
///
/// Cuts `0` and `c >= L` are zero.
pub fn cut_entropy(
    state: &mut MPS,
    chain: &Chain,
    c: usize,
    threshold: f64,
    eps: f64,
) -> MPSResult<f64>
{
    if c == 0 || c >= chain.l() { return Ok(0.0); }
    let svals = state.schmidt_values(c - 1)?;
    Ok(von_neumann(svals.as_slice(), threshold, eps))
}

/// Compute the entropy across every cut `1..L`, in order.
pub fn cut_entropies(
    state: &mut MPS,
    chain: &Chain,
    threshold: f64,
    eps: f64,
) -> MPSResult<Vec<f64>>
{
    (1..chain.l())
        .map(|c| cut_entropy(state, chain, c, threshold, eps))
        .collect()
}

/// Result of an entropy ensemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntropyEnsemble {
    /// Cut positions, `1..L`.
    pub cuts: Vec<usize>,
    /// Mean entropy at each cut over valid trials.
    pub avg_entropies: Vec<f64>,
    /// Sample standard deviation at each cut over valid trials.
    pub std_entropies: Vec<f64>,
    /// Mean entropy at cut `L / 2`.
    pub central_entropy: f64,
    /// Largest mean entropy over all cuts.
    pub max_entropy: f64,
    /// Number of valid trials.
    pub successful_trials: usize,
    /// Number of trials requested.
    pub ntrials: usize,
}

impl EntropyEnsemble {
    /// Reduce per-trial entropies over a chain of `l` sites. Each row holds
    /// the entropies at cuts `1..l`; NaN entries are excluded per cut.
    pub fn reduce(l: usize, trials: &[Vec<f64>]) -> Self {
        let cuts: Vec<usize> = (1..l).collect();
        let per_cut: Vec<RunningStats> =
            (0..cuts.len())
            .map(|j| {
                trials.iter()
                    .filter_map(|row| row.get(j).copied())
                    .filter(|s| !s.is_nan())
                    .collect()
            })
            .collect();
        let avg_entropies: Vec<f64> = per_cut.iter().map(|s| s.mean()).collect();
        let std_entropies: Vec<f64> = per_cut.iter().map(|s| s.std()).collect();
        let central_entropy =
            cuts.iter().position(|c| *c == l / 2)
            .map(|j| avg_entropies[j])
            .unwrap_or(0.0);
        let max_entropy =
            avg_entropies.iter().copied()
            .filter(|s| !s.is_nan())
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |m| m.max(s))))
            .unwrap_or(if cuts.is_empty() { 0.0 } else { f64::NAN });
        let successful_trials =
            trials.iter().filter(|row| row.iter().all(|s| !s.is_nan())).count();
        Self {
            cuts,
            avg_entropies,
            std_entropies,
            central_entropy,
            max_entropy,
            successful_trials,
            ntrials: trials.len(),
        }
    }
}

/// Run a single entropy trial, returning the entropy at every cut `1..L`.
pub fn entropy_trial<O>(
    engine: &Evolution<'_>,
    config: &EntropyConfig,
    k: usize,
    observer: &O,
) -> Result<Vec<f64>, TrialError>
where O: Observer + ?Sized
{
    let mut rng = trial_rng(config.seed, k);
    let mut traj = engine.run(LocalState::Plus, &BornRule, &mut rng, observer)?;
    let chain = engine.chain();
    traj.state.normalize()?;
    Ok(cut_entropies(&mut traj.state, &chain, config.threshold, config.eps)?)
}

/// Run an entropy ensemble.
///
/// Fails only on an invalid config. Invalid trials, and trials skipped after
/// an interruption, contribute NaN at every cut.
pub fn run_entropy<O>(config: &EntropyConfig, observer: &O)
    -> Result<EntropyEnsemble, ConfigError>
where O: Observer + ?Sized
{
    config.validate()?;
    let chain = config.chain()?;
    let kraus = KrausSet::new(&chain, config.strengths)?;
    let engine = Evolution::new(chain, &kraus, config.evolution)?;
    let ncuts = chain.l() - 1;

    let do_trial = |k: usize| -> Vec<f64> {
        if observer.interrupted() {
            debug!(trial = k, "skipping trial after interrupt");
            return vec![f64::NAN; ncuts];
        }
        match entropy_trial(&engine, config, k, observer) {
            Ok(row) => {
                observer.trial(k, TrialStatus::Completed);
                row
            },
            Err(err) => {
                debug!(trial = k, %err, "invalid trial");
                observer.trial(k, TrialStatus::Invalid);
                vec![f64::NAN; ncuts]
            },
        }
    };
    let trials: Vec<Vec<f64>> =
        if config.parallel {
            (0..config.ntrials).into_par_iter().map(do_trial).collect()
        } else {
            (0..config.ntrials).map(do_trial).collect()
        };

    let res = EntropyEnsemble::reduce(chain.l(), &trials);
    info!(
        l = chain.l(),
        lambda_x = config.strengths.lambda_x,
        lambda_zz = config.strengths.lambda_zz,
        central = res.central_entropy,
        successful = res.successful_trials,
        ntrials = res.ntrials,
        "entropy ensemble done",
    );
    Ok(res)
}
