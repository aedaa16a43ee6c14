//! Measurement-induced phase transitions in chains of qubits under competing
//! weak X and ZZ measurements.
//!
//! A run builds the [Kraus pairs][kraus] for a [chain][chain] once, evolves
//! independent [trajectories][evolve] under a chosen outcome policy, and
//! reduces their terminal states either to the Edwards-Anderson
//! [Binder cumulant][ensemble] of the ZZ order parameter or to
//! [bipartite entanglement entropies][entropy].

pub mod binder;
pub mod chain;
pub mod correlator;
pub mod ensemble;
pub mod entropy;
pub mod error;
pub mod evolve;
pub mod kraus;
pub mod observe;
pub mod stats;

pub use chain::Chain;
pub use correlator::{ CorrelatorConfig, Strategy };
pub use ensemble::{ run_binder, BinderConfig, BinderEnsemble };
pub use entropy::{ run_entropy, EntropyConfig, EntropyEnsemble };
pub use error::{ ConfigError, TrialError };
pub use evolve::{ BondOrder, Evolution, EvolutionConfig, Policy, StepError };
pub use kraus::{ KrausSet, Strengths };
pub use observe::{ Logged, Observer, Silent };
