//! Weak-measurement Kraus operators.
//!
//! A weak measurement of a ±1-valued observable `O` with strength `λ` is the
//! pair
//! ```text
//! K0 = (1 + λ O) / √(2 (1 + λ²))
//! K1 = (1 - λ O) / √(2 (1 + λ²))
//! ```
//! which satisfies `K0† K0 + K1† K1 = 1` for any real `λ`. At `λ = 0` both
//! operators are `1/√2` and the measurement does nothing; at `λ = 1` they are
//! the projectors onto the eigenspaces of `O`.

use nalgebra as na;
use serde::{ Deserialize, Serialize };
use tensor_net::{ ops::{ XMAT, ZZMAT }, C64 };
use crate::{ chain::Chain, error::ConfigError };

/// The result of a weak measurement, labeling which Kraus operator was
/// applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    /// `K0 ∝ 1 + λ O`
    Zero = 0,
    /// `K1 ∝ 1 - λ O`
    One = 1,
}

impl Outcome {
    /// Returns `true` if `self` is `Zero`.
    pub fn is_zero(self) -> bool { matches!(self, Self::Zero) }

    /// Returns `true` if `self` is `One`.
    pub fn is_one(self) -> bool { matches!(self, Self::One) }
}

impl From<bool> for Outcome {
    fn from(b: bool) -> Self { if b { Self::One } else { Self::Zero } }
}

impl From<Outcome> for bool {
    fn from(o: Outcome) -> Self { o.is_one() }
}

/// Measurement strengths for the single-site X and nearest-neighbor ZZ
/// measurements.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strengths {
    /// Strength of the X measurements.
    pub lambda_x: f64,
    /// Strength of the ZZ measurements.
    pub lambda_zz: f64,
}

impl Strengths {
    /// Create a new set of strengths.
    pub fn new(lambda_x: f64, lambda_zz: f64) -> Self {
        Self { lambda_x, lambda_zz }
    }

    /// Parameterize both strengths by a single `λ`, as `(λ, 1 - λ)`.
    pub fn from_lambda(lambda: f64) -> Self { Self::new(lambda, 1.0 - lambda) }

    /// Fails if either strength is non-finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.lambda_x.is_finite() {
            return Err(ConfigError::BadStrength {
                name: "lambda_x", value: self.lambda_x });
        }
        if !self.lambda_zz.is_finite() {
            return Err(ConfigError::BadStrength {
                name: "lambda_zz", value: self.lambda_zz });
        }
        Ok(())
    }
}

/// A pair of Kraus operators for a two-outcome weak measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct KrausPair {
    /// The operator for [`Outcome::Zero`].
    pub k0: na::DMatrix<C64>,
    /// The operator for [`Outcome::One`].
    pub k1: na::DMatrix<C64>,
}

impl KrausPair {
    /// Build the weak measurement of a ±1-valued observable `op` with strength
    /// `lambda`.
    pub fn weak(op: &na::DMatrix<C64>, lambda: f64) -> Self {
        let d = op.nrows();
        let id: na::DMatrix<C64> = na::DMatrix::identity(d, d);
        let norm = (2.0 * (1.0 + lambda * lambda)).sqrt();
        let k0 = (&id + op.scale(lambda)).unscale(norm);
        let k1 = (&id - op.scale(lambda)).unscale(norm);
        Self { k0, k1 }
    }

    /// Return the operator for a given outcome.
    pub fn get(&self, outcome: Outcome) -> &na::DMatrix<C64> {
        match outcome {
            Outcome::Zero => &self.k0,
            Outcome::One => &self.k1,
        }
    }

    /// Compute `K0† K0 + K1† K1`.
    pub fn completeness(&self) -> na::DMatrix<C64> {
        self.k0.adjoint() * &self.k0 + self.k1.adjoint() * &self.k1
    }
}

/// Kraus pairs for every site (X measurements) and every bond (ZZ
/// measurements) of a chain.
///
/// Built once per run and shared read-only across trials.
#[derive(Clone, Debug, PartialEq)]
pub struct KrausSet {
    strengths: Strengths,
    x: Vec<KrausPair>,
    zz: Vec<KrausPair>,
}

impl KrausSet {
    /// Build the Kraus pairs for `chain`.
    ///
    /// Fails if the chain has fewer than 2 physical sites or either strength is
    /// non-finite.
    pub fn new(chain: &Chain, strengths: Strengths) -> Result<Self, ConfigError> {
        strengths.validate()?;
        if chain.l() < 2 { return Err(ConfigError::TooFewSites(chain.l())); }
        let x =
            chain.sites()
            .map(|_| KrausPair::weak(&XMAT, strengths.lambda_x))
            .collect();
        let zz =
            chain.bonds()
            .map(|_| KrausPair::weak(&ZZMAT, strengths.lambda_zz))
            .collect();
        Ok(Self { strengths, x, zz })
    }

    /// Return the strengths the set was built with.
    pub fn strengths(&self) -> Strengths { self.strengths }

    /// Return the number of physical sites the set was built for.
    pub fn nsites(&self) -> usize { self.x.len() }

    /// Return the X measurement on site `k`.
    ///
    /// *Panics if `k` is out of bounds.*
    pub fn site(&self, k: usize) -> &KrausPair { &self.x[k] }

    /// Return the ZZ measurement on bond `b`.
    ///
    /// *Panics if `b` is out of bounds.*
    pub fn bond(&self, b: usize) -> &KrausPair { &self.zz[b] }

    /// Iterate over the X measurements.
    pub fn sites(&self) -> impl Iterator<Item = &KrausPair> + '_ { self.x.iter() }

    /// Iterate over the ZZ measurements.
    pub fn bonds(&self) -> impl Iterator<Item = &KrausPair> + '_ { self.zz.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_net::ops::IMAT;

    #[test]
    fn outcomes_convert_from_bools() {
        assert_eq!(Outcome::from(true), Outcome::One);
        assert_eq!(Outcome::from(false), Outcome::Zero);
        assert!(bool::from(Outcome::One));
        assert!(Outcome::Zero.is_zero() && !Outcome::Zero.is_one());
    }

    #[test]
    fn zero_strength_is_trivial() {
        let pair = KrausPair::weak(&XMAT, 0.0);
        let half = IMAT.unscale(2.0_f64.sqrt());
        assert!((&pair.k0 - &half).norm() < 1e-15);
        assert!((&pair.k1 - &half).norm() < 1e-15);
    }

    #[test]
    fn unit_strength_projects() {
        let pair = KrausPair::weak(&ZZMAT, 1.0);
        let k0k0 = &pair.k0 * &pair.k0;
        assert!((&k0k0 - &pair.k0).norm() < 1e-14);
        assert!((&pair.k0 * &pair.k1).norm() < 1e-14);
    }

    #[test]
    fn set_covers_sites_and_bonds() {
        let chain = Chain::with_dummy(5).unwrap();
        let set = KrausSet::new(&chain, Strengths::from_lambda(0.25)).unwrap();
        assert_eq!(set.nsites(), 5);
        assert_eq!(set.sites().count(), 5);
        assert_eq!(set.bonds().count(), 4);
        assert_eq!(set.strengths().lambda_zz, 0.75);
    }

    #[test]
    fn single_site_chain_is_rejected() {
        let chain = Chain::new(1).unwrap();
        assert_eq!(
            KrausSet::new(&chain, Strengths::new(0.5, 0.5)),
            Err(ConfigError::TooFewSites(1)),
        );
    }

    #[test]
    fn non_finite_strength_is_rejected() {
        let chain = Chain::new(3).unwrap();
        assert!(matches!(
            KrausSet::new(&chain, Strengths::new(f64::NAN, 0.5)),
            Err(ConfigError::BadStrength { name: "lambda_x", .. }),
        ));
    }
}
