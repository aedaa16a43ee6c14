use nalgebra as na;
use proptest::prelude::*;
use mipt::{
    chain::Chain,
    kraus::{ KrausPair, KrausSet, Strengths },
    ConfigError,
};
use tensor_net::{ ops::{ IMAT, XMAT, ZZMAT }, C64 };

fn is_identity(m: &na::DMatrix<C64>) -> bool {
    let id: na::DMatrix<C64> = na::DMatrix::identity(m.nrows(), m.ncols());
    (m - id).norm() < 1e-12
}

proptest! {
    #[test]
    fn weak_pairs_are_complete(lx in -5.0_f64..5.0, lzz in -5.0_f64..5.0) {
        let chain = Chain::new(3).unwrap();
        let set = KrausSet::new(&chain, Strengths::new(lx, lzz)).unwrap();
        prop_assert_eq!(set.sites().count(), 3);
        prop_assert_eq!(set.bonds().count(), 2);
        for pair in set.sites().chain(set.bonds()) {
            prop_assert!(is_identity(&pair.completeness()));
        }
    }
}

#[test]
fn zero_strength_is_scaled_identity() {
    let pair = KrausPair::weak(&XMAT, 0.0);
    let half: na::DMatrix<C64> = IMAT.unscale(2.0_f64.sqrt());
    assert!((&pair.k0 - &half).norm() < 1e-15);
    assert!((&pair.k1 - &half).norm() < 1e-15);
}

#[test]
fn projective_limit() {
    // λ = 1 gives the projectors onto the ±1 eigenspaces
    let pair = KrausPair::weak(&ZZMAT, 1.0);
    assert!((&pair.k0 * &pair.k0 - &pair.k0).norm() < 1e-12);
    assert!((&pair.k1 * &pair.k1 - &pair.k1).norm() < 1e-12);
    assert!((&pair.k0 * &pair.k1).norm() < 1e-12);
}

#[test]
fn bonds_need_two_sites() {
    let chain = Chain::new(1).unwrap();
    assert_eq!(
        KrausSet::new(&chain, Strengths::from_lambda(0.5)),
        Err(ConfigError::TooFewSites(1)),
    );
    let bad = Strengths::new(f64::NAN, 0.5);
    let chain = Chain::new(4).unwrap();
    assert!(matches!(
        KrausSet::new(&chain, bad),
        Err(ConfigError::BadStrength { name: "lambda_x", .. }),
    ));
}
