#![allow(dead_code)]

//! Dense state-vector reference for small chains.
//!
//! Basis index `Σ s_k 2^k`, leftmost site fastest, matching
//! `MPS::from_vector`.

use nalgebra as na;
use mipt::{
    evolve::BondOrder,
    kraus::{ KrausPair, Strengths },
};
use tensor_net::{ ops::{ XMAT, ZZMAT }, C64 };

pub type Dense = na::DVector<C64>;

pub fn up(l: usize) -> Dense {
    let mut psi = Dense::zeros(1 << l);
    psi[0] = C64::from(1.0);
    psi
}

pub fn plus(l: usize) -> Dense {
    let n = 1 << l;
    Dense::from_element(n, C64::from((n as f64).sqrt().recip()))
}

pub fn apply1(psi: &Dense, k: usize, op: &na::DMatrix<C64>) -> Dense {
    let mut out = Dense::zeros(psi.len());
    for (idx, amp) in psi.iter().enumerate() {
        let s = (idx >> k) & 1;
        let rest = idx & !(1 << k);
        for t in 0..2 {
            out[rest | (t << k)] += op[(t, s)] * amp;
        }
    }
    out
}

pub fn apply2(psi: &Dense, k: usize, op: &na::DMatrix<C64>) -> Dense {
    let mut out = Dense::zeros(psi.len());
    for (idx, amp) in psi.iter().enumerate() {
        let p = ((idx >> k) & 1) + 2 * ((idx >> (k + 1)) & 1);
        let rest = idx & !(0b11 << k);
        for q in 0..4 {
            out[rest | (q << k)] += op[(q, p)] * amp;
        }
    }
    out
}

pub fn normalize(psi: &mut Dense) -> f64 {
    let norm = psi.norm();
    psi.unscale_mut(norm);
    norm
}

/// `⟨ψ| Z_{sites...} |ψ⟩` for a normalized state.
pub fn zcorr(psi: &Dense, sites: &[usize]) -> f64 {
    psi.iter().enumerate()
        .map(|(idx, amp)| {
            let parity = sites.iter().filter(|&&k| (idx >> k) & 1 == 1).count();
            let sign = if parity % 2 == 0 { 1.0 } else { -1.0 };
            sign * amp.norm_sqr()
        })
        .sum()
}

/// Brute-force `(S2, S4)` over all ordered tuples.
pub fn sums(psi: &Dense, l: usize) -> (f64, f64) {
    let mut s2 = 0.0;
    let mut s4 = 0.0;
    for i in 0..l {
        for j in 0..l {
            s2 += zcorr(psi, &[i, j]).powi(2);
            for k in 0..l {
                for m in 0..l {
                    s4 += zcorr(psi, &[i, j, k, m]).powi(2);
                }
            }
        }
    }
    (s2, s4)
}

/// Forced-outcome trajectory from the all-up state, without truncation.
pub fn forced(
    l: usize,
    strengths: Strengths,
    steps: usize,
    order: BondOrder,
) -> Dense {
    let kx = KrausPair::weak(&XMAT, strengths.lambda_x);
    let kzz = KrausPair::weak(&ZZMAT, strengths.lambda_zz);
    let mut psi = up(l);
    for _ in 0..steps {
        for k in 0..l {
            psi = apply1(&psi, k, &kx.k1);
            normalize(&mut psi);
        }
        for b in order.bonds(l) {
            psi = apply2(&psi, b, &kzz.k1);
            normalize(&mut psi);
        }
    }
    psi
}

pub fn assert_close(a: f64, b: f64, tol: f64) {
    assert!(
        (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs())),
        "{} != {} (tol {})", a, b, tol,
    );
}
