#![allow(rustdoc::private_intra_doc_links)]

//! Structures allowing (rank-2) [`DMatrix`][na::DMatrix] structures to be used
//! as rank-3 site tensors in a matrix product state.
//!
//! The base mathematical structure here is a rank-3 tensor with indices `u`,
//! `s`, and `v`,
//! ```text
//!  u       v
//! ---- Γ ----
//!      |
//!      | s
//! ```
//! where `s` is the physical index and `u` and `v` are bond indices shared with
//! `Γ`'s neighbors in the chain.
//!
//! Since `nalgebra` doesn't provide any rank-3 structures, we model `Γ_usv`
//! using an ordinary matrix that can be in one of two forms (see [`GData`]):
//! `Γ_<us>v`, where `s` is fused with `u`; or `Γ_u<sv>`, where `s` is fused
//! with `v`. In both cases the storage is column-major with the leftmost fused
//! index varying fastest, so that the two forms share the same underlying
//! buffer and [reshaping][na::DMatrix::reshape_generic] converts between them
//! without moving any data.

use std::mem;
use nalgebra as na;
use num_complex::Complex64 as C64;
use crate::mps::{ MPSError, MPSResult };

/// Basic wrapper enum around a bare `DMatrix`, with variants to keep track of
/// which bond index the physical index is fused to.
///
/// You'll likely want to deal with this data via [`Gamma`].
#[derive(Clone, Debug, PartialEq)]
pub enum GData {
    /// The physical index is fused with the left bond index.
    LFused(na::DMatrix<C64>),
    /// The physical index is fused with the right bond index.
    RFused(na::DMatrix<C64>),
}

impl GData {
    /// Return `true` if `self` is `LFused`.
    pub fn is_lfused(&self) -> bool { matches!(self, Self::LFused(..)) }

    /// Return `true` if `self` is `RFused`.
    pub fn is_rfused(&self) -> bool { matches!(self, Self::RFused(..)) }

    /// Discard fusing information and return just the bare matrix.
    pub fn unwrap(self) -> na::DMatrix<C64> {
        match self {
            Self::LFused(mat) => mat,
            Self::RFused(mat) => mat,
        }
    }

    /// Return a reference to the underlying matrix.
    pub fn get(&self) -> &na::DMatrix<C64> {
        match self {
            Self::LFused(mat) => mat,
            Self::RFused(mat) => mat,
        }
    }
}

/// A single site tensor `Γ_usv`.
#[derive(Clone, Debug, PartialEq)]
pub struct Gamma {
    // physical dimension
    mdim: usize,
    data: GData,
}

impl Default for Gamma {
    fn default() -> Self {
        Self { mdim: 1, data: GData::LFused(na::DMatrix::zeros(0, 0)) }
    }
}

impl Gamma {
    /// Create a new `Gamma` from a left-fused matrix `Γ_<us>v`.
    ///
    /// *Panics if the number of rows is not a multiple of `mdim`.*
    pub fn new_lfused(mdim: usize, data: na::DMatrix<C64>) -> Self {
        if mdim == 0 || data.nrows() % mdim != 0 {
            panic!("inconsistent dimensions");
        }
        Self { mdim, data: GData::LFused(data) }
    }

    /// Create a new `Gamma` from a right-fused matrix `Γ_u<sv>`.
    ///
    /// *Panics if the number of columns is not a multiple of `mdim`.*
    pub fn new_rfused(mdim: usize, data: na::DMatrix<C64>) -> Self {
        if mdim == 0 || data.ncols() % mdim != 0 {
            panic!("inconsistent dimensions");
        }
        Self { mdim, data: GData::RFused(data) }
    }

    /// Return `true` if `self` is left-fused.
    pub fn is_lfused(&self) -> bool { self.data.is_lfused() }

    /// Return `true` if `self` is right-fused.
    pub fn is_rfused(&self) -> bool { self.data.is_rfused() }

    /// Return the dimension of the physical index.
    pub fn mdim(&self) -> usize { self.mdim }

    /// Return the dimensions `(u, s, v)` of the tensor.
    pub fn dims(&self) -> (usize, usize, usize) {
        match &self.data {
            GData::LFused(mat) => {
                let (us, v) = mat.shape();
                (us / self.mdim, self.mdim, v)
            },
            GData::RFused(mat) => {
                let (u, sv) = mat.shape();
                (u, self.mdim, sv / self.mdim)
            },
        }
    }

    /// Return a reference to the underlying data.
    pub fn data(&self) -> &GData { &self.data }

    /// Return a reference to the underlying matrix, in whichever fused form it
    /// is currently held.
    pub fn mat(&self) -> &na::DMatrix<C64> { self.data.get() }

    /// Return the element `Γ_usv`.
    ///
    /// *Panics if any index is out of bounds.*
    pub fn get(&self, u: usize, s: usize, v: usize) -> C64 {
        let (m, d, _) = self.dims();
        match &self.data {
            GData::LFused(mat) => mat[(u + m * s, v)],
            GData::RFused(mat) => mat[(u, s + d * v)],
        }
    }

    /// Return the bond matrix `Γ_u(s)v` for a fixed physical index `s`.
    pub fn block(&self, s: usize) -> na::DMatrix<C64> {
        let (m, _, n) = self.dims();
        na::DMatrix::from_fn(m, n, |u, v| self.get(u, s, v))
    }

    fn make_lfused(&mut self) {
        if self.is_rfused() {
            let (m, d, n) = self.dims();
            let mat = mem::take(&mut self.data).unwrap();
            self.data =
                GData::LFused(mat.reshape_generic(na::Dyn(m * d), na::Dyn(n)));
        }
    }

    fn make_rfused(&mut self) {
        if self.is_lfused() {
            let (m, d, n) = self.dims();
            let mat = mem::take(&mut self.data).unwrap();
            self.data =
                GData::RFused(mat.reshape_generic(na::Dyn(m), na::Dyn(d * n)));
        }
    }

    /// Convert to left-fused form and return the bare matrix.
    pub fn unwrap_lfused(mut self) -> na::DMatrix<C64> {
        self.make_lfused();
        self.data.unwrap()
    }

    /// Convert to right-fused form and return the bare matrix.
    pub fn unwrap_rfused(mut self) -> na::DMatrix<C64> {
        self.make_rfused();
        self.data.unwrap()
    }

    /// Return a left-fused copy of the underlying matrix.
    pub fn to_lfused(&self) -> na::DMatrix<C64> { self.clone().unwrap_lfused() }

    /// Apply an operator to the physical index.
    ///
    /// *Panics if `op` is not `mdim × mdim`.*
    pub fn apply_op(&mut self, op: &na::DMatrix<C64>) {
        let (m, d, n) = self.dims();
        if op.shape() != (d, d) { panic!("inconsistent dimensions"); }
        let new =
            na::DMatrix::from_fn(m * d, n, |r, v| {
                let (u, sp) = (r % m, r / m);
                (0..d).map(|s| op[(sp, s)] * self.get(u, s, v)).sum::<C64>()
            });
        self.data = GData::LFused(new);
    }

    /// Multiply every element by a real factor.
    pub fn scale(&mut self, a: f64) {
        match &mut self.data {
            GData::LFused(mat) => mat.scale_mut(a),
            GData::RFused(mat) => mat.scale_mut(a),
        }
    }

    /// Return the Frobenius norm of the tensor.
    pub fn norm(&self) -> f64 { self.mat().norm() }

    /// Return `true` if every element is finite.
    pub fn is_finite(&self) -> bool {
        self.mat().iter().all(|a| a.re.is_finite() && a.im.is_finite())
    }

    /// Contract `self` with its right neighbor across their shared bond,
    /// returning the two-site tensor along with the original physical
    /// dimensions.
    ///
    /// The fused physical index of the result is `p = s1 + d1 s2`.
    ///
    /// *Panics if the bond dimensions don't match.*
    pub fn contract_bond(self, rhs: Self) -> (Self, (usize, usize)) {
        let (m, lphys, _) = self.dims();
        let (_, rphys, n) = rhs.dims();
        let lmat = self.unwrap_lfused();
        let rmat = rhs.unwrap_rfused();
        if lmat.ncols() != rmat.nrows() { panic!("inconsistent dimensions"); }
        let new_phys = lphys * rphys;
        let new_mat =
            (lmat * rmat).reshape_generic(na::Dyn(m * new_phys), na::Dyn(n));
        (Self::new_lfused(new_phys, new_mat), (lphys, rphys))
    }

    /// Inverse of [`contract_bond`][Self::contract_bond]: split a two-site
    /// tensor back into two sites with a truncated Schmidt decomposition.
    ///
    /// The left tensor is left-orthonormal; the Schmidt values are multiplied
    /// into the right tensor, which therefore carries the norm of `self`. The
    /// Schmidt values are also returned.
    ///
    /// Fails if the tensor contains non-finite elements or the decomposition
    /// does not converge.
    ///
    /// *Panics if `lphys * rphys` does not equal the physical dimension.*
    pub fn factor(self, lphys: usize, rphys: usize, trunc: Truncation)
        -> MPSResult<(Self, na::DVector<f64>, Self)>
    {
        if lphys * rphys != self.mdim { panic!("inconsistent dimensions"); }
        let (m, _, n) = self.dims();
        let mat =
            self.unwrap_lfused()
            .reshape_generic(na::Dyn(m * lphys), na::Dyn(rphys * n));
        let Schmidt { u, s, q, rank: _ } = Schmidt::from_decomp(mat, trunc, true)?;
        Ok((Self::new_lfused(lphys, u), s, Self::new_rfused(rphys, q)))
    }
}

impl Default for GData {
    fn default() -> Self { Self::LFused(na::DMatrix::zeros(0, 0)) }
}

/// Bond truncation policy applied at every factorization.
///
/// Singular values are considered in descending order. The smallest are
/// dropped as long as their total squared weight, relative to the total squared
/// weight of the spectrum, stays at or below `cutoff`; after that, at most
/// `maxdim` values are kept. At least one value is always kept.
///
/// Truncation never renormalizes the kept values.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Truncation {
    /// Maximum bond dimension.
    pub maxdim: usize,
    /// Maximum relative discarded weight.
    pub cutoff: f64,
}

impl Default for Truncation {
    fn default() -> Self { Self::exact() }
}

impl Truncation {
    /// Create a new truncation policy.
    pub fn new(maxdim: usize, cutoff: f64) -> Self { Self { maxdim, cutoff } }

    /// Keep every nonzero singular value.
    pub fn exact() -> Self { Self { maxdim: usize::MAX, cutoff: 0.0 } }

    /// Return the number of values to keep from a spectrum sorted in
    /// descending order.
    pub fn rank(&self, svals: &[f64]) -> usize {
        let total: f64 = svals.iter().map(|s| s * s).sum();
        if !(total > 0.0) { return 1; }
        let mut discarded = 0.0;
        let mut r = svals.len();
        while r > 1 {
            let w = svals[r - 1] * svals[r - 1];
            if (discarded + w) / total > self.cutoff { break; }
            discarded += w;
            r -= 1;
        }
        r.min(self.maxdim).max(1)
    }
}

/// Data struct holding a Schmidt decomposition repurposed for MPS
/// factorization.
#[derive(Clone, Debug, PartialEq)]
pub struct Schmidt {
    /// Left Schmidt column vectors.
    pub u: na::DMatrix<C64>,
    /// Schmidt values, in descending order.
    pub s: na::DVector<f64>,
    /// Right Schmidt row vectors.
    pub q: na::DMatrix<C64>,
    /// Schmidt rank.
    pub rank: usize,
}

impl Schmidt {
    /// Compute the (truncated) Schmidt decomposition of a matrix.
    ///
    /// Pass `remul_svals = true` to return the right Schmidt vectors scaled by
    /// their corresponding Schmidt values.
    ///
    /// Fails if the matrix contains non-finite elements or the decomposition
    /// does not converge.
    pub fn from_decomp(q: na::DMatrix<C64>, trunc: Truncation, remul_svals: bool)
        -> MPSResult<Self>
    {
        if q.iter().any(|a| !a.re.is_finite() || !a.im.is_finite()) {
            return Err(MPSError::NonFinite);
        }
        let (nrows, ncols) = q.shape();
        let svd =
            q.try_svd(true, true, f64::EPSILON, 0)
            .ok_or(MPSError::SvdFailed)?;
        let (Some(u_full), Some(vt_full)) = (svd.u, svd.v_t)
            else { return Err(MPSError::SvdFailed); };
        let svals = svd.singular_values;
        let mut order: Vec<usize> = (0..svals.len()).collect();
        order.sort_by(|&a, &b| svals[b].total_cmp(&svals[a]));
        let sorted: Vec<f64> = order.iter().map(|&j| svals[j]).collect();
        let rank = trunc.rank(&sorted);
        let s = na::DVector::from_iterator(rank, sorted.into_iter().take(rank));
        let u = na::DMatrix::from_fn(nrows, rank, |i, j| u_full[(i, order[j])]);
        let q =
            na::DMatrix::from_fn(rank, ncols, |i, j| {
                let qij = vt_full[(order[i], j)];
                if remul_svals { qij * s[i] } else { qij }
            });
        Ok(Self { u, s, q, rank })
    }

    /// Return the Schmidt values only, in descending order.
    pub fn values(mat: na::DMatrix<C64>) -> MPSResult<na::DVector<f64>> {
        if mat.iter().any(|a| !a.re.is_finite() || !a.im.is_finite()) {
            return Err(MPSError::NonFinite);
        }
        let svd =
            mat.try_svd(false, false, f64::EPSILON, 0)
            .ok_or(MPSError::SvdFailed)?;
        let mut s: Vec<f64> = svd.singular_values.iter().copied().collect();
        s.sort_by(|a, b| b.total_cmp(a));
        Ok(na::DVector::from_vec(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64) -> C64 { C64::new(re, 0.0) }

    #[test]
    fn rank_respects_cutoff_and_maxdim() {
        let svals = [0.9, 0.4, 1e-4, 1e-8];
        assert_eq!(Truncation::exact().rank(&svals), 4);
        assert_eq!(Truncation::new(usize::MAX, 1e-12).rank(&svals), 3);
        assert_eq!(Truncation::new(usize::MAX, 1e-6).rank(&svals), 2);
        assert_eq!(Truncation::new(1, 0.0).rank(&svals), 1);
        assert_eq!(Truncation::new(usize::MAX, 1.0).rank(&svals), 1);
        assert_eq!(Truncation::exact().rank(&[0.0, 0.0]), 1);
    }

    #[test]
    fn exact_rank_drops_zero_values() {
        assert_eq!(Truncation::exact().rank(&[1.0, 0.5, 0.0, 0.0]), 2);
    }

    #[test]
    fn schmidt_reconstructs_and_sorts() {
        let mat =
            na::DMatrix::from_row_slice(3, 2, &[
                c(0.1), c(2.0),
                c(0.0), c(0.3),
                c(1.5), c(-0.2),
            ]);
        let Schmidt { u, s, q, rank } =
            Schmidt::from_decomp(mat.clone(), Truncation::exact(), true).unwrap();
        assert_eq!(rank, 2);
        assert!(s[0] >= s[1]);
        assert!((u * q - mat).norm() < 1e-12);
    }

    #[test]
    fn schmidt_rejects_nan() {
        let mut mat = na::DMatrix::from_element(2, 2, c(1.0));
        mat[(1, 0)] = C64::new(f64::NAN, 0.0);
        assert!(matches!(
            Schmidt::from_decomp(mat, Truncation::exact(), false),
            Err(MPSError::NonFinite),
        ));
    }

    #[test]
    fn fused_forms_agree() {
        // Γ with m = 2, d = 2, n = 3
        let data = na::DMatrix::from_fn(4, 3, |r, v| c((10 * r + v) as f64));
        let g = Gamma::new_lfused(2, data);
        let rf = Gamma::new_rfused(2, g.clone().unwrap_rfused());
        assert_eq!(rf.dims(), (2, 2, 3));
        for u in 0..2 {
            for s in 0..2 {
                for v in 0..3 {
                    assert_eq!(g.get(u, s, v), rf.get(u, s, v));
                }
            }
        }
    }

    #[test]
    fn contract_then_factor_is_lossless() {
        let gl = Gamma::new_lfused(2, na::DMatrix::from_fn(2, 2, |i, j| c((i + 2 * j) as f64 + 0.5)));
        let gr = Gamma::new_rfused(2, na::DMatrix::from_fn(2, 2, |i, j| c(1.0 - (i * j) as f64)));
        let (g2, (dl, dr)) = gl.contract_bond(gr);
        assert_eq!(g2.dims(), (1, 4, 1));
        let (l, _, r) = g2.clone().factor(dl, dr, Truncation::exact()).unwrap();
        let (back, _) = l.contract_bond(r);
        assert!((back.to_lfused() - g2.to_lfused()).norm() < 1e-12);
    }
}
