//! Matrix product states held in a mixed-canonical gauge around a single
//! orthogonality center.
//!
//! Non-unitary local operators (e.g. Kraus operators of weak measurements)
//! change the norm of a state, so unlike a Γ–Λ factorization with stored
//! Schmidt values, the gauge here tracks only *which* tensor carries the norm.
//! Every tensor to the left of the center is left-orthonormal and every tensor
//! to the right is right-orthonormal, which makes the norm, local
//! expectation values, and the Schmidt spectrum at any bond next to the center
//! cheap to compute.
//!
//! ```text
//!      .-bond 0-.        .-bond 1-.        .-bond n-2-.
//!      V        V        V        V        V          V
//! A[0] ------------ A[1] ------------ ... ------------ A[n-1]
//!  |                 |                                   |
//!  | <- physical     | <- physical                       | <- physical
//!       index 0           index 1                             index n-1
//! ```

use std::mem;
use nalgebra as na;
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use thiserror::Error;
use crate::{
    gamma::{ Gamma, Schmidt, Truncation },
    ops::LocalState,
};

#[derive(Debug, Error)]
pub enum MPSError {
    #[error("error in MPS creation: cannot create for an empty system")]
    EmptySystem,

    #[error("error in MPS creation: unphysical zero-dimensional physical index")]
    UnphysicalIndex,

    #[error("error in MPS creation: array length/shape doesn't match indices")]
    StateIncompatibleShape,

    #[error("error in operator application: incorrect shape")]
    OperatorIncompatibleShape,

    #[error("site index {0} out of bounds for a chain of {1} sites")]
    SiteOutOfBounds(usize, usize),

    #[error("bond index {0} out of bounds for a chain of {1} sites")]
    BondOutOfBounds(usize, usize),

    #[error("cannot contract states of {0} and {1} sites")]
    LengthMismatch(usize, usize),

    #[error("state has zero norm")]
    ZeroNorm,

    #[error("encountered non-finite tensor elements")]
    NonFinite,

    #[error("singular value decomposition failed to converge")]
    SvdFailed,
}
use MPSError::*;
pub type MPSResult<T> = Result<T, MPSError>;

/// A (pure) matrix product state.
///
/// Two-site operations and [`truncate`][Self::truncate] discard bond space
/// according to a [`Truncation`] policy; operations that can fail leave `self`
/// in an unspecified state when they do, so callers that need to recover
/// should act on a clone.
#[derive(Clone, Debug, PartialEq)]
pub struct MPS {
    // number of sites, ≥ 1
    pub(crate) n: usize,
    // site tensors
    pub(crate) data: Vec<Gamma>,
    // orthogonality center, if known
    pub(crate) center: Option<usize>,
    // default truncation for two-site operations
    pub(crate) trunc: Truncation,
}

impl MPS {
    /// Create a product state from a list of local state vectors, which are
    /// individually normalized.
    ///
    /// Fails if no vectors are given, any vector is empty, or any vector has
    /// zero or non-finite norm.
    pub fn from_locals<I>(locals: I, trunc: Truncation) -> MPSResult<Self>
    where I: IntoIterator<Item = na::DVector<C64>>
    {
        let data: Vec<Gamma> =
            locals.into_iter()
            .map(|v| {
                let dim = v.len();
                if dim == 0 { return Err(UnphysicalIndex); }
                let norm = v.norm();
                if !norm.is_finite() { return Err(NonFinite); }
                if norm <= 0.0 { return Err(ZeroNorm); }
                let col = v.unscale(norm);
                Ok(Gamma::new_lfused(
                    dim, na::DMatrix::from_column_slice(dim, 1, col.as_slice())))
            })
            .collect::<MPSResult<_>>()?;
        if data.is_empty() { return Err(EmptySystem); }
        Ok(Self { n: data.len(), data, center: Some(0), trunc })
    }

    /// Create a product state from a list of labels.
    pub fn new_product<I>(states: I, trunc: Truncation) -> MPSResult<Self>
    where I: IntoIterator<Item = LocalState>
    {
        Self::from_locals(states.into_iter().map(LocalState::vector), trunc)
    }

    /// Create `n` qubits initialized to `∣0...0⟩`.
    pub fn new_qubits(n: usize, trunc: Truncation) -> MPSResult<Self> {
        Self::new_product((0..n).map(|_| LocalState::Up), trunc)
    }

    /// Factorize a dense state vector with physical dimensions `dims`.
    ///
    /// The state vector is indexed with the leftmost site varying fastest,
    /// e.g. for two qubits
    /// ```text
    /// ∣00⟩ ∣10⟩ ∣01⟩ ∣11⟩
    /// ```
    /// The state is normalized and left in left-canonical form (orthogonality
    /// center on the last site).
    ///
    /// Fails if `dims` is empty or contains a zero, if the length of `state`
    /// doesn't match, or if the state has zero norm.
    pub fn from_vector<I>(dims: &[usize], state: I, trunc: Truncation)
        -> MPSResult<Self>
    where I: IntoIterator<Item = C64>
    {
        if dims.is_empty() { return Err(EmptySystem); }
        if dims.iter().any(|d| *d == 0) { return Err(UnphysicalIndex); }
        let state: Vec<C64> = state.into_iter().collect();
        let statelen: usize = dims.iter().product();
        if state.len() != statelen { return Err(StateIncompatibleShape); }
        let n = dims.len();
        let mut q = na::DMatrix::from_column_slice(1, statelen, &state);
        let norm = q.norm();
        if !norm.is_finite() { return Err(NonFinite); }
        if norm <= 0.0 { return Err(ZeroNorm); }
        q.unscale_mut(norm);
        let mut data: Vec<Gamma> = Vec::with_capacity(n);
        let mut udim: usize = 1;
        for &d in dims.iter().take(n - 1) {
            let reslen = q.len() / (udim * d);
            q = q.reshape_generic(na::Dyn(udim * d), na::Dyn(reslen));
            let Schmidt { u, s: _, q: rest, rank } =
                Schmidt::from_decomp(q, trunc, true)?;
            data.push(Gamma::new_lfused(d, u));
            q = rest;
            udim = rank;
        }
        let dlast = dims[n - 1];
        data.push(Gamma::new_lfused(
            dlast, q.reshape_generic(na::Dyn(udim * dlast), na::Dyn(1))));
        Ok(Self { n, data, center: Some(n - 1), trunc })
    }

    /// Contract the entire state into a dense vector, using the same index
    /// ordering as [`from_vector`][Self::from_vector].
    pub fn into_vector(self) -> na::DVector<C64> {
        let mut iter = self.data.into_iter();
        // n ≥ 1 is guaranteed by every constructor
        let Some(first) = iter.next() else { unreachable!() };
        let mat = iter.fold(first, |acc, g| acc.contract_bond(g).0).unwrap_lfused();
        na::DVector::from_column_slice(mat.as_slice())
    }

    /// Return the number of sites.
    pub fn n(&self) -> usize { self.n }

    /// Return the current orthogonality center, if known.
    pub fn center(&self) -> Option<usize> { self.center }

    /// Return the default truncation policy for two-site operations.
    pub fn trunc(&self) -> Truncation { self.trunc }

    /// Set the default truncation policy for two-site operations.
    pub fn set_trunc(&mut self, trunc: Truncation) -> &mut Self {
        self.trunc = trunc;
        self
    }

    /// Return the physical dimension of the `k`-th site.
    pub fn phys_dim(&self, k: usize) -> Option<usize> {
        self.data.get(k).map(Gamma::mdim)
    }

    /// Return the dimension of the `b`-th bond, between sites `b` and `b + 1`.
    pub fn bond_dim(&self, b: usize) -> Option<usize> {
        (b + 1 < self.n).then(|| self.data[b].dims().2)
    }

    /// Return the largest bond dimension in the chain (1 for a single site).
    pub fn max_bond_dim(&self) -> usize {
        (0 .. self.n - 1)
            .map(|b| self.data[b].dims().2)
            .max()
            .unwrap_or(1)
    }

    // QR-factor the `j`-th tensor, keeping the isometry and pushing the
    // triangular part into the right neighbor
    //
    // assumes `j + 1` is in bounds
    fn shift_right(&mut self, j: usize) {
        let g = mem::take(&mut self.data[j]);
        let d = g.mdim();
        let qr = g.unwrap_lfused().qr();
        let (q, r) = (qr.q(), qr.r());
        self.data[j] = Gamma::new_lfused(d, q);
        let next = mem::take(&mut self.data[j + 1]);
        let dn = next.mdim();
        self.data[j + 1] = Gamma::new_rfused(dn, r * next.unwrap_rfused());
    }

    // mirror of `shift_right`, using the QR decomposition of the adjoint
    //
    // assumes `j ≥ 1`
    fn shift_left(&mut self, j: usize) {
        let g = mem::take(&mut self.data[j]);
        let d = g.mdim();
        let qr = g.unwrap_rfused().adjoint().qr();
        let (q, r) = (qr.q(), qr.r());
        self.data[j] = Gamma::new_rfused(d, q.adjoint());
        let prev = mem::take(&mut self.data[j - 1]);
        let dp = prev.mdim();
        self.data[j - 1] = Gamma::new_lfused(dp, prev.unwrap_lfused() * r.adjoint());
    }

    /// Move the orthogonality center to site `k`.
    ///
    /// If the center is unknown, every tensor is re-gauged.
    ///
    /// Fails if `k` is out of bounds.
    pub fn orthogonalize(&mut self, k: usize) -> MPSResult<&mut Self> {
        if k >= self.n { return Err(SiteOutOfBounds(k, self.n)); }
        match self.center {
            Some(c) if c == k => { },
            Some(c) if c < k => {
                (c..k).for_each(|j| { self.shift_right(j); });
            },
            Some(c) => {
                (k + 1 ..= c).rev().for_each(|j| { self.shift_left(j); });
            },
            None => {
                (0..k).for_each(|j| { self.shift_right(j); });
                (k + 1 .. self.n).rev().for_each(|j| { self.shift_left(j); });
            },
        }
        self.center = Some(k);
        Ok(self)
    }

    /// Return the norm of the state.
    pub fn norm(&self) -> f64 {
        match self.center {
            Some(c) => self.data[c].norm(),
            None => self.overlap(self).re.max(0.0).sqrt(),
        }
    }

    /// Return the squared norm of the state.
    pub fn norm_sq(&self) -> f64 { self.norm().powi(2) }

    /// Rescale the state to unit norm, returning the previous norm.
    ///
    /// Fails if the norm is zero or non-finite.
    pub fn normalize(&mut self) -> MPSResult<f64> {
        let c = self.center.unwrap_or(0);
        self.orthogonalize(c)?;
        let norm = self.data[c].norm();
        if !norm.is_finite() { return Err(NonFinite); }
        if norm <= 0.0 { return Err(ZeroNorm); }
        self.data[c].scale(norm.recip());
        Ok(norm)
    }

    /// Apply a single-site operator to the `k`-th site.
    ///
    /// The orthogonality center is moved to `k` first and stays there, so the
    /// operator need not be unitary.
    ///
    /// Fails if `k` is out of bounds or `op` has the wrong shape.
    pub fn apply_op1(&mut self, k: usize, op: &na::DMatrix<C64>)
        -> MPSResult<&mut Self>
    {
        if k >= self.n { return Err(SiteOutOfBounds(k, self.n)); }
        let d = self.data[k].mdim();
        if op.shape() != (d, d) { return Err(OperatorIncompatibleShape); }
        self.orthogonalize(k)?;
        self.data[k].apply_op(op);
        Ok(self)
    }

    // contract the `k`-th and `k + 1`-th tensors across their shared bond, act
    // on the two-site tensor, and refactor with truncation, leaving the
    // orthogonality center on `k + 1`
    //
    // assumes `k + 1` is in bounds
    fn map_pair<F>(&mut self, k: usize, trunc: Truncation, f: F) -> MPSResult<()>
    where F: FnOnce(&mut Gamma)
    {
        self.orthogonalize(k)?;
        let gl = mem::take(&mut self.data[k]);
        let gr = mem::take(&mut self.data[k + 1]);
        let (mut g2, (lphys, rphys)) = gl.contract_bond(gr);
        f(&mut g2);
        self.center = None;
        let (gl_new, _, gr_new) = g2.factor(lphys, rphys, trunc)?;
        self.data[k] = gl_new;
        self.data[k + 1] = gr_new;
        self.center = Some(k + 1);
        Ok(())
    }

    fn check_pair(&self, k: usize) -> MPSResult<(usize, usize)> {
        if k + 1 >= self.n { return Err(BondOutOfBounds(k, self.n)); }
        Ok((self.data[k].mdim(), self.data[k + 1].mdim()))
    }

    /// Apply a two-site operator to the `k`-th and `k + 1`-th sites, truncating
    /// the bond between them with the state's default policy.
    ///
    /// `op` is indexed as described in [`kron2`][crate::ops::kron2]. The
    /// orthogonality center is left on `k + 1`.
    ///
    /// Fails if `k + 1` is out of bounds, `op` has the wrong shape, or the
    /// refactorization fails.
    pub fn apply_op2(&mut self, k: usize, op: &na::DMatrix<C64>)
        -> MPSResult<&mut Self>
    {
        let trunc = self.trunc;
        self.apply_op2_trunc(k, op, trunc)
    }

    /// Like [`apply_op2`][Self::apply_op2], but with an explicit truncation
    /// policy.
    pub fn apply_op2_trunc(
        &mut self,
        k: usize,
        op: &na::DMatrix<C64>,
        trunc: Truncation,
    ) -> MPSResult<&mut Self>
    {
        let (dl, dr) = self.check_pair(k)?;
        if op.shape() != (dl * dr, dl * dr) {
            return Err(OperatorIncompatibleShape);
        }
        self.map_pair(k, trunc, |g2| { g2.apply_op(op); })?;
        Ok(self)
    }

    /// Re-truncate the `b`-th bond without acting on the state otherwise. The
    /// orthogonality center is left on `b + 1`.
    ///
    /// Fails if `b + 1` is out of bounds or the refactorization fails.
    pub fn compress_bond(&mut self, b: usize, trunc: Truncation)
        -> MPSResult<&mut Self>
    {
        self.check_pair(b)?;
        self.map_pair(b, trunc, |_| ())?;
        Ok(self)
    }

    /// Re-truncate every bond in a single right-to-left sweep. The
    /// orthogonality center is left on the first site.
    ///
    /// Fails if any refactorization fails.
    pub fn truncate(&mut self, trunc: Truncation) -> MPSResult<&mut Self> {
        self.orthogonalize(self.n - 1)?;
        for j in (1 .. self.n).rev() {
            let g = mem::take(&mut self.data[j]);
            let d = g.mdim();
            self.center = None;
            let Schmidt { mut u, s, q, rank: _ } =
                Schmidt::from_decomp(g.unwrap_rfused(), trunc, false)?;
            self.data[j] = Gamma::new_rfused(d, q);
            u.column_iter_mut().zip(s.iter())
                .for_each(|(mut col, sv)| { col.scale_mut(*sv); });
            let prev = mem::take(&mut self.data[j - 1]);
            let dp = prev.mdim();
            self.data[j - 1] = Gamma::new_lfused(dp, prev.unwrap_lfused() * u);
            self.center = Some(j - 1);
        }
        Ok(self)
    }

    // ⟨self|other⟩ without checks
    fn overlap(&self, other: &Self) -> C64 {
        let mut env = na::DMatrix::from_element(1, 1, C64::one());
        for (a, b) in self.data.iter().zip(&other.data) {
            let (_, d, na_) = a.dims();
            let (_, _, nb) = b.dims();
            let mut next = na::DMatrix::zeros(na_, nb);
            for s in 0..d {
                next += a.block(s).adjoint() * &env * b.block(s);
            }
            env = next;
        }
        env[(0, 0)]
    }

    /// Compute the inner product `⟨self|other⟩`.
    ///
    /// Fails if the two states have different numbers of sites or physical
    /// dimensions.
    pub fn inner(&self, other: &Self) -> MPSResult<C64> {
        if self.n != other.n { return Err(LengthMismatch(self.n, other.n)); }
        let dims_match =
            self.data.iter().zip(&other.data)
            .all(|(a, b)| a.mdim() == b.mdim());
        if !dims_match { return Err(StateIncompatibleShape); }
        Ok(self.overlap(other))
    }

    /// Return the Schmidt values across the `b`-th bond, in descending order.
    ///
    /// The values are those of the state as it is, and so are normalized only
    /// if the state is.
    ///
    /// Fails if `b + 1` is out of bounds or the decomposition fails.
    pub fn schmidt_values(&mut self, b: usize) -> MPSResult<na::DVector<f64>> {
        self.check_pair(b)?;
        self.orthogonalize(b)?;
        Schmidt::values(self.data[b].to_lfused())
    }

    /// Compute the expectation value of a single-site operator.
    pub fn expectation_value(&mut self, k: usize, op: &na::DMatrix<C64>)
        -> MPSResult<C64>
    {
        self.correlator(op, &[k])
    }

    /// Compute `⟨ψ| op_i op_j ... |ψ⟩` for the same single-site operator placed
    /// on every listed site.
    ///
    /// See [`correlators`][Self::correlators].
    pub fn correlator(&mut self, op: &na::DMatrix<C64>, sites: &[usize])
        -> MPSResult<C64>
    {
        self.correlators(op, &[sites])
            .map(|vals| vals.into_iter().next().unwrap_or_else(C64::zero))
    }

    /// Compute `⟨ψ| op_i op_j ... |ψ⟩` for many site lists in one batch.
    ///
    /// Site lists may be in any order and may contain repeats; a site listed
    /// `m` times receives `op^m`. Operators on distinct sites commute, so the
    /// result doesn't depend on the order within a list. The empty list gives
    /// `⟨ψ|ψ⟩`.
    ///
    /// Lists are evaluated in order of their leftmost site, with the
    /// orthogonality center moving monotonically to the right, and each
    /// value is contracted only between its leftmost and rightmost sites.
    ///
    /// Fails if any site is out of bounds or `op` doesn't match a site's
    /// physical dimension.
    pub fn correlators<S>(&mut self, op: &na::DMatrix<C64>, sets: &[S])
        -> MPSResult<Vec<C64>>
    where S: AsRef<[usize]>
    {
        let reduced: Vec<Vec<(usize, usize)>> =
            sets.iter()
            .map(|set| self.reduce_sites(op, set.as_ref()))
            .collect::<MPSResult<_>>()?;
        let mut order: Vec<usize> = (0..reduced.len()).collect();
        order.sort_by_key(|&j| reduced[j].first().map(|(k, _)| *k).unwrap_or(0));
        let mut powers: Vec<na::DMatrix<C64>> = vec![op.clone()];
        let mut vals: Vec<C64> = vec![C64::zero(); reduced.len()];
        for j in order {
            let sites = &reduced[j];
            vals[j] =
                match sites.first() {
                    None => C64::from(self.norm_sq()),
                    Some(&(k0, _)) => {
                        self.orthogonalize(k0)?;
                        self.contract_window(sites, op, &mut powers)
                    },
                };
        }
        Ok(vals)
    }

    // sort and group a site list into (site, multiplicity) pairs
    fn reduce_sites(&self, op: &na::DMatrix<C64>, sites: &[usize])
        -> MPSResult<Vec<(usize, usize)>>
    {
        let mut sorted = sites.to_vec();
        sorted.sort_unstable();
        let mut reduced: Vec<(usize, usize)> = Vec::with_capacity(sorted.len());
        for k in sorted {
            let Some(d) = self.phys_dim(k) else {
                return Err(SiteOutOfBounds(k, self.n));
            };
            if op.shape() != (d, d) { return Err(OperatorIncompatibleShape); }
            match reduced.last_mut() {
                Some((kk, m)) if *kk == k => { *m += 1; },
                _ => { reduced.push((k, 1)); },
            }
        }
        Ok(reduced)
    }

    // contract the window between the first and last listed sites
    //
    // assumes `sites` is non-empty and sorted, and that the orthogonality
    // center is on its first site; left of the window the environment is the
    // identity, right of it the trace
    fn contract_window(
        &self,
        sites: &[(usize, usize)],
        op: &na::DMatrix<C64>,
        powers: &mut Vec<na::DMatrix<C64>>,
    ) -> C64
    {
        let (k0, _) = sites[0];
        let (k1, _) = sites[sites.len() - 1];
        let m = self.data[k0].dims().0;
        let mut env: na::DMatrix<C64> = na::DMatrix::identity(m, m);
        let mut listed = sites.iter().peekable();
        for k in k0 ..= k1 {
            let local =
                match listed.peek() {
                    Some(&&(kk, mult)) if kk == k => {
                        listed.next();
                        while powers.len() < mult {
                            let next = powers[powers.len() - 1].clone() * op;
                            powers.push(next);
                        }
                        Some(&powers[mult - 1])
                    },
                    _ => None,
                };
            env = transfer(&env, &self.data[k], local);
        }
        env.trace()
    }
}

// E' = Σ_{s,t} O_st A_s† E A_t
fn transfer(env: &na::DMatrix<C64>, g: &Gamma, op: Option<&na::DMatrix<C64>>)
    -> na::DMatrix<C64>
{
    let (m, d, n) = g.dims();
    let blocks: Vec<na::DMatrix<C64>> = (0..d).map(|s| g.block(s)).collect();
    let mut next = na::DMatrix::zeros(n, n);
    for (s, a_s) in blocks.iter().enumerate() {
        let ket =
            match op {
                None => a_s.clone(),
                Some(op) => {
                    blocks.iter().enumerate()
                        .fold(na::DMatrix::zeros(m, n), |acc, (t, a_t)| {
                            acc + a_t * op[(s, t)]
                        })
                },
            };
        next += a_s.adjoint() * env * ket;
    }
    next
}
