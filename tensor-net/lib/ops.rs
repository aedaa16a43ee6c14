//! Local operators and product-state labels for chains of qubits.
//!
//! All matrices are written in the computational basis `∣0⟩, ∣1⟩`, where `∣0⟩`
//! is the +1 eigenstate of Z ("up"). Two-site operators act on the fused index
//! `p = s1 + 2 s2` of a neighboring pair, i.e. with the left site's index
//! varying fastest (see [`kron2`]).

use nalgebra as na;
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use once_cell::sync::Lazy;

/// Make a single-qubit identity.
pub fn make_id() -> na::DMatrix<C64> { na::DMatrix::identity(2, 2) }

/// Lazy-static version of [`make_id`].
pub static IMAT: Lazy<na::DMatrix<C64>> = Lazy::new(make_id);

/// Make a Pauli X.
pub fn make_x() -> na::DMatrix<C64> {
    na::DMatrix::from_row_slice(2, 2, &[
        C64::zero(), C64::one(),
        C64::one(),  C64::zero(),
    ])
}

/// Lazy-static version of [`make_x`].
pub static XMAT: Lazy<na::DMatrix<C64>> = Lazy::new(make_x);

/// Make a Pauli Y.
pub fn make_y() -> na::DMatrix<C64> {
    na::DMatrix::from_row_slice(2, 2, &[
        C64::zero(), -C64::i(),
        C64::i(),    C64::zero(),
    ])
}

/// Lazy-static version of [`make_y`].
pub static YMAT: Lazy<na::DMatrix<C64>> = Lazy::new(make_y);

/// Make a Pauli Z.
pub fn make_z() -> na::DMatrix<C64> {
    na::DMatrix::from_row_slice(2, 2, &[
        C64::one(),  C64::zero(),
        C64::zero(), -C64::one(),
    ])
}

/// Lazy-static version of [`make_z`].
pub static ZMAT: Lazy<na::DMatrix<C64>> = Lazy::new(make_z);

/// Make the two-site product Z ⊗ Z.
pub fn make_zz() -> na::DMatrix<C64> { kron2(&make_z(), &make_z()) }

/// Lazy-static version of [`make_zz`].
pub static ZZMAT: Lazy<na::DMatrix<C64>> = Lazy::new(make_zz);

/// Form the two-site operator acting as `a` on the left site and `b` on the
/// right site of a neighboring pair.
///
/// The result is indexed by `p = s1 + d1 s2`, matching the ordering produced by
/// [`Gamma::contract_bond`][crate::gamma::Gamma::contract_bond]:
/// ```text
/// ∣00⟩ ∣10⟩ ∣01⟩ ∣11⟩
/// ```
pub fn kron2(a: &na::DMatrix<C64>, b: &na::DMatrix<C64>) -> na::DMatrix<C64> {
    b.kronecker(a)
}

/// Named single-site operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LocalOp {
    /// Identity.
    Id,
    /// Pauli X.
    X,
    /// Pauli Y.
    Y,
    /// Pauli Z.
    Z,
}

impl LocalOp {
    /// Return the matrix representation of `self`.
    pub fn matrix(self) -> na::DMatrix<C64> {
        match self {
            Self::Id => IMAT.clone(),
            Self::X => XMAT.clone(),
            Self::Y => YMAT.clone(),
            Self::Z => ZMAT.clone(),
        }
    }

    /// Return `true` if `self` is diagonal in the computational basis.
    pub fn is_diagonal(self) -> bool { matches!(self, Self::Id | Self::Z) }
}

/// Labels for single-qubit states used to build product states.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LocalState {
    /// ∣0⟩, the +1 eigenstate of Z.
    Up,
    /// ∣1⟩, the –1 eigenstate of Z.
    Down,
    /// ∣+⟩, the +1 eigenstate of X.
    Plus,
    /// ∣–⟩, the –1 eigenstate of X.
    Minus,
}

impl LocalState {
    /// Return the normalized state vector for `self`.
    pub fn vector(self) -> na::DVector<C64> {
        let h = C64::from(std::f64::consts::FRAC_1_SQRT_2);
        match self {
            Self::Up => na::DVector::from_column_slice(&[C64::one(), C64::zero()]),
            Self::Down => na::DVector::from_column_slice(&[C64::zero(), C64::one()]),
            Self::Plus => na::DVector::from_column_slice(&[h, h]),
            Self::Minus => na::DVector::from_column_slice(&[h, -h]),
        }
    }
}
