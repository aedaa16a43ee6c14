//! Matrix product states for chains of few-level quantum systems, with the
//! operations needed to drive weak-measurement trajectories: local operator
//! application with bond truncation, re-gauging to an orthogonality center,
//! overlaps, Schmidt spectra, and batched multi-site correlators.

pub mod gamma;
pub mod mps;
pub mod ops;

pub use num_complex::Complex64 as C64;
pub use gamma::Truncation;
pub use mps::{ MPS, MPSError, MPSResult };
