//! efm-linalg: Linear algebra wrappers for easyfinemap-rs
//!
//! Provides the dense matrix type used for LD correlation slices and
//! the Cholesky-based SPD solvers behind joint and conditional effect
//! estimation.

pub mod decomposition;
pub mod dense;

pub use decomposition::{CholeskyDecomp, LinalgError};
pub use dense::DenseMatrix;
