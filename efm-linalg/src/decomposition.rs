#![allow(clippy::needless_range_loop)]
//! Cholesky factorization and SPD solvers.
//!
//! The joint and conditional effect estimates are the solution of
//! small symmetric positive definite systems (one row per selected
//! signal), so a straightforward Cholesky factorization is used.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix is not positive definite (pivot {pivot} = {value:.3e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },

    #[error("Matrix is not square: {nrows} x {ncols}")]
    NotSquare { nrows: usize, ncols: usize },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Result of a Cholesky decomposition.
#[derive(Debug, Clone)]
pub struct CholeskyDecomp {
    /// Lower triangular factor L such that A = L * L'.
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Pivots at or below this value are treated as a rank deficiency.
    pub const MIN_PIVOT: f64 = 1e-10;

    /// Compute the Cholesky decomposition of a symmetric positive definite matrix.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::NotSquare {
                nrows: n,
                ncols: a.ncols(),
            });
        }
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            // Relative to the original diagonal so that unscaled systems
            // (entries ~ N * 2pq) and correlation matrices behave alike.
            let diag = a.get(j, j) - sum;
            if !diag.is_finite() || diag <= Self::MIN_PIVOT * a.get(j, j).abs().max(1.0) {
                return Err(LinalgError::NotPositiveDefinite {
                    pivot: j,
                    value: diag,
                });
            }
            l.set(j, j, diag.sqrt());

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Dimension of the factored matrix.
    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
        let n = self.dim();
        if b.len() != n {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: b.len(),
            });
        }

        // Forward substitution: L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * y[j];
            }
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }

        // Backward substitution: L' * x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * x[j];
            }
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }

        Ok(x)
    }

    /// Quadratic form b' A^{-1} b without forming the inverse.
    pub fn inverse_quad_form(&self, b: &[f64]) -> Result<f64, LinalgError> {
        let x = self.solve(b)?;
        Ok(DenseMatrix::dot(b, &x))
    }

    /// Compute A^{-1} = (L L')^{-1} column by column.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.dim();
        let mut inv = DenseMatrix::zeros(n, n);
        for j in 0..n {
            let mut e = vec![0.0; n];
            e[j] = 1.0;
            // Dimensions match by construction.
            let col = self.solve(&e).unwrap_or_default();
            for (i, v) in col.into_iter().enumerate() {
                inv.set(i, j, v);
            }
        }
        inv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(n: usize, data: &[f64]) -> DenseMatrix {
        DenseMatrix::from_fn(n, n, |i, j| data[i * n + j])
    }

    #[test]
    fn test_cholesky() {
        // A = [[4, 2], [2, 3]]
        let a = matrix(2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        // L = [[2, 0], [1, sqrt(2)]]
        assert!((chol.l.get(0, 0) - 2.0).abs() < 1e-10);
        assert!((chol.l.get(1, 0) - 1.0).abs() < 1e-10);
        assert!((chol.l.get(1, 1) - 2.0f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_solve() {
        let a = matrix(3, &[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0]);
        let b = [1.0, 2.0, 3.0];
        let x = CholeskyDecomp::new(&a).unwrap().solve(&b).unwrap();
        for i in 0..3 {
            let ax: f64 = (0..3).map(|j| a.get(i, j) * x[j]).sum();
            assert!((ax - b[i]).abs() < 1e-10, "ax[{}]={} != {}", i, ax, b[i]);
        }
    }

    #[test]
    fn test_inverse() {
        let a = matrix(2, &[1.0, 0.5, 0.5, 1.0]);
        let inv = CholeskyDecomp::new(&a).unwrap().inverse();
        for i in 0..2 {
            for j in 0..2 {
                let prod: f64 = (0..2).map(|k| a.get(i, k) * inv.get(k, j)).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_perfectly_correlated_is_rejected() {
        // Two identical variants: r = 1 gives a singular correlation matrix.
        let a = matrix(2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(
            CholeskyDecomp::new(&a),
            Err(LinalgError::NotPositiveDefinite { pivot: 1, .. })
        ));
    }

    #[test]
    fn test_not_square() {
        assert_eq!(
            CholeskyDecomp::new(&DenseMatrix::zeros(2, 3)).unwrap_err(),
            LinalgError::NotSquare { nrows: 2, ncols: 3 }
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let chol = CholeskyDecomp::new(&matrix(2, &[1.0, 0.0, 0.0, 1.0])).unwrap();
        assert_eq!(
            chol.solve(&[1.0]),
            Err(LinalgError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_inverse_quad_form() {
        let a = matrix(2, &[2.0, 0.0, 0.0, 4.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        // b' A^-1 b = 1/2 + 4/4
        assert!((chol.inverse_quad_form(&[1.0, 2.0]).unwrap() - 1.5).abs() < 1e-12);
    }
}
