//! Dense matrix operations backed by faer.
//!
//! LD correlation slices and the small normal-equation systems built
//! by the conditional selection engine are both dense and symmetric,
//! so a thin wrapper over faer's column-major `Mat<f64>` is enough.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Build a matrix entry by entry.
    pub fn from_fn<F>(nrows: usize, ncols: usize, f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        Self {
            inner: Mat::from_fn(nrows, ncols, f),
        }
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Set both (i, j) and (j, i).
    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.inner.write(i, j, value);
        self.inner.write(j, i, value);
    }

    /// Dot product of two slices.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn() {
        let m = DenseMatrix::from_fn(2, 3, |i, j| (i * 3 + j) as f64);
        assert_eq!(m.nrows(), 2);
        assert_eq!(m.ncols(), 3);
        assert_eq!(m.get(1, 2), 5.0);
    }

    #[test]
    fn test_set_symmetric() {
        let mut m = DenseMatrix::zeros(2, 2);
        m.set_symmetric(0, 1, 0.5);
        assert_eq!(m.get(1, 0), 0.5);
        m.set(1, 0, 0.4);
        assert_eq!(m.get(0, 1), 0.5);
    }

    #[test]
    fn test_dot() {
        assert_eq!(DenseMatrix::dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }
}
