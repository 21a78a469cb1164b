//! LD correlation from reference panel dosages.
//!
//! Panel genotypes count the bim's first allele. Each column is first
//! aligned to the effect allele of the summary statistics, so that the
//! sign of r and the reference EAF both refer to that allele. Missing
//! genotypes are skipped pairwise.

use efm_geno::plink::AlleleStats;
use efm_linalg::dense::DenseMatrix;

/// Standard deviations at or below this are treated as monomorphic.
const MIN_SD: f64 = 1e-10;

/// Dosages of one panel variant, counting the effect allele.
#[derive(Debug, Clone)]
pub struct AlignedDosages {
    values: Vec<f64>,
    stats: AlleleStats,
    mean: f64,
    sd: f64,
}

impl AlignedDosages {
    /// `flip` when the panel counts the other allele.
    pub fn new(mut values: Vec<f64>, flip: bool) -> Self {
        if flip {
            values.iter_mut().for_each(|x| *x = 2.0 - *x);
        }
        let stats = AlleleStats::from_dosages(&values);
        let (mut sum_sq, mean) = (0.0, 2.0 * stats.af);
        for &x in values.iter().filter(|x| !x.is_nan()) {
            sum_sq += (x - mean) * (x - mean);
        }
        let sd = if stats.n_valid > 0 {
            (sum_sq / stats.n_valid as f64).sqrt()
        } else {
            0.0
        };
        AlignedDosages {
            values,
            stats,
            mean,
            sd,
        }
    }

    /// Reference frequency of the effect allele.
    pub fn eaf(&self) -> f64 {
        self.stats.af
    }

    pub fn mac(&self) -> f64 {
        self.stats.mac
    }

    fn is_monomorphic(&self) -> bool {
        self.sd <= MIN_SD
    }

    /// Pearson r over the samples observed at both variants.
    fn r_with(&self, other: &AlignedDosages) -> f64 {
        if self.is_monomorphic() || other.is_monomorphic() {
            return 0.0;
        }
        let mut cov = 0.0;
        let mut count = 0usize;
        for (&a, &b) in self.values.iter().zip(&other.values) {
            if !a.is_nan() && !b.is_nan() {
                cov += (a - self.mean) * (b - other.mean);
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        (cov / (count as f64 * self.sd * other.sd)).clamp(-1.0, 1.0)
    }
}

/// Correlation matrix of the columns, with a unit diagonal. Monomorphic
/// columns are uncorrelated with everything else.
pub fn ld_matrix(columns: &[AlignedDosages]) -> DenseMatrix {
    let m = columns.len();
    let mut ld = DenseMatrix::zeros(m, m);
    for i in 0..m {
        ld.set(i, i, 1.0);
        for j in (i + 1)..m {
            ld.set_symmetric(i, j, columns[i].r_with(&columns[j]));
        }
    }
    ld
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(vs: &[&[f64]]) -> Vec<AlignedDosages> {
        vs.iter().map(|v| AlignedDosages::new(v.to_vec(), false)).collect()
    }

    #[test]
    fn test_perfect_correlation() {
        let g = [0.0, 1.0, 2.0, 0.0, 1.0];
        let ld = ld_matrix(&cols(&[&g, &g]));
        assert!((ld.get(0, 1) - 1.0).abs() < 1e-10);
        assert!((ld.get(1, 0) - 1.0).abs() < 1e-10);
        assert_eq!(ld.get(1, 1), 1.0);
    }

    #[test]
    fn test_flip_aligns_sign_and_frequency() {
        let g = vec![0.0, 1.0, 2.0, 0.0, 1.0];
        let other: Vec<f64> = g.iter().map(|x| 2.0 - x).collect();
        let same = ld_matrix(&[
            AlignedDosages::new(g.clone(), false),
            AlignedDosages::new(other.clone(), true),
        ]);
        assert!((same.get(0, 1) - 1.0).abs() < 1e-10);

        let opposite = ld_matrix(&cols(&[&g, &other]));
        assert!((opposite.get(0, 1) + 1.0).abs() < 1e-10);

        let flipped = AlignedDosages::new(vec![2.0, 2.0, 1.0, 0.0], true);
        assert!((flipped.eaf() - 0.375).abs() < 1e-12);
        assert_eq!(flipped.mac(), 3.0);
    }

    #[test]
    fn test_monomorphic_and_missing() {
        let ld = ld_matrix(&cols(&[&[0.0, 1.0, f64::NAN, 2.0], &[1.0, 1.0, 1.0, 1.0]]));
        assert_eq!(ld.get(0, 1), 0.0);
        assert_eq!(ld.get(1, 1), 1.0);

        let all_missing = AlignedDosages::new(vec![f64::NAN; 3], false);
        assert!(all_missing.is_monomorphic());
    }

    #[test]
    fn test_symmetric() {
        let ld = ld_matrix(&cols(&[&[0.0, 1.0, 2.0], &[1.0, 1.0, 0.0], &[2.0, 0.0, 1.0]]));
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(ld.get(i, j), ld.get(j, i));
            }
        }
    }
}
