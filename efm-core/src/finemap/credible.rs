//! Credible sets.

use std::cmp::Ordering;

use efm_geno::SnpId;

use super::Method;

/// A row carrying posterior probabilities for one or more methods.
pub trait Posterior {
    /// NaN when the method was not run or failed.
    fn pp(&self, method: Method) -> f64;
    fn p(&self) -> f64;
    fn snpid(&self) -> &SnpId;
}

/// PP descending with NaN last, then P ascending, then SNPID.
fn credible_order<T: Posterior>(a: &T, b: &T, method: Method) -> Ordering {
    let (pa, pb) = (a.pp(method), b.pp(method));
    let by_pp = match (pa.is_nan(), pb.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => pb.total_cmp(&pa),
    };
    by_pp
        .then_with(|| a.p().total_cmp(&b.p()))
        .then_with(|| a.snpid().cmp(b.snpid()))
}

/// Indices of the credible set of `rows` under `method`, in credible
/// order: the shortest prefix whose cumulative PP reaches
/// `threshold * max_causal` (capped at 1), crossing row included.
///
/// Without a threshold, or when the effective threshold is 1, the set is
/// the whole locus in input order.
pub fn credible_set<T: Posterior>(
    rows: &[T],
    method: Method,
    threshold: Option<f64>,
    max_causal: usize,
) -> Vec<usize> {
    let Some(t) = threshold else {
        return (0..rows.len()).collect();
    };
    let target = (t * max_causal.max(1) as f64).min(1.0);
    if target >= 1.0 {
        return (0..rows.len()).collect();
    }

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| credible_order(&rows[a], &rows[b], method));

    let mut set = Vec::new();
    let mut cum = 0.0;
    for i in order {
        let pp = rows[i].pp(method);
        if pp.is_nan() {
            break;
        }
        set.push(i);
        cum += pp;
        if cum >= target {
            break;
        }
    }
    set
}
