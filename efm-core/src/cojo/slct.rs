//! Stepwise model selection (forward entry, backward elimination).

use std::collections::HashSet;

use tracing::debug;

use super::model::{FitError, JointFit, SummaryModel};
use super::{CojoParams, FallbackReason, JointSignal};

/// Select the independent signals of a region.
///
/// Each forward step adds the candidate with the smallest conditional P
/// below the threshold, skipping candidates collinear with the current
/// set. After each addition, selected variants whose joint P rose above
/// the threshold are dropped. Dropped and collinear candidates are not
/// reconsidered, which bounds the number of steps.
pub fn stepwise_select(
    model: &SummaryModel,
    params: &CojoParams,
) -> Result<Vec<JointSignal>, FallbackReason> {
    let n = model.len();
    if n == 0 {
        return Err(FallbackReason::TooFewVariants);
    }

    // Start from the most significant marginal variant.
    let first = (0..n)
        .min_by(|&a, &b| model.marginal_p(a).total_cmp(&model.marginal_p(b)))
        .ok_or(FallbackReason::TooFewVariants)?;
    if model.marginal_p(first) >= params.p_threshold {
        return Err(FallbackReason::NoSignal);
    }

    let mut selected = vec![first];
    let mut excluded: HashSet<usize> = HashSet::new();
    let mut fit = model.joint(&selected).map_err(fit_fallback)?;

    let mut steps = 0usize;
    loop {
        let mut best: Option<(usize, f64)> = None;
        for c in 0..n {
            if selected.contains(&c) || excluded.contains(&c) {
                continue;
            }
            let Some(cond) = model.conditional(c, &fit) else {
                continue;
            };
            if cond.r2 >= params.collinear {
                excluded.insert(c);
                continue;
            }
            if !cond.p.is_finite() {
                continue;
            }
            let better = match best {
                None => true,
                Some((b, bp)) => cond.p < bp || (cond.p == bp && c < b),
            };
            if better {
                best = Some((c, cond.p));
            }
        }

        let Some((c, p)) = best else {
            break;
        };
        if p >= params.p_threshold {
            break;
        }
        if steps >= params.max_iter {
            debug!("stepwise selection stopped after {} steps", steps);
            return Err(FallbackReason::NotConverged);
        }

        selected.push(c);
        fit = match model.joint(&selected) {
            Ok(f) => f,
            Err(_) => {
                // Numerically collinear despite the R² check.
                selected.pop();
                excluded.insert(c);
                continue;
            }
        };
        steps += 1;
        debug!(
            "step {}: added {} (conditional p = {:.3e}), {} selected",
            steps,
            model.id(c),
            p,
            selected.len()
        );

        fit = backward_eliminate(model, params, &mut selected, &mut excluded, fit)?;
    }

    Ok(signals(model, &fit))
}

/// Drop selected variants with joint P above the threshold, worst first.
fn backward_eliminate(
    model: &SummaryModel,
    params: &CojoParams,
    selected: &mut Vec<usize>,
    excluded: &mut HashSet<usize>,
    mut fit: JointFit,
) -> Result<JointFit, FallbackReason> {
    while selected.len() > 1 {
        let worst = fit
            .p
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &p)| (i, p));
        match worst {
            Some((i, p)) if p > params.p_threshold => {
                let removed = selected.remove(i);
                excluded.insert(removed);
                debug!("removed {} (joint p = {:.3e})", model.id(removed), p);
                fit = model.joint(selected).map_err(fit_fallback)?;
            }
            _ => break,
        }
    }
    Ok(fit)
}

fn signals(model: &SummaryModel, fit: &JointFit) -> Vec<JointSignal> {
    fit.members
        .iter()
        .enumerate()
        .map(|(i, &j)| JointSignal {
            snpid: model.id(j).clone(),
            beta: fit.beta[i],
            se: fit.se[i],
            p: fit.p[i],
        })
        .collect()
}

fn fit_fallback(e: FitError) -> FallbackReason {
    match e {
        FitError::Singular(_) => FallbackReason::Singular,
        FitError::Degenerate => FallbackReason::Degenerate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ld::{LdProvider, StaticLd};
    use efm_geno::Variant;

    fn var(bp: u64, beta: f64, se: f64, p: f64) -> Variant {
        Variant::new(1, bp, None, "A", "G", Some(0.3), None, beta, se, p).unwrap()
    }

    fn params() -> CojoParams {
        CojoParams {
            sample_size: Some(50_000.0),
            ..Default::default()
        }
    }

    fn model(vars: &[&Variant], ld: StaticLd) -> SummaryModel {
        let slice = ld.ld_slice(1, vars).unwrap();
        SummaryModel::build(vars, slice, &params()).unwrap()
    }

    #[test]
    fn test_two_independent_signals() {
        let a = var(100, 0.06, 0.005, 3.5e-33);
        let b = var(5_000, 0.04, 0.005, 1.2e-15);
        let c = var(9_000, 0.005, 0.005, 0.3);
        let m = model(&[&a, &b, &c], StaticLd::new());
        let sig = stepwise_select(&m, &params()).unwrap();
        let ids: Vec<_> = sig.iter().map(|s| s.snpid.clone()).collect();
        assert_eq!(ids, vec![a.snpid.clone(), b.snpid.clone()]);
        assert!(sig.iter().all(|s| s.p < 5e-8));
    }

    #[test]
    fn test_proxy_is_not_selected() {
        let a = var(100, 0.06, 0.005, 3.5e-33);
        let proxy = var(200, 0.058, 0.005, 1e-30);
        let m = model(
            &[&a, &proxy],
            StaticLd::new().with_r(&a.snpid, &proxy.snpid, 0.98),
        );
        let sig = stepwise_select(&m, &params()).unwrap();
        assert_eq!(sig.len(), 1);
        assert_eq!(sig[0].snpid, a.snpid);
    }

    #[test]
    fn test_no_signal() {
        let a = var(100, 0.01, 0.005, 0.04);
        let m = model(&[&a], StaticLd::new());
        assert_eq!(
            stepwise_select(&m, &params()),
            Err(FallbackReason::NoSignal)
        );
    }

    #[test]
    fn test_iteration_cap() {
        let a = var(100, 0.06, 0.005, 3.5e-33);
        let b = var(5_000, 0.04, 0.005, 1.2e-15);
        let c = var(9_000, 0.035, 0.005, 2.6e-12);
        let m = model(&[&a, &b, &c], StaticLd::new());
        let p = CojoParams {
            max_iter: 1,
            ..params()
        };
        assert_eq!(stepwise_select(&m, &p), Err(FallbackReason::NotConverged));
    }

    #[test]
    fn test_iteration_cap_reached_exactly() {
        // One forward step is all this region needs.
        let a = var(100, 0.06, 0.005, 3.5e-33);
        let b = var(5_000, 0.04, 0.005, 1.2e-15);
        let m = model(&[&a, &b], StaticLd::new());
        let p = CojoParams {
            max_iter: 1,
            ..params()
        };
        assert_eq!(stepwise_select(&m, &p).unwrap().len(), 2);
    }
}
