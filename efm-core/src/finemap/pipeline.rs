//! Fine-map every locus in parallel and assemble the annotated table.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use efm_geno::format::{format_float, format_opt};
use efm_geno::sumstats::{standard_fields, standard_header};
use efm_geno::variant::{genomic_order, significance_order};
use efm_geno::{SnpId, Variant};

use crate::cojo::{
    CojoEngine, CojoParams, ConditionalSelector, ConditionalStats, SelectionError,
    SelectionOutcome,
};
use crate::config::ConfigError;
use crate::ld::{LdProvider, LdSlice};
use crate::loci::output::COJO_COLUMNS;
use crate::model::Locus;

use super::abf::{run_abf, AbfError};
use super::credible::{credible_set, Posterior};
use super::scorer::{Effect, LocusInput, ScorerError, ScorerRegistry};
use super::{FinemapConfig, Method};

/// Collaborators of the fine-mapping run.
#[derive(Clone, Default)]
pub struct FinemapContext {
    pub ld: Option<Arc<dyn LdProvider>>,
    /// Overrides the in-process conditional engine built from `ld`.
    pub selector: Option<Arc<dyn ConditionalSelector>>,
    pub scorers: ScorerRegistry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVariant {
    pub variant: Variant,
    pub lead_snp: SnpId,
    pub pp: BTreeMap<Method, f64>,
    /// Effect conditional on nearby leads (conditional mode).
    pub cond: Option<ConditionalStats>,
}

impl Posterior for ScoredVariant {
    fn pp(&self, method: Method) -> f64 {
        self.pp.get(&method).copied().unwrap_or(f64::NAN)
    }

    fn p(&self) -> f64 {
        self.variant.p
    }

    fn snpid(&self) -> &SnpId {
        &self.variant.snpid
    }
}

/// A method that could not score a locus; its column is NaN there.
#[derive(Debug, Clone, PartialEq)]
pub struct LocusFailure {
    pub lead_snp: SnpId,
    pub method: Method,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct FinemapReport {
    pub methods: Vec<Method>,
    pub conditional: bool,
    pub rows: Vec<ScoredVariant>,
    pub failures: Vec<LocusFailure>,
}

#[derive(Error, Debug)]
pub enum FinemapError {
    #[error("no variants in input")]
    EmptyInput,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Abf(#[from] AbfError),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

struct LocusOutput {
    key: (u32, u64, u64, SnpId),
    rows: Vec<ScoredVariant>,
    failures: Vec<LocusFailure>,
}

/// Shared, read-only state of one run.
struct Run<'a> {
    config: &'a FinemapConfig,
    ctx: &'a FinemapContext,
    credible: Option<Method>,
    selector: Option<Arc<dyn ConditionalSelector>>,
}

/// Fine-map `loci` over `variants`. Output rows are ordered by locus
/// (CHR, START, END) and by position within a locus.
pub fn finemap_all_loci(
    variants: &[Variant],
    loci: &[Locus],
    config: &FinemapConfig,
    ctx: &FinemapContext,
) -> Result<FinemapReport, FinemapError> {
    if variants.is_empty() {
        return Err(FinemapError::EmptyInput);
    }
    config.validate()?;
    let credible = config.credible_selector()?;

    for &m in &config.methods {
        if m == Method::Abf {
            continue;
        }
        if ctx.scorers.get(m).is_none() {
            return Err(ConfigError::NoScorer(m.to_string()).into());
        }
        if m.requires_ld() && ctx.ld.is_none() {
            return Err(ConfigError::MissingLdReference(m.name()).into());
        }
    }

    let selector: Option<Arc<dyn ConditionalSelector>> = if config.conditional {
        Some(match &ctx.selector {
            Some(s) => Arc::clone(s),
            None => {
                let ld = ctx
                    .ld
                    .clone()
                    .ok_or(ConfigError::MissingLdReference("conditional fine-mapping"))?;
                let params = CojoParams {
                    sample_size: config.sample_size,
                    use_ref_eaf: config.use_ref_eaf,
                    ..Default::default()
                };
                Arc::new(CojoEngine::new(ld, params)?)
            }
        })
    } else {
        None
    };

    let mut by_chrom: HashMap<u32, Vec<&Variant>> = HashMap::new();
    for v in variants {
        by_chrom.entry(v.chrom).or_default().push(v);
    }
    for vs in by_chrom.values_mut() {
        vs.sort_by(|a, b| genomic_order(a, b));
    }
    let by_id: HashMap<&SnpId, &Variant> = variants.iter().map(|v| (&v.snpid, v)).collect();

    if loci.is_empty() {
        warn!("No loci to fine-map");
    }
    info!(
        "Fine-mapping {} loci with {}",
        loci.len(),
        config
            .methods
            .iter()
            .map(Method::name)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let run = Run {
        config,
        ctx,
        credible,
        selector,
    };

    let mut outputs: Vec<LocusOutput> = loci
        .par_iter()
        .map(|locus| {
            let all = by_chrom.get(&locus.chrom).map(Vec::as_slice).unwrap_or(&[]);
            let lo = all.partition_point(|v| v.bp < locus.start);
            let hi = all.partition_point(|v| v.bp <= locus.end);
            let fixed = if run.selector.is_some() {
                nearby_leads(locus, loci, &by_id, config.cond_snps_wind_kb)
            } else {
                Vec::new()
            };
            run.locus(locus, all[lo..hi].to_vec(), &fixed)
        })
        .collect::<Result<_, _>>()?;

    outputs.sort_by(|a, b| a.key.cmp(&b.key));

    let mut rows = Vec::new();
    let mut failures = Vec::new();
    for out in outputs {
        rows.extend(out.rows);
        failures.extend(out.failures);
    }
    if !failures.is_empty() {
        warn!("{} locus/method combinations failed and are reported as NA", failures.len());
    }
    Ok(FinemapReport {
        methods: config.methods.clone(),
        conditional: config.conditional,
        rows,
        failures,
    })
}

/// Lead variants of the other loci on the chromosome within `wind_kb` of
/// this locus' lead.
fn nearby_leads<'a>(
    locus: &Locus,
    loci: &[Locus],
    by_id: &HashMap<&SnpId, &'a Variant>,
    wind_kb: u64,
) -> Vec<&'a Variant> {
    let radius = wind_kb.saturating_mul(1000);
    let mut out: Vec<&Variant> = Vec::new();
    for other in loci {
        if other.chrom != locus.chrom
            || other.lead_snp == locus.lead_snp
            || other.lead_snp_bp.abs_diff(locus.lead_snp_bp) > radius
        {
            continue;
        }
        if let Some(&v) = by_id.get(&other.lead_snp) {
            if !out.iter().any(|o| o.snpid == v.snpid) {
                out.push(v);
            }
        }
    }
    out
}

fn usable(c: &ConditionalStats) -> bool {
    c.beta.is_finite() && c.se.is_finite() && c.se > 0.0
}

impl Run<'_> {
    fn locus(
        &self,
        locus: &Locus,
        mut subset: Vec<&Variant>,
        fixed: &[&Variant],
    ) -> Result<LocusOutput, FinemapError> {
        let config = self.config;
        let key = (locus.chrom, locus.start, locus.end, locus.lead_snp.clone());
        if subset.is_empty() {
            warn!("{}: no variants inside chr{}:{}-{}", locus.lead_snp, locus.chrom, locus.start, locus.end);
            return Ok(LocusOutput {
                key,
                rows: Vec::new(),
                failures: Vec::new(),
            });
        }
        if subset.len() > config.max_variants {
            warn!(
                "{}: {} variants, keeping the {} most significant",
                locus.lead_snp,
                subset.len(),
                config.max_variants
            );
            subset.sort_by(|a, b| significance_order(a, b));
            subset.truncate(config.max_variants);
            subset.sort_by(|a, b| genomic_order(a, b));
        }
        let n = subset.len();

        let cond = self.condition(locus, &subset, fixed)?;
        let effects: Vec<Effect> = subset
            .iter()
            .zip(&cond)
            .map(|(v, c)| match c {
                Some(c) if usable(c) => Effect {
                    snpid: v.snpid.clone(),
                    beta: c.beta,
                    se: c.se,
                },
                _ => Effect::marginal(v),
            })
            .collect();

        let needs_ld = config.methods.iter().any(Method::requires_ld);
        let mut ld_error = None;
        let ld: Option<LdSlice> = match (&self.ctx.ld, needs_ld) {
            (Some(provider), true) => match provider.ld_slice(locus.chrom, &subset) {
                Ok(slice) => Some(slice),
                Err(e) => {
                    ld_error = Some(e.to_string());
                    None
                }
            },
            _ => None,
        };

        let mut failures = Vec::new();
        let mut pp: BTreeMap<Method, Vec<f64>> = BTreeMap::new();
        for &m in &config.methods {
            let scored: Result<Vec<f64>, String> = match m {
                Method::Abf => Ok(run_abf(&effects, config.prior_w)?),
                _ => match (&ld_error, self.ctx.scorers.get(m)) {
                    (Some(reason), _) if m.requires_ld() => Err(format!("LD unavailable: {reason}")),
                    (_, Some(scorer)) => {
                        let input = LocusInput {
                            locus,
                            variants: &subset,
                            effects: &effects,
                            ld: ld.as_ref(),
                            sample_size: config.sample_size,
                            max_causal: config.max_causal,
                        };
                        scorer
                            .score(&input)
                            .and_then(|v| {
                                if v.len() == n {
                                    Ok(v)
                                } else {
                                    Err(ScorerError::Length {
                                        method: m,
                                        expected: n,
                                        got: v.len(),
                                    })
                                }
                            })
                            .map_err(|e| e.to_string())
                    }
                    (_, None) => Err(ConfigError::NoScorer(m.to_string()).to_string()),
                },
            };
            match scored {
                Ok(v) => {
                    pp.insert(m, v);
                }
                Err(reason) => {
                    warn!("{}: {} failed: {}", locus.lead_snp, m, reason);
                    failures.push(LocusFailure {
                        lead_snp: locus.lead_snp.clone(),
                        method: m,
                        reason,
                    });
                    pp.insert(m, vec![f64::NAN; n]);
                }
            }
        }

        let rows: Vec<ScoredVariant> = subset
            .iter()
            .zip(cond)
            .enumerate()
            .map(|(i, (v, c))| ScoredVariant {
                variant: (*v).clone(),
                lead_snp: locus.lead_snp.clone(),
                pp: pp.iter().map(|(m, col)| (*m, col[i])).collect(),
                cond: c,
            })
            .collect();

        let rows = match self.credible {
            Some(method) => {
                let mut keep = credible_set(&rows, method, config.credible_threshold, config.max_causal);
                keep.sort_unstable();
                debug!("{}: {} of {} variants in the credible set", locus.lead_snp, keep.len(), n);
                rows.into_iter()
                    .enumerate()
                    .filter(|(i, _)| keep.binary_search(i).is_ok())
                    .map(|(_, r)| r)
                    .collect()
            }
            None => rows,
        };

        Ok(LocusOutput {
            key,
            rows,
            failures,
        })
    }

    /// Conditional statistics aligned with `subset`; all `None` outside
    /// conditional mode or when conditioning falls back.
    fn condition(
        &self,
        locus: &Locus,
        subset: &[&Variant],
        fixed: &[&Variant],
    ) -> Result<Vec<Option<ConditionalStats>>, SelectionError> {
        let Some(selector) = &self.selector else {
            return Ok(vec![None; subset.len()]);
        };
        if fixed.is_empty() {
            // Nothing to condition on: conditional equals marginal.
            return Ok(subset
                .iter()
                .map(|v| {
                    Some(ConditionalStats {
                        snpid: v.snpid.clone(),
                        beta: v.beta,
                        se: v.se,
                        p: v.p,
                    })
                })
                .collect());
        }
        match selector.condition(locus.chrom, subset, fixed)? {
            SelectionOutcome::Selected(stats) => {
                let by_id: HashMap<SnpId, ConditionalStats> =
                    stats.into_iter().map(|s| (s.snpid.clone(), s)).collect();
                let out: Vec<Option<ConditionalStats>> =
                    subset.iter().map(|v| by_id.get(&v.snpid).cloned()).collect();
                let n_missing = out.iter().filter(|c| c.is_none()).count();
                if n_missing > 0 {
                    debug!(
                        "{}: {} variants keep marginal effects after conditioning on {} leads",
                        locus.lead_snp,
                        n_missing,
                        fixed.len()
                    );
                }
                Ok(out)
            }
            SelectionOutcome::Fallback(reason) => {
                warn!("{}: {}; fine-mapping marginal effects", locus.lead_snp, reason);
                Ok(vec![None; subset.len()])
            }
        }
    }
}

/// Annotated fine-mapping table: standard columns, one PP column per
/// method, conditional estimates in conditional mode, then LEAD_SNP.
pub fn write_finemap<W: Write>(mut w: W, report: &FinemapReport) -> std::io::Result<()> {
    let mut header: Vec<String> = standard_header().into_iter().map(String::from).collect();
    header.extend(report.methods.iter().map(Method::column));
    if report.conditional {
        header.extend(COJO_COLUMNS.iter().map(|c| c.to_string()));
    }
    header.push("LEAD_SNP".to_string());
    writeln!(w, "{}", header.join("\t"))?;

    for row in &report.rows {
        let mut fields = standard_fields(&row.variant);
        for &m in &report.methods {
            fields.push(format_float(row.pp(m)));
        }
        if report.conditional {
            let c = row.cond.as_ref();
            fields.push(format_opt(c.map(|c| c.beta)));
            fields.push(format_opt(c.map(|c| c.se)));
            fields.push(format_opt(c.map(|c| c.p)));
        }
        fields.push(row.lead_snp.to_string());
        writeln!(w, "{}", fields.join("\t"))?;
    }
    w.flush()
}
