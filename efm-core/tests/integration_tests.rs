//! End-to-end tests: summary statistics in, loci and fine-mapping tables out.
//!
//! Inputs are written to temporary directories so the readers and writers
//! are exercised together with the engines.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use efm_core::cojo::{CojoEngine, CojoParams};
use efm_core::finemap::{finemap_all_loci, write_finemap, FinemapConfig, FinemapContext, Method};
use efm_core::ld::{LdProvider, PlinkLdReference, StaticLd};
use efm_core::loci::output::{read_loci, write_lead_snps, write_loci};
use efm_core::loci::{identify_loci, LociConfig, LociContext, StrategyParams};
use efm_geno::sumstats::read_sumstats;
use efm_geno::variant::make_snpid_unique;
use efm_geno::Variant;

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const HEADER: &str = "CHR\tBP\trsID\tEA\tNEA\tEAF\tMAF\tBETA\tSE\tP";

/// Chromosome 22 with one significant region around rs2236918.
fn chr22_sumstats() -> String {
    let rows = [
        "22\t29001000\trs9608281\tC\tT\t0.12\t0.12\t-0.0101\t0.0058\t0.082",
        "22\t29451671\trs2236918\tG\tA\t0.47\t0.47\t-0.0241\t0.0037\t7.99e-11",
        "22\t29460021\trs5753263\tT\tC\t0.46\t0.46\t-0.0225\t0.0037\t1.2e-9",
        "22\t29510980\trs9625420\tA\tG\t0.31\tNA\t0.0203\t0.0036\t3.4e-8",
        "22\t29700112\t.\tA\tC\t0.05\t0.05\t0.0101\t0.0090\t0.26",
        "22\t31500000\trs1007788\tG\tT\t0.22\t0.22\t0.0088\t0.0044\t0.046",
    ];
    let mut text = format!("{HEADER}\n");
    for r in rows {
        text.push_str(r);
        text.push('\n');
    }
    text
}

fn load(name: &str, content: &str) -> Vec<Variant> {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, name, content);
    let variants = read_sumstats(&path).unwrap();
    make_snpid_unique(variants).0
}

fn var(chrom: u32, bp: u64, beta: f64, se: f64, p: f64) -> Variant {
    Variant::new(chrom, bp, None, "A", "G", Some(0.3), None, beta, se, p).unwrap()
}

mod loci_identification {
    use super::*;

    #[test]
    fn test_chr22_distance_scenario() {
        let variants = load("chr22.txt", &chr22_sumstats());
        let res = identify_loci(&variants, &LociConfig::default(), &LociContext::default()).unwrap();

        let mut out = Vec::new();
        write_loci(&mut out, &res.loci).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().nth(1).unwrap(),
            "22\t28951671\t29951671\t22-29451671-A-G\t7.99e-11\t29451671"
        );
        assert_eq!(text.lines().count(), 2);

        let mut out = Vec::new();
        write_lead_snps(&mut out, &res.lead_snps).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().nth(1).unwrap(),
            "22\t29451671\trs2236918\tG\tA\t0.47\t0.47\t-0.0241\t0.0037\t7.99e-11\t22-29451671-A-G"
        );
    }

    #[test]
    fn test_distance_output_is_idempotent() {
        let variants = load("idem.txt", &chr22_sumstats());
        let render = |vars: &[Variant]| {
            let res = identify_loci(vars, &LociConfig::default(), &LociContext::default()).unwrap();
            let mut out = Vec::new();
            write_loci(&mut out, &res.loci).unwrap();
            write_lead_snps(&mut out, &res.lead_snps).unwrap();
            out
        };
        let first = render(&variants);
        let mut reversed = variants.clone();
        reversed.reverse();
        assert_eq!(first, render(&variants));
        assert_eq!(first, render(&reversed));
    }

    #[test]
    fn test_loci_table_round_trips_through_reader() {
        let variants = load("rt.txt", &chr22_sumstats());
        let res = identify_loci(&variants, &LociConfig::default(), &LociContext::default()).unwrap();
        let mut out = Vec::new();
        write_loci(&mut out, &res.loci).unwrap();
        let back = read_loci(out.as_slice(), "loci.txt").unwrap();
        assert_eq!(back, res.loci);
    }

    #[test]
    fn test_no_significant_variant_yields_one_locus() {
        let text = format!(
            "{HEADER}\n1\t1000\trs1\tA\tG\t0.2\t0.2\t0.01\t0.01\t0.3\n2\t5000000\trs2\tA\tG\t0.2\t0.2\t0.03\t0.01\t2e-3\n"
        );
        let variants = load("nosig.txt", &text);
        let res = identify_loci(&variants, &LociConfig::default(), &LociContext::default()).unwrap();
        assert_eq!(res.loci.len(), 1);
        assert_eq!(res.loci[0].chrom, 2);
        assert_eq!((res.loci[0].start, res.loci[0].end), (4_500_000, 5_500_000));
    }

    #[test]
    fn test_merge_loci_removes_overlap() {
        let variants = vec![
            var(1, 1_000_000, 0.1, 0.01, 1e-20),
            var(1, 1_800_000, 0.1, 0.01, 1e-10),
            var(1, 2_500_000, 0.1, 0.01, 1e-12),
        ];
        let overlapping = identify_loci(&variants, &LociConfig::default(), &LociContext::default()).unwrap();
        // 2.5 Mb leads before 1.8 Mb and cannot claim it.
        assert!(overlapping.overlapping);
        assert_eq!(overlapping.loci.len(), 3);

        let config = LociConfig {
            merge_loci: true,
            ..Default::default()
        };
        let merged = identify_loci(&variants, &config, &LociContext::default()).unwrap();
        assert!(!merged.overlapping);
        assert_eq!(merged.loci.len(), 1);
        assert_eq!(merged.loci[0].lead_snp_bp, 1_000_000);
        assert_eq!((merged.loci[0].start, merged.loci[0].end), (500_000, 3_000_000));
    }

    #[test]
    fn test_clumping_with_static_ld() {
        let lead = var(1, 1_000_000, 0.1, 0.01, 1e-20);
        let proxy = var(1, 1_050_000, 0.1, 0.01, 1e-15);
        let indep = var(1, 1_100_000, 0.1, 0.01, 1e-10);
        let ld = StaticLd::new()
            .with_r(&lead.snpid, &proxy.snpid, 0.8)
            .with_r(&lead.snpid, &indep.snpid, 0.1);
        let config = LociConfig {
            strategy: StrategyParams::Clumping {
                clump_kb: 500,
                clump_r2: 0.1,
            },
            ..Default::default()
        };
        let ctx = LociContext {
            ld: Some(Arc::new(ld)),
            ..Default::default()
        };
        let res = identify_loci(&[lead, proxy, indep], &config, &ctx).unwrap();
        let leads: Vec<u64> = res.lead_snps.iter().map(|l| l.variant.bp).collect();
        assert_eq!(leads, vec![1_000_000, 1_100_000]);
    }

    /// Pack A1 dosages into PLINK .bed bytes (4 samples per byte).
    fn pack(dosages: &[u8]) -> Vec<u8> {
        dosages
            .chunks(4)
            .map(|chunk| {
                chunk.iter().enumerate().fold(0u8, |byte, (k, &d)| {
                    let code = match d {
                        2 => 0b00,
                        1 => 0b10,
                        _ => 0b11,
                    };
                    byte | (code << (2 * k))
                })
            })
            .collect()
    }

    #[test]
    fn test_clumping_with_plink_reference() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = format!("{}/ref.chr{{chrom}}", dir.path().display());
        let chr_prefix = format!("{}/ref.chr22", dir.path().display());

        let mut fam = std::fs::File::create(format!("{chr_prefix}.fam")).unwrap();
        for i in 0..8 {
            writeln!(fam, "F{i} S{i} 0 0 1 -9").unwrap();
        }
        let mut bim = std::fs::File::create(format!("{chr_prefix}.bim")).unwrap();
        writeln!(bim, "22\trsA\t0\t29451671\tA\tG").unwrap();
        writeln!(bim, "22\trsB\t0\t29461671\tA\tG").unwrap();
        writeln!(bim, "22\trsC\t0\t29551671\tC\tT").unwrap();
        let a = [2, 1, 0, 0, 2, 1, 0, 1];
        let c = [0, 1, 2, 0, 1, 0, 2, 1];
        let mut bed = vec![0x6C, 0x1B, 0x01];
        bed.extend(pack(&a));
        bed.extend(pack(&a));
        bed.extend(pack(&c));
        std::fs::write(format!("{chr_prefix}.bed"), bed).unwrap();

        let v = |bp: u64, ea: &str, nea: &str, p: f64| {
            Variant::new(22, bp, None, ea, nea, None, None, 0.05, 0.01, p).unwrap()
        };
        let variants = vec![
            v(29451671, "A", "G", 1e-12),
            v(29461671, "A", "G", 1e-11),
            v(29551671, "C", "T", 1e-9),
            // Not in the panel: leads its own locus.
            v(29600000, "A", "T", 1e-8),
        ];

        let reference = PlinkLdReference::new(prefix);
        let slice = reference
            .ld_slice(22, &variants.iter().collect::<Vec<_>>())
            .unwrap();
        assert_eq!(slice.len(), 3);
        assert!((slice.r2(&variants[0].snpid, &variants[1].snpid) - 1.0).abs() < 1e-10);

        let config = LociConfig {
            strategy: StrategyParams::Clumping {
                clump_kb: 500,
                clump_r2: 0.5,
            },
            ..Default::default()
        };
        let ctx = LociContext {
            ld: Some(Arc::new(reference)),
            ..Default::default()
        };
        let res = identify_loci(&variants, &config, &ctx).unwrap();
        let leads: Vec<u64> = res.clusters.iter().map(|c| c.lead.variant.bp).collect();
        assert_eq!(leads, vec![29451671, 29551671, 29600000]);
        assert_eq!(res.clusters[0].claimed.len(), 1);
    }

    #[test]
    fn test_conditional_with_cojo_engine() {
        let lead = var(1, 1_000_000, 0.06, 0.005, 3.5e-33);
        let proxy = var(1, 1_020_000, 0.054, 0.005, 3.4e-27);
        let second = var(1, 1_300_000, 0.04, 0.005, 1.2e-15);
        let ld = StaticLd::new().with_r(&lead.snpid, &proxy.snpid, 0.9);
        let config = LociConfig {
            strategy: StrategyParams::Conditional {
                window_kb: 500,
                cojo: CojoParams {
                    sample_size: Some(50_000.0),
                    ..Default::default()
                },
            },
            ..Default::default()
        };
        let ctx = LociContext {
            ld: Some(Arc::new(ld)),
            ..Default::default()
        };
        let res = identify_loci(&[lead.clone(), proxy, second.clone()], &config, &ctx).unwrap();
        let leads: Vec<_> = res.lead_snps.iter().map(|l| l.variant.snpid.clone()).collect();
        assert_eq!(leads, vec![lead.snpid.clone(), second.snpid.clone()]);
        assert!(res.lead_snps.iter().all(|l| l.joint.is_some()));
        assert!(res.overlapping);

        let mut out = Vec::new();
        write_lead_snps(&mut out, &res.lead_snps).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().next().unwrap().ends_with("COJO_BETA\tCOJO_SE\tCOJO_P"));
    }

    #[test]
    fn test_conditional_fallback_keeps_distant_hits() {
        let hits = vec![
            var(1, 10_000_000, 0.06, 0.005, 1e-30),
            var(1, 60_000_000, 0.05, 0.005, 1e-20),
            var(1, 120_000_000, 0.04, 0.005, 1e-12),
        ];
        let config = LociConfig {
            strategy: StrategyParams::Conditional {
                window_kb: 500,
                cojo: CojoParams {
                    sample_size: Some(50_000.0),
                    ..Default::default()
                },
            },
            ..Default::default()
        };
        // Every LD request fails, so each window falls back to its top variant.
        let ctx = LociContext {
            ld: Some(Arc::new(StaticLd::new().failing_chrom(1))),
            ..Default::default()
        };
        let res = identify_loci(&hits, &config, &ctx).unwrap();
        let leads: Vec<u64> = res.loci.iter().map(|l| l.lead_snp_bp).collect();
        assert_eq!(leads, vec![10_000_000, 60_000_000, 120_000_000]);
        assert!(res.lead_snps.iter().all(|l| l.joint.is_none()));

        let distance = identify_loci(&hits, &LociConfig::default(), &LociContext::default()).unwrap();
        assert_eq!(res.loci, distance.loci);
    }
}

mod finemapping {
    use super::*;
    use efm_core::cojo::{
        ConditionalSelector, ConditionalStats, JointSignal, SelectionError, SelectionOutcome,
    };
    use efm_core::finemap::{ExternalScorer, LocusInput, ScorerError, ScorerRegistry};
    use efm_core::Locus;

    #[test]
    fn test_single_variant_abf_is_one() {
        let text = format!("{HEADER}\n22\t29451671\trs2236918\tG\tA\t0.47\t0.47\t-0.0241\t0.0037\t7.99e-11\n");
        let variants = load("abf1.txt", &text);
        let loci = identify_loci(&variants, &LociConfig::default(), &LociContext::default())
            .unwrap()
            .loci;
        let report = finemap_all_loci(&variants, &loci, &FinemapConfig::default(), &FinemapContext::default()).unwrap();
        assert_eq!(report.rows.len(), 1);
        let mut out = Vec::new();
        write_finemap(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "CHR\tBP\trsID\tEA\tNEA\tEAF\tMAF\tBETA\tSE\tP\tSNPID\tPP_ABF\tLEAD_SNP"
        );
        assert!(lines[1].ends_with("\t1\t22-29451671-A-G"));
    }

    #[test]
    fn test_chr22_finemap_with_credible_set() {
        let variants = load("cs.txt", &chr22_sumstats());
        let loci = identify_loci(&variants, &LociConfig::default(), &LociContext::default())
            .unwrap()
            .loci;
        let config = FinemapConfig {
            credible_threshold: Some(0.95),
            ..Default::default()
        };
        let full = finemap_all_loci(&variants, &loci, &FinemapConfig::default(), &FinemapContext::default()).unwrap();
        let cs = finemap_all_loci(&variants, &loci, &config, &FinemapContext::default()).unwrap();
        // Five variants fall inside [28951671, 29951671].
        assert_eq!(full.rows.len(), 5);
        assert!(!cs.rows.is_empty() && cs.rows.len() < full.rows.len());
        let total: f64 = cs.rows.iter().map(|r| r.pp[&Method::Abf]).sum();
        assert!(total >= 0.95);
        assert!(cs.rows.iter().any(|r| r.variant.bp == 29451671));
    }

    /// Fails on loci led from chromosome 2, uniform elsewhere.
    struct FlakyScorer;

    impl ExternalScorer for FlakyScorer {
        fn method(&self) -> Method {
            Method::Susie
        }

        fn score(&self, input: &LocusInput<'_>) -> Result<Vec<f64>, ScorerError> {
            if input.locus.chrom == 2 {
                return Err(ScorerError::Failed {
                    method: Method::Susie,
                    reason: "did not converge".into(),
                });
            }
            assert!(input.ld.is_some());
            let n = input.effects.len();
            Ok(vec![1.0 / n as f64; n])
        }
    }

    #[test]
    fn test_failing_scorer_degrades_per_locus() {
        let variants = vec![
            var(1, 1_000_000, 0.1, 0.01, 1e-20),
            var(1, 1_010_000, 0.05, 0.01, 1e-6),
            var(2, 1_000_000, 0.1, 0.01, 1e-20),
        ];
        let loci = identify_loci(&variants, &LociConfig::default(), &LociContext::default())
            .unwrap()
            .loci;
        let mut scorers = ScorerRegistry::new();
        scorers.register(Arc::new(FlakyScorer));
        let ctx = FinemapContext {
            ld: Some(Arc::new(StaticLd::new())),
            scorers,
            ..Default::default()
        };
        let config = FinemapConfig {
            methods: vec![Method::Abf, Method::Susie],
            ..Default::default()
        };
        let report = finemap_all_loci(&variants, &loci, &config, &ctx).unwrap();
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].lead_snp, variants[2].snpid);
        assert_eq!(report.rows[0].pp[&Method::Susie], 0.5);
        assert!(report.rows[2].pp[&Method::Susie].is_nan());
        assert_eq!(report.rows[2].pp[&Method::Abf], 1.0);
    }

    /// Halves every effect when conditioning on anything.
    struct HalvingSelector;

    impl ConditionalSelector for HalvingSelector {
        fn select(
            &self,
            _chrom: u32,
            _variants: &[&Variant],
        ) -> Result<SelectionOutcome<Vec<JointSignal>>, SelectionError> {
            unreachable!("fine-mapping only conditions")
        }

        fn condition(
            &self,
            _chrom: u32,
            variants: &[&Variant],
            fixed: &[&Variant],
        ) -> Result<SelectionOutcome<Vec<ConditionalStats>>, SelectionError> {
            assert_eq!(fixed.len(), 1);
            Ok(SelectionOutcome::Selected(
                variants
                    .iter()
                    .map(|v| ConditionalStats {
                        snpid: v.snpid.clone(),
                        beta: v.beta / 2.0,
                        se: v.se,
                        p: 0.5,
                    })
                    .collect(),
            ))
        }
    }

    #[test]
    fn test_conditional_finemap_uses_nearby_leads() {
        let a = var(1, 1_000_000, 0.1, 0.01, 1e-20);
        let b = var(1, 1_800_000, 0.08, 0.01, 1e-15);
        let far = var(1, 9_000_000, 0.07, 0.01, 1e-12);
        let variants = vec![a.clone(), b.clone(), far.clone()];
        let loci = vec![
            Locus::new(1, 500_000, 1_500_000, &a),
            Locus::new(1, 1_300_000, 2_300_000, &b),
            Locus::new(1, 8_500_000, 9_500_000, &far),
        ];
        let ctx = FinemapContext {
            selector: Some(Arc::new(HalvingSelector)),
            ..Default::default()
        };
        let config = FinemapConfig {
            conditional: true,
            sample_size: Some(100_000.0),
            ..Default::default()
        };
        let report = finemap_all_loci(&variants, &loci, &config, &ctx).unwrap();
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0].cond.as_ref().unwrap().beta, 0.05);
        assert_eq!(report.rows[1].cond.as_ref().unwrap().beta, 0.04);
        // Nothing within 1000 kb: conditional equals marginal.
        assert_eq!(report.rows[2].cond.as_ref().unwrap().beta, 0.07);

        let mut out = Vec::new();
        write_finemap(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text
            .lines()
            .next()
            .unwrap()
            .ends_with("PP_ABF\tCOJO_BETA\tCOJO_SE\tCOJO_P\tLEAD_SNP"));
        assert!(text.lines().nth(1).unwrap().contains("\t0.05\t0.01\t0.5\t"));
    }

    #[test]
    fn test_conditional_finemap_with_cojo_engine() {
        let lead = var(1, 1_000_000, 0.06, 0.005, 3.5e-33);
        let proxy = var(1, 1_020_000, 0.054, 0.005, 3.4e-27);
        let second = var(1, 1_600_000, 0.04, 0.005, 1.2e-15);
        let variants = vec![lead.clone(), proxy.clone(), second.clone()];
        let loci = vec![
            Locus::new(1, 500_000, 1_500_000, &lead),
            Locus::new(1, 1_100_000, 2_100_000, &second),
        ];
        let ld = StaticLd::new().with_r(&lead.snpid, &proxy.snpid, 0.9);
        let ctx = FinemapContext {
            ld: Some(Arc::new(ld)),
            ..Default::default()
        };
        let config = FinemapConfig {
            conditional: true,
            sample_size: Some(50_000.0),
            ..Default::default()
        };
        let report = finemap_all_loci(&variants, &loci, &config, &ctx).unwrap();
        assert!(report.failures.is_empty());
        // Locus of `lead`: conditioning on an unlinked lead leaves effects intact.
        let first = &report.rows[0];
        assert_eq!(first.variant.snpid, lead.snpid);
        let c = first.cond.as_ref().unwrap();
        assert!((c.beta - lead.beta).abs() < 0.01);
        let sum: f64 = report.rows[..2].iter().map(|r| r.pp[&Method::Abf]).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cojo_engine_direct_construction() {
        let params = CojoParams {
            sample_size: Some(10_000.0),
            ..Default::default()
        };
        let engine = CojoEngine::new(Arc::new(StaticLd::new()), params);
        assert!(engine.is_ok());
    }
}
