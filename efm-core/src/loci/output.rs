//! Loci, lead-SNP and parameter tables.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use efm_geno::format::{format_float, format_opt};
use efm_geno::sumstats::{standard_fields, standard_header};
use efm_geno::variant::parse_chrom;
use efm_geno::SnpId;

use crate::model::Locus;

use super::LeadSnp;

pub const LOCI_COLUMNS: [&str; 6] = ["CHR", "START", "END", "LEAD_SNP", "LEAD_SNP_P", "LEAD_SNP_BP"];

pub const COJO_COLUMNS: [&str; 3] = ["COJO_BETA", "COJO_SE", "COJO_P"];

pub fn write_loci<W: Write>(mut w: W, loci: &[Locus]) -> std::io::Result<()> {
    writeln!(w, "{}", LOCI_COLUMNS.join("\t"))?;
    for l in loci {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}",
            l.chrom,
            l.start,
            l.end,
            l.lead_snp,
            format_float(l.lead_snp_p),
            l.lead_snp_bp
        )?;
    }
    w.flush()
}

/// Lead-SNP table: standard columns plus SNPID, and the joint estimates
/// when any lead carries them.
pub fn write_lead_snps<W: Write>(mut w: W, leads: &[LeadSnp]) -> std::io::Result<()> {
    let with_cojo = leads.iter().any(|l| l.joint.is_some());
    let mut header = standard_header();
    if with_cojo {
        header.extend(COJO_COLUMNS);
    }
    writeln!(w, "{}", header.join("\t"))?;
    for lead in leads {
        let mut fields = standard_fields(&lead.variant);
        if with_cojo {
            let j = lead.joint.as_ref();
            fields.push(format_opt(j.map(|j| j.beta)));
            fields.push(format_opt(j.map(|j| j.se)));
            fields.push(format_opt(j.map(|j| j.p)));
        }
        writeln!(w, "{}", fields.join("\t"))?;
    }
    w.flush()
}

/// Effective parameters as pretty JSON.
pub fn write_params<W: Write, T: Serialize>(mut w: W, params: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut w, params).context("Failed to serialize parameters")?;
    writeln!(w)?;
    Ok(())
}

/// Read a loci table written by [`write_loci`].
pub fn read_loci<R: BufRead>(reader: R, label: &str) -> Result<Vec<Locus>> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(h) => h.with_context(|| format!("Failed to read {label}"))?,
        None => bail!("{label}: empty loci file"),
    };
    let cols: Vec<&str> = header.trim_end().split('\t').collect();
    if cols.len() < LOCI_COLUMNS.len() || cols[..LOCI_COLUMNS.len()] != LOCI_COLUMNS {
        bail!("{label}: loci header must start with {}", LOCI_COLUMNS.join(" "));
    }

    let mut loci = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line.with_context(|| format!("Failed to read {label}"))?;
        let line_no = i + 2;
        if line.trim().is_empty() {
            continue;
        }
        let f: Vec<&str> = line.trim_end().split('\t').collect();
        if f.len() < LOCI_COLUMNS.len() {
            bail!("{label}:{line_no}: expected {} columns, found {}", LOCI_COLUMNS.len(), f.len());
        }
        let chrom = parse_chrom(f[0]).with_context(|| format!("{label}:{line_no}: invalid CHR '{}'", f[0]))?;
        let start: u64 = f[1].parse().with_context(|| format!("{label}:{line_no}: invalid START"))?;
        let end: u64 = f[2].parse().with_context(|| format!("{label}:{line_no}: invalid END"))?;
        let lead_snp = SnpId::parse(f[3]).with_context(|| format!("{label}:{line_no}: invalid LEAD_SNP '{}'", f[3]))?;
        let lead_snp_p: f64 = f[4].parse().with_context(|| format!("{label}:{line_no}: invalid LEAD_SNP_P"))?;
        let lead_snp_bp: u64 = f[5].parse().with_context(|| format!("{label}:{line_no}: invalid LEAD_SNP_BP"))?;
        if start >= end {
            bail!("{label}:{line_no}: START must be < END");
        }
        loci.push(Locus {
            chrom,
            start,
            end,
            lead_snp,
            lead_snp_p,
            lead_snp_bp,
        });
    }
    Ok(loci)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cojo::JointSignal;
    use efm_geno::Variant;

    fn scenario_lead() -> Variant {
        Variant::new(22, 29451671, Some("rs2236918".into()), "G", "A", Some(0.47), None, -0.0241, 0.0037, 7.99e-11).unwrap()
    }

    #[test]
    fn test_write_loci_row() {
        let v = scenario_lead();
        let locus = Locus::new(22, 28951671, 29951671, &v);
        let mut out = Vec::new();
        write_loci(&mut out, &[locus.clone()]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "CHR\tSTART\tEND\tLEAD_SNP\tLEAD_SNP_P\tLEAD_SNP_BP\n22\t28951671\t29951671\t22-29451671-A-G\t7.99e-11\t29451671\n"
        );
        let back = read_loci(text.as_bytes(), "loci.txt").unwrap();
        assert_eq!(back, vec![locus]);
    }

    #[test]
    fn test_lead_snps_cojo_columns_only_when_present() {
        let v = scenario_lead();
        let plain = LeadSnp { variant: v.clone(), joint: None };
        let mut out = Vec::new();
        write_lead_snps(&mut out, &[plain.clone()]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("CHR\tBP\trsID\tEA\tNEA\tEAF\tMAF\tBETA\tSE\tP\tSNPID\n"));

        let joint = LeadSnp {
            variant: v.clone(),
            joint: Some(JointSignal { snpid: v.snpid.clone(), beta: -0.02, se: 0.004, p: 5.7e-7 }),
        };
        let mut out = Vec::new();
        write_lead_snps(&mut out, &[joint, plain]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("SNPID\tCOJO_BETA\tCOJO_SE\tCOJO_P"));
        assert!(lines[1].ends_with("\t-0.02\t0.004\t5.7e-7"));
        assert!(lines[2].ends_with("\tNA\tNA\tNA"));
    }

    #[test]
    fn test_read_loci_rejects_bad_rows() {
        let text = "CHR\tSTART\tEND\tLEAD_SNP\tLEAD_SNP_P\tLEAD_SNP_BP\n1\t500\t100\t1-300-A-G\t1e-9\t300\n";
        assert!(read_loci(text.as_bytes(), "x").is_err());
        assert!(read_loci("CHR\tBP\n".as_bytes(), "x").is_err());
    }
}
