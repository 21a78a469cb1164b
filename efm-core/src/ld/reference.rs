//! PLINK reference panel as an [`LdProvider`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use efm_geno::plink::PlinkReader;
use efm_geno::variant::CHROM_X;
use efm_geno::Variant;
use tracing::debug;

use super::matrix::{ld_matrix, AlignedDosages};
use super::provider::{LdError, LdProvider, LdSlice};

/// Placeholder replaced by the chromosome number in a panel prefix.
pub const CHROM_WILDCARD: &str = "{chrom}";

/// Reference panel given as a PLINK prefix, optionally containing
/// `{chrom}` for per-chromosome files. Readers are opened on first use
/// and shared between threads.
pub struct PlinkLdReference {
    pattern: String,
    min_mac: f64,
    readers: Mutex<HashMap<u32, Arc<PlinkReader>>>,
}

impl PlinkLdReference {
    pub fn new(pattern: impl Into<String>) -> Self {
        PlinkLdReference {
            pattern: pattern.into(),
            min_mac: 0.0,
            readers: Mutex::new(HashMap::new()),
        }
    }

    /// Treat panel variants with a minor allele count below `mac` as absent.
    pub fn with_min_mac(mut self, mac: f64) -> Self {
        self.min_mac = mac;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_per_chromosome(&self) -> bool {
        self.pattern.contains(CHROM_WILDCARD)
    }

    /// Candidate prefixes for `chrom`; chromosome 23 also tries `X`.
    fn prefixes(&self, chrom: u32) -> Vec<String> {
        if !self.is_per_chromosome() {
            return vec![self.pattern.clone()];
        }
        let mut out = vec![self.pattern.replace(CHROM_WILDCARD, &chrom.to_string())];
        if chrom == CHROM_X {
            out.push(self.pattern.replace(CHROM_WILDCARD, "X"));
        }
        out
    }

    /// Prefix of the panel holding `chrom`, if its bed file exists.
    pub fn prefix_for(&self, chrom: u32) -> Option<String> {
        self.prefixes(chrom)
            .into_iter()
            .find(|p| PathBuf::from(format!("{p}.bed")).exists())
    }

    /// Chromosomes with a panel on disk. A single-file panel reports the
    /// chromosomes listed in its bim file.
    pub fn chromosomes(&self) -> Result<Vec<u32>, LdError> {
        if self.is_per_chromosome() {
            return Ok((1..=CHROM_X).filter(|&c| self.prefix_for(c).is_some()).collect());
        }
        let reader = self.reader(0)?;
        let mut chroms: Vec<u32> = reader.bim().iter().filter_map(|b| b.chrom).collect();
        chroms.sort_unstable();
        chroms.dedup();
        Ok(chroms)
    }

    /// Shared reader for `chrom` (any key for a single-file panel).
    pub fn reader(&self, chrom: u32) -> Result<Arc<PlinkReader>, LdError> {
        let key = if self.is_per_chromosome() { chrom } else { 0 };
        let mut readers = self
            .readers
            .lock()
            .map_err(|_| LdError::Reference("reader cache poisoned".to_string()))?;
        if let Some(r) = readers.get(&key) {
            return Ok(Arc::clone(r));
        }
        let prefix = self
            .prefix_for(chrom)
            .ok_or(LdError::MissingChromosome(chrom))?;
        let reader = PlinkReader::open(&prefix).map_err(|e| LdError::Reference(format!("{e:#}")))?;
        let reader = Arc::new(reader);
        readers.insert(key, Arc::clone(&reader));
        Ok(reader)
    }
}

impl LdProvider for PlinkLdReference {
    fn ld_slice(&self, chrom: u32, variants: &[&Variant]) -> Result<LdSlice, LdError> {
        let reader = self.reader(chrom)?;

        let mut ids = Vec::new();
        let mut columns = Vec::new();
        let mut n_low_mac = 0usize;
        for v in variants {
            let Some(idx) = reader.index_of(&v.snpid) else {
                continue;
            };
            let entry = &reader.bim()[idx];
            if entry.chrom != Some(chrom) {
                continue;
            }
            let d = reader
                .read_dosages(idx)
                .map_err(|e| LdError::Reference(format!("{e:#}")))?;
            let column = AlignedDosages::new(d, entry.allele1 != v.ea);
            if column.mac() < self.min_mac {
                n_low_mac += 1;
                continue;
            }
            ids.push(v.snpid.clone());
            columns.push(column);
        }
        if n_low_mac > 0 {
            debug!(
                "chr{}: {} variants skipped with MAC < {}",
                chrom, n_low_mac, self.min_mac
            );
        }

        if ids.is_empty() {
            return Err(LdError::NoOverlap {
                chrom,
                n_requested: variants.len(),
            });
        }
        debug!(
            "chr{}: {} of {} variants found in {}",
            chrom,
            ids.len(),
            variants.len(),
            reader.prefix().display()
        );

        let ref_eaf = columns.iter().map(AlignedDosages::eaf).collect();
        Ok(LdSlice::new(ids, ld_matrix(&columns), ref_eaf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_panel(prefix: &str) {
        let mut fam = std::fs::File::create(format!("{prefix}.fam")).unwrap();
        for i in 0..4 {
            writeln!(fam, "F{i} S{i} 0 0 1 -9").unwrap();
        }
        let mut bim = std::fs::File::create(format!("{prefix}.bim")).unwrap();
        writeln!(bim, "22\trs1\t0\t100\tA\tG").unwrap();
        writeln!(bim, "22\trs2\t0\t200\tC\tT").unwrap();
        let mut bed = std::fs::File::create(format!("{prefix}.bed")).unwrap();
        // rs1 dosages of A: 2, 1, 0, 0; rs2 dosages of C: 2, 1, 0, 0
        let m: u8 = 0b11_11_10_00;
        bed.write_all(&[0x6C, 0x1B, 0x01, m, m]).unwrap();
    }

    #[test]
    fn test_plink_reference_signs_by_effect_allele() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/panel.chr{{chrom}}", dir.path().display());
        write_panel(&format!("{}/panel.chr22", dir.path().display()));

        let reference = PlinkLdReference::new(pattern);
        assert!(reference.is_per_chromosome());
        assert_eq!(reference.chromosomes().unwrap(), vec![22]);

        // rs1 reported with effect allele A, rs2 with effect allele T (flipped).
        let a = Variant::new(22, 100, None, "A", "G", None, None, 0.1, 0.02, 1e-9).unwrap();
        let b = Variant::new(22, 200, None, "T", "C", None, None, 0.1, 0.02, 1e-9).unwrap();
        let missing = Variant::new(22, 300, None, "A", "C", None, None, 0.1, 0.02, 1e-9).unwrap();
        let slice = reference.ld_slice(22, &[&a, &b, &missing]).unwrap();
        assert_eq!(slice.len(), 2);
        assert!((slice.r(&a.snpid, &b.snpid).unwrap() + 1.0).abs() < 1e-10);
        assert!((slice.ref_eaf(&a.snpid).unwrap() - 0.375).abs() < 1e-12);
        assert!((slice.ref_eaf(&b.snpid).unwrap() - 0.625).abs() < 1e-12);

        assert_eq!(
            reference.ld_slice(21, &[&a]).unwrap_err(),
            LdError::MissingChromosome(21)
        );
    }

    #[test]
    fn test_low_mac_variants_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = format!("{}/panel", dir.path().display());
        write_panel(&prefix);
        let a = Variant::new(22, 100, None, "A", "G", None, None, 0.1, 0.02, 1e-9).unwrap();
        let b = Variant::new(22, 200, None, "T", "C", None, None, 0.1, 0.02, 1e-9).unwrap();

        // Both panel variants have a minor allele count of 3.
        let kept = PlinkLdReference::new(prefix.clone()).with_min_mac(3.0);
        assert_eq!(kept.ld_slice(22, &[&a, &b]).unwrap().len(), 2);

        let strict = PlinkLdReference::new(prefix).with_min_mac(4.0);
        assert_eq!(
            strict.ld_slice(22, &[&a, &b]).unwrap_err(),
            LdError::NoOverlap {
                chrom: 22,
                n_requested: 2
            }
        );
    }
}
