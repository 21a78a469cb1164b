//! PLINK bed/bim/fam reference panel reader using memory-mapped files.
//!
//! PLINK binary format consists of three files:
//! - .bed: Binary genotype data (2 bits per genotype, packed)
//! - .bim: Variant information (chrom, id, cm, pos, a1, a2)
//! - .fam: Sample information (fid, iid, father, mother, sex, pheno)
//!
//! Variants are indexed by [`SnpId`] so that summary statistics can be
//! joined against the panel regardless of allele order. Only the first
//! occurrence of a duplicated SNPID is reachable through the index.
//!
//! Reference: https://www.cog-genomics.org/plink/1.9/formats#bed

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use memmap2::Mmap;

use crate::variant::{parse_chrom, SnpId};

/// PLINK BIM file entry (one per variant).
#[derive(Debug, Clone)]
pub struct BimEntry {
    /// Parsed chromosome, `None` for codes outside 1-22/X.
    pub chrom: Option<u32>,
    pub id: String,
    pub pos: u64,
    /// Allele counted by the bed dosages.
    pub allele1: String,
    pub allele2: String,
}

impl BimEntry {
    pub fn snpid(&self) -> Option<SnpId> {
        self.chrom
            .map(|c| SnpId::new(c, self.pos, &self.allele1, &self.allele2))
    }
}

/// Allele frequency summary of one marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlleleStats {
    /// Frequency of allele1.
    pub af: f64,
    /// Minor allele count.
    pub mac: f64,
    /// Number of non-missing samples.
    pub n_valid: usize,
}

impl AlleleStats {
    /// Compute allele frequency from dosages.
    pub fn from_dosages(dosages: &[f64]) -> Self {
        let mut sum = 0.0;
        let mut n = 0usize;
        for &d in dosages {
            if !d.is_nan() {
                sum += d;
                n += 1;
            }
        }
        let af = if n > 0 { sum / (2.0 * n as f64) } else { 0.0 };
        let mac = sum.min(2.0 * n as f64 - sum);
        AlleleStats { af, mac, n_valid: n }
    }
}

/// Reader for one PLINK bed/bim/fam triple.
pub struct PlinkReader {
    /// Memory-mapped .bed file.
    mmap: Mmap,
    /// Variant information from .bim file.
    bim: Vec<BimEntry>,
    /// Sample IDs (IID) from the .fam file.
    sample_ids: Vec<String>,
    /// Number of bytes per marker in the bed file.
    bytes_per_marker: usize,
    /// SNPID -> first marker index.
    index: HashMap<SnpId, usize>,
    /// Markers whose SNPID was already taken by an earlier marker.
    n_duplicated: usize,
    prefix: PathBuf,
}

impl PlinkReader {
    /// Open `{prefix}.bed`, `{prefix}.bim` and `{prefix}.fam`.
    ///
    /// The prefix is used verbatim, so names such as `EUR.chr22` work.
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        let prefix = prefix.as_ref().to_path_buf();
        let with_ext = |ext: &str| PathBuf::from(format!("{}.{}", prefix.display(), ext));
        let bed_path = with_ext("bed");
        let bim_path = with_ext("bim");
        let fam_path = with_ext("fam");

        let sample_ids = Self::parse_fam(&fam_path)?;
        let n_samples = sample_ids.len();
        let bim = Self::parse_bim(&bim_path)?;

        let bed_file = std::fs::File::open(&bed_path)
            .with_context(|| format!("Failed to open bed file: {}", bed_path.display()))?;
        // SAFETY: the panel is opened read-only and not modified while mapped.
        let mmap = unsafe { Mmap::map(&bed_file)? };

        if mmap.len() < 3 {
            bail!("Bed file too small: {}", bed_path.display());
        }
        if mmap[0] != 0x6C || mmap[1] != 0x1B {
            bail!("Invalid PLINK bed file magic number: {}", bed_path.display());
        }
        if mmap[2] != 0x01 {
            bail!("Only SNP-major bed files are supported (mode byte = 0x01)");
        }

        let bytes_per_marker = n_samples.div_ceil(4);
        let expected_size = 3 + bytes_per_marker * bim.len();
        if mmap.len() < expected_size {
            bail!(
                "Bed file too small: expected at least {} bytes, got {}",
                expected_size,
                mmap.len()
            );
        }

        let mut index = HashMap::with_capacity(bim.len());
        let mut n_duplicated = 0;
        for (i, entry) in bim.iter().enumerate() {
            if let Some(id) = entry.snpid() {
                if index.contains_key(&id) {
                    n_duplicated += 1;
                } else {
                    index.insert(id, i);
                }
            }
        }

        tracing::debug!(
            "Opened PLINK panel {}: {} markers, {} samples, {} duplicated SNPIDs",
            prefix.display(),
            bim.len(),
            n_samples,
            n_duplicated
        );

        Ok(Self {
            mmap,
            bim,
            sample_ids,
            bytes_per_marker,
            index,
            n_duplicated,
            prefix,
        })
    }

    /// Parse a .fam file, returning the IIDs.
    fn parse_fam(path: &Path) -> Result<Vec<String>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fam file: {}", path.display()))?;
        let mut ids = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!("Fam file line {} has fewer than 6 fields", line_num + 1);
            }
            ids.push(fields[1].to_string());
        }
        Ok(ids)
    }

    /// Parse a .bim file.
    fn parse_bim(path: &Path) -> Result<Vec<BimEntry>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bim file: {}", path.display()))?;
        let mut entries = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!("Bim file line {} has fewer than 6 fields", line_num + 1);
            }
            let pos = fields[3].parse().with_context(|| {
                format!("Bim file line {}: invalid position '{}'", line_num + 1, fields[3])
            })?;
            entries.push(BimEntry {
                chrom: parse_chrom(fields[0]),
                id: fields[1].to_string(),
                pos,
                allele1: fields[4].to_ascii_uppercase(),
                allele2: fields[5].to_ascii_uppercase(),
            });
        }
        Ok(entries)
    }

    /// Decode a single genotype from the bed file.
    /// Returns dosage of allele1: 0, 1, 2, or NaN for missing.
    #[inline]
    fn decode_genotype(byte: u8, offset: usize) -> f64 {
        let bits = (byte >> (offset * 2)) & 0x03;
        match bits {
            0b00 => 2.0,      // Homozygous A1/A1
            0b01 => f64::NAN, // Missing
            0b10 => 1.0,      // Heterozygous A1/A2
            0b11 => 0.0,      // Homozygous A2/A2
            _ => unreachable!(),
        }
    }

    /// Allele1 dosages of the marker at `index`, one per sample.
    pub fn read_dosages(&self, index: usize) -> Result<Vec<f64>> {
        if index >= self.bim.len() {
            bail!("Marker index {} out of range ({})", index, self.bim.len());
        }
        let n = self.n_samples();
        let offset = 3 + index * self.bytes_per_marker;
        let mut dosages = Vec::with_capacity(n);
        for sample_idx in 0..n {
            let byte = self.mmap[offset + sample_idx / 4];
            dosages.push(Self::decode_genotype(byte, sample_idx % 4));
        }
        Ok(dosages)
    }

    /// Marker index of a SNPID, if present in the panel.
    pub fn index_of(&self, snpid: &SnpId) -> Option<usize> {
        self.index.get(snpid).copied()
    }

    pub fn n_markers(&self) -> usize {
        self.bim.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_duplicated(&self) -> usize {
        self.n_duplicated
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn bim(&self) -> &[BimEntry] {
        &self.bim
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }
}
