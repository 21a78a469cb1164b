//! LD-block and chromosome-size tables.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::variant::parse_chrom;

/// One approximately independent LD block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LdBlock {
    pub chrom: u32,
    pub start: u64,
    pub end: u64,
}

impl LdBlock {
    pub fn contains(&self, bp: u64) -> bool {
        self.start <= bp && bp <= self.end
    }
}

/// LD blocks grouped per chromosome, sorted by start.
#[derive(Debug, Clone, Default)]
pub struct LdBlocks {
    by_chrom: BTreeMap<u32, Vec<LdBlock>>,
}

impl LdBlocks {
    pub fn new(blocks: impl IntoIterator<Item = LdBlock>) -> Self {
        let mut by_chrom: BTreeMap<u32, Vec<LdBlock>> = BTreeMap::new();
        for b in blocks {
            by_chrom.entry(b.chrom).or_default().push(b);
        }
        for v in by_chrom.values_mut() {
            v.sort_by_key(|b| (b.start, b.end));
        }
        LdBlocks { by_chrom }
    }

    /// The first block (by start) on `chrom` that contains `bp`.
    pub fn containing(&self, chrom: u32, bp: u64) -> Option<&LdBlock> {
        let blocks = self.by_chrom.get(&chrom)?;
        // Blocks starting after bp cannot contain it.
        let upper = blocks.partition_point(|b| b.start <= bp);
        blocks[..upper].iter().find(|b| b.contains(bp))
    }

    pub fn chromosome(&self, chrom: u32) -> &[LdBlock] {
        self.by_chrom.get(&chrom).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &LdBlock> {
        self.by_chrom.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_chrom.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read an LD-block file: tab/space separated `CHR START END`.
///
/// A first line whose chromosome field does not parse is treated as a
/// header and skipped.
pub fn read_ld_blocks<P: AsRef<Path>>(path: P) -> Result<LdBlocks> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open LD block file: {}", path.display()))?;
    let mut blocks = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 3 {
            bail!(
                "{}:{}: expected 3 columns (CHR START END), found {}",
                path.display(),
                line_num + 1,
                fields.len()
            );
        }
        let Some(chrom) = parse_chrom(fields[0]) else {
            if line_num == 0 {
                continue;
            }
            bail!("{}:{}: invalid chromosome '{}'", path.display(), line_num + 1, fields[0]);
        };
        let start: u64 = fields[1]
            .parse()
            .with_context(|| format!("{}:{}: invalid START", path.display(), line_num + 1))?;
        let end: u64 = fields[2]
            .parse()
            .with_context(|| format!("{}:{}: invalid END", path.display(), line_num + 1))?;
        if start >= end {
            bail!("{}:{}: START must be < END", path.display(), line_num + 1);
        }
        blocks.push(LdBlock { chrom, start, end });
    }
    tracing::debug!("Read {} LD blocks from {}", blocks.len(), path.display());
    Ok(LdBlocks::new(blocks))
}

/// Chromosome lengths used to clip locus boundaries.
#[derive(Debug, Clone, Default)]
pub struct ChromSizes {
    sizes: BTreeMap<u32, u64>,
}

impl ChromSizes {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, u64)>) -> Self {
        ChromSizes {
            sizes: pairs.into_iter().collect(),
        }
    }

    pub fn length(&self, chrom: u32) -> Option<u64> {
        self.sizes.get(&chrom).copied()
    }
}

/// Read a two-column `CHR LENGTH` table (e.g. a `.chrom.sizes` file).
/// Unrecognised chromosome names (alt contigs, MT) are skipped.
pub fn read_chrom_sizes<P: AsRef<Path>>(path: P) -> Result<ChromSizes> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chromosome sizes: {}", path.display()))?;
    let mut pairs = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        let Some(chrom) = parse_chrom(fields[0]) else {
            continue;
        };
        let len: u64 = fields[1]
            .parse()
            .with_context(|| format!("{}:{}: invalid length", path.display(), line_num + 1))?;
        pairs.push((chrom, len));
    }
    Ok(ChromSizes::from_pairs(pairs))
}
