//! Summary-statistics table reader and writer.
//!
//! The input is a tab-separated table with a header and exactly the
//! columns `CHR BP rsID EA NEA EAF MAF BETA SE P` in this order. A table
//! written by this module carries an extra trailing `SNPID` column; it is
//! accepted on input and recomputed from the other fields. Files ending
//! in `.gz` are decompressed transparently.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use thiserror::Error;

use crate::format::{format_float, format_opt, is_null};
use crate::variant::{parse_chrom, Variant, VariantError};

/// Fixed input columns.
pub const SUMSTAT_COLUMNS: [&str; 10] = [
    "CHR", "BP", "rsID", "EA", "NEA", "EAF", "MAF", "BETA", "SE", "P",
];

/// Name of the derived key column.
pub const SNPID_COLUMN: &str = "SNPID";

#[derive(Error, Debug)]
pub enum SumstatsError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: empty file, expected a header")]
    MissingHeader { path: String },

    #[error("{path}: header must be CHR BP rsID EA NEA EAF MAF BETA SE P (optionally followed by SNPID), found '{found}'")]
    BadHeader { path: String, found: String },

    #[error("{path}:{line}: expected {expected} columns, found {found}")]
    ColumnCount {
        path: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{path}:{line}: invalid {column} value '{value}'")]
    Parse {
        path: String,
        line: usize,
        column: &'static str,
        value: String,
    },

    #[error("{path}:{line}: {source}")]
    Invalid {
        path: String,
        line: usize,
        #[source]
        source: VariantError,
    },
}

/// Read a summary-statistics file, gzip-compressed when the name ends in `.gz`.
pub fn read_sumstats<P: AsRef<Path>>(path: P) -> Result<Vec<Variant>, SumstatsError> {
    let path = path.as_ref();
    let label = path.display().to_string();
    let file = File::open(path).map_err(|source| SumstatsError::Io {
        path: label.clone(),
        source,
    })?;
    let is_gz = path.extension().is_some_and(|e| e == "gz");
    if is_gz {
        parse_sumstats(BufReader::new(MultiGzDecoder::new(file)), &label)
    } else {
        parse_sumstats(BufReader::new(file), &label)
    }
}

/// Parse a summary-statistics table from any buffered reader.
///
/// `label` names the source in error messages.
pub fn parse_sumstats<R: BufRead>(reader: R, label: &str) -> Result<Vec<Variant>, SumstatsError> {
    let io_err = |source| SumstatsError::Io {
        path: label.to_string(),
        source,
    };
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line.map_err(io_err)?,
        None => {
            return Err(SumstatsError::MissingHeader {
                path: label.to_string(),
            })
        }
    };
    let columns: Vec<&str> = header.trim_end().split('\t').collect();
    let with_snpid = columns.len() == SUMSTAT_COLUMNS.len() + 1 && columns[10] == SNPID_COLUMN;
    if columns[..columns.len().min(SUMSTAT_COLUMNS.len())] != SUMSTAT_COLUMNS[..]
        || (columns.len() != SUMSTAT_COLUMNS.len() && !with_snpid)
    {
        return Err(SumstatsError::BadHeader {
            path: label.to_string(),
            found: header.trim_end().to_string(),
        });
    }
    let n_cols = columns.len();

    let mut variants = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line.map_err(io_err)?;
        let line_no = i + 2;
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != n_cols {
            return Err(SumstatsError::ColumnCount {
                path: label.to_string(),
                line: line_no,
                expected: n_cols,
                found: fields.len(),
            });
        }
        variants.push(parse_row(&fields, label, line_no)?);
    }

    Ok(variants)
}

fn parse_row(fields: &[&str], label: &str, line: usize) -> Result<Variant, SumstatsError> {
    let parse_err = |column: &'static str, value: &str| SumstatsError::Parse {
        path: label.to_string(),
        line,
        column,
        value: value.to_string(),
    };
    let float = |idx: usize| -> Result<f64, SumstatsError> {
        fields[idx]
            .trim()
            .parse::<f64>()
            .map_err(|_| parse_err(SUMSTAT_COLUMNS[idx], fields[idx]))
    };
    let opt_float = |idx: usize| -> Result<Option<f64>, SumstatsError> {
        if is_null(fields[idx]) {
            Ok(None)
        } else {
            float(idx).map(Some)
        }
    };

    let chrom = parse_chrom(fields[0]).ok_or_else(|| parse_err("CHR", fields[0]))?;
    let bp = fields[1]
        .trim()
        .parse::<u64>()
        .map_err(|_| parse_err("BP", fields[1]))?;
    let rsid = if is_null(fields[2]) {
        None
    } else {
        Some(fields[2].trim().to_string())
    };
    let eaf = opt_float(5)?;
    let maf = opt_float(6)?;
    let beta = float(7)?;
    let se = float(8)?;
    let p = float(9)?;

    Variant::new(chrom, bp, rsid, fields[3], fields[4], eaf, maf, beta, se, p).map_err(|source| {
        SumstatsError::Invalid {
            path: label.to_string(),
            line,
            source,
        }
    })
}

/// Header of the standardized table: the fixed columns plus SNPID.
pub fn standard_header() -> Vec<&'static str> {
    let mut cols = SUMSTAT_COLUMNS.to_vec();
    cols.push(SNPID_COLUMN);
    cols
}

/// The eleven standard fields of one variant, in header order.
pub fn standard_fields(v: &Variant) -> Vec<String> {
    vec![
        v.chrom.to_string(),
        v.bp.to_string(),
        v.rsid.clone().unwrap_or_else(|| "NA".to_string()),
        v.ea.clone(),
        v.nea.clone(),
        format_opt(v.eaf),
        format_opt(v.maf),
        format_float(v.beta),
        format_float(v.se),
        format_float(v.p),
        v.snpid.to_string(),
    ]
}

/// Write variants as a standardized table (fixed columns plus SNPID).
pub fn write_sumstats<W: Write>(mut w: W, variants: &[Variant]) -> std::io::Result<()> {
    writeln!(w, "{}", standard_header().join("\t"))?;
    for v in variants {
        writeln!(w, "{}", standard_fields(v).join("\t"))?;
    }
    w.flush()
}
