pub mod finemap;
pub mod get_loci;
pub mod validate_ldref;
pub mod validate_sumstats;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

/// Write a rendered table to `path`, gzip-compressed when it ends in `.gz`.
pub fn write_output(path: &Path, content: &[u8]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    if path.extension().is_some_and(|e| e == "gz") {
        let mut gz = GzEncoder::new(w, Compression::default());
        gz.write_all(content)?;
        w = gz.finish()?;
    } else {
        w.write_all(content)?;
    }
    w.flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}
