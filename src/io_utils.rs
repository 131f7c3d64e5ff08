//! File and stream helpers shared by the stores and the CLI.
//!
//! Delimited output always goes through [`csv_writer`], which quotes every
//! field so that values holding delimiters, quotes or line breaks survive a
//! trip back through [`crate::delimited::parse`].

use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use csv::QuoteStyle;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn csv_writer<W: Write>(inner: W, delimiter: u8) -> csv::Writer<W> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .flexible(true);
    builder.from_writer(inner)
}

/// Rewrites `path` with `rows`, going through a sibling temp file so a
/// failed write never leaves a half-written table behind.
pub fn write_rows_atomically(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let staging = path.with_extension("csv.tmp");
    {
        let file = File::create(&staging)
            .with_context(|| format!("Creating staging file {staging:?}"))?;
        let mut writer = csv_writer(BufWriter::new(file), DEFAULT_CSV_DELIMITER);
        for (idx, row) in rows.iter().enumerate() {
            writer
                .write_record(row)
                .with_context(|| format!("Writing row {} to {staging:?}", idx + 1))?;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing {staging:?}"))?;
    }
    fs::rename(&staging, path).with_context(|| format!("Replacing {path:?}"))?;
    Ok(())
}

/// Reads a whole text input; `-` means stdin.
pub fn read_text(path: &Path) -> Result<String> {
    if is_dash(path) {
        let mut buffer = String::new();
        io::stdin()
            .lock()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        Ok(buffer)
    } else {
        fs::read_to_string(path).with_context(|| format!("Reading {path:?}"))
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
