//! Lenient delimited-text reader.
//!
//! Tables arrive as raw comma separated text exported from a spreadsheet, so
//! the reader has to cope with quoted fields that carry delimiters, doubled
//! quotes and line breaks, with ragged rows and with stray blank lines. It
//! never fails: an unterminated quote simply runs to the end of the input.
//!
//! [`parse`] makes a single pass over the text. [`rows_to_records`] projects
//! the first row as a header over the rest, which is the shape every other
//! module consumes.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::io_utils;

/// A header-keyed row in tabular form: every value is a string.
pub type TabularRecord = BTreeMap<String, String>;

pub const DEFAULT_DELIMITER: char = ',';
pub const DEFAULT_QUOTE: char = '"';

#[derive(Debug, Clone, Copy)]
pub struct DelimitedParser {
    delimiter: char,
    quote: char,
}

impl Default for DelimitedParser {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            quote: DEFAULT_QUOTE,
        }
    }
}

#[derive(Default)]
struct RowBuilder {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    field: String,
    field_quoted: bool,
}

impl RowBuilder {
    fn end_field(&mut self) {
        self.row.push(std::mem::take(&mut self.field));
        self.field_quoted = false;
    }

    fn end_row(&mut self) {
        let quoted = self.field_quoted;
        self.end_field();
        let row = std::mem::take(&mut self.row);
        // a line holding one bare empty field is blank, not a record
        if row.len() == 1 && row[0].is_empty() && !quoted {
            return;
        }
        self.rows.push(row);
    }

    fn is_pristine(&self) -> bool {
        self.row.is_empty() && self.field.is_empty() && !self.field_quoted
    }
}

impl DelimitedParser {
    pub fn new(delimiter: char, quote: char) -> Self {
        Self { delimiter, quote }
    }

    pub fn parse(&self, text: &str) -> Vec<Vec<String>> {
        let mut builder = RowBuilder::default();
        let mut in_quotes = false;
        let mut chars = text.chars().peekable();

        while let Some(ch) = chars.next() {
            if in_quotes {
                if ch == self.quote {
                    if chars.peek() == Some(&self.quote) {
                        chars.next();
                        builder.field.push(self.quote);
                    } else {
                        in_quotes = false;
                    }
                } else {
                    builder.field.push(ch);
                }
                continue;
            }

            match ch {
                c if c == self.quote && builder.field.is_empty() && !builder.field_quoted => {
                    in_quotes = true;
                    builder.field_quoted = true;
                }
                c if c == self.delimiter => builder.end_field(),
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    builder.end_row();
                }
                '\n' => builder.end_row(),
                other => builder.field.push(other),
            }
        }

        if in_quotes || !builder.is_pristine() {
            builder.end_row();
        }
        builder.rows
    }
}

/// Parses `text` with the default comma delimiter and double-quote quoting.
pub fn parse(text: &str) -> Vec<Vec<String>> {
    DelimitedParser::default().parse(text)
}

/// Treats the first row as the header and keys every following row by it.
///
/// Header names are trimmed. Cells missing from a short row become empty
/// strings; cells beyond the header are ignored.
pub fn rows_to_records(rows: &[Vec<String>]) -> Vec<TabularRecord> {
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };
    let header = header.iter().map(|h| h.trim().to_string()).collect::<Vec<_>>();
    body.iter()
        .map(|row| {
            header
                .iter()
                .enumerate()
                .map(|(idx, name)| (name.clone(), row.get(idx).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Parses raw delimited text straight into header-keyed records.
pub fn parse_records(text: &str) -> Vec<TabularRecord> {
    rows_to_records(&parse(text))
}

/// Serializes rows back to delimited text, quoting every field.
pub fn to_delimited(rows: &[Vec<String>]) -> Result<String> {
    let mut writer = io_utils::csv_writer(Vec::new(), io_utils::DEFAULT_CSV_DELIMITER);
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
