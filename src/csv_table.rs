//! Line-oriented tokenizer for published-sheet CSV exports.
//!
//! This is intentionally not an RFC 4180 reader: sheet exports put one record
//! per line and quote every cell, so a cell is whatever sits between commas
//! with one pair of surrounding quotes removed. Embedded commas, quotes and
//! newlines are not supported. A blank line ends the table, matching the
//! trailing blank rows a spreadsheet export carries.
//!
//! Snapshots written by [`write_rows`] quote every cell with the `csv` crate,
//! which this tokenizer reads back to the same cells.

use std::io::Write;

use anyhow::{Context, Result};
use csv::QuoteStyle;
use serde::{Deserialize, Serialize};

/// One physical line split into raw cells.
pub type Row = Vec<String>;

const EMPTY_QUOTED_CELL: &str = "\"\"";

/// Excludes a row from the parse result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RowFilter {
    /// Matches the 1-based physical row number.
    Line { line: usize },
    /// Matches when the first cell equals the literal.
    FirstCell { value: String },
}

impl RowFilter {
    pub fn line(line: usize) -> Self {
        RowFilter::Line { line }
    }

    pub fn first_cell(value: impl Into<String>) -> Self {
        RowFilter::FirstCell {
            value: value.into(),
        }
    }

    pub fn matches(&self, row_number: usize, cells: &[String]) -> bool {
        match self {
            RowFilter::Line { line } => *line == row_number,
            RowFilter::FirstCell { value } => cells.first().is_some_and(|first| first == value),
        }
    }
}

/// Tokenizer configured with the row filters of one spreadsheet.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    filters: Vec<RowFilter>,
}

impl CsvTable {
    pub fn new(filters: Vec<RowFilter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[RowFilter] {
        &self.filters
    }

    pub fn parse(&self, text: &str, skip_header_row: bool) -> Vec<Row> {
        parse(text, skip_header_row, &self.filters)
    }
}

/// Splits `text` into rows, dropping any row matched by at least one filter.
///
/// Row numbers are 1-based and count filtered rows too. With
/// `skip_header_row` the first line is discarded and numbering starts at 2.
pub fn parse(text: &str, skip_header_row: bool, filters: &[RowFilter]) -> Vec<Row> {
    let mut lines = text.lines();
    let mut row_number = 1usize;
    if skip_header_row {
        if lines.next().is_none() {
            return Vec::new();
        }
        row_number = 2;
    }

    let mut rows = Vec::new();
    for line in lines {
        let Some(cells) = split_line(line) else {
            break;
        };
        let current = row_number;
        row_number += 1;
        if filters.iter().any(|filter| filter.matches(current, &cells)) {
            continue;
        }
        rows.push(cells);
    }
    rows
}

/// Returns `None` for a blank line (empty, or nothing but `""` cells).
fn split_line(line: &str) -> Option<Row> {
    if line.is_empty() {
        return None;
    }
    let mut blank = true;
    let cells: Row = line
        .split(',')
        .map(|cell| {
            if cell == EMPTY_QUOTED_CELL {
                return String::new();
            }
            blank = false;
            unquote(cell).to_string()
        })
        .collect();
    if blank { None } else { Some(cells) }
}

fn unquote(cell: &str) -> &str {
    let cell = cell.strip_prefix('"').unwrap_or(cell);
    cell.strip_suffix('"').unwrap_or(cell)
}

/// Writes rows as a snapshot that [`parse`] reads back cell-for-cell.
pub fn write_rows<W: Write>(writer: W, rows: &[Row]) -> Result<()> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .flexible(true);
    let mut csv_writer = builder.from_writer(writer);
    for (idx, row) in rows.iter().enumerate() {
        csv_writer
            .write_record(row)
            .with_context(|| format!("Writing snapshot row {}", idx + 1))?;
    }
    csv_writer.flush().context("Flushing snapshot")?;
    Ok(())
}
