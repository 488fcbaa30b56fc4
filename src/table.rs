//! Plain-text tables for CLI output.

use std::{borrow::Cow, fmt::Write as _};

use crate::{binder::Record, schema::TableSchema};

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h).max(3)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(&flatten(cell)));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

/// Renders dynamically bound records, one column per emitted field.
pub fn render_records<'a, I>(schema: &TableSchema, records: I) -> String
where
    I: IntoIterator<Item = &'a Record>,
{
    let headers: Vec<String> = schema
        .emitted_columns()
        .map(|column| column.field_name.clone())
        .collect();
    let rows: Vec<Vec<String>> = records.into_iter().map(record_cells).collect();
    render_table(&headers, &rows)
}

fn record_cells(record: &Record) -> Vec<String> {
    record
        .fields()
        .iter()
        .map(|(_, value)| value.to_string())
        .collect()
}

/// One line per column: slot, header, generated names, type and flags.
pub fn render_schema(schema: &TableSchema) -> String {
    let headers = ["#", "header", "field", "constant", "type", "exported", "valid"]
        .map(String::from)
        .to_vec();
    let rows: Vec<Vec<String>> = schema
        .columns
        .iter()
        .map(|column| {
            let type_label = match &column.enum_type_name {
                Some(name) => format!("{}({name})", column.column_type),
                None => column.column_type.to_string(),
            };
            vec![
                column.index.to_string(),
                column.source_name.clone(),
                column.field_name.clone(),
                column.constant_name.clone(),
                type_label,
                yes_no(column.exported),
                yes_no(column.valid),
            ]
        })
        .collect();
    render_table(&headers, &rows)
}

fn yes_no(flag: bool) -> String {
    let label = if flag { "yes" } else { "no" };
    label.to_string()
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = flatten(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
