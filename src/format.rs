//! Text renderers for tabular results
use prettytable::{Cell, Row, Table};

use crate::value::DataTable;

/// Render a preview table for terminal-style display.
pub fn format_preview(data: &DataTable) -> String {
    if data.columns.is_empty() {
        return "No results.".to_string();
    }

    let mut table = Table::new();
    table.add_row(Row::new(
        data.columns.iter().map(|c| Cell::new(c)).collect(),
    ));
    for row in &data.rows {
        table.add_row(Row::new(row.iter().map(|v| Cell::new(v)).collect()));
    }

    let mut out = table.to_string();
    out.push_str(&format!("({} rows)\n", data.rows.len()));
    out
}

/// Render as a GitHub-flavored markdown table.
pub fn format_markdown(data: &DataTable) -> String {
    if data.columns.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str("| ");
    out.push_str(&data.columns.join(" | "));
    out.push_str(" |\n|");
    for _ in &data.columns {
        out.push_str(" --- |");
    }
    out.push('\n');
    for row in &data.rows {
        out.push_str("| ");
        let escaped: Vec<String> = row.iter().map(|v| v.replace('|', "\\|")).collect();
        out.push_str(&escaped.join(" | "));
        out.push_str(" |\n");
    }
    out
}

/// Render as CSV with RFC-style quoting.
pub fn format_csv(data: &DataTable) -> String {
    if data.columns.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&escape_csv_row(&data.columns));
    out.push('\n');
    for row in &data.rows {
        out.push_str(&escape_csv_row(row));
        out.push('\n');
    }
    out
}

fn escape_csv_row(row: &[String]) -> String {
    let escaped: Vec<String> = row
        .iter()
        .map(|v| {
            if v.contains(',') || v.contains('"') || v.contains('\n') {
                format!("\"{}\"", v.replace('"', "\"\""))
            } else {
                v.clone()
            }
        })
        .collect();
    escaped.join(",")
}
