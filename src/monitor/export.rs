//! Rendering of monitor snapshots for operators and dashboards.

use std::io::Write;

use super::snapshot::ConsumerSnapshot;
use crate::error::MonitorError;

const HEADERS: [&str; 4] = ["Consumer id", "Idle time", "Pending items", "Status"];

/// Right-aligned columns (the numeric ones).
const NUMERIC: [bool; 4] = [false, true, true, false];

fn cells(snapshot: &ConsumerSnapshot) -> [String; 4] {
    [
        snapshot.consumer_id.clone(),
        snapshot.idle_ms.to_string(),
        snapshot.pending.to_string(),
        snapshot.status.label().to_string(),
    ]
}

fn separator(widths: &[usize; 4], fill: char) -> String {
    let mut line = String::from("+");
    for width in widths {
        line.extend(std::iter::repeat(fill).take(width + 2));
        line.push('+');
    }
    line
}

fn row(values: &[String; 4], widths: &[usize; 4]) -> String {
    let mut line = String::from("|");
    for (column, value) in values.iter().enumerate() {
        let width = widths[column];
        if NUMERIC[column] {
            line.push_str(&format!(" {value:>width$} |"));
        } else {
            line.push_str(&format!(" {value:<width$} |"));
        }
    }
    line
}

/// Renders snapshots as a grid table with the columns
/// `Consumer id | Idle time | Pending items | Status`.
pub fn render_table(snapshots: &[ConsumerSnapshot]) -> String {
    let rows: Vec<[String; 4]> = snapshots.iter().map(cells).collect();
    let headers = HEADERS.map(str::to_string);

    let mut widths = HEADERS.map(|h| h.chars().count());
    for values in &rows {
        for (column, value) in values.iter().enumerate() {
            widths[column] = widths[column].max(value.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() * 2 + 3);
    lines.push(separator(&widths, '-'));
    lines.push(row(&headers, &widths));
    lines.push(separator(&widths, '='));
    for values in &rows {
        lines.push(row(values, &widths));
        lines.push(separator(&widths, '-'));
    }
    if rows.is_empty() {
        lines.pop();
        lines.push(separator(&widths, '-'));
    }

    let mut table = lines.join("\n");
    table.push('\n');
    table
}

/// Writes the snapshot table to `writer`.
///
/// # Errors
///
/// Returns `MonitorError::Io` if writing fails.
pub fn export_table<W: Write>(
    snapshots: &[ConsumerSnapshot],
    writer: &mut W,
) -> Result<(), MonitorError> {
    writer.write_all(render_table(snapshots).as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Renders one JSON object per consumer, one per line.
///
/// # Errors
///
/// Returns `MonitorError::Json` if serialization fails.
pub fn export_json(snapshots: &[ConsumerSnapshot]) -> Result<String, MonitorError> {
    let mut out = String::new();
    for snapshot in snapshots {
        out.push_str(&serde_json::to_string(snapshot)?);
        out.push('\n');
    }
    Ok(out)
}
