//! CSV serialization of window records.
//!
//! Writes the records of one window in their wire column order, one row per
//! record. Output is UTF-8 with a leading BOM and CRLF row endings so the
//! common spreadsheet tools open it without an import dialog.

use crate::feed::types::TelemetryRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;

/// Column order of the exported file.
pub const CSV_HEADERS: [&str; 17] = [
    "timestamp",
    "machine_id",
    "state",
    "mode",
    "status",
    "vr",
    "vy",
    "vb",
    "ir",
    "iy",
    "ib",
    "kw",
    "kwh_total",
    "pf",
    "count_total",
    "temp_c",
    "alarm_code",
];

/// Export errors.
#[derive(Debug)]
pub enum ExportError {
    /// There is nothing in the window to export.
    EmptyWindow,
    /// Writing to the destination failed.
    IoError(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::EmptyWindow => {
                write!(f, "no data in the selected time window to export")
            }
            ExportError::IoError(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for ExportError {}

/// Write `window` as CSV; returns the number of rows written.
pub fn write_csv<W: Write>(out: &mut W, window: &[TelemetryRecord]) -> Result<usize, ExportError> {
    if window.is_empty() {
        return Err(ExportError::EmptyWindow);
    }

    let mut rows = Vec::with_capacity(window.len() + 1);
    rows.push(CSV_HEADERS.join(","));
    for record in window {
        rows.push(record_row(record));
    }

    // BOM first, CRLF between rows.
    out.write_all("\u{FEFF}".as_bytes())
        .and_then(|_| out.write_all(rows.join("\r\n").as_bytes()))
        .map_err(|e| ExportError::IoError(e.to_string()))?;

    Ok(window.len())
}

/// Default export filename, stamped with the given time.
pub fn default_export_filename(now: DateTime<Utc>) -> String {
    format!("device_stream_{}.csv", now.format("%Y-%m-%d_%H-%M-%S"))
}

fn record_row(record: &TelemetryRecord) -> String {
    let cells = [
        record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        record.machine_id.clone(),
        record.state.as_str().to_string(),
        record.mode.clone().unwrap_or_default(),
        record.status.clone().unwrap_or_default(),
        num_cell(record.vr),
        num_cell(record.vy),
        num_cell(record.vb),
        num_cell(record.ir),
        num_cell(record.iy),
        num_cell(record.ib),
        num_cell(record.kw),
        num_cell(record.kwh_total),
        num_cell(record.pf),
        num_cell(record.count_total),
        num_cell(record.temp_c),
        record.alarm_code.clone().unwrap_or_default(),
    ];
    cells
        .iter()
        .map(|cell| escape_csv(cell))
        .collect::<Vec<_>>()
        .join(",")
}

/// Missing values export as empty cells.
fn num_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Quote a cell when it contains a delimiter, quote, or line break.
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
