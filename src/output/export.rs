//! Tabular export of the observation log
//!
//! Produces a CSV with one row per record, in the fixed column order of the
//! spreadsheet the observations are transcribed into. Columns that are filled
//! in by hand later are left blank.

use crate::output::{OutputError, OutputResult};
use crate::storage::{scan_observations, write_atomic, ObservationRecord};
use chrono::{Datelike, NaiveDate};
use std::path::Path;

/// Export column headers, in order
pub const EXPORT_HEADERS: [&str; 18] = [
    "date",
    "week_number",
    "number",
    "life_stage (database)",
    "life_stage",
    "sex",
    "country",
    "location",
    "province",
    "x (Ea)",
    "y (N)",
    "Latitude",
    "Longitude",
    "activity",
    "host_plants",
    "hasComments",
    "comment",
    "link",
];

/// Summary of one export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    pub skipped_lines: usize,
}

/// ISO week number of a `DD-MM-YY` observation date
pub fn week_number(date: &str) -> Option<u32> {
    NaiveDate::parse_from_str(date, "%d-%m-%y")
        .ok()
        .map(|d| d.iso_week().week())
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Converts one record into an export row
pub fn export_row(record: &ObservationRecord) -> [String; 18] {
    [
        record.date.clone(),
        week_number(&record.date)
            .map(|w| w.to_string())
            .unwrap_or_default(),
        record.number_text.clone(),
        opt(&record.life_stage).to_string(),
        String::new(),
        opt(&record.sex).to_string(),
        opt(&record.country).to_string(),
        opt(&record.location).to_string(),
        opt(&record.province).to_string(),
        opt(&record.x_ea).to_string(),
        opt(&record.y_n).to_string(),
        opt(&record.latitude).to_string(),
        opt(&record.longitude).to_string(),
        record.activity.clone(),
        opt(&record.on_in).to_string(),
        if record.has_comments { "Yes" } else { "No" }.to_string(),
        String::new(),
        record.url.clone(),
    ]
}

/// Renders records as CSV bytes
pub fn render_csv(records: &[ObservationRecord]) -> OutputResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(EXPORT_HEADERS)
        .map_err(|e| OutputError::Format(e.to_string()))?;
    for record in records {
        writer
            .write_record(export_row(record))
            .map_err(|e| OutputError::Format(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| OutputError::Format(e.to_string()))
}

/// Exports the observation log at `observations_path` to `export_path`
///
/// Nothing is written when the log holds no valid records.
pub async fn export_observations(
    observations_path: &Path,
    export_path: &Path,
) -> OutputResult<ExportSummary> {
    let scan = scan_observations(observations_path)
        .await
        .map_err(|e| OutputError::Storage(e.to_string()))?;

    let summary = ExportSummary {
        rows: scan.records.len(),
        skipped_lines: scan.malformed.len(),
    };

    if scan.records.is_empty() {
        tracing::warn!("No data to export from {}", observations_path.display());
        return Ok(summary);
    }

    let bytes = render_csv(&scan.records)?;
    write_atomic(export_path, &bytes)
        .await
        .map_err(|e| OutputError::Write(e.to_string()))?;

    tracing::info!(
        "Exported {} observations to {}",
        summary.rows,
        export_path.display()
    );
    Ok(summary)
}
