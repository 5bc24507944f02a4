//! Spreadsheet export of paper records.

use crate::error::{ArxivError, Result};
use crate::models::PaperRecord;
use chrono::Utc;
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use tracing::info;

/// Column order of the exported sheet
pub const COLUMNS: [&str; 12] = [
    "title",
    "arxiv_id",
    "id_with_version",
    "file_name",
    "status",
    "innovation",
    "method",
    "conclusion",
    "summary",
    "parse_status",
    "parse_error",
    "parsed_at",
];

fn row_values(record: &PaperRecord) -> [String; 12] {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        record.title.clone(),
        record.arxiv_id.clone(),
        record.identity.clone(),
        opt(&record.file_name),
        record.download_status.as_str().to_string(),
        opt(&record.innovation),
        opt(&record.method),
        opt(&record.conclusion),
        opt(&record.summary),
        record.parse_status.map(|s| s.as_str().to_string()).unwrap_or_default(),
        opt(&record.parse_error),
        opt(&record.parsed_at),
    ]
}

/// Write `records` to `arxiv_summary_<timestamp>.xlsx` inside `destination`.
pub fn generate_excel(records: &[PaperRecord], destination: &Path) -> Result<PathBuf> {
    if records.is_empty() {
        return Err(ArxivError::Precondition(
            "No records to export, finish a parse job first".to_string(),
        ));
    }
    std::fs::create_dir_all(destination)?;

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header = Format::new().set_bold();

    for (col, name) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header)?;
    }
    for (row, record) in records.iter().enumerate() {
        for (col, value) in row_values(record).iter().enumerate() {
            worksheet.write_string(row as u32 + 1, col as u16, value)?;
        }
    }
    worksheet.set_column_width(0, 60)?;
    worksheet.set_freeze_panes(1, 0)?;

    let file_name = format!("arxiv_summary_{}.xlsx", Utc::now().format("%Y%m%d_%H%M%S"));
    let path = destination.join(file_name);
    workbook.save(&path)?;

    info!(rows = records.len(), path = %path.display(), "Spreadsheet written");
    Ok(path)
}
