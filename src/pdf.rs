//! PDF text extraction.

use crate::error::{ArxivError, Result};
use std::path::{Path, PathBuf};

/// Extract and normalise the text of a PDF off the async runtime.
pub async fn extract_text(path: &Path) -> Result<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_text_sync(&path))
        .await
        .map_err(|e| ArxivError::Pdf(format!("Task join error: {}", e)))?
}

fn extract_text_sync(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ArxivError::Pdf(format!("File not found: {}", path.display())));
    }
    let raw = pdf_extract::extract_text(path).map_err(|e| {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        ArxivError::Pdf(format!("Cannot read {}: {}", name, e))
    })?;
    Ok(normalize_whitespace(&raw))
}

/// Collapse whitespace inside lines and keep blank-line paragraph breaks.
pub fn normalize_whitespace(raw: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        current.extend(line.split_whitespace());
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}
