//! arXiv identifiers and on-disk PDF file names.
//!
//! File names follow `{year}-{id_with_version}-{first_author}-{title_slug}.pdf`
//! so that every version of a paper can be found with a `*-{base_id}v*.pdf`
//! glob when a newer version replaces it.

use crate::error::{ArxivError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const ELLIPSIS: char = '…';
const PDF_SUFFIX_LEN: usize = 4;
const TITLE_SLUG_WORDS: usize = 8;

fn arxiv_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4}\.\d{4,5})(v\d+)?").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Split an arXiv id or abs URL into `(base_id, id_with_version)`.
///
/// A missing version is treated as `v1`.
pub fn extract_arxiv_ids(identifier: &str) -> Result<(String, String)> {
    let caps = arxiv_id_regex()
        .captures(identifier)
        .ok_or_else(|| ArxivError::Parse(format!("cannot parse arXiv id: {}", identifier)))?;
    let base = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
    let version = caps.get(2).map(|m| m.as_str()).unwrap_or("v1");
    let with_version = format!("{}{}", base, version);
    Ok((base, with_version))
}

fn is_invalid_filename_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || (c as u32) < 0x20
}

/// Make a string safe to embed in a file name.
pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value.trim().chars().filter(|c| !is_invalid_filename_char(*c)).collect();
    let joined = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    let mut collapsed = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches(|c| matches!(c, '-' | '.' | '_'));
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercase, hyphenated slug of the first words of a title.
pub fn slugify_title(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    let words: Vec<&str> = lowered.split_whitespace().take(TITLE_SLUG_WORDS).collect();
    if words.is_empty() {
        return sanitize_component("untitled");
    }
    sanitize_component(&words.join("-"))
}

/// Truncate `base_name` so that `base_name + ".pdf"` fits in `limit` characters.
pub fn enforce_filename_length(base_name: &str, limit: usize) -> String {
    if base_name.chars().count() <= limit.saturating_sub(PDF_SUFFIX_LEN) {
        return base_name.to_string();
    }
    let allowed = limit.saturating_sub(PDF_SUFFIX_LEN + 1);
    if allowed == 0 {
        return ELLIPSIS.to_string();
    }
    let head: String = base_name.chars().take(allowed).collect();
    let trimmed = head.trim_end_matches(|c| matches!(c, '-' | '.' | '_'));
    let mut name = if trimmed.is_empty() { head.clone() } else { trimmed.to_string() };
    name.push(ELLIPSIS);
    name
}

/// Build the canonical PDF file name for a paper.
pub fn build_filename(year: i32, id_with_version: &str, first_author: &str, title: &str, limit: usize) -> String {
    let base = format!(
        "{}-{}-{}-{}",
        year,
        sanitize_component(id_with_version),
        sanitize_component(first_author),
        slugify_title(title)
    );
    format!("{}.pdf", enforce_filename_length(&base, limit))
}

/// Other versions of `base_id` already present in `pdf_dir`, excluding `keep`.
pub fn find_existing_versions(pdf_dir: &Path, base_id: &str, keep: &str) -> Vec<PathBuf> {
    let marker = format!("-{}v", base_id);
    let Ok(entries) = std::fs::read_dir(pdf_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n != keep && n.ends_with(".pdf") && n.contains(&marker))
        })
        .collect()
}
