//! Search form validation.
//!
//! Everything here runs before any network call. The session layer and
//! the `/crawl/search` handler share these helpers so both sides reject
//! the same input.

use crate::error::{ArxivError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Inclusive publication year filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        self.start <= year && year <= self.end
    }
}

impl std::fmt::Display for YearRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

fn year_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{4})\s*-\s*(\d{4})\s*$").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Parse a `YYYY-YYYY` filter. Empty or absent input means no filter.
pub fn parse_year_range(raw: Option<&str>) -> Result<Option<YearRange>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    let caps = year_range_regex()
        .captures(raw)
        .ok_or_else(|| ArxivError::Validation("year range must look like YYYY-YYYY".to_string()))?;

    let year = |idx: usize| -> Result<i32> {
        caps.get(idx)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| ArxivError::Validation(format!("invalid year in range: {}", raw)))
    };
    let (start, end) = (year(1)?, year(2)?);

    if start > end {
        return Err(ArxivError::Validation(
            "year range start must not be after its end".to_string(),
        ));
    }
    Ok(Some(YearRange { start, end }))
}

/// Clamp a requested count into `[1, max]`; absent means `default`.
pub fn clamp_count(raw: Option<i64>, default: u32, max: u32) -> u32 {
    match raw {
        None => default,
        Some(v) if v < 1 => 1,
        Some(v) if v > i64::from(max) => max,
        Some(v) => v as u32,
    }
}

/// Split a free-form keyword field on commas, semicolons (ASCII or
/// full-width) and whitespace.
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(|c: char| matches!(c, ',' | ';' | '，' | '；') || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Case-insensitive dedup keeping first occurrence order.
pub fn dedup_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keywords
        .into_iter()
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect()
}

/// Require a description or at least one explicit keyword.
pub fn require_search_input(query_text: Option<&str>, keywords: Option<&str>) -> Result<()> {
    let has_query = query_text.is_some_and(|q| !q.trim().is_empty());
    let has_keywords = keywords.is_some_and(|k| !split_keywords(k).is_empty());
    if has_query || has_keywords {
        Ok(())
    } else {
        Err(ArxivError::Validation(
            "provide a research description or at least one keyword".to_string(),
        ))
    }
}
