//! Keyword search and PDF download.
//!
//! One keyword is searched at a time, newest first, filtered by year and
//! downloaded sequentially (the arXiv client is rate limited anyway). A
//! keyword list is walked in order until `max_num` distinct papers are
//! collected; a failing keyword is recorded and the walk continues.

use crate::arxiv::ArxivClient;
use crate::config::AppConfig;
use crate::error::Result;
use crate::models::{CrawlSummary, PaperRecord};
use crate::validate::YearRange;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use tracing::{info, warn};

/// Result of searching a keyword list
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    pub success: bool,
    pub results: Vec<PaperRecord>,
    pub summary: CrawlSummary,
    /// `keyword: reason` for every failed keyword, joined with `; `
    pub error: Option<String>,
}

/// Walk `keywords` in order, asking `crawl_one` for the papers still
/// missing, and merge the results without duplicates.
pub async fn aggregate_keywords<F, Fut>(keywords: &[String], max_num: u32, mut crawl_one: F) -> CrawlOutcome
where
    F: FnMut(String, u32) -> Fut,
    Fut: Future<Output = Result<Vec<PaperRecord>>>,
{
    let keywords: Vec<&str> = keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()).collect();
    if keywords.is_empty() {
        return CrawlOutcome {
            error: Some("No usable keywords".to_string()),
            ..Default::default()
        };
    }

    let mut aggregated: Vec<PaperRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut failures: Vec<String> = Vec::new();

    for keyword in keywords {
        let remaining = (max_num as usize).saturating_sub(aggregated.len());
        if remaining == 0 {
            break;
        }

        match crawl_one(keyword.to_string(), remaining as u32).await {
            Ok(records) => {
                for record in records {
                    let key = record.match_key().unwrap_or_default().to_string();
                    if seen.insert(key) {
                        aggregated.push(record);
                    }
                }
            }
            Err(e) => {
                warn!(keyword = keyword, error = %e, "Keyword search failed");
                failures.push(format!("{}: {}", keyword, e));
            }
        }
    }
    aggregated.truncate(max_num as usize);

    CrawlOutcome {
        success: !aggregated.is_empty(),
        summary: CrawlSummary::from_records(&aggregated),
        results: aggregated,
        error: (!failures.is_empty()).then(|| failures.join("; ")),
    }
}

/// Searches arXiv and downloads into a PDF directory
pub struct Crawler {
    client: ArxivClient,
    prefetch_cap: u32,
}

impl Crawler {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: ArxivClient::new(config)?,
            prefetch_cap: config.prefetch_cap,
        })
    }

    /// Number of entries requested from arXiv for `max_num` downloads
    pub fn prefetch_count(&self, max_num: u32) -> u32 {
        self.prefetch_cap.min(max_num.saturating_mul(3)).max(1)
    }

    /// Search one keyword and download up to `max_num` matching papers.
    pub async fn crawl_keyword(
        &self,
        keywords: &str,
        year_range: Option<YearRange>,
        max_num: u32,
        pdf_dir: &Path,
    ) -> Result<Vec<PaperRecord>> {
        tokio::fs::create_dir_all(pdf_dir).await?;

        let entries = self.client.search(keywords, self.prefetch_count(max_num)).await?;
        let selected: Vec<_> = entries
            .into_iter()
            .filter(|e| year_range.map_or(true, |r| r.contains(e.year())))
            .take(max_num as usize)
            .collect();

        info!(keywords = keywords, selected = selected.len(), "Downloading papers");

        let mut records = Vec::with_capacity(selected.len());
        for entry in &selected {
            records.push(self.client.download(entry, pdf_dir).await);
        }
        Ok(records)
    }

    /// Search every keyword in turn until `max_num` papers are collected.
    pub async fn crawl_keyword_list(
        &self,
        keywords: &[String],
        year_range: Option<YearRange>,
        max_num: u32,
        pdf_dir: &Path,
    ) -> CrawlOutcome {
        let outcome = aggregate_keywords(keywords, max_num, |keyword, remaining| async move {
            self.crawl_keyword(&keyword, year_range, remaining, pdf_dir).await
        })
        .await;

        info!(
            keywords = keywords.len(),
            total = outcome.summary.total,
            downloaded = outcome.summary.downloaded,
            failed = outcome.summary.failed,
            "Crawl finished"
        );
        outcome
    }
}
