//! arXiv API client.
//!
//! Searches the Atom feed at `export.arxiv.org` and downloads PDFs into the
//! configured directory.
//!
//! API etiquette (per arXiv's terms of use):
//! - At most one request per second, plus a little jitter
//! - Retry with backoff on network errors, 429 and 5xx
//! - A descriptive User-Agent

use crate::config::AppConfig;
use crate::error::{ArxivError, Result};
use crate::models::{DownloadStatus, PaperRecord};
use crate::naming::{build_filename, extract_arxiv_ids, find_existing_versions};
use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A parsed feed entry
#[derive(Debug, Clone)]
pub struct ArxivEntry {
    pub base_id: String,
    pub id_with_version: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub pdf_url: String,
}

impl ArxivEntry {
    pub fn year(&self) -> i32 {
        self.published.year()
    }

    fn record(&self, status: DownloadStatus) -> PaperRecord {
        let mut record = PaperRecord::new(self.id_with_version.clone(), self.title.clone(), status);
        record.arxiv_id = self.base_id.clone();
        record
    }
}

// === Atom feed structures ===

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    published: String,
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<RawAuthor>,
    #[serde(rename = "link", default)]
    links: Vec<RawLink>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@type", default)]
    link_type: Option<String>,
}

/// Parse an arXiv Atom response. Entries with an unparseable id or
/// publication date are skipped.
pub fn parse_atom_feed(xml: &str) -> Result<Vec<ArxivEntry>> {
    let feed: Feed = quick_xml::de::from_str(xml)?;

    let mut entries = Vec::with_capacity(feed.entries.len());
    for raw in feed.entries {
        if raw.id.trim().is_empty() {
            continue;
        }
        let (base_id, id_with_version) = match extract_arxiv_ids(&raw.id) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(id = %raw.id, error = %e, "Skipping entry with unparseable id");
                continue;
            }
        };
        let published = match DateTime::parse_from_rfc3339(raw.published.trim()) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                warn!(published = %raw.published, error = %e, "Skipping entry with invalid date");
                continue;
            }
        };
        let updated = raw
            .updated
            .as_deref()
            .and_then(|u| DateTime::parse_from_rfc3339(u.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(published);

        let pdf_url = raw
            .links
            .iter()
            .find(|l| l.link_type.as_deref() == Some("application/pdf") && !l.href.is_empty())
            .map(|l| l.href.clone())
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}.pdf", id_with_version));

        entries.push(ArxivEntry {
            base_id,
            id_with_version,
            title: raw.title.split_whitespace().collect::<Vec<_>>().join(" "),
            authors: raw.authors.into_iter().map(|a| a.name.trim().to_string()).collect(),
            published,
            updated,
            pdf_url,
        });
    }
    Ok(entries)
}

/// Build the Atom query URL for a keyword search, newest first.
pub fn build_search_url(api_url: &str, keywords: &str, max_results: u32) -> String {
    format!(
        "{}?search_query={}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
        api_url,
        urlencoding::encode(&format!("all:{}", keywords)),
        max_results
    )
}

/// Spaces out requests: a fixed minimum interval plus random jitter.
struct RateLimiter {
    min_interval: Duration,
    jitter_ms: (u64, u64),
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration, jitter_ms: (u64, u64)) -> Self {
        Self {
            min_interval,
            jitter_ms,
            last_call: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(elapsed) = last.map(|t| t.elapsed()) {
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        let (lo, hi) = self.jitter_ms;
        let jitter = rand::thread_rng().gen_range(lo..=hi.max(lo));
        tokio::time::sleep(Duration::from_millis(jitter)).await;
        *last = Some(Instant::now());
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// arXiv client with rate limiting and retries
pub struct ArxivClient {
    client: reqwest::Client,
    limiter: RateLimiter,
    config: AppConfig,
}

impl ArxivClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| ArxivError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(config.rate_limit, config.jitter_ms),
            config: config.clone(),
        })
    }

    /// GET `url`, retrying transient failures with the configured backoff.
    async fn get_with_retries(&self, url: &str) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            self.limiter.wait().await;

            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let error = if status == StatusCode::TOO_MANY_REQUESTS {
                        ArxivError::RateLimited(self.config.backoff_for(attempt).as_secs().max(1))
                    } else {
                        ArxivError::Api {
                            code: status.as_u16(),
                            message: format!("Unexpected status {} for {}", status, url),
                        }
                    };
                    if !is_retryable(status) {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(e) => last_error = Some(ArxivError::Network(e)),
            }

            let backoff = self.config.backoff_for(attempt);
            warn!(
                url = url,
                attempt = attempt + 1,
                wait_ms = backoff.as_millis() as u64,
                "Request failed, backing off"
            );
            tokio::time::sleep(backoff).await;
        }

        Err(last_error.unwrap_or_else(|| ArxivError::Config(format!("No attempts made for {}", url))))
    }

    /// Search arXiv for `keywords`, newest submissions first.
    pub async fn search(&self, keywords: &str, max_results: u32) -> Result<Vec<ArxivEntry>> {
        let url = build_search_url(&self.config.arxiv_api_url, keywords, max_results);
        info!(keywords = keywords, max_results = max_results, "Querying arXiv");

        let body = self.get_with_retries(&url).await?.text().await?;
        let entries = parse_atom_feed(&body)?;

        debug!(count = entries.len(), "Parsed arXiv feed");
        Ok(entries)
    }

    /// Download the PDF for `entry` into `pdf_dir`.
    ///
    /// Never fails: problems are reported through the record's status and
    /// reason. A complete copy already on disk is kept; other versions of
    /// the same paper are removed once the new one is in place.
    pub async fn download(&self, entry: &ArxivEntry, pdf_dir: &Path) -> PaperRecord {
        let first_author = entry.authors.first().map(String::as_str).unwrap_or("unknown");
        let file_name = build_filename(
            entry.year(),
            &entry.id_with_version,
            first_author,
            &entry.title,
            self.config.max_filename_length,
        );
        let file_path = pdf_dir.join(&file_name);

        if let Ok(meta) = tokio::fs::metadata(&file_path).await {
            if meta.len() > self.config.min_pdf_size_bytes {
                info!(file = %file_path.display(), "Skipping existing file");
                return self.finished_record(entry, DownloadStatus::AlreadyExists, &file_name);
            }
            warn!(file = %file_path.display(), "Removing incomplete file before re-download");
            let _ = tokio::fs::remove_file(&file_path).await;
        }

        let old_versions = find_existing_versions(pdf_dir, &entry.base_id, &file_name);
        let temp_path = file_path.with_extension("part");

        match self.fetch_pdf(&entry.pdf_url, &temp_path, &file_path).await {
            Ok(()) => {
                for old in &old_versions {
                    info!(file = %old.display(), "Removing superseded version");
                    let _ = tokio::fs::remove_file(old).await;
                }
                let status = if old_versions.is_empty() {
                    DownloadStatus::Downloaded
                } else {
                    DownloadStatus::ReplacedOldVersion
                };
                self.finished_record(entry, status, &file_name)
            }
            Err(e) => {
                warn!(url = %entry.pdf_url, error = %e, "PDF download failed");
                let _ = tokio::fs::remove_file(&temp_path).await;
                let mut record = entry.record(DownloadStatus::Failed);
                record.reason = Some(e.to_string());
                record
            }
        }
    }

    fn finished_record(&self, entry: &ArxivEntry, status: DownloadStatus, file_name: &str) -> PaperRecord {
        let mut record = entry.record(status).with_file_name(file_name);
        record.relative_path = Some(format!("pdf_files/{}", file_name));
        record
    }

    /// Stream a PDF into `temp_path`, validate it, then move it to `dest`.
    async fn fetch_pdf(&self, url: &str, temp_path: &PathBuf, dest: &Path) -> Result<()> {
        debug!(url = url, dest = %dest.display(), "Downloading PDF");
        let mut response = self.get_with_retries(url).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !content_type.contains("pdf") {
            return Err(ArxivError::Parse(format!("Unexpected content type: {}", content_type)));
        }

        let mut file = tokio::fs::File::create(temp_path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if written <= self.config.min_pdf_size_bytes {
            return Err(ArxivError::Parse(format!("Downloaded file too small ({} bytes)", written)));
        }

        tokio::fs::rename(temp_path, dest).await?;
        Ok(())
    }
}
