//! Session-scoped job and form state.

use crate::config::{DEFAULT_KEYWORD_COUNT, DEFAULT_MAX_NUM, MAX_ALLOWED_NUM, MAX_KEYWORD_COUNT};
use crate::error::Result;
use crate::models::{ExcelStatus, ExcelStatusResponse, JobStatus, ParseProgress, SearchRequest};
use crate::validate::{clamp_count, parse_year_range, require_search_input};

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Which screen the session is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Home,
    Results,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// Whole-job parse state as the session sees it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseState {
    pub status: JobStatus,
    pub message: Option<String>,
    pub updated_at: Option<String>,
    pub source_dir: Option<String>,
    pub progress: Progress,
}

impl ParseState {
    /// Overwrite with a polled snapshot. The source directory is kept when
    /// the poll does not report one.
    pub fn apply_progress(&mut self, progress: ParseProgress) {
        self.status = progress.status;
        self.message = progress.message.or(progress.last_error);
        self.updated_at = progress.updated_at;
        if progress.source_dir.is_some() {
            self.source_dir = progress.source_dir;
        }
        self.progress = Progress {
            current: progress.current,
            total: progress.total,
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExcelState {
    pub status: ExcelStatus,
    pub message: Option<String>,
    pub file: Option<String>,
    pub path: Option<String>,
    pub updated_at: Option<String>,
}

impl ExcelState {
    /// Overwrite with a polled snapshot.
    pub fn apply_status(&mut self, status: ExcelStatusResponse) {
        self.status = status.status;
        self.message = status.message;
        self.file = status.file;
        self.path = status.path;
        self.updated_at = status.updated_at;
    }
}

/// PDF source and spreadsheet destination for this session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    pub pdf_dir: Option<String>,
    pub excel_dir: Option<String>,
}

/// Keywords used by the last search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordPlan {
    keywords: Vec<String>,
}

impl KeywordPlan {
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn replace(&mut self, keywords: Vec<String>) {
        self.keywords = keywords;
    }
}

/// Search form input as typed by the user
#[derive(Debug, Clone, Default)]
pub struct SearchForm {
    pub query_text: String,
    pub keywords: String,
    pub year_range: String,
    pub keyword_count: Option<i64>,
    pub max_num: Option<i64>,
    pub pdf_dir: Option<String>,
    pub excel_dir: Option<String>,
}

impl SearchForm {
    /// Validate and normalise into a request body.
    pub fn to_request(&self) -> Result<SearchRequest> {
        require_search_input(Some(self.query_text.as_str()), Some(self.keywords.as_str()))?;
        let year_range = parse_year_range(Some(self.year_range.as_str()))?;

        let non_blank = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        Ok(SearchRequest {
            query_text: non_blank(&self.query_text),
            keywords: non_blank(&self.keywords),
            year_range: year_range.map(|r| r.to_string()),
            max_num: Some(i64::from(clamp_count(self.max_num, DEFAULT_MAX_NUM, MAX_ALLOWED_NUM))),
            keyword_count: Some(i64::from(clamp_count(
                self.keyword_count,
                DEFAULT_KEYWORD_COUNT,
                MAX_KEYWORD_COUNT,
            ))),
            pdf_dir: self.pdf_dir.as_deref().and_then(non_blank),
            excel_dir: self.excel_dir.as_deref().and_then(non_blank),
        })
    }
}
