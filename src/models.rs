//! Shared data model and wire types.
//!
//! [`PaperRecord`] is the unit every job works on. The request/response
//! structs mirror the JSON bodies of the `/api` endpoints and are used by
//! both the axum handlers and the session client, so the two sides cannot
//! drift apart.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of downloading one paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Downloaded,
    AlreadyExists,
    ReplacedOldVersion,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::AlreadyExists => "already_exists",
            Self::ReplacedOldVersion => "replaced_old_version",
            Self::Failed => "failed",
        }
    }
}

/// Per-record parse outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordParseStatus {
    Running,
    Succeeded,
    Failed,
}

impl RecordParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// One searched/downloaded paper and whatever parsing attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// arXiv id with version, e.g. `2401.01234v2`. Empty when unknown.
    #[serde(rename = "id_with_version", default)]
    pub identity: String,
    #[serde(default)]
    pub arxiv_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub relative_path: Option<String>,
    #[serde(rename = "status")]
    pub download_status: DownloadStatus,
    /// Download failure reason
    #[serde(default)]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_status: Option<RecordParseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub innovation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_at: Option<String>,
}

impl PaperRecord {
    pub fn new(identity: impl Into<String>, title: impl Into<String>, status: DownloadStatus) -> Self {
        let identity = identity.into();
        let arxiv_id = identity
            .rsplit_once('v')
            .filter(|(_, version)| !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()))
            .map(|(base, _)| base.to_string())
            .unwrap_or_else(|| identity.clone());
        Self {
            identity,
            arxiv_id,
            title: title.into(),
            file_name: None,
            relative_path: None,
            download_status: status,
            reason: None,
            parse_status: None,
            parse_error: None,
            innovation: None,
            method: None,
            conclusion: None,
            summary: None,
            parsed_at: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Identity, then file name, then title, whichever is first non-empty.
    pub fn match_key(&self) -> Option<&str> {
        [
            Some(self.identity.as_str()),
            self.file_name.as_deref(),
            Some(self.title.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|k| !k.is_empty())
    }

    /// Whether `incoming` is an update of this record.
    ///
    /// Only the field `incoming` would key on is compared: its identity when
    /// present, else its file name, else its title.
    pub fn is_matched_by(&self, incoming: &PaperRecord) -> bool {
        fn non_empty(value: Option<&str>) -> Option<&str> {
            value.map(str::trim).filter(|v| !v.is_empty())
        }

        if let Some(identity) = non_empty(Some(&incoming.identity)) {
            return non_empty(Some(&self.identity)) == Some(identity);
        }
        if let Some(file_name) = non_empty(incoming.file_name.as_deref()) {
            return non_empty(self.file_name.as_deref()) == Some(file_name);
        }
        non_empty(Some(&incoming.title)).is_some_and(|title| non_empty(Some(&self.title)) == Some(title))
    }

    /// Whether the paper has a local PDF that can be parsed.
    pub fn is_parse_candidate(&self) -> bool {
        self.download_status != DownloadStatus::Failed
    }
}

/// Job status vocabulary shared by the parse and session layers.
///
/// The set is deliberately loose: pollers may report any of the synonyms
/// below, and unknown strings are preserved as [`JobStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    #[default]
    Idle,
    Ready,
    Queued,
    Pending,
    Running,
    Succeeded,
    Completed,
    Success,
    Done,
    Failed,
    Error,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Completed => "completed",
            Self::Success => "success",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Completed | Self::Success | Self::Done)
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "idle" => Self::Idle,
            "ready" => Self::Ready,
            "queued" => Self::Queued,
            "pending" => Self::Pending,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "completed" => Self::Completed,
            "success" => Self::Success,
            "done" => Self::Done,
            "failed" => Self::Failed,
            "error" => Self::Error,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Excel export status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcelStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ExcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// === Search / download ===

/// `POST /api/crawl/search` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_dir: Option<String>,
}

/// Per-status download counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub downloaded: usize,
    #[serde(default)]
    pub already_exists: usize,
    #[serde(default)]
    pub replaced_old_version: usize,
    #[serde(default)]
    pub failed: usize,
}

impl CrawlSummary {
    pub fn from_records(records: &[PaperRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.download_status {
                DownloadStatus::Downloaded => summary.downloaded += 1,
                DownloadStatus::AlreadyExists => summary.already_exists += 1,
                DownloadStatus::ReplacedOldVersion => summary.replaced_old_version += 1,
                DownloadStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

/// Storage directories reported back by a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_dir: Option<String>,
}

/// Echo of the effective search parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestedParams {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub year_range: Option<String>,
    #[serde(default)]
    pub max_num: u32,
    #[serde(default)]
    pub query_text: Option<String>,
}

/// `POST /api/crawl/search` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<PaperRecord>,
    #[serde(default)]
    pub summary: CrawlSummary,
    #[serde(default)]
    pub generated_keywords: Vec<String>,
    #[serde(default)]
    pub storage: StorageInfo,
    #[serde(default)]
    pub requested: RequestedParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === Parse ===

/// `POST /api/parse/start` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseStartRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<PaperRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseSummary {
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default)]
    pub parsed: Option<usize>,
    #[serde(default)]
    pub failed: Option<usize>,
}

/// `POST /api/parse/start` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseStartResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub summary: ParseSummary,
    #[serde(default)]
    pub results: Vec<PaperRecord>,
    #[serde(default)]
    pub storage: StorageInfo,
}

/// `GET /api/parse/progress` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseProgress {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub current: usize,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub source_dir: Option<String>,
}

// === Excel ===

/// `POST /api/excel/generate` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcelGenerateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<PaperRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

/// `POST /api/excel/generate` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcelGenerateResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// `GET /api/excel/status` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcelStatusResponse {
    #[serde(default)]
    pub status: ExcelStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

// === System ===

/// `GET /api/system/storage` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageResponse {
    pub pdf_dir: String,
    pub excel_dir: String,
    #[serde(default)]
    pub log_dir: Option<String>,
}

/// Body of non-2xx JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_names() {
        let json = r#"{
            "title": "Attention",
            "arxiv_id": "1706.03762",
            "id_with_version": "1706.03762v7",
            "status": "replaced_old_version",
            "file_name": "2017-1706.03762v7-Ashish-Vaswani-attention.pdf",
            "relative_path": "pdf_files/2017-1706.03762v7-Ashish-Vaswani-attention.pdf",
            "reason": null
        }"#;
        let record: PaperRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.identity, "1706.03762v7");
        assert_eq!(record.download_status, DownloadStatus::ReplacedOldVersion);
        assert!(record.parse_status.is_none());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id_with_version"], "1706.03762v7");
        assert_eq!(value["status"], "replaced_old_version");
        assert!(value.get("parse_status").is_none());
    }

    #[test]
    fn test_new_derives_base_id() {
        let record = PaperRecord::new("2401.01234v3", "T", DownloadStatus::Downloaded);
        assert_eq!(record.arxiv_id, "2401.01234");
        let bare = PaperRecord::new("2401.01234", "T", DownloadStatus::Downloaded);
        assert_eq!(bare.arxiv_id, "2401.01234");
    }

    #[test]
    fn test_match_key_priority() {
        let mut record = PaperRecord::new("2401.00001v1", "Title", DownloadStatus::Downloaded)
            .with_file_name("a.pdf");
        assert_eq!(record.match_key(), Some("2401.00001v1"));
        record.identity.clear();
        assert_eq!(record.match_key(), Some("a.pdf"));
        record.file_name = Some("  ".to_string());
        assert_eq!(record.match_key(), Some("Title"));
        record.title.clear();
        assert_eq!(record.match_key(), None);
    }

    #[test]
    fn test_matched_by_uses_incoming_priority() {
        let stored = PaperRecord::new("2401.00001v1", "Alpha", DownloadStatus::Downloaded).with_file_name("a.pdf");

        let by_file = PaperRecord::new("", "Other title", DownloadStatus::Downloaded).with_file_name("a.pdf");
        assert!(stored.is_matched_by(&by_file));

        let other_id = PaperRecord::new("2401.00001v2", "Alpha", DownloadStatus::Downloaded).with_file_name("a.pdf");
        assert!(!stored.is_matched_by(&other_id));

        let by_title = PaperRecord::new("", "Alpha", DownloadStatus::Downloaded);
        assert!(stored.is_matched_by(&by_title));

        let keyless = PaperRecord::new("", "", DownloadStatus::Downloaded);
        assert!(!stored.is_matched_by(&keyless));
    }

    #[test]
    fn test_job_status_vocabulary() {
        for s in ["succeeded", "completed", "success", "done"] {
            assert!(JobStatus::from(s).is_terminal_success(), "{s}");
        }
        assert!(JobStatus::from("ERROR").is_terminal_failure());
        assert_eq!(JobStatus::from("cancelled"), JobStatus::Other("cancelled".to_string()));

        let parsed: JobStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(parsed, JobStatus::Running);
        assert_eq!(serde_json::to_string(&JobStatus::Completed).unwrap(), "\"completed\"");
    }

    #[test]
    fn test_crawl_summary_counts() {
        let records = vec![
            PaperRecord::new("1v1", "a", DownloadStatus::Downloaded),
            PaperRecord::new("2v1", "b", DownloadStatus::AlreadyExists),
            PaperRecord::new("3v1", "c", DownloadStatus::Failed),
        ];
        let summary = CrawlSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.already_exists, 1);
        assert_eq!(summary.failed, 1);
    }
}
