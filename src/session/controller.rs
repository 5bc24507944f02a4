//! Session orchestration.
//!
//! [`SessionController`] is the single owner of the session state. Jobs run
//! in two phases: `begin_*` validates preconditions and applies the
//! optimistic `running` state synchronously, returning a ticket; the caller
//! awaits the request and hands the result to `complete_*`. The `trigger_*`
//! methods do both in one call. Tickets remember the search they were
//! issued under, so results that finish after a newer search are dropped.

use super::backend::Backend;
use super::guard::NavigationGuard;
use super::poll::{spawn_excel_poller, spawn_parse_poller, PollTask, PollUpdate};
use super::state::{now_iso, ExcelState, KeywordPlan, ParseState, Progress, SearchForm, StorageConfig, View};
use super::store::RecordStore;
use crate::error::{ArxivError, Result};
use crate::models::{
    CrawlSummary, ExcelGenerateRequest, ExcelGenerateResponse, ExcelStatus, JobStatus, ParseStartRequest,
    ParseStartResponse, SearchResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What a finished search reported
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub summary: CrawlSummary,
    pub keywords: Vec<String>,
    /// Non-fatal problems, e.g. some keyword queries failed
    pub warning: Option<String>,
}

/// Whether a completion was applied to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// Issued before the latest search; ignored
    Stale,
}

/// An issued parse request
#[derive(Debug, Clone)]
pub struct ParseTicket {
    epoch: u64,
    candidate_count: usize,
    pub request: ParseStartRequest,
}

/// An issued spreadsheet request
#[derive(Debug, Clone)]
pub struct ExcelTicket {
    epoch: u64,
    pub request: ExcelGenerateRequest,
}

pub struct SessionController<B: Backend> {
    backend: Arc<B>,
    store: RecordStore,
    parse: ParseState,
    excel: ExcelState,
    storage: StorageConfig,
    keywords: KeywordPlan,
    view: View,
    guard: NavigationGuard,
    /// Bumped by every applied search
    epoch: u64,
}

impl<B: Backend + 'static> SessionController<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            store: RecordStore::new(),
            parse: ParseState::default(),
            excel: ExcelState::default(),
            storage: StorageConfig::default(),
            keywords: KeywordPlan::default(),
            view: View::Home,
            guard: NavigationGuard::default(),
            epoch: 0,
        }
    }

    pub fn backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn parse_state(&self) -> &ParseState {
        &self.parse
    }

    pub fn excel_state(&self) -> &ExcelState {
        &self.excel
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn keyword_plan(&self) -> &KeywordPlan {
        &self.keywords
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// User navigation. The guard runs right after, so it may redirect.
    pub fn navigate(&mut self, view: View) -> View {
        self.view = view;
        self.run_guard();
        self.view
    }

    /// Override the storage directories; `None` leaves a field unchanged.
    pub fn set_storage(&mut self, pdf_dir: Option<String>, excel_dir: Option<String>) {
        if pdf_dir.is_some() {
            self.storage.pdf_dir = pdf_dir;
        }
        if excel_dir.is_some() {
            self.storage.excel_dir = excel_dir;
        }
    }

    /// Fill unset storage directories from the server defaults.
    pub async fn load_storage_defaults(&mut self) -> Result<()> {
        let defaults = self.backend.storage_defaults().await?;
        self.storage.pdf_dir.get_or_insert(defaults.pdf_dir);
        self.storage.excel_dir.get_or_insert(defaults.excel_dir);
        Ok(())
    }

    fn run_guard(&mut self) {
        if let Some(target) = self.guard.evaluate(&self.parse.status, self.view) {
            info!(from = ?self.view, to = ?target, status = %self.parse.status, "Navigation guard redirect");
            self.view = target;
        }
    }

    // === Search ===

    /// Validate the form, run the search and reset the session to its results.
    ///
    /// Validation errors are returned before any request is made. Transport
    /// errors and server-reported failures leave the session untouched.
    pub async fn search(&mut self, form: &SearchForm) -> Result<SearchOutcome> {
        let request = form.to_request()?;
        let response = self.backend.search(&request).await?;
        if !response.success {
            let message = response.error.unwrap_or_else(|| "Search failed".to_string());
            return Err(ArxivError::JobFailed(message));
        }
        Ok(self.apply_search(response, request.excel_dir))
    }

    fn apply_search(&mut self, response: SearchResponse, excel_override: Option<String>) -> SearchOutcome {
        self.epoch += 1;
        let summary = response.summary.clone();

        self.store.replace_all(response.results);
        self.parse = ParseState {
            status: if summary.downloaded > 0 { JobStatus::Ready } else { JobStatus::Idle },
            message: Some(format!("{} papers downloaded", summary.downloaded)),
            updated_at: Some(now_iso()),
            source_dir: response.storage.pdf_dir.clone(),
            progress: Progress::default(),
        };
        self.excel = ExcelState::default();
        self.keywords.replace(response.generated_keywords.clone());

        if let Some(pdf_dir) = response.storage.pdf_dir {
            self.storage.pdf_dir = Some(pdf_dir);
        }
        if let Some(excel_dir) = response.storage.excel_dir.or(excel_override) {
            self.storage.excel_dir = Some(excel_dir);
        }
        self.run_guard();

        if let Some(warning) = &response.error {
            warn!(warning = %warning, "Search finished with warnings");
        }
        info!(total = summary.total, downloaded = summary.downloaded, "Search applied");

        SearchOutcome {
            summary,
            keywords: response.generated_keywords,
            warning: response.error,
        }
    }

    // === Parse ===

    /// Check there is something to parse and mark the job running.
    pub fn begin_parse(&mut self) -> Result<ParseTicket> {
        let candidates = self.store.parse_candidates();
        if candidates.is_empty() {
            return Err(ArxivError::Precondition(
                "No downloaded papers to parse, run a search first".to_string(),
            ));
        }
        let candidate_count = candidates.len();

        self.parse.status = JobStatus::Running;
        self.parse.message = Some(format!("Parsing {} papers", candidate_count));
        self.parse.updated_at = Some(now_iso());
        self.parse.progress = Progress {
            current: 0,
            total: candidate_count,
        };
        self.run_guard();

        Ok(ParseTicket {
            epoch: self.epoch,
            candidate_count,
            request: ParseStartRequest {
                records: Some(candidates),
                source: self.storage.pdf_dir.clone(),
            },
        })
    }

    fn fail_parse(&mut self, message: String) {
        self.parse.status = JobStatus::Failed;
        self.parse.message = Some(message);
        self.parse.updated_at = Some(now_iso());
        self.run_guard();
    }

    /// Apply the outcome of a parse request.
    pub fn complete_parse(
        &mut self,
        ticket: ParseTicket,
        result: Result<ParseStartResponse>,
    ) -> Result<Completion> {
        if ticket.epoch != self.epoch {
            info!(ticket = ticket.epoch, current = self.epoch, "Discarding parse result from an earlier search");
            return Ok(Completion::Stale);
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.fail_parse(e.to_string());
                return Err(e);
            }
        };
        if !response.success {
            let message = response.message.unwrap_or_else(|| "Parse job failed".to_string());
            self.fail_parse(message.clone());
            return Err(ArxivError::JobFailed(message));
        }

        let merged = self.store.merge_parse_results(&response.results);
        self.parse.progress = Progress {
            current: response.summary.parsed.unwrap_or(0),
            total: response.summary.total.unwrap_or(ticket.candidate_count),
        };
        self.parse.status = response.status.unwrap_or(JobStatus::Completed);
        self.parse.message = Some(response.message.unwrap_or_else(|| "Parsing complete".to_string()));
        self.parse.updated_at = Some(now_iso());
        if let Some(dir) = response.storage.pdf_dir {
            self.parse.source_dir = Some(dir);
        }
        self.run_guard();

        info!(merged = merged, status = %self.parse.status, "Parse results applied");
        Ok(Completion::Applied)
    }

    /// Run a parse job end to end.
    pub async fn trigger_parse(&mut self) -> Result<Completion> {
        let ticket = self.begin_parse()?;
        let result = self.backend.start_parse(&ticket.request).await;
        self.complete_parse(ticket, result)
    }

    // === Excel ===

    /// Check there is something to export and mark the job running.
    pub fn begin_excel(&mut self) -> Result<ExcelTicket> {
        if self.store.is_empty() {
            return Err(ArxivError::Precondition(
                "No records to export, run a search first".to_string(),
            ));
        }

        self.excel = ExcelState {
            status: ExcelStatus::Running,
            message: Some("Generating spreadsheet".to_string()),
            file: None,
            path: self.storage.excel_dir.clone(),
            updated_at: Some(now_iso()),
        };

        Ok(ExcelTicket {
            epoch: self.epoch,
            request: ExcelGenerateRequest {
                records: Some(self.store.records().to_vec()),
                output_dir: self.storage.excel_dir.clone(),
            },
        })
    }

    fn fail_excel(&mut self, message: String) {
        self.excel.status = ExcelStatus::Failed;
        self.excel.message = Some(message);
        self.excel.file = None;
        self.excel.updated_at = Some(now_iso());
    }

    /// Apply the outcome of a spreadsheet request.
    pub fn complete_excel(
        &mut self,
        ticket: ExcelTicket,
        result: Result<ExcelGenerateResponse>,
    ) -> Result<Completion> {
        if ticket.epoch != self.epoch {
            info!(ticket = ticket.epoch, current = self.epoch, "Discarding spreadsheet result from an earlier search");
            return Ok(Completion::Stale);
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.fail_excel(e.to_string());
                return Err(e);
            }
        };
        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "Spreadsheet generation failed".to_string());
            self.fail_excel(message.clone());
            return Err(ArxivError::JobFailed(message));
        }

        self.excel = ExcelState {
            status: ExcelStatus::Completed,
            message: Some(response.message.unwrap_or_else(|| "Spreadsheet ready".to_string())),
            file: response.file,
            path: response.path.or_else(|| self.storage.excel_dir.clone()),
            updated_at: Some(now_iso()),
        };
        info!(file = ?self.excel.file, "Spreadsheet ready");
        Ok(Completion::Applied)
    }

    /// Run a spreadsheet job end to end.
    pub async fn trigger_excel(&mut self) -> Result<Completion> {
        let ticket = self.begin_excel()?;
        let result = self.backend.generate_excel(&ticket.request).await;
        self.complete_excel(ticket, result)
    }

    /// Fetch the generated workbook. Returns its file name and bytes.
    pub async fn download_excel(&self) -> Result<(String, Vec<u8>)> {
        let Some(file) = self.excel.file.clone() else {
            return Err(ArxivError::Precondition(
                "No spreadsheet has been generated yet".to_string(),
            ));
        };
        let bytes = self.backend.download_excel().await?;
        Ok((file, bytes))
    }

    // === Polling ===

    /// Start polling parse progress. Feed what the task yields to
    /// [`Self::apply_update`]; dropping the task stops the polling.
    pub fn poll_parse(&self, interval: Duration) -> PollTask {
        spawn_parse_poller(self.backend(), interval)
    }

    /// Start polling spreadsheet status, as [`Self::poll_parse`].
    pub fn poll_excel(&self, interval: Duration) -> PollTask {
        spawn_excel_poller(self.backend(), interval)
    }

    /// Overwrite job state with a polled snapshot.
    pub fn apply_update(&mut self, update: PollUpdate) {
        match update {
            PollUpdate::Parse(progress) => {
                self.parse.apply_progress(progress);
                self.run_guard();
            }
            PollUpdate::Excel(status) => self.excel.apply_status(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DownloadStatus, ExcelStatusResponse, PaperRecord, ParseProgress, ParseSummary, RecordParseStatus,
        StorageInfo, StorageResponse,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Calls {
        search: AtomicUsize,
        parse: AtomicUsize,
        progress: AtomicUsize,
        excel: AtomicUsize,
        excel_status: AtomicUsize,
        download: AtomicUsize,
    }

    #[derive(Default)]
    struct MockBackend {
        calls: Calls,
        search: Mutex<Option<SearchResponse>>,
        parse: Mutex<Option<ParseStartResponse>>,
        excel: Mutex<Option<ExcelGenerateResponse>>,
        progress_fails: bool,
        excel_status_fails: bool,
    }

    fn transport_error() -> ArxivError {
        ArxivError::Api {
            code: 502,
            message: "bad gateway".to_string(),
        }
    }

    fn take<T>(slot: &Mutex<Option<T>>) -> Result<T> {
        slot.lock().unwrap().take().ok_or_else(transport_error)
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn storage_defaults(&self) -> Result<StorageResponse> {
            Ok(StorageResponse {
                pdf_dir: "/srv/pdf_files".to_string(),
                excel_dir: "/srv/excel_output".to_string(),
                log_dir: None,
            })
        }

        async fn search(&self, _request: &crate::models::SearchRequest) -> Result<SearchResponse> {
            self.calls.search.fetch_add(1, Ordering::SeqCst);
            take(&self.search)
        }

        async fn start_parse(&self, _request: &ParseStartRequest) -> Result<ParseStartResponse> {
            self.calls.parse.fetch_add(1, Ordering::SeqCst);
            take(&self.parse)
        }

        async fn parse_progress(&self) -> Result<ParseProgress> {
            self.calls.progress.fetch_add(1, Ordering::SeqCst);
            if self.progress_fails {
                return Err(transport_error());
            }
            Ok(ParseProgress {
                success: true,
                status: JobStatus::Running,
                current: 1,
                total: 2,
                ..Default::default()
            })
        }

        async fn generate_excel(&self, _request: &ExcelGenerateRequest) -> Result<ExcelGenerateResponse> {
            self.calls.excel.fetch_add(1, Ordering::SeqCst);
            take(&self.excel)
        }

        async fn excel_status(&self) -> Result<ExcelStatusResponse> {
            self.calls.excel_status.fetch_add(1, Ordering::SeqCst);
            if self.excel_status_fails {
                return Err(transport_error());
            }
            Ok(ExcelStatusResponse {
                status: ExcelStatus::Completed,
                message: Some("Spreadsheet ready".to_string()),
                file: Some("arxiv_summary_20240101_000000.xlsx".to_string()),
                path: Some("/srv/excel_output".to_string()),
                updated_at: Some("2024-01-01T00:00:00".to_string()),
            })
        }

        async fn download_excel(&self) -> Result<Vec<u8>> {
            self.calls.download.fetch_add(1, Ordering::SeqCst);
            Ok(b"PK".to_vec())
        }
    }

    fn record(id: &str, status: DownloadStatus) -> PaperRecord {
        PaperRecord::new(id, format!("Paper {id}"), status).with_file_name(format!("{id}.pdf"))
    }

    fn search_response(records: Vec<PaperRecord>) -> SearchResponse {
        SearchResponse {
            success: true,
            summary: CrawlSummary::from_records(&records),
            results: records,
            generated_keywords: vec!["sparse attention".to_string()],
            storage: StorageInfo {
                pdf_dir: Some("/data/pdf_files".to_string()),
                excel_dir: None,
            },
            ..Default::default()
        }
    }

    fn form() -> SearchForm {
        SearchForm {
            keywords: "transformer".to_string(),
            ..Default::default()
        }
    }

    async fn searched(records: Vec<PaperRecord>) -> (SessionController<MockBackend>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::default());
        *backend.search.lock().unwrap() = Some(search_response(records));
        let mut session = SessionController::new(Arc::clone(&backend));
        session.search(&form()).await.unwrap();
        (session, backend)
    }

    fn parsed(mut r: PaperRecord) -> PaperRecord {
        r.parse_status = Some(RecordParseStatus::Succeeded);
        r.innovation = Some("idea".to_string());
        r
    }

    #[tokio::test]
    async fn test_search_validation_makes_no_request() {
        let backend = Arc::new(MockBackend::default());
        let mut session = SessionController::new(Arc::clone(&backend));
        let err = session.search(&SearchForm::default()).await.unwrap_err();
        assert!(matches!(err, ArxivError::Validation(_)));

        let bad_years = SearchForm {
            year_range: "2024-2023".to_string(),
            ..form()
        };
        assert!(session.search(&bad_years).await.is_err());
        assert_eq!(backend.calls.search.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_resets_session() {
        let (session, _) = searched(vec![
            record("1v1", DownloadStatus::Downloaded),
            record("2v1", DownloadStatus::Failed),
        ])
        .await;

        assert_eq!(session.store().len(), 2);
        assert_eq!(session.parse_state().status, JobStatus::Ready);
        assert_eq!(session.excel_state().status, ExcelStatus::Idle);
        assert_eq!(session.keyword_plan().keywords(), ["sparse attention".to_string()]);
        assert_eq!(session.storage().pdf_dir.as_deref(), Some("/data/pdf_files"));
    }

    #[tokio::test]
    async fn test_search_with_nothing_downloaded_is_idle() {
        let (session, _) = searched(vec![record("1v1", DownloadStatus::Failed)]).await;
        assert_eq!(session.parse_state().status, JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_search_with_only_existing_files_is_idle() {
        let (mut session, _) = searched(vec![
            record("1v1", DownloadStatus::AlreadyExists),
            record("2v1", DownloadStatus::ReplacedOldVersion),
        ])
        .await;
        assert_eq!(session.parse_state().status, JobStatus::Idle);

        // The files are on disk, so parsing is still allowed.
        let ticket = session.begin_parse().unwrap();
        assert_eq!(ticket.request.records.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_search_partial_success_warns() {
        let backend = Arc::new(MockBackend::default());
        let mut response = search_response(vec![record("1v1", DownloadStatus::Downloaded)]);
        response.error = Some("quantum: API error: 503 - unavailable".to_string());
        *backend.search.lock().unwrap() = Some(response);
        let mut session = SessionController::new(Arc::clone(&backend));

        let outcome = session.search(&form()).await.unwrap();
        assert_eq!(outcome.warning.as_deref(), Some("quantum: API error: 503 - unavailable"));
        assert_eq!(outcome.summary.downloaded, 1);
        assert_eq!(session.store().len(), 1);
        assert_eq!(session.store().records()[0].identity, "1v1");
        assert_eq!(session.parse_state().status, JobStatus::Ready);
    }

    #[tokio::test]
    async fn test_search_failure_leaves_session() {
        let (mut session, backend) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        *backend.search.lock().unwrap() = Some(SearchResponse {
            success: false,
            error: Some("arXiv unavailable".to_string()),
            ..Default::default()
        });

        let err = session.search(&form()).await.unwrap_err();
        assert_eq!(err.to_string(), "arXiv unavailable");
        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_rejected_when_all_downloads_failed() {
        let (mut session, backend) = searched(vec![
            record("1v1", DownloadStatus::Failed),
            record("2v1", DownloadStatus::Failed),
        ])
        .await;
        let before = session.parse_state().clone();

        let err = session.trigger_parse().await.unwrap_err();
        assert!(matches!(err, ArxivError::Precondition(_)));
        assert_eq!(backend.calls.parse.load(Ordering::SeqCst), 0);
        assert_eq!(session.parse_state(), &before);
    }

    #[tokio::test]
    async fn test_begin_parse_is_optimistic() {
        let (mut session, backend) = searched(vec![
            record("1v1", DownloadStatus::Downloaded),
            record("2v1", DownloadStatus::AlreadyExists),
            record("3v1", DownloadStatus::Failed),
        ])
        .await;

        let ticket = session.begin_parse().unwrap();
        assert_eq!(session.parse_state().status, JobStatus::Running);
        assert_eq!(session.parse_state().progress, Progress { current: 0, total: 2 });
        assert_eq!(ticket.request.records.as_ref().map(Vec::len), Some(2));
        assert_eq!(ticket.request.source.as_deref(), Some("/data/pdf_files"));
        assert_eq!(backend.calls.parse.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parse_success_merges_and_navigates() {
        let (mut session, backend) = searched(vec![
            record("1v1", DownloadStatus::Downloaded),
            record("2v1", DownloadStatus::Downloaded),
        ])
        .await;
        *backend.parse.lock().unwrap() = Some(ParseStartResponse {
            success: true,
            results: vec![
                parsed(record("2v1", DownloadStatus::Downloaded)),
                parsed(record("9v1", DownloadStatus::Downloaded)),
            ],
            summary: ParseSummary {
                total: Some(2),
                parsed: Some(1),
                failed: Some(1),
            },
            storage: StorageInfo {
                pdf_dir: Some("/elsewhere".to_string()),
                excel_dir: None,
            },
            ..Default::default()
        });

        assert_eq!(session.trigger_parse().await.unwrap(), Completion::Applied);

        let state = session.parse_state();
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.progress, Progress { current: 1, total: 2 });
        assert_eq!(state.source_dir.as_deref(), Some("/elsewhere"));
        assert_eq!(session.store().len(), 2);
        assert!(session.store().records()[0].parse_status.is_none());
        assert_eq!(session.store().records()[1].innovation.as_deref(), Some("idea"));
        assert_eq!(session.view(), View::Results);
    }

    #[tokio::test]
    async fn test_parse_job_failure_keeps_store() {
        let (mut session, backend) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        let before = session.store().clone();
        *backend.parse.lock().unwrap() = Some(ParseStartResponse {
            success: false,
            results: vec![parsed(record("1v1", DownloadStatus::Downloaded))],
            ..Default::default()
        });

        let err = session.trigger_parse().await.unwrap_err();
        assert!(matches!(err, ArxivError::JobFailed(_)));
        assert_eq!(session.parse_state().status, JobStatus::Failed);
        assert_eq!(session.parse_state().message.as_deref(), Some("Parse job failed"));
        assert_eq!(session.store(), &before);
        assert_eq!(session.view(), View::Home);
    }

    #[tokio::test]
    async fn test_parse_transport_failure() {
        let (mut session, _) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        let err = session.trigger_parse().await.unwrap_err();
        assert_eq!(session.parse_state().status, JobStatus::Failed);
        assert_eq!(session.parse_state().message, Some(err.to_string()));
    }

    #[tokio::test]
    async fn test_stale_parse_result_is_discarded() {
        let (mut session, backend) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        let ticket = session.begin_parse().unwrap();

        *backend.search.lock().unwrap() = Some(search_response(vec![record("5v1", DownloadStatus::Downloaded)]));
        session.search(&form()).await.unwrap();

        let late = ParseStartResponse {
            success: true,
            results: vec![parsed(record("1v1", DownloadStatus::Downloaded))],
            ..Default::default()
        };
        assert_eq!(session.complete_parse(ticket, Ok(late)).unwrap(), Completion::Stale);
        assert_eq!(session.parse_state().status, JobStatus::Ready);
        assert_eq!(session.store().records()[0].identity, "5v1");
    }

    #[tokio::test]
    async fn test_excel_rejected_on_empty_store() {
        let backend = Arc::new(MockBackend::default());
        let mut session = SessionController::new(Arc::clone(&backend));

        let err = session.trigger_excel().await.unwrap_err();
        assert!(matches!(err, ArxivError::Precondition(_)));
        assert_eq!(backend.calls.excel.load(Ordering::SeqCst), 0);
        assert_eq!(session.excel_state().status, ExcelStatus::Idle);
    }

    #[tokio::test]
    async fn test_excel_lifecycle() {
        let (mut session, backend) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        session.set_storage(None, Some("/out".to_string()));

        let ticket = session.begin_excel().unwrap();
        assert_eq!(session.excel_state().status, ExcelStatus::Running);
        assert_eq!(session.excel_state().path.as_deref(), Some("/out"));
        assert_eq!(ticket.request.output_dir.as_deref(), Some("/out"));

        let response = ExcelGenerateResponse {
            success: true,
            file: Some("arxiv_summary_20240101_000000.xlsx".to_string()),
            ..Default::default()
        };
        session.complete_excel(ticket, Ok(response)).unwrap();
        assert_eq!(session.excel_state().status, ExcelStatus::Completed);
        assert_eq!(session.excel_state().path.as_deref(), Some("/out"));

        let (name, bytes) = session.download_excel().await.unwrap();
        assert_eq!(name, "arxiv_summary_20240101_000000.xlsx");
        assert_eq!(bytes, b"PK");
        assert_eq!(backend.calls.download.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_excel_failure() {
        let (mut session, backend) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        *backend.excel.lock().unwrap() = Some(ExcelGenerateResponse {
            success: false,
            message: Some("disk full".to_string()),
            ..Default::default()
        });

        assert!(session.trigger_excel().await.is_err());
        assert_eq!(session.excel_state().status, ExcelStatus::Failed);
        assert_eq!(session.excel_state().message.as_deref(), Some("disk full"));
        assert!(session.excel_state().file.is_none());
    }

    #[tokio::test]
    async fn test_download_requires_file() {
        let (session, backend) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        assert!(matches!(
            session.download_excel().await,
            Err(ArxivError::Precondition(_))
        ));
        assert_eq!(backend.calls.download.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_defaults_do_not_override() {
        let backend = Arc::new(MockBackend::default());
        let mut session = SessionController::new(backend);
        session.set_storage(Some("/mine".to_string()), None);
        session.load_storage_defaults().await.unwrap();
        assert_eq!(session.storage().pdf_dir.as_deref(), Some("/mine"));
        assert_eq!(session.storage().excel_dir.as_deref(), Some("/srv/excel_output"));
    }

    #[tokio::test]
    async fn test_poll_updates_are_applied() {
        let (mut session, _) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        let mut task = session.poll_parse(Duration::from_millis(5));

        let update = task.next().await.unwrap();
        assert!(matches!(update, PollUpdate::Parse(_)));
        session.apply_update(update);
        assert_eq!(session.parse_state().status, JobStatus::Running);
        assert_eq!(session.parse_state().progress, Progress { current: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_poll_errors_are_swallowed() {
        let backend = Arc::new(MockBackend {
            progress_fails: true,
            ..Default::default()
        });
        let session = SessionController::new(Arc::clone(&backend));
        let mut task = session.poll_parse(Duration::from_millis(5));

        let waited = tokio::time::timeout(Duration::from_millis(50), task.next()).await;
        assert!(waited.is_err());
        assert!(!task.is_finished());
        assert!(backend.calls.progress.load(Ordering::SeqCst) >= 2);
        assert_eq!(session.parse_state().status, JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_excel_poll_updates_are_applied() {
        let (mut session, _) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;
        let mut task = session.poll_excel(Duration::from_millis(5));

        let update = task.next().await.unwrap();
        assert!(matches!(update, PollUpdate::Excel(_)));
        session.apply_update(update);

        let state = session.excel_state();
        assert_eq!(state.status, ExcelStatus::Completed);
        assert_eq!(state.file.as_deref(), Some("arxiv_summary_20240101_000000.xlsx"));
        assert_eq!(state.path.as_deref(), Some("/srv/excel_output"));
        assert_eq!(session.parse_state().status, JobStatus::Ready);

        let (name, _) = session.download_excel().await.unwrap();
        assert_eq!(name, "arxiv_summary_20240101_000000.xlsx");
    }

    #[tokio::test]
    async fn test_excel_poll_errors_are_swallowed() {
        let backend = Arc::new(MockBackend {
            excel_status_fails: true,
            ..Default::default()
        });
        let session = SessionController::new(Arc::clone(&backend));
        let mut task = session.poll_excel(Duration::from_millis(5));

        let waited = tokio::time::timeout(Duration::from_millis(50), task.next()).await;
        assert!(waited.is_err());
        assert!(!task.is_finished());
        assert!(backend.calls.excel_status.load(Ordering::SeqCst) >= 2);
        assert_eq!(session.excel_state().status, ExcelStatus::Idle);
    }

    #[tokio::test]
    async fn test_dropping_poll_task_stops_polling() {
        let backend = Arc::new(MockBackend::default());
        let session = SessionController::new(Arc::clone(&backend));
        let task = session.poll_parse(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(task);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let calls = backend.calls.progress.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.calls.progress.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_queued_snapshots_are_dropped_with_their_poller() {
        let (mut session, _) = searched(vec![record("1v1", DownloadStatus::Downloaded)]).await;

        // Let the parse poller queue several snapshots nobody reads.
        let parse_task = session.poll_parse(Duration::from_millis(2));
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(parse_task);

        let mut excel_task = session.poll_excel(Duration::from_millis(2));
        let update = excel_task.next().await.unwrap();
        assert!(matches!(update, PollUpdate::Excel(_)));
        session.apply_update(update);

        assert_eq!(session.parse_state().status, JobStatus::Ready);
        assert_eq!(session.view(), View::Home);
    }
}
