//! Server-side job state.
//!
//! The parse and Excel jobs each keep one shared state record that the
//! progress/status endpoints read. Writers are the job runners; every
//! update stamps `updated_at`.

use crate::models::{ExcelStatus, ExcelStatusResponse, JobStatus, PaperRecord, ParseProgress};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct ParseJobState {
    status: JobStatus,
    total: usize,
    current: usize,
    message: String,
    last_error: Option<String>,
    results: Vec<PaperRecord>,
    started_at: Option<String>,
    finished_at: Option<String>,
    updated_at: Option<String>,
    source_dir: Option<String>,
}

impl Default for ParseJobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Idle,
            total: 0,
            current: 0,
            message: "Waiting for a parse job".to_string(),
            last_error: None,
            results: Vec::new(),
            started_at: None,
            finished_at: None,
            updated_at: None,
            source_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
struct ExcelJobState {
    status: ExcelStatus,
    file_path: Option<PathBuf>,
    message: String,
    updated_at: Option<String>,
    target_dir: Option<PathBuf>,
}

impl Default for ExcelJobState {
    fn default() -> Self {
        Self {
            status: ExcelStatus::Idle,
            file_path: None,
            message: "No spreadsheet generated yet".to_string(),
            updated_at: None,
            target_dir: None,
        }
    }
}

/// Shared parse/Excel job state
#[derive(Debug, Default)]
pub struct JobTracker {
    parse: Mutex<ParseJobState>,
    excel: Mutex<ExcelJobState>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // === Parse ===

    pub fn begin_parse(&self, total: usize, source_dir: Option<&Path>) {
        let mut state = lock(&self.parse);
        let now = now_iso();
        let source_dir = source_dir
            .map(|d| d.display().to_string())
            .or_else(|| state.source_dir.take());
        *state = ParseJobState {
            status: JobStatus::Running,
            total,
            current: 0,
            message: "Parse job started".to_string(),
            last_error: None,
            results: Vec::new(),
            started_at: Some(now.clone()),
            finished_at: None,
            updated_at: Some(now),
            source_dir,
        };
    }

    /// Record one finished paper and advance `current`, never past `total`.
    pub fn append_parse_result(&self, record: PaperRecord) {
        let mut state = lock(&self.parse);
        state.results.push(record);
        state.current = (state.current + 1).min(state.total);
        state.updated_at = Some(now_iso());
    }

    pub fn complete_parse(&self) {
        let mut state = lock(&self.parse);
        let now = now_iso();
        state.status = JobStatus::Completed;
        state.message = "Parse job finished".to_string();
        state.current = state.total;
        state.finished_at = Some(now.clone());
        state.updated_at = Some(now);
    }

    /// Mark the job failed. Partial results are discarded.
    pub fn fail_parse(&self, error: &str, source_dir: Option<&Path>) {
        let mut state = lock(&self.parse);
        let now = now_iso();
        state.status = JobStatus::Failed;
        state.message = "Parse job failed".to_string();
        state.last_error = Some(error.to_string());
        state.results.clear();
        state.finished_at = Some(now.clone());
        state.updated_at = Some(now);
        if let Some(dir) = source_dir {
            state.source_dir = Some(dir.display().to_string());
        }
    }

    pub fn parse_progress(&self) -> ParseProgress {
        let state = lock(&self.parse);
        ParseProgress {
            success: matches!(state.status, JobStatus::Completed | JobStatus::Running),
            status: state.status.clone(),
            message: Some(state.message.clone()),
            current: state.current,
            total: state.total,
            last_error: state.last_error.clone(),
            updated_at: state.updated_at.clone(),
            source_dir: state.source_dir.clone(),
        }
    }

    /// Results of the last parse job
    pub fn parse_results(&self) -> Vec<PaperRecord> {
        lock(&self.parse).results.clone()
    }

    // === Excel ===

    pub fn begin_excel(&self, target_dir: &Path) {
        let mut state = lock(&self.excel);
        state.status = ExcelStatus::Running;
        state.file_path = None;
        state.message = "Generating spreadsheet".to_string();
        state.updated_at = Some(now_iso());
        state.target_dir = Some(target_dir.to_path_buf());
    }

    pub fn succeed_excel(&self, file_path: &Path) {
        let mut state = lock(&self.excel);
        state.status = ExcelStatus::Completed;
        state.file_path = Some(file_path.to_path_buf());
        state.message = "Spreadsheet ready".to_string();
        state.updated_at = Some(now_iso());
        state.target_dir = file_path.parent().map(Path::to_path_buf);
    }

    pub fn fail_excel(&self, message: &str) {
        let mut state = lock(&self.excel);
        state.status = ExcelStatus::Failed;
        state.message = message.to_string();
        state.updated_at = Some(now_iso());
    }

    pub fn excel_status(&self) -> ExcelStatusResponse {
        let state = lock(&self.excel);
        let path = state
            .target_dir
            .clone()
            .or_else(|| state.file_path.as_deref().and_then(Path::parent).map(Path::to_path_buf));
        ExcelStatusResponse {
            status: state.status,
            message: Some(state.message.clone()),
            file: state
                .file_path
                .as_deref()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned()),
            path: path.map(|p| p.display().to_string()),
            updated_at: state.updated_at.clone(),
        }
    }

    /// Path of the last generated workbook, if it still exists on disk.
    pub fn excel_file(&self) -> Option<PathBuf> {
        lock(&self.excel).file_path.clone().filter(|p| p.is_file())
    }
}
