//! HTTP API.
//!
//! All job endpoints live under `/api`. POST endpoints report business
//! failures as `200` with `success: false` so clients have a single error
//! path; only a missing spreadsheet download answers with a 404.

use crate::config::{AppConfig, MAX_KEYWORD_COUNT};
use crate::crawl::Crawler;
use crate::error::{ArxivError, Result};
use crate::excel::generate_excel;
use crate::jobs::JobTracker;
use crate::keywords::suggest_keywords;
use crate::llm::LlmClient;
use crate::models::{
    ErrorBody, ExcelGenerateRequest, ExcelGenerateResponse, ExcelStatusResponse, ParseProgress, ParseStartRequest,
    ParseStartResponse, RequestedParams, SearchRequest, SearchResponse, StorageInfo, StorageResponse,
};
use crate::parse::{run_parse_job, ParseContext};
use crate::validate::{
    clamp_count, dedup_keywords, parse_year_range, require_search_input, split_keywords, YearRange,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Shared server state
pub struct AppState {
    pub config: AppConfig,
    pub tracker: JobTracker,
    crawler: Crawler,
    llm: Option<LlmClient>,
}

impl AppState {
    pub fn new(config: AppConfig, llm: Option<LlmClient>) -> Result<Self> {
        Ok(Self {
            crawler: Crawler::new(&config)?,
            tracker: JobTracker::new(),
            config,
            llm,
        })
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/crawl/search", post(search_handler))
        .route("/parse/start", post(parse_start_handler))
        .route("/parse/progress", get(parse_progress_handler))
        .route("/excel/generate", post(excel_generate_handler))
        .route("/excel/status", get(excel_status_handler))
        .route("/excel/download", get(excel_download_handler))
        .route("/system/storage", get(storage_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Absolute form of a user-supplied directory.
fn resolve_dir(raw: &str) -> PathBuf {
    let raw = raw.trim();
    std::path::absolute(raw).unwrap_or_else(|_| PathBuf::from(raw))
}

fn override_dir(raw: Option<&str>) -> Option<PathBuf> {
    raw.filter(|s| !s.trim().is_empty()).map(resolve_dir)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

// === Search ===

struct PreparedSearch {
    keywords: Vec<String>,
    year_range: Option<YearRange>,
    max_num: u32,
    pdf_dir: PathBuf,
}

async fn prepare_search(state: &AppState, req: &SearchRequest) -> Result<PreparedSearch> {
    require_search_input(req.query_text.as_deref(), req.keywords.as_deref())?;
    let year_range = parse_year_range(req.year_range.as_deref())?;
    let max_num = clamp_count(req.max_num, state.config.default_max_num, state.config.max_allowed_num);
    let keyword_count = clamp_count(req.keyword_count, state.config.default_keyword_count, MAX_KEYWORD_COUNT);

    let mut keywords = Vec::new();
    if let Some(query) = req.query_text.as_deref().filter(|q| !q.trim().is_empty()) {
        keywords.extend(suggest_keywords(state.llm.as_ref(), query, keyword_count).await);
    }
    if let Some(manual) = req.keywords.as_deref() {
        keywords.extend(split_keywords(manual));
    }
    let keywords = dedup_keywords(keywords);
    if keywords.is_empty() {
        return Err(ArxivError::Validation(
            "could not derive any search keywords from the request".to_string(),
        ));
    }

    Ok(PreparedSearch {
        keywords,
        year_range,
        max_num,
        pdf_dir: override_dir(req.pdf_dir.as_deref()).unwrap_or_else(|| state.config.pdf_dir.clone()),
    })
}

/// Search endpoint handler
async fn search_handler(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Json<SearchResponse> {
    let prepared = match prepare_search(&state, &req).await {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!(error = %e, "Search rejected");
            return Json(SearchResponse {
                success: false,
                error: Some(e.to_string()),
                ..Default::default()
            });
        }
    };

    info!(
        keywords = ?prepared.keywords,
        max_num = prepared.max_num,
        year_range = ?prepared.year_range,
        "Search request"
    );

    let outcome = state
        .crawler
        .crawl_keyword_list(&prepared.keywords, prepared.year_range, prepared.max_num, &prepared.pdf_dir)
        .await;

    if let Some(err) = &outcome.error {
        warn!(error = %err, "Search finished with keyword failures");
    }

    Json(SearchResponse {
        success: outcome.success,
        results: outcome.results,
        summary: outcome.summary,
        generated_keywords: prepared.keywords.clone(),
        storage: StorageInfo {
            pdf_dir: Some(prepared.pdf_dir.display().to_string()),
            excel_dir: override_dir(req.excel_dir.as_deref()).map(|d| d.display().to_string()),
        },
        requested: RequestedParams {
            keywords: prepared.keywords,
            year_range: prepared.year_range.map(|r| r.to_string()),
            max_num: prepared.max_num,
            query_text: req.query_text.clone(),
        },
        error: outcome.error,
    })
}

// === Parse ===

async fn parse_start_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ParseStartRequest>,
) -> Json<ParseStartResponse> {
    let pdf_dir = override_dir(req.source.as_deref()).unwrap_or_else(|| state.config.pdf_dir.clone());
    let ctx = ParseContext {
        tracker: &state.tracker,
        llm: state.llm.as_ref(),
        field_limit: state.config.field_char_limit,
    };
    Json(run_parse_job(&ctx, &pdf_dir, req.records).await)
}

async fn parse_progress_handler(State(state): State<Arc<AppState>>) -> Json<ParseProgress> {
    Json(state.tracker.parse_progress())
}

// === Excel ===

async fn excel_generate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExcelGenerateRequest>,
) -> Json<ExcelGenerateResponse> {
    let records = match req.records {
        Some(records) if !records.is_empty() => records,
        _ => state.tracker.parse_results(),
    };
    if records.is_empty() {
        let message = "No data to export, finish a parse job first";
        state.tracker.fail_excel(message);
        return Json(ExcelGenerateResponse {
            success: false,
            message: Some(message.to_string()),
            file: None,
            path: None,
        });
    }

    let excel_dir = override_dir(req.output_dir.as_deref()).unwrap_or_else(|| state.config.excel_dir.clone());
    state.tracker.begin_excel(&excel_dir);

    let target = excel_dir.clone();
    let written = tokio::task::spawn_blocking(move || generate_excel(&records, &target))
        .await
        .map_err(|e| ArxivError::Config(format!("Task join error: {}", e)))
        .and_then(|r| r);

    match written {
        Ok(path) => {
            state.tracker.succeed_excel(&path);
            Json(ExcelGenerateResponse {
                success: true,
                message: Some("Spreadsheet ready".to_string()),
                file: path.file_name().map(|n| n.to_string_lossy().into_owned()),
                path: path.parent().map(|p| p.display().to_string()),
            })
        }
        Err(e) => {
            error!(error = %e, "Spreadsheet generation failed");
            state.tracker.fail_excel(&e.to_string());
            Json(ExcelGenerateResponse {
                success: false,
                message: Some(e.to_string()),
                file: None,
                path: Some(excel_dir.display().to_string()),
            })
        }
    }
}

async fn excel_status_handler(State(state): State<Arc<AppState>>) -> Json<ExcelStatusResponse> {
    Json(state.tracker.excel_status())
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn excel_download_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(path) = state.tracker.excel_file() else {
        return not_found("Spreadsheet has not been generated");
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "arxiv_summary.xlsx".to_string());
            (
                [
                    (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name)),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, path = %path.display(), "Spreadsheet read failed");
            not_found("Spreadsheet is no longer available")
        }
    }
}

// === System ===

async fn storage_handler(State(state): State<Arc<AppState>>) -> Json<StorageResponse> {
    let show = |p: &Path| p.display().to_string();
    Json(StorageResponse {
        pdf_dir: show(&state.config.pdf_dir),
        excel_dir: show(&state.config.excel_dir),
        log_dir: Some(show(&state.config.log_dir)),
    })
}
