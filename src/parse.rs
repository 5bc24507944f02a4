//! PDF parse job.
//!
//! Resolves the candidate PDFs, extracts and summarises each one with
//! bounded concurrency, and reports progress through the [`JobTracker`].

use crate::analysis::analyze_paper;
use crate::jobs::JobTracker;
use crate::llm::LlmClient;
use crate::models::{
    DownloadStatus, JobStatus, PaperRecord, ParseStartResponse, ParseSummary, RecordParseStatus, StorageInfo,
};
use crate::naming::extract_arxiv_ids;
use crate::pdf::extract_text;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Papers parsed at the same time
const PARSE_CONCURRENCY: usize = 4;

/// Everything a parse job needs besides its input
pub struct ParseContext<'a> {
    pub tracker: &'a JobTracker,
    pub llm: Option<&'a LlmClient>,
    pub field_limit: usize,
}

struct Candidate {
    record: PaperRecord,
    path: PathBuf,
}

/// Records with a local PDF, or every `*.pdf` in `pdf_dir` when no records
/// were given.
fn resolve_candidates(pdf_dir: &Path, records: Option<Vec<PaperRecord>>) -> Vec<Candidate> {
    match records {
        Some(records) if !records.is_empty() => records
            .into_iter()
            .filter(PaperRecord::is_parse_candidate)
            .filter_map(|record| {
                let file_name = record.file_name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
                let path = pdf_dir.join(file_name);
                Some(Candidate { record, path })
            })
            .collect(),
        _ => scan_directory(pdf_dir),
    }
}

fn scan_directory(pdf_dir: &Path) -> Vec<Candidate> {
    let Ok(entries) = std::fs::read_dir(pdf_dir) else {
        warn!(dir = %pdf_dir.display(), "PDF directory not readable");
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf")))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let stem = path.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let identity = extract_arxiv_ids(&file_name).map(|(_, full)| full).unwrap_or_default();
            let record = PaperRecord::new(identity, stem, DownloadStatus::AlreadyExists).with_file_name(file_name);
            Candidate { record, path }
        })
        .collect()
}

fn failed(mut record: PaperRecord, error: String) -> PaperRecord {
    record.parse_status = Some(RecordParseStatus::Failed);
    record.parse_error = Some(error);
    record.innovation = None;
    record.method = None;
    record.conclusion = None;
    record.summary = None;
    record.parsed_at = Some(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string());
    record
}

async fn parse_one(ctx: &ParseContext<'_>, candidate: Candidate) -> PaperRecord {
    let Candidate { mut record, path } = candidate;
    if !path.exists() {
        return failed(record, "File not found".to_string());
    }

    match extract_text(&path).await {
        Ok(text) => {
            let summary = analyze_paper(ctx.llm, &text, ctx.field_limit).await.limited(ctx.field_limit);
            record.parse_status = Some(RecordParseStatus::Succeeded);
            record.parse_error = None;
            record.innovation = Some(summary.innovation);
            record.method = Some(summary.method);
            record.conclusion = Some(summary.conclusion);
            record.summary = Some(summary.summary);
            record.parsed_at = Some(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string());
            debug!(file = %path.display(), "Paper parsed");
            record
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Paper parse failed");
            failed(record, e.to_string())
        }
    }
}

/// Parse the PDFs in `pdf_dir` selected by `records`.
pub async fn run_parse_job(
    ctx: &ParseContext<'_>,
    pdf_dir: &Path,
    records: Option<Vec<PaperRecord>>,
) -> ParseStartResponse {
    let storage = StorageInfo {
        pdf_dir: Some(pdf_dir.display().to_string()),
        excel_dir: None,
    };
    let candidates = resolve_candidates(pdf_dir, records);
    let total = candidates.len();

    if total == 0 {
        ctx.tracker
            .fail_parse("No PDFs to parse, run a search first", Some(pdf_dir));
        return ParseStartResponse {
            success: false,
            message: Some("No PDF files to parse".to_string()),
            status: Some(JobStatus::Failed),
            summary: ParseSummary {
                total: Some(0),
                parsed: Some(0),
                failed: Some(0),
            },
            results: Vec::new(),
            storage,
        };
    }

    info!(total = total, dir = %pdf_dir.display(), llm = ctx.llm.is_some(), "Starting parse job");
    ctx.tracker.begin_parse(total, Some(pdf_dir));

    let mut indexed: Vec<(usize, PaperRecord)> = stream::iter(candidates.into_iter().enumerate())
        .map(|(idx, candidate)| async move {
            let record = parse_one(ctx, candidate).await;
            ctx.tracker.append_parse_result(record.clone());
            (idx, record)
        })
        .buffer_unordered(PARSE_CONCURRENCY)
        .collect()
        .await;
    indexed.sort_by_key(|(idx, _)| *idx);
    let results: Vec<PaperRecord> = indexed.into_iter().map(|(_, r)| r).collect();

    let failed_count = results
        .iter()
        .filter(|r| r.parse_status == Some(RecordParseStatus::Failed))
        .count();
    let summary = ParseSummary {
        total: Some(total),
        parsed: Some(total - failed_count),
        failed: Some(failed_count),
    };

    info!(total = total, failed = failed_count, "Parse job finished");

    if failed_count == total {
        ctx.tracker
            .fail_parse("Every PDF failed to parse, check the logs", Some(pdf_dir));
        ParseStartResponse {
            success: false,
            message: Some("Parsing failed, see results".to_string()),
            status: Some(JobStatus::Failed),
            summary,
            results,
            storage,
        }
    } else {
        ctx.tracker.complete_parse();
        ParseStartResponse {
            success: true,
            message: Some("Parsing complete".to_string()),
            status: Some(JobStatus::Completed),
            summary,
            results,
            storage,
        }
    }
}
