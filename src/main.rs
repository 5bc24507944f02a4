//! rustarxiv - arXiv search, PDF digest and Excel export
//!
//! Runs the job server, or drives a full session against one.
//!
//! ## Usage
//!
//! ### HTTP Server Mode
//! ```bash
//! rustarxiv serve --port 5000 --data-dir ./data
//! ```
//!
//! ### Session Mode
//! ```bash
//! rustarxiv run --keywords "diffusion models, score matching" --year-range 2023-2024
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rustarxiv::config::{AppConfig, Profile};
use rustarxiv::llm::LlmClient;
use rustarxiv::models::PaperRecord;
use rustarxiv::server::{router, AppState};
use rustarxiv::session::{Backend, HttpBackend, SearchForm, SessionController, DEFAULT_POLL_INTERVAL};
use rustarxiv::ArxivError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// arXiv search, PDF digest and Excel export
#[derive(Parser)]
#[command(name = "rustarxiv")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "5000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Root for pdf_files/, excel_output/ and logs/
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Configuration profile: development or production (default: $ARXIV_APP_CONFIG)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Search, download, parse and export in one session
    Run {
        /// Server origin
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        server: String,

        /// Research description used to suggest keywords
        #[arg(short, long, default_value = "")]
        query_text: String,

        /// Comma or newline separated keywords
        #[arg(short, long, default_value = "")]
        keywords: String,

        /// Publication year range, e.g. "2023-2024"
        #[arg(short, long, default_value = "")]
        year_range: String,

        /// Number of keywords to suggest from --query-text
        #[arg(long)]
        keyword_count: Option<i64>,

        /// Papers to download across all keywords
        #[arg(short, long)]
        max_num: Option<i64>,

        /// Directory the server stores PDFs in
        #[arg(long)]
        pdf_dir: Option<String>,

        /// Directory the server writes spreadsheets to
        #[arg(long)]
        excel_dir: Option<String>,

        /// Local path for the downloaded spreadsheet (default: server file name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Status poll interval in seconds
        #[arg(long)]
        poll_secs: Option<u64>,

        /// Stop after the search
        #[arg(long)]
        skip_parse: bool,
    },

    /// Show the server's default storage directories
    Storage {
        /// Server origin
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        server: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            data_dir,
            profile,
        } => {
            let profile = profile.as_deref().map(Profile::from_name).unwrap_or_else(Profile::from_env);
            run_server(host, port, data_dir, profile, cli.debug).await
        }
        Commands::Run {
            server,
            query_text,
            keywords,
            year_range,
            keyword_count,
            max_num,
            pdf_dir,
            excel_dir,
            output,
            poll_secs,
            skip_parse,
        } => {
            init_console_logging(cli.debug);
            let form = SearchForm {
                query_text,
                keywords,
                year_range,
                keyword_count,
                max_num,
                pdf_dir,
                excel_dir,
            };
            let interval = poll_secs.map(Duration::from_secs).unwrap_or(DEFAULT_POLL_INTERVAL);
            run_session(&server, form, output, interval, skip_parse).await
        }
        Commands::Storage { server } => {
            init_console_logging(cli.debug);
            show_storage(&server).await
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

fn env_filter(debug: bool, fallback: &str) -> EnvFilter {
    let level = if debug { Level::DEBUG.to_string() } else { fallback.to_string() };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_console_logging(debug: bool) {
    fmt()
        .with_env_filter(env_filter(debug, "info"))
        .with_target(true)
        .with_thread_ids(false)
        .init();
}

/// Console plus a daily-rolling `backend.*.log` under the log directory
fn init_server_logging(config: &AppConfig, debug: bool) -> Result<()> {
    let file_appender = rolling::RollingFileAppender::builder()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("backend")
        .filename_suffix("log")
        .build(&config.log_dir)
        .context("Failed to open log file")?;

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true);
    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .with(env_filter(debug, config.log_level()))
        .init();
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16, data_dir: PathBuf, profile: Profile, debug: bool) -> Result<()> {
    let data_dir = std::path::absolute(&data_dir).context("Invalid --data-dir")?;
    let config = AppConfig::new(profile, &data_dir);
    config.ensure_directories().context("Failed to create storage directories")?;
    init_server_logging(&config, debug)?;

    let llm = LlmClient::from_env().context("Failed to configure LLM client")?;
    match &llm {
        Some(client) => info!(model = client.model(), "LLM enabled"),
        None => warn!("No LLM API key configured, using heuristic keywords and summaries"),
    }

    info!(
        host = %host,
        port = port,
        profile = ?profile,
        pdf_dir = %config.pdf_dir.display(),
        excel_dir = %config.excel_dir.display(),
        "Starting HTTP server"
    );

    let state = Arc::new(AppState::new(config, llm).context("Failed to initialise server state")?);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

// ============================================================================
// Session
// ============================================================================

async fn show_storage(server: &str) -> Result<()> {
    let backend = HttpBackend::new(server)?;
    let storage = backend.storage_defaults().await.context("Failed to query server storage")?;
    println!("PDF directory:   {}", storage.pdf_dir);
    println!("Excel directory: {}", storage.excel_dir);
    if let Some(log_dir) = storage.log_dir {
        println!("Log directory:   {}", log_dir);
    }
    Ok(())
}

async fn run_session(
    server: &str,
    form: SearchForm,
    output: Option<PathBuf>,
    interval: Duration,
    skip_parse: bool,
) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(server)?);
    let mut session = SessionController::new(backend);

    session.set_storage(form.pdf_dir.clone(), form.excel_dir.clone());
    if let Err(e) = session.load_storage_defaults().await {
        warn!(error = %e, "Could not load storage defaults");
    }

    // ===========================================
    // Search & download
    // ===========================================
    println!("\n--- Search ---");
    let outcome = match session.search(&form).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_client_side() => bail!("Invalid search: {}", e),
        Err(e) => return Err(anyhow!(e).context("Search failed")),
    };
    println!("Keywords: {}", outcome.keywords.join(", "));
    println!(
        "Found {} papers: {} downloaded, {} already present, {} replaced older versions, {} failed",
        outcome.summary.total,
        outcome.summary.downloaded,
        outcome.summary.already_exists,
        outcome.summary.replaced_old_version,
        outcome.summary.failed
    );
    if let Some(warning) = &outcome.warning {
        println!("Warning: {}", warning);
    }
    for record in session.store().records() {
        print_record(record);
    }

    if skip_parse {
        return Ok(());
    }

    // ===========================================
    // Parse
    // ===========================================
    println!("\n--- Parse ---");
    run_parse(&mut session, interval).await;

    // ===========================================
    // Excel
    // ===========================================
    println!("\n--- Excel ---");
    run_excel(&mut session, interval, output).await
}

async fn run_parse(session: &mut SessionController<HttpBackend>, interval: Duration) {
    let ticket = match session.begin_parse() {
        Ok(ticket) => ticket,
        Err(e) => {
            println!("Skipping parse: {}", e);
            return;
        }
    };

    let backend = session.backend();
    let request = ticket.request.clone();
    let mut job = tokio::spawn(async move { backend.start_parse(&request).await });
    let mut poller = session.poll_parse(interval);

    let result = loop {
        tokio::select! {
            joined = &mut job => {
                break joined.unwrap_or_else(|e| Err(ArxivError::JobFailed(format!("Parse task aborted: {}", e))));
            }
            Some(update) = poller.next() => {
                session.apply_update(update);
                let progress = session.parse_state().progress;
                println!("Parsing {}/{} ({})", progress.current, progress.total, session.parse_state().status);
            }
        }
    };
    drop(poller);

    match session.complete_parse(ticket, result) {
        Ok(_) => {
            let state = session.parse_state();
            println!(
                "Parse {}: {}/{} papers",
                state.status, state.progress.current, state.progress.total
            );
            for record in session.store().records() {
                print_record(record);
            }
        }
        Err(e) => println!("Parse failed: {}", e),
    }
}

async fn run_excel(
    session: &mut SessionController<HttpBackend>,
    interval: Duration,
    output: Option<PathBuf>,
) -> Result<()> {
    let ticket = session.begin_excel().context("Cannot generate spreadsheet")?;

    let backend = session.backend();
    let request = ticket.request.clone();
    let mut job = tokio::spawn(async move { backend.generate_excel(&request).await });
    let mut poller = session.poll_excel(interval);

    let result = loop {
        tokio::select! {
            joined = &mut job => {
                break joined.unwrap_or_else(|e| Err(ArxivError::JobFailed(format!("Excel task aborted: {}", e))));
            }
            Some(update) = poller.next() => session.apply_update(update),
        }
    };
    drop(poller);

    session
        .complete_excel(ticket, result)
        .context("Spreadsheet generation failed")?;

    let (file, bytes) = session.download_excel().await.context("Spreadsheet download failed")?;
    let target = output.unwrap_or_else(|| PathBuf::from(&file));
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    println!("Saved {} ({} bytes)", target.display(), bytes.len());
    if let Some(path) = &session.excel_state().path {
        println!("Server copy in {}", path);
    }
    Ok(())
}

fn print_record(record: &PaperRecord) {
    let name = record.file_name.as_deref().unwrap_or("-");
    println!("  [{}] {} {}", record.download_status.as_str(), record.identity, name);
    if let Some(reason) = &record.reason {
        println!("      reason: {}", reason);
    }
    if let Some(summary) = &record.summary {
        println!("      summary: {}", summary);
    }
    if let Some(error) = &record.parse_error {
        println!("      parse error: {}", error);
    }
}
