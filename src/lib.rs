//! # rustarxiv
//!
//! arXiv search, PDF digest and Excel export - Rust microservice and session client
//!
//! ## Modules
//!
//! - [`server`] - axum HTTP API for the search, parse and spreadsheet jobs
//! - [`arxiv`] - arXiv Atom API client and PDF downloader
//! - [`crawl`] - multi-keyword search aggregation
//! - [`parse`] - PDF text extraction and summarisation job
//! - [`excel`] - spreadsheet export
//! - [`jobs`] - server-side job state
//! - [`session`] - client session: record store, job state machines, polling
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustarxiv::session::{HttpBackend, SearchForm, SessionController};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = Arc::new(HttpBackend::new("http://127.0.0.1:5000")?);
//!     let mut session = SessionController::new(backend);
//!     let form = SearchForm {
//!         keywords: "diffusion models".to_string(),
//!         ..Default::default()
//!     };
//!     let outcome = session.search(&form).await?;
//!     println!("Found {} papers", outcome.summary.total);
//!     session.trigger_parse().await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod arxiv;
pub mod config;
pub mod crawl;
pub mod error;
pub mod excel;
pub mod jobs;
pub mod keywords;
pub mod llm;
pub mod models;
pub mod naming;
pub mod parse;
pub mod pdf;
pub mod prompts;
pub mod server;
pub mod session;
pub mod validate;

pub use error::{ArxivError, Result};
