//! Runtime configuration.
//!
//! [`AppConfig`] carries everything the backend services need (arXiv
//! endpoint, storage directories, limits, retry policy). It is built from a
//! [`Profile`] and a data directory; the profile is chosen on the command
//! line or through `ARXIV_APP_CONFIG`. [`LlmConfig`] is read from the
//! environment (after `.env` has been loaded) and is optional: without an
//! API key every LLM-backed step falls back to its local heuristic.

use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// arXiv Atom API endpoint
pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

/// Default OpenAI-compatible endpoint (DashScope compatible mode)
pub const DEFAULT_LLM_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "qwen-turbo";

/// Default and maximum download count per search
pub const DEFAULT_MAX_NUM: u32 = 5;
pub const MAX_ALLOWED_NUM: u32 = 10;

/// Default and maximum generated keyword count
pub const DEFAULT_KEYWORD_COUNT: u32 = 5;
pub const MAX_KEYWORD_COUNT: u32 = 10;

/// Deployment profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Development,
    Production,
}

impl Profile {
    /// Resolve a profile by name. Unknown names fall back to development.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Resolve from `ARXIV_APP_CONFIG`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("ARXIV_APP_CONFIG")
            .map(|v| Self::from_name(&v))
            .unwrap_or_default()
    }

    pub fn log_level(&self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production => "info",
        }
    }
}

/// Backend configuration shared by every service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub profile: Profile,
    pub arxiv_api_url: String,
    pub user_agent: String,

    pub pdf_dir: PathBuf,
    pub excel_dir: PathBuf,
    pub log_dir: PathBuf,

    pub default_max_num: u32,
    pub max_allowed_num: u32,
    /// Upper bound on entries requested from arXiv per keyword
    pub prefetch_cap: u32,
    pub default_keyword_count: u32,

    /// Minimum spacing between two arXiv requests
    pub rate_limit: Duration,
    /// Extra random delay added to every request, in milliseconds
    pub jitter_ms: (u64, u64),
    pub max_retries: u32,
    pub retry_backoff: Vec<Duration>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,

    /// Files at or below this size are treated as broken downloads
    pub min_pdf_size_bytes: u64,
    pub max_filename_length: usize,
    /// Character cap applied to every parsed summary field
    pub field_char_limit: usize,
}

impl AppConfig {
    /// Build the configuration for `profile`, rooting all storage under `base_dir`.
    pub fn new(profile: Profile, base_dir: &Path) -> Self {
        Self {
            profile,
            arxiv_api_url: ARXIV_API_URL.to_string(),
            user_agent: format!("rustarxiv/{}", env!("CARGO_PKG_VERSION")),
            pdf_dir: base_dir.join("pdf_files"),
            excel_dir: base_dir.join("excel_output"),
            log_dir: base_dir.join("logs"),
            default_max_num: DEFAULT_MAX_NUM,
            max_allowed_num: MAX_ALLOWED_NUM,
            prefetch_cap: 100,
            default_keyword_count: env_parse("SUGGEST_KEYWORD_COUNT").unwrap_or(DEFAULT_KEYWORD_COUNT),
            rate_limit: Duration::from_secs(1),
            jitter_ms: (100, 300),
            max_retries: 3,
            retry_backoff: vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
            ],
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            min_pdf_size_bytes: 10 * 1024,
            max_filename_length: 120,
            field_char_limit: env_parse("PARSE_FIELD_CHAR_LIMIT").unwrap_or(50),
        }
    }

    /// Log level used when neither `RUST_LOG` nor `--debug` is given.
    pub fn log_level(&self) -> &'static str {
        self.profile.log_level()
    }

    /// Backoff before retry number `attempt` (0-based), clamped to the last entry.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.retry_backoff.len().saturating_sub(1));
        self.retry_backoff
            .get(idx)
            .copied()
            .unwrap_or(Duration::from_millis(500))
    }

    /// Create the PDF, Excel and log directories.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.pdf_dir, &self.excel_dir, &self.log_dir] {
            std::fs::create_dir_all(dir)?;
        }
        debug!(pdf_dir = %self.pdf_dir.display(), excel_dir = %self.excel_dir.display(), "Storage ready");
        Ok(())
    }
}

/// LLM configuration for the OpenAI-compatible chat endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Read the LLM settings from the environment.
    ///
    /// Returns `None` when no API key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = env_first(&["TONGYI_API_KEY", "OPENAI_API_KEY"])?;
        Some(Self {
            base_url: env_first(&["TONGYI_BASE_URL", "OPENAI_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            api_key,
            model: env_first(&["TONGYI_LLM_MODEL", "OPENAI_LLM_MODEL"])
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            temperature: env_first(&["TONGYI_LLM_TEMPERATURE", "TEMPERATURE"])
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            max_tokens: env_first(&["TONGYI_LLM_MAX_TOKENS", "MAX_TOKENS"])
                .and_then(|v| v.parse().ok())
                .unwrap_or(512),
        })
    }
}

/// First non-empty variable among `keys`
fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_name() {
        assert_eq!(Profile::from_name("prod"), Profile::Production);
        assert_eq!(Profile::from_name("Production"), Profile::Production);
        assert_eq!(Profile::from_name("dev"), Profile::Development);
        assert_eq!(Profile::from_name("whatever"), Profile::Development);
    }

    #[test]
    fn test_directories_are_rooted() {
        let config = AppConfig::new(Profile::Production, Path::new("/srv/arxiv"));
        assert_eq!(config.pdf_dir, PathBuf::from("/srv/arxiv/pdf_files"));
        assert_eq!(config.excel_dir, PathBuf::from("/srv/arxiv/excel_output"));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_backoff_clamps_to_last() {
        let config = AppConfig::new(Profile::Development, Path::new("."));
        assert_eq!(config.backoff_for(0), Duration::from_millis(500));
        assert_eq!(config.backoff_for(2), Duration::from_secs(2));
        assert_eq!(config.backoff_for(9), Duration::from_secs(2));
    }

    #[test]
    fn test_ensure_directories() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = AppConfig::new(Profile::Development, temp.path());
        config.ensure_directories()?;
        assert!(config.pdf_dir.is_dir());
        assert!(config.excel_dir.is_dir());
        assert!(config.log_dir.is_dir());
        Ok(())
    }
}
