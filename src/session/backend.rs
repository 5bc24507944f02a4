//! Transport seam between the session and the job server.

use crate::error::{ArxivError, Result};
use crate::models::{
    ExcelGenerateRequest, ExcelGenerateResponse, ExcelStatusResponse, ParseProgress, ParseStartRequest,
    ParseStartResponse, SearchRequest, SearchResponse, StorageResponse,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Timeout for status polls and small GETs
const POLL_TIMEOUT_SECS: u64 = 10;

/// Job server operations used by the session
#[async_trait]
pub trait Backend: Send + Sync {
    async fn storage_defaults(&self) -> Result<StorageResponse>;
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
    async fn start_parse(&self, request: &ParseStartRequest) -> Result<ParseStartResponse>;
    async fn parse_progress(&self) -> Result<ParseProgress>;
    async fn generate_excel(&self, request: &ExcelGenerateRequest) -> Result<ExcelGenerateResponse>;
    async fn excel_status(&self) -> Result<ExcelStatusResponse>;
    async fn download_excel(&self) -> Result<Vec<u8>>;
}

/// [`Backend`] over HTTP against the `/api` routes
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    api_base: Url,
}

impl HttpBackend {
    /// `server` is the origin, e.g. `http://127.0.0.1:5000`.
    pub fn new(server: &str) -> Result<Self> {
        let mut origin = Url::parse(server.trim())
            .map_err(|e| ArxivError::Config(format!("Invalid server URL {}: {}", server, e)))?;
        if !origin.path().ends_with('/') {
            let path = format!("{}/", origin.path());
            origin.set_path(&path);
        }
        let api_base = origin
            .join("api/")
            .map_err(|e| ArxivError::Config(format!("Invalid server URL {}: {}", server, e)))?;

        // Search and parse requests run the whole job server-side, so only
        // connecting is bounded for them.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ArxivError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, api_base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| ArxivError::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ArxivError::Api {
            code: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = Self::check(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "POST");
        let response = self.client.post(url).json(body).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn storage_defaults(&self) -> Result<StorageResponse> {
        self.get_json("system/storage").await
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.post_json("crawl/search", request).await
    }

    async fn start_parse(&self, request: &ParseStartRequest) -> Result<ParseStartResponse> {
        self.post_json("parse/start", request).await
    }

    async fn parse_progress(&self) -> Result<ParseProgress> {
        self.get_json("parse/progress").await
    }

    async fn generate_excel(&self, request: &ExcelGenerateRequest) -> Result<ExcelGenerateResponse> {
        self.post_json("excel/generate", request).await
    }

    async fn excel_status(&self) -> Result<ExcelStatusResponse> {
        self.get_json("excel/status").await
    }

    async fn download_excel(&self) -> Result<Vec<u8>> {
        let response = self.client.get(self.endpoint("excel/download")?).send().await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_are_under_api() {
        let backend = HttpBackend::new("http://127.0.0.1:5000").unwrap();
        assert_eq!(
            backend.endpoint("parse/progress").unwrap().as_str(),
            "http://127.0.0.1:5000/api/parse/progress"
        );

        let prefixed = HttpBackend::new("http://example.org/arxiv").unwrap();
        assert_eq!(
            prefixed.endpoint("excel/status").unwrap().as_str(),
            "http://example.org/arxiv/api/excel/status"
        );
    }

    #[test]
    fn test_invalid_server_url() {
        assert!(matches!(HttpBackend::new("not a url"), Err(ArxivError::Config(_))));
    }
}
