//! 页面抓取：PageFetcher 是提取流水线与网络之间的接缝
//!
//! HttpPageFetcher 使用浏览器式请求头、单请求超时，并把响应体截断在 max_body_bytes 以内。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use thiserror::Error;

/// 浏览器 UA，避免被站点识别为爬虫
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// 抓取错误（只在提取器内部使用，最终转成部分记录）
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("failed to read body: {0}")]
    Body(String),
}

/// 抓取单个 URL 的 HTML
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// 基于 reqwest 的抓取实现
pub struct HttpPageFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new(request_timeout: Duration, max_body_bytes: usize) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        let client = Client::builder()
            .timeout(request_timeout)
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_body_bytes,
        }
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT, DEFAULT_MAX_BODY_BYTES)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?
        {
            let room = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                tracing::debug!(url = %url, limit = self.max_body_bytes, "body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
