//! 网页搜索：抓取搜索结果页并解析结果块
//!
//! 每个 `div.g` 是一条结果：`h3` 为标题，首个 `a[href]` 为链接，`.VwiC3b` 为摘要；标题或链接为空的块丢弃。

use std::sync::Arc;

use scraper::{Html, Selector};
use serde::Serialize;

use super::fetch::{FetchError, PageFetcher};
use super::parse::collapse_whitespace;

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://google.com";

/// 单条搜索结果；position 从 1 开始
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub position: usize,
}

/// 搜索引擎客户端
pub struct SearchEngine {
    fetcher: Arc<dyn PageFetcher>,
    base_url: String,
}

impl SearchEngine {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn search_url(&self, query: &str) -> Result<String, FetchError> {
        reqwest::Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[("q", query), ("hl", "en")],
        )
        .map(String::from)
        .map_err(|e| FetchError::Request(e.to_string()))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, FetchError> {
        let url = self.search_url(query)?;
        tracing::info!(query = %query, "web search");
        let html = self.fetcher.fetch(&url).await?;
        let results = parse_search_results(&html);
        tracing::debug!(query = %query, count = results.len(), "search results parsed");
        Ok(results)
    }
}

/// 从结果页 HTML 中解析结果
pub fn parse_search_results(html: &str) -> Vec<SearchResult> {
    let (Ok(block), Ok(title), Ok(link), Ok(snippet)) = (
        Selector::parse("div.g"),
        Selector::parse("h3"),
        Selector::parse("a[href]"),
        Selector::parse(".VwiC3b"),
    ) else {
        return Vec::new();
    };

    let doc = Html::parse_document(html);
    let mut results = Vec::new();
    for el in doc.select(&block) {
        let title_text = el
            .select(&title)
            .next()
            .map(|t| collapse_whitespace(&t.text().collect::<String>()))
            .unwrap_or_default();
        let href = el
            .select(&link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|h| h.trim().to_string())
            .unwrap_or_default();
        if title_text.is_empty() || href.is_empty() {
            continue;
        }
        let snippet_text = el
            .select(&snippet)
            .next()
            .map(|s| collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();
        results.push(SearchResult {
            title: title_text,
            link: href,
            snippet: snippet_text,
            position: results.len() + 1,
        });
    }
    results
}
