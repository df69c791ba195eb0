//! Web 工具：web_search / extract_websites，均基于 ContentExtractor
//!
//! web_search 返回搜索结果 JSON；extract_websites=true 时改为抓取前 top_k 个链接并返回页面记录 JSON。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::extractor::{ContentExtractor, SearchEngine};
use crate::tools::schema::{parameters_schema_for, ExtractWebsitesArgs, WebSearchArgs};
use crate::tools::{Tool, ToolOutput};

/// 搜索后默认抓取的链接数
pub const DEFAULT_TOP_K: usize = 5;

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("failed to encode result: {e}"))
}

/// web_search：搜索，可选抓取结果页面
pub struct WebSearchTool {
    engine: Arc<SearchEngine>,
    extractor: Arc<ContentExtractor>,
    top_k: usize,
}

impl WebSearchTool {
    pub fn new(engine: Arc<SearchEngine>, extractor: Arc<ContentExtractor>, top_k: usize) -> Self {
        Self {
            engine,
            extractor,
            top_k,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns titles, links and snippets; set extract_websites to true to get the content of the top results instead."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<WebSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| "invalid or missing query argument".to_string())?;
        let extract = args
            .get("extract_websites")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| "invalid or missing extract_websites argument".to_string())?;

        let results = self
            .engine
            .search(query)
            .await
            .map_err(|e| format!("search failed: {e}"))?;

        if !extract {
            return to_json(&results).map(ToolOutput::text);
        }

        let links: Vec<String> = results
            .into_iter()
            .take(self.top_k)
            .map(|r| r.link)
            .collect();
        tracing::info!(query = %query, links = links.len(), "extracting top search results");
        let records = self
            .extractor
            .extract(&links, self.extractor.batch_deadline())
            .await;
        to_json(&records).map(ToolOutput::text)
    }
}

/// extract_websites：抓取给定链接
pub struct ExtractWebsitesTool {
    extractor: Arc<ContentExtractor>,
}

impl ExtractWebsitesTool {
    pub fn new(extractor: Arc<ContentExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Tool for ExtractWebsitesTool {
    fn name(&self) -> &str {
        "extract_websites"
    }

    fn description(&self) -> &str {
        "Fetch the given web pages and return their title, description, date, author and main content."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<ExtractWebsitesArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let raw = args
            .get("links")
            .and_then(|v| v.as_array())
            .ok_or_else(|| "invalid or missing links argument".to_string())?;
        let links = raw
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("invalid link at index {i}, expected string"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let records = self
            .extractor
            .extract(&links, self.extractor.batch_deadline())
            .await;
        to_json(&records).map(ToolOutput::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{FetchError, PageFetcher, DEFAULT_BATCH_DEADLINE};
    use serde_json::json;

    /// 搜索页返回 6 条结果，其余 URL 返回简单页面
    struct FakeWeb;

    #[async_trait]
    impl PageFetcher for FakeWeb {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            if url.contains("/search?") {
                let blocks: String = (1..=6)
                    .map(|i| format!(r#"<div class="g"><a href="https://r{i}.test/"><h3>Result {i}</h3></a></div>"#))
                    .collect();
                return Ok(format!("<html><body>{blocks}</body></html>"));
            }
            Ok(format!("<html><head><title>{url}</title></head><body><p>page</p></body></html>"))
        }
    }

    fn tools() -> (WebSearchTool, ExtractWebsitesTool) {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(FakeWeb);
        let engine = Arc::new(SearchEngine::new(fetcher.clone(), "https://search.test"));
        let extractor = Arc::new(ContentExtractor::new(fetcher, 4, DEFAULT_BATCH_DEADLINE));
        (
            WebSearchTool::new(engine, extractor.clone(), DEFAULT_TOP_K),
            ExtractWebsitesTool::new(extractor),
        )
    }

    #[tokio::test]
    async fn test_search_without_extraction_returns_results() {
        let (search, _) = tools();
        let out = search
            .execute(json!({ "query": "rust", "extract_websites": false }))
            .await
            .expect("search");
        let value: Value = serde_json::from_str(&out.content).expect("json");
        assert_eq!(value.as_array().map(|a| a.len()), Some(6));
        assert_eq!(value[0]["position"], 1);
    }

    #[tokio::test]
    async fn test_search_with_extraction_takes_top_k() {
        let (search, _) = tools();
        let out = search
            .execute(json!({ "query": "rust", "extract_websites": true }))
            .await
            .expect("search");
        let value: Value = serde_json::from_str(&out.content).expect("json");
        let records = value.as_array().expect("array");
        assert_eq!(records.len(), DEFAULT_TOP_K);
        assert!(records.iter().all(|r| r["content"] == "page"));
    }

    #[tokio::test]
    async fn test_search_requires_both_arguments() {
        let (search, _) = tools();
        let err = search.execute(json!({ "query": "rust" })).await.unwrap_err();
        assert_eq!(err, "invalid or missing extract_websites argument");
        let err = search
            .execute(json!({ "extract_websites": true }))
            .await
            .unwrap_err();
        assert_eq!(err, "invalid or missing query argument");
    }

    #[tokio::test]
    async fn test_extract_rejects_non_string_link() {
        let (_, extract) = tools();
        let err = extract
            .execute(json!({ "links": ["https://a.test/", 42] }))
            .await
            .unwrap_err();
        assert_eq!(err, "invalid link at index 1, expected string");
    }

    #[tokio::test]
    async fn test_extract_returns_records() {
        let (_, extract) = tools();
        let out = extract
            .execute(json!({ "links": ["https://a.test/"] }))
            .await
            .expect("extract");
        let value: Value = serde_json::from_str(&out.content).expect("json");
        assert_eq!(value[0]["url"], "https://a.test/");
        assert_eq!(value[0]["title"], "https://a.test/");
    }
}
