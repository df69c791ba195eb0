//! 网页内容提取：有界并发抓取 + 解析 + 去重
//!
//! extract(urls, deadline) 为整批 URL 建立一个 CancellationToken 与 timeout 作用域；
//! 每个 URL 一个 JoinSet 任务，通过 Semaphore 限制同时在途的请求数。抓取失败的 URL 产出只含 url 的部分记录。
//! 截止时间到达时取消令牌、中止所有任务，只返回已完成的记录（完成顺序），不会有任务活过本批次。

pub mod fetch;
pub mod parse;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use fetch::{FetchError, HttpPageFetcher, PageFetcher};
pub use parse::{dedup_lines, parse_page};
pub use search::{SearchEngine, SearchResult};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_BATCH_DEADLINE: Duration = Duration::from_secs(10);

/// 单个页面的提取结果，构造后不再修改
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WebPageRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub author: String,
    pub content: String,
}

impl WebPageRecord {
    /// 抓取失败时的部分记录：只有 url
    pub fn partial(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// 内容提取器
pub struct ContentExtractor {
    fetcher: Arc<dyn PageFetcher>,
    max_concurrency: usize,
    batch_deadline: Duration,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_concurrency: usize, batch_deadline: Duration) -> Self {
        Self {
            fetcher,
            max_concurrency: max_concurrency.max(1),
            batch_deadline,
        }
    }

    /// 配置的整批截止时间
    pub fn batch_deadline(&self) -> Duration {
        self.batch_deadline
    }

    /// 抓取并解析一批 URL（尽力而为）
    pub async fn extract(&self, urls: &[String], deadline: Duration) -> Vec<WebPageRecord> {
        let token = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for url in urls {
            let url = url.clone();
            let fetcher = self.fetcher.clone();
            let semaphore = semaphore.clone();
            let token = token.clone();
            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = token.cancelled() => return None,
                    permit = semaphore.acquire_owned() => permit.ok()?,
                };
                if token.is_cancelled() {
                    return None;
                }

                let fetched = tokio::select! {
                    _ = token.cancelled() => return None,
                    fetched = fetcher.fetch(&url) => fetched,
                };
                let record = match fetched {
                    Ok(html) => parse_page(&url, &html),
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "fetch failed");
                        WebPageRecord::partial(url)
                    }
                };
                Some(record)
            });
        }

        let mut records = Vec::with_capacity(urls.len());
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) if e.is_panic() => tracing::error!(error = %e, "extraction task panicked"),
                    Err(e) => tracing::debug!(error = %e, "extraction task aborted"),
                }
            }
        };

        if tokio::time::timeout(deadline, collect).await.is_err() {
            tracing::warn!(
                completed = records.len(),
                total = urls.len(),
                "extraction deadline reached, cancelling remaining fetches"
            );
            token.cancel();
            tasks.shutdown().await;
        }

        tracing::info!(completed = records.len(), total = urls.len(), "extraction finished");
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录并发数的假抓取器：每次抓取耗时 delay
    struct InstrumentedFetcher {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        started: AtomicUsize,
    }

    impl InstrumentedFetcher {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageFetcher for InstrumentedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if url.ends_with("/panic") {
                panic!("parser exploded on {url}");
            }
            if url.ends_with("/missing") {
                return Err(FetchError::Status(404));
            }
            Ok(format!("<html><head><title>{url}</title></head><body><p>body of {url}</p></body></html>"))
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://site{i}.test/")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_never_exceeds_cap() {
        let fetcher = InstrumentedFetcher::new(Duration::from_millis(200));
        let extractor = ContentExtractor::new(fetcher.clone(), 4, DEFAULT_BATCH_DEADLINE);
        let records = extractor.extract(&urls(10), DEFAULT_BATCH_DEADLINE).await;
        assert_eq!(records.len(), 10);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 4);
        assert_eq!(fetcher.started.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_subset_and_stops_new_fetches() {
        let fetcher = InstrumentedFetcher::new(Duration::from_secs(1));
        let extractor = ContentExtractor::new(fetcher.clone(), 4, DEFAULT_BATCH_DEADLINE);
        let records = extractor.extract(&urls(10), Duration::from_millis(1500)).await;
        assert_eq!(records.len(), 4);
        assert_eq!(fetcher.started.load(Ordering::SeqCst), 8);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fetcher.started.load(Ordering::SeqCst), 8);
        // 第二批在 sleep 中被中止，计数停在中途
        assert_eq!(fetcher.in_flight.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_yields_partial_record() {
        let fetcher = InstrumentedFetcher::new(Duration::from_millis(10));
        let extractor = ContentExtractor::new(fetcher, 4, DEFAULT_BATCH_DEADLINE);
        let links = vec!["https://ok.test/".to_string(), "https://gone.test/missing".to_string()];
        let mut records = extractor.extract(&links, DEFAULT_BATCH_DEADLINE).await;
        records.sort_by(|a, b| a.url.cmp(&b.url));

        assert_eq!(records[0], WebPageRecord::partial("https://gone.test/missing"));
        assert_eq!(records[1].title, "https://ok.test/");
        assert_eq!(records[1].content, "body of https://ok.test/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_does_not_sink_batch() {
        let fetcher = InstrumentedFetcher::new(Duration::from_millis(10));
        let extractor = ContentExtractor::new(fetcher.clone(), 1, DEFAULT_BATCH_DEADLINE);
        let links = vec![
            "https://a.test/".to_string(),
            "https://b.test/panic".to_string(),
            "https://c.test/".to_string(),
        ];
        let mut records = extractor.extract(&links, DEFAULT_BATCH_DEADLINE).await;
        records.sort_by(|a, b| a.url.cmp(&b.url));

        // 单并发下 panic 后的链接仍被抓取，说明许可已归还
        assert_eq!(fetcher.started.load(Ordering::SeqCst), 3);
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.test/", "https://c.test/"]);
    }

    #[test]
    fn test_record_json_field_names() {
        let value = serde_json::to_value(WebPageRecord::partial("https://a.test")).expect("json");
        let mut keys: Vec<&String> = value.as_object().expect("object").keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["author", "content", "date", "description", "title", "url"]);
    }
}
