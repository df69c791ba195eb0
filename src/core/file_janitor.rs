//! 沙箱文件清理：定期删除超过 max_age 的文件
//!
//! 扫描只看沙箱目录第一层的普通文件（walkdir，阻塞线程池中执行）；删除并发不超过 3。目录不存在时什么也不做。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

pub const DEFAULT_MAX_FILE_AGE: Duration = Duration::from_secs(3600);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const MAX_CONCURRENT_DELETES: usize = 3;

#[derive(Debug, Clone)]
pub struct FileJanitor {
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
}

impl FileJanitor {
    pub fn new(dir: impl AsRef<Path>, max_age: Duration, interval: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_age,
            interval,
        }
    }

    /// 立即清理一次，返回删除的文件数
    pub async fn cleanup_now(&self) -> usize {
        let dir = self.dir.clone();
        let max_age = self.max_age;
        let stale = match tokio::task::spawn_blocking(move || stale_files(&dir, max_age)).await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = %e, "file scan task failed");
                return 0;
            }
        };
        if stale.is_empty() {
            return 0;
        }

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_DELETES));
        let mut tasks = JoinSet::new();
        for path in stale {
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::debug!(path = %path.display(), "deleted stale file");
                        Some(())
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to delete file");
                        None
                    }
                }
            });
        }

        let mut deleted = 0;
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(())) = joined {
                deleted += 1;
            }
        }
        tracing::info!(dir = %self.dir.display(), deleted, "sandbox cleanup finished");
        deleted
    }

    /// 后台定期清理，直到 token 被取消
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("file janitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.cleanup_now().await;
                    }
                }
            }
        })
    }
}

fn stale_files(dir: &Path, max_age: Duration) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let now = SystemTime::now();
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age)
        })
        .map(|entry| entry.into_path())
        .collect()
}
