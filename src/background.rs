//! 后台维护任务：限流窗口清理与过期暂存文件回收。

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{info, warn};

use crate::config::{RATE_PRUNE_INTERVAL_SECS, TEMP_SWEEP_INTERVAL_SECS};
use crate::ratelimit::RateLimiter;
use crate::staged::is_staged_temp_name;
use crate::storage::Storage;

/// 启动后台任务（限流清理与暂存文件回收）。
pub fn spawn_background_tasks(
    storage: Arc<Storage>,
    limiter: Arc<RateLimiter>,
    temp_ttl: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(RATE_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            limiter.prune().await;
        }
    });

    if temp_ttl.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TEMP_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match sweep_stale_temp_files(&storage, temp_ttl).await {
                Ok(removed) if removed > 0 => {
                    info!(removed, "swept stale upload temp files");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "temp file sweep failed"),
            }
        }
    });
}

/// 遍历存储树，删除超过 TTL 的暂存临时文件（中断上传的残留）。
pub async fn sweep_stale_temp_files(
    storage: &Storage,
    ttl: Duration,
) -> Result<u64, std::io::Error> {
    let now = SystemTime::now();
    let mut removed = 0;
    let mut stack = vec![storage.root_path().to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            if metadata.is_dir() {
                stack.push(entry.path());
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_staged_temp_name(&name) {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let Ok(age) = now.duration_since(modified) else {
                continue;
            };
            if age >= ttl {
                let path = entry.path();
                if let Err(err) = fs::remove_file(&path).await {
                    warn!(path = ?path, error = %err, "failed to remove stale temp file");
                } else {
                    removed += 1;
                }
            }
        }
    }

    Ok(removed)
}
