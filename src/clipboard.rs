//! 共享剪贴板：进程级单槽文本，支持并发读写。

use axum::extract::{ConnectInfo, Extension};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http::resolve_client_ip;
use crate::ratelimit::RateLimiter;

/// 单个可变文本槽，进程启动时为空。`set` 在写锁下整体替换内容，
/// 读者不会观察到撕裂写入。内容仅在进程生命周期内保留。
#[derive(Default)]
pub struct ClipboardStore {
    content: RwLock<String>,
}

impl ClipboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> String {
        self.content.read().await.clone()
    }

    pub async fn set(&self, text: String) {
        *self.content.write().await = text;
    }
}

/// 读取当前剪贴板内容。
pub async fn get_clipboard(
    Extension(clipboard): Extension<Arc<ClipboardStore>>,
) -> Response {
    let content = clipboard.get().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response()
}

/// 整体覆盖剪贴板内容，带按 IP 限流。
pub async fn set_clipboard(
    Extension(clipboard): Extension<Arc<ClipboardStore>>,
    Extension(limiter): Extension<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let client_ip = resolve_client_ip(&headers, Some(addr.ip())).unwrap_or_else(|| addr.ip());
    if !limiter.check(client_ip).await {
        warn!(%client_ip, "clipboard rate limit exceeded");
        return Err(ApiError::TooManyRequests(60));
    }

    debug!(bytes = body.len(), "clipboard updated");
    clipboard.set(body).await;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLIPBOARD_RATE_LIMIT;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let store = ClipboardStore::new();
        assert_eq!(store.get().await, "");
        store.set("hello".to_string()).await;
        assert_eq!(store.get().await, "hello");
        // 重复 set 幂等
        store.set("hello".to_string()).await;
        assert_eq!(store.get().await, "hello");
    }

    #[tokio::test]
    async fn post_handler_enforces_rate_limit() {
        let clipboard = Arc::new(ClipboardStore::new());
        let limiter = Arc::new(RateLimiter::new(
            CLIPBOARD_RATE_LIMIT,
            Duration::from_secs(60),
        ));
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);

        for i in 0..CLIPBOARD_RATE_LIMIT {
            let result = set_clipboard(
                Extension(clipboard.clone()),
                Extension(limiter.clone()),
                ConnectInfo(addr),
                HeaderMap::new(),
                format!("payload {i}"),
            )
            .await;
            assert!(result.is_ok(), "request {i} should pass");
        }

        let result = set_clipboard(
            Extension(clipboard.clone()),
            Extension(limiter),
            ConnectInfo(addr),
            HeaderMap::new(),
            "over the top".to_string(),
        )
        .await;
        assert!(matches!(result, Err(ApiError::TooManyRequests(_))));
        assert_eq!(clipboard.get().await, format!("payload {}", CLIPBOARD_RATE_LIMIT - 1));
    }
}
