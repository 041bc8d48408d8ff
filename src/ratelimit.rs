//! 按客户端 IP 的滑动窗口限流。

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// 以客户端 IP 为键的滑动窗口请求计数器。
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// 允许则记录本次请求并返回 true，超限返回 false。
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        let timestamps = requests.entry(ip).or_default();
        timestamps.retain(|ts| now.duration_since(*ts) < self.window);
        if timestamps.len() >= self.max_requests {
            return false;
        }
        timestamps.push(now);
        true
    }

    /// 清理窗口外的记录，空条目一并移除。
    pub async fn prune(&self) {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        requests.retain(|_, timestamps| {
            timestamps.retain(|ts| now.duration_since(*ts) < self.window);
            !timestamps.is_empty()
        });
    }
}
