use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::utils::{error_codes, error_to_api_response};

// 达到这个规模时顺手清掉过期窗口，避免计数表无限增长
const CLEANUP_THRESHOLD: usize = 4096;

// 固定窗口的 IP 限流。状态都在进程内，和存储层保持一致
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    counters: Mutex<HashMap<String, (u32, Instant)>>,
}

impl RateLimiter {
    pub fn new(config: &Config) -> Self {
        RateLimiter {
            window: config.rate_limit_window(),
            max_requests: config.rate_limit_requests,
            counters: Mutex::new(HashMap::new()),
        }
    }

    async fn check(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;

        if counters.len() > CLEANUP_THRESHOLD {
            let window = self.window;
            counters.retain(|_, (_, started)| now.duration_since(*started) < window);
        }

        let entry = counters.entry(ip.to_string()).or_insert((0, now));
        if now.duration_since(entry.1) >= self.window {
            *entry = (0, now);
        }
        entry.0 += 1;
        entry.0 <= self.max_requests
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    // 优先取代理头里的原始 IP，降级用连接地址
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());
    let ip = req
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string();

    if limiter.check(&ip).await {
        Ok(next.run(req).await)
    } else {
        tracing::warn!(%ip, "触发限流");
        Ok((
            StatusCode::TOO_MANY_REQUESTS,
            error_to_api_response::<()>(error_codes::RATE_LIMIT, "请求过于频繁，请稍后再试".into()),
        )
            .into_response())
    }
}
