use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::middleware::auth::{extract_bearer, verify_token, AuthUser};
use crate::AppState;

/// Fixed-window request counter keyed by client.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, WindowEntry>>>,
    max_requests: u32,
    window_secs: u64,
}

struct WindowEntry {
    count: u32,
    reset_at: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window_secs,
        }
    }

    pub async fn check(&self, key: &str) -> bool {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.check_at(key, now).await
    }

    async fn check_at(&self, key: &str, now: u64) -> bool {
        let mut windows = self.windows.lock().await;
        // Expired windows are dropped so idle clients don't pile up.
        if windows.len() > 10_000 {
            windows.retain(|_, e| e.reset_at > now);
        }

        let entry = windows.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now + self.window_secs,
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window_secs;
        }

        entry.count += 1;
        entry.count <= self.max_requests
    }
}

fn get_client_key(state: &AppState, req: &Request) -> String {
    // User id when authenticated, otherwise IP
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return format!("user:{}", user.id);
    }
    if let Some(claims) = extract_bearer(req)
        .and_then(|token| verify_token(&token, &state.config.jwt.secret).ok())
    {
        return format!("user:{}", claims.sub);
    }
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| format!("ip:{}", v.split(',').next().unwrap_or("unknown").trim()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}

/// Middleware: general rate limiter.
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("global:{}", get_client_key(&state, &req));
    if !state.rate_limiter.check(&key).await {
        tracing::debug!(client = %key, "rate limited");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(req).await)
}

/// Middleware: stricter limiter for clan mutations. Reads pass through.
pub async fn write_rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if req.method().is_safe() {
        return Ok(next.run(req).await);
    }
    let key = format!("write:{}", get_client_key(&state, &req));
    if !state.write_rate_limiter.check(&key).await {
        tracing::debug!(client = %key, "write rate limited");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_max_then_blocks() {
        let limiter = RateLimiter::new(3, 60);
        for _ in 0..3 {
            assert!(limiter.check_at("ip:1.2.3.4", 1_000).await);
        }
        assert!(!limiter.check_at("ip:1.2.3.4", 1_000).await);
        assert!(limiter.check_at("ip:5.6.7.8", 1_000).await);
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.check_at("user:u1", 1_000).await);
        assert!(!limiter.check_at("user:u1", 1_059).await);
        assert!(limiter.check_at("user:u1", 1_060).await);
    }
}
