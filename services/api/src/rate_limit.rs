//! Fixed-window request limiting per client IP for the `/api` routes.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::{models::ErrorResponse, state::AppState};

/// Tracked clients beyond which expired windows are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counts a request from `ip`; returns whether it is within the limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if clients.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        if entry.count >= self.limit {
            return false;
        }
        entry.count += 1;
        true
    }
}

fn client_ip(request: &Request) -> IpAddr {
    let extensions = request.extensions();
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    // Router tests inject the peer address through `MockConnectInfo`.
    #[cfg(test)]
    let peer = peer.or_else(|| {
        extensions
            .get::<axum::extract::connect_info::MockConnectInfo<SocketAddr>>()
            .map(|mock| mock.0.ip())
    });

    peer.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware rejecting clients that exceed the configured rate with 429.
pub async fn limit_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    if state.rate_limiter.check(ip) {
        return next.run(request).await;
    }

    warn!(%ip, path = %request.uri().path(), "Rate limit exceeded");
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(
            header::RETRY_AFTER,
            state.rate_limiter.window().as_secs().to_string(),
        )],
        Json(ErrorResponse::new(
            "Too many requests, please try again later.",
        )),
    )
        .into_response()
}
