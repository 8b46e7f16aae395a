// web-server/src/middleware/rate_limiter.rs
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Instant, Duration};
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header,
    Error, ResponseError,
    HttpResponse
};
use common::RateLimitConfig;
use dashmap::DashMap;
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::fmt;

// Custom error for rate limiting
#[derive(Debug)]
struct RateLimitExceeded {
    retry_after: u64,
}

impl fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rate limit exceeded")
    }
}

impl ResponseError for RateLimitExceeded {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::TOO_MANY_REQUESTS
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::TooManyRequests()
            .append_header((header::RETRY_AFTER, self.retry_after.to_string()))
            .json(serde_json::json!({
                "ok": false,
                "message": "Rate limit exceeded. Please try again later."
            }))
    }
}

/// Sliding-window limiter keyed by client IP, shared by all workers
#[derive(Debug, Clone)]
pub struct RateLimiter {
    paths: Vec<String>,
    max_requests: usize,
    window: Duration,
    trust_proxy_headers: bool,
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    last_sweep: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    pub fn new(paths: Vec<String>, max_requests: usize, window: Duration) -> Self {
        Self {
            paths,
            max_requests,
            window,
            trust_proxy_headers: false,
            store: Arc::new(DashMap::new()),
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn from_config(config: &RateLimitConfig, paths: Vec<String>) -> Self {
        let mut limiter = Self::new(paths, config.max_requests, Duration::from_secs(config.window_secs));
        limiter.trust_proxy_headers = config.trust_proxy_headers;
        limiter
    }

    fn applies_to(&self, path: &str) -> bool {
        self.paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Peer IP, or the forwarded client IP when proxy headers are trusted
    fn client_key(&self, req: &ServiceRequest) -> String {
        if self.trust_proxy_headers {
            if let Some(ip) = req.connection_info().realip_remote_addr() {
                return ip.to_string();
            }
        }

        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn is_rate_limited(&self, ip: &str, now: Instant) -> bool {
        let limited = {
            let mut hits = self.store.entry(ip.to_string()).or_default();

            while hits.front().map_or(false, |oldest| now.duration_since(*oldest) >= self.window) {
                hits.pop_front();
            }

            if hits.len() >= self.max_requests {
                true
            } else {
                hits.push_back(now);
                false
            }
        };

        self.maybe_sweep(now);
        limited
    }

    /// Drop clients with no hit inside the window, at most once per window.
    /// Must not run while a store entry is borrowed.
    fn maybe_sweep(&self, now: Instant) {
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last_sweep) < self.window {
            return;
        }
        *last_sweep = now;

        let window = self.window;
        let before = self.store.len();
        self.store.retain(|_, hits| {
            hits.back().map_or(false, |newest| now.duration_since(*newest) < window)
        });
        tracing::debug!("Rate limiter evicted {} idle clients", before.saturating_sub(self.store.len()));
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimiterMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimiterMiddleware {
            service,
            limiter: self.clone(),
        }))
    }
}

pub struct RateLimiterMiddleware<S> {
    service: S,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.limiter.applies_to(req.path()) {
            let ip = self.limiter.client_key(&req);

            if self.limiter.is_rate_limited(&ip, Instant::now()) {
                tracing::warn!("Rate limit exceeded for IP: {}", ip);

                let retry_after = self.limiter.window.as_secs();
                return Box::pin(async move {
                    Err(RateLimitExceeded { retry_after }.into())
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            fut.await
        })
    }
}
