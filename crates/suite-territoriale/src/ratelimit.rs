//! Per-client hourly quotas on the form endpoints.
//!
//! Clients are keyed by IP address. Behind a proxy the first `x-forwarded-for` entry is the
//! originating client.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde_json::json;

pub const RATE_LIMITED_MESSAGE: &str = "Trop de tentatives. Veuillez réessayer plus tard.";

const UNKNOWN_CLIENT: &str = "unknown";
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Keyed limiter allowing `N` requests per client and per hour, all usable at once.
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl ClientRateLimiter {
    pub fn per_hour(requests: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::keyed(Quota::per_hour(requests)),
            clock: DefaultClock::default(),
        }
    }

    pub fn check(&self, client: &str) -> Result<(), RateLimited> {
        self.limiter
            .check_key(&client.to_string())
            .map_err(|not_until| RateLimited {
                retry_after: not_until.wait_time_from(self.clock.now()),
            })
    }

    /// Forgets clients whose quota is fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

/// Periodically drop idle client entries so the key space stays bounded.
pub fn spawn_cleanup(limiters: Vec<Arc<ClientRateLimiter>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            for limiter in &limiters {
                limiter.retain_recent();
            }
            tracing::debug!(limiters = limiters.len(), "rate limiter cleanup done");
        }
    });
}

/// Rejection carrying the time until the client may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

impl RateLimited {
    /// Whole seconds to announce in `Retry-After`, never less than one.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, self.retry_after_secs().to_string())],
            Json(json!({ "success": false, "message": RATE_LIMITED_MESSAGE })),
        )
            .into_response()
    }
}

/// Originating client address: first `x-forwarded-for` entry, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

/// Extractor resolving [`client_ip`] for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(client_ip(&parts.headers, peer)))
    }
}

/// Middleware consuming one unit of the client's quota before the handler runs.
pub async fn enforce(
    State(limiter): State<Arc<ClientRateLimiter>>,
    ClientIp(client): ClientIp,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check(&client) {
        Ok(()) => next.run(request).await,
        Err(limited) => {
            tracing::warn!(
                client = %client,
                path = %request.uri().path(),
                retry_after = limited.retry_after_secs(),
                "rate limit exceeded"
            );
            limited.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        let peer: SocketAddr = "192.0.2.1:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), "192.0.2.1");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn quota_is_per_client() {
        let limiter = ClientRateLimiter::per_hour(NonZeroU32::new(2).unwrap());
        assert!(limiter.check("203.0.113.7").is_ok());
        assert!(limiter.check("203.0.113.7").is_ok());
        let limited = limiter.check("203.0.113.7").expect_err("third call limited");
        assert!(limited.retry_after_secs() > 1);
        assert!(limited.retry_after_secs() <= 1800);

        assert!(limiter.check("198.51.100.4").is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn retry_after_rounds_up_to_at_least_one_second() {
        let limited = RateLimited {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(limited.retry_after_secs(), 2);
        let limited = RateLimited {
            retry_after: Duration::ZERO,
        };
        assert_eq!(limited.retry_after_secs(), 1);
    }

    #[tokio::test]
    async fn rejection_response_has_french_message() {
        let response = RateLimited {
            retry_after: Duration::from_secs(30),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], RATE_LIMITED_MESSAGE);
        assert_eq!(body["success"], false);
    }
}
