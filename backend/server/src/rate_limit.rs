//! # Rate Limiting
//!
//! Token bucket per client IP.
//!
//! - Each bucket starts full with `burst` tokens and refills `burst` tokens per `refill`
//! - One token per request, an empty bucket gets `429`
//! - Requests without a known peer address share one bucket
//! - Once per `refill` window, buckets idle for a whole window are dropped. They
//!   would have refilled to `burst`, same as a new bucket
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use tracing::warn;

use crate::{error::AppError, state::AppState};

const UNKNOWN_PEER: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

struct Bucket {
    tokens: f64,
    last: Instant,
}

struct Buckets {
    by_peer: HashMap<IpAddr, Bucket>,
    swept: Instant,
}

pub struct RateLimiter {
    burst: f64,
    refill: Duration,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(burst: u32, refill: Duration) -> Self {
        Self {
            burst: burst.max(1) as f64,
            refill,
            buckets: Mutex::new(Buckets {
                by_peer: HashMap::new(),
                swept: Instant::now(),
            }),
        }
    }

    pub fn check(&self, peer: IpAddr) -> bool {
        self.check_at(peer, Instant::now())
    }

    fn check_at(&self, peer: IpAddr, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        if now.saturating_duration_since(buckets.swept) >= self.refill {
            let refill = self.refill;
            buckets
                .by_peer
                .retain(|_, bucket| now.saturating_duration_since(bucket.last) < refill);
            buckets.swept = now;
        }

        let bucket = buckets.by_peer.entry(peer).or_insert(Bucket {
            tokens: self.burst,
            last: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last);
        let refilled = elapsed.as_secs_f64() / self.refill.as_secs_f64() * self.burst;
        bucket.tokens = (bucket.tokens + refilled).min(self.burst);
        bucket.last = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(UNKNOWN_PEER);

    if !state.limiter.check(peer) {
        warn!("Rate limited {peer} on {}", request.uri().path());
        return AppError::RateLimited.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 8));

    #[test]
    fn test_burst_then_reject() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at(PEER, now));
        }
        assert!(!limiter.check_at(PEER, now));
        assert!(limiter.check_at(OTHER, now));
    }

    #[test]
    fn test_refill() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let now = Instant::now();

        assert!(limiter.check_at(PEER, now));
        assert!(limiter.check_at(PEER, now));
        assert!(!limiter.check_at(PEER, now));

        // half the window refills half the burst
        assert!(limiter.check_at(PEER, now + Duration::from_secs(5)));
        assert!(!limiter.check_at(PEER, now + Duration::from_secs(5)));

        assert!(limiter.check_at(PEER, now + Duration::from_secs(60)));
        assert!(limiter.check_at(PEER, now + Duration::from_secs(60)));
        assert!(!limiter.check_at(PEER, now + Duration::from_secs(60)));
    }

    #[test]
    fn test_idle_buckets_are_dropped() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        for host in 0..1000u32 {
            let peer = IpAddr::V4(Ipv4Addr::from(0x0a01_0000 + host));
            assert!(limiter.check_at(peer, now));
        }
        assert_eq!(limiter.buckets.lock().by_peer.len(), 1000);

        // drained inside the window, so it must survive the sweep
        assert!(limiter.check_at(PEER, now + Duration::from_secs(50)));
        assert!(limiter.check_at(PEER, now + Duration::from_secs(50)));

        assert!(!limiter.check_at(PEER, now + Duration::from_secs(61)));
        assert_eq!(limiter.buckets.lock().by_peer.len(), 1);
    }
}
