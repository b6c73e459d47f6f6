//! Rate limiting for codedrop-relay.
//!
//! Codes are short enough to guess, so receive attempts are limited per
//! client IP much more tightly than anything else. Sends are limited per IP
//! to keep one client from draining the code space, and a global limiter
//! caps aggregate load.
//!
//! All limiters are governor rate limiters; the keyed ones are backed by
//! DashMap.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits sends per client IP.
    send_limiter: Arc<KeyedLimiter<IpAddr>>,

    /// Limits receive attempts per client IP.
    receive_limiter: Arc<KeyedLimiter<IpAddr>>,

    /// Global rate limiter across all clients.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("send_limiter", &"KeyedLimiter<IpAddr>")
            .field("receive_limiter", &"KeyedLimiter<IpAddr>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

/// Which quota a request draws on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Creating a transfer.
    Send,
    /// Redeeming a code.
    Receive,
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// Zero values are rejected by [`crate::config::Config::validate`]; if
    /// one slips through it is treated as 1.
    pub fn new(config: &LimitsConfig) -> Self {
        let per_minute = |n: u32| Quota::per_minute(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN));

        let global_rps =
            NonZeroU32::new(config.global_requests_per_second).unwrap_or(NonZeroU32::MIN);

        Self {
            send_limiter: Arc::new(RateLimiter::keyed(per_minute(config.sends_per_minute))),
            receive_limiter: Arc::new(RateLimiter::keyed(per_minute(config.receives_per_minute))),
            global_limiter: Arc::new(RateLimiter::direct(Quota::per_second(global_rps))),
        }
    }

    /// Check a request against the global limit and then the per-IP quota
    /// for `action`.
    pub fn check(&self, action: Action, ip: IpAddr) -> Result<(), RateLimitError> {
        self.check_global()?;
        match action {
            Action::Send => self.check_send(&ip),
            Action::Receive => self.check_receive(&ip),
        }
    }

    /// Check if a send is allowed for this IP.
    pub fn check_send(&self, ip: &IpAddr) -> Result<(), RateLimitError> {
        self.send_limiter
            .check_key(ip)
            .map_err(|_| RateLimitError::SendLimitExceeded)
    }

    /// Check if a receive attempt is allowed for this IP.
    pub fn check_receive(&self, ip: &IpAddr) -> Result<(), RateLimitError> {
        self.receive_limiter
            .check_key(ip)
            .map_err(|_| RateLimitError::ReceiveLimitExceeded)
    }

    /// Check if the global request rate is within limits.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Number of IPs tracked by the send limiter (for metrics).
    pub fn send_keys_count(&self) -> usize {
        self.send_limiter.len()
    }

    /// Number of IPs tracked by the receive limiter (for metrics).
    pub fn receive_keys_count(&self) -> usize {
        self.receive_limiter.len()
    }

    /// Evict idle clients from the keyed limiters.
    ///
    /// `retain_recent()` removes entries whose cells have fully recharged.
    /// Called periodically from the cleanup task.
    pub fn shrink(&self) {
        self.send_limiter.retain_recent();
        self.receive_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many sends from this IP.
    #[error("send rate limit exceeded")]
    SendLimitExceeded,
    /// Too many receive attempts from this IP.
    #[error("receive rate limit exceeded")]
    ReceiveLimitExceeded,
    /// Global request rate exceeded across all clients.
    #[error("global rate limit exceeded")]
    GlobalLimitExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config(sends: u32, receives: u32, global: u32) -> LimitsConfig {
        LimitsConfig {
            sends_per_minute: sends,
            receives_per_minute: receives,
            global_requests_per_second: global,
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn create_rate_limits() {
        let limits = RateLimits::new(&LimitsConfig::default());
        assert_eq!(limits.send_keys_count(), 0);
        assert_eq!(limits.receive_keys_count(), 0);
    }

    #[test]
    fn receive_limit_allows_within_quota() {
        let limits = RateLimits::new(&config(100, 5, 1000));
        for _ in 0..5 {
            assert!(limits.check(Action::Receive, ip(1)).is_ok());
        }
        assert_eq!(
            limits.check(Action::Receive, ip(1)),
            Err(RateLimitError::ReceiveLimitExceeded)
        );
    }

    #[test]
    fn send_and_receive_quotas_are_separate() {
        let limits = RateLimits::new(&config(2, 2, 1000));

        assert!(limits.check(Action::Receive, ip(1)).is_ok());
        assert!(limits.check(Action::Receive, ip(1)).is_ok());
        assert!(limits.check(Action::Receive, ip(1)).is_err());

        // Sends still have full quota
        assert!(limits.check(Action::Send, ip(1)).is_ok());
        assert!(limits.check(Action::Send, ip(1)).is_ok());
        assert_eq!(
            limits.check(Action::Send, ip(1)),
            Err(RateLimitError::SendLimitExceeded)
        );
    }

    #[test]
    fn different_ips_have_independent_limits() {
        let limits = RateLimits::new(&config(1, 1, 1000));
        assert!(limits.check(Action::Send, ip(1)).is_ok());
        assert!(limits.check(Action::Send, ip(1)).is_err());
        assert!(limits.check(Action::Send, ip(2)).is_ok());
        assert_eq!(limits.send_keys_count(), 2);
    }

    #[test]
    fn global_rate_limiter_rejects_excess() {
        let limits = RateLimits::new(&config(100, 100, 5));
        for n in 0..5 {
            assert!(limits.check(Action::Send, ip(n)).is_ok());
        }
        assert_eq!(
            limits.check(Action::Send, ip(9)),
            Err(RateLimitError::GlobalLimitExceeded)
        );
    }

    #[test]
    fn zero_quota_treated_as_one() {
        let limits = RateLimits::new(&config(0, 0, 0));
        assert!(limits.check(Action::Send, ip(1)).is_ok());
        assert!(limits.check_send(&ip(1)).is_err());
    }

    #[test]
    fn rate_limits_are_debug() {
        let limits = RateLimits::new(&LimitsConfig::default());
        assert!(format!("{:?}", limits).contains("RateLimits"));
    }

    #[test]
    fn shrink_does_not_panic() {
        let limits = RateLimits::new(&LimitsConfig::default());
        let _ = limits.check(Action::Send, ip(1));
        let _ = limits.check(Action::Receive, ip(2));
        assert!(limits.send_keys_count() > 0);
        limits.shrink();
    }
}
