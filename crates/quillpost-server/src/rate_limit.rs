//! Per-client request quotas.
//!
//! A fixed-window counter is kept for every `(client, class)` pair. The
//! window opens on the first request and lasts the class window; once it
//! has elapsed the next request opens a fresh one. Updates go through the
//! `DashMap` entry lock, so concurrent requests for the same key are
//! counted exactly once each.

use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Operation classes that carry separate quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateClass {
    Signup,
    Login,
    MutatePost,
    ReadPost,
    ListPosts,
}

impl RateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::MutatePost => "mutate_post",
            Self::ReadPost => "read_post",
            Self::ListPosts => "list_posts",
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `requests` allowed per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub requests: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Quota {
    pub const fn per_minute(requests: u32) -> Self {
        Self {
            requests,
            window: Duration::from_secs(60),
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} per {}",
            self.requests,
            humantime_serde::re::humantime::format_duration(self.window)
        )
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The class has no quota.
    Unlimited,
    Allowed {
        limit: u32,
        remaining: u32,
        reset: OffsetDateTime,
    },
    Denied {
        quota: Quota,
        reset: OffsetDateTime,
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: OffsetDateTime,
    count: u32,
}

impl Window {
    fn reset_at(&self, quota: &Quota) -> OffsetDateTime {
        self.started + quota.window
    }

    fn is_expired(&self, quota: &Quota, now: OffsetDateTime) -> bool {
        now >= self.reset_at(quota)
    }
}

/// Fixed-window rate limiter keyed by client and operation class.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<(String, RateClass), Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn quota(&self, class: RateClass) -> Option<Quota> {
        match class {
            RateClass::Signup => self.config.signup,
            RateClass::Login => self.config.login,
            RateClass::MutatePost => self.config.mutate_post,
            RateClass::ReadPost => self.config.read_post,
            RateClass::ListPosts => self.config.list_posts,
        }
    }

    /// Checks and, when allowed, counts one request against the current time.
    pub fn allow(&self, client: &str, class: RateClass) -> RateDecision {
        self.allow_at(client, class, OffsetDateTime::now_utc())
    }

    /// Checks and, when allowed, counts one request at `now`.
    ///
    /// A denial leaves the counter untouched.
    pub fn allow_at(&self, client: &str, class: RateClass, now: OffsetDateTime) -> RateDecision {
        let Some(quota) = self.quota(class) else {
            return RateDecision::Unlimited;
        };

        // Must run before `entry` takes a shard lock.
        if self.windows.len() >= self.config.max_tracked_keys {
            self.purge_expired(now);
        }

        let mut window = self
            .windows
            .entry((client.to_string(), class))
            .or_insert(Window {
                started: now,
                count: 0,
            });

        if window.is_expired(&quota, now) {
            window.started = now;
            window.count = 0;
        }

        let reset = window.reset_at(&quota);
        if window.count >= quota.requests {
            let retry_after = (reset - now).unsigned_abs();
            debug!(client, class = %class, "Rate limit exceeded");
            return RateDecision::Denied {
                quota,
                reset,
                retry_after,
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            limit: quota.requests,
            remaining: quota.requests - window.count,
            reset,
        }
    }

    /// Drops windows that have already elapsed.
    pub fn purge_expired(&self, now: OffsetDateTime) {
        let before = self.windows.len();
        self.windows.retain(|(_, class), window| {
            self.quota(*class)
                .is_some_and(|quota| !window.is_expired(&quota, now))
        });
        debug!(
            purged = before.saturating_sub(self.windows.len()),
            "Purged expired rate limit windows"
        );
    }

    /// Number of tracked windows.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    fn t0() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn test_allows_up_to_quota_then_denies() {
        let limiter = limiter();
        let now = t0();

        for i in 0..10 {
            match limiter.allow_at("1.2.3.4", RateClass::Signup, now) {
                RateDecision::Allowed {
                    limit, remaining, ..
                } => {
                    assert_eq!(limit, 10);
                    assert_eq!(remaining, 9 - i);
                }
                other => panic!("expected Allowed, got {other:?}"),
            }
        }

        let decision = limiter.allow_at("1.2.3.4", RateClass::Signup, now + Duration::from_secs(10));
        let RateDecision::Denied {
            quota, retry_after, ..
        } = decision
        else {
            panic!("expected Denied, got {decision:?}");
        };
        assert_eq!(quota.requests, 10);
        assert_eq!(retry_after, Duration::from_secs(50));
    }

    #[test]
    fn test_denial_does_not_extend_window() {
        let limiter = limiter();
        let now = t0();
        for _ in 0..5 {
            limiter.allow_at("c", RateClass::MutatePost, now);
        }
        for s in 1..30 {
            assert!(
                limiter
                    .allow_at("c", RateClass::MutatePost, now + Duration::from_secs(s))
                    .is_denied()
            );
        }

        // Window opened at t0 still closes at t0 + 60s.
        let decision = limiter.allow_at("c", RateClass::MutatePost, now + Duration::from_secs(60));
        assert!(matches!(
            decision,
            RateDecision::Allowed { remaining: 4, .. }
        ));
    }

    #[test]
    fn test_recovers_after_window() {
        let limiter = limiter();
        let now = t0();
        for _ in 0..20 {
            limiter.allow_at("c", RateClass::ReadPost, now);
        }
        assert!(limiter.allow_at("c", RateClass::ReadPost, now).is_denied());
        assert!(
            !limiter
                .allow_at("c", RateClass::ReadPost, now + Duration::from_secs(61))
                .is_denied()
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter();
        let now = t0();
        for _ in 0..10 {
            limiter.allow_at("a", RateClass::Login, now);
        }
        assert!(limiter.allow_at("a", RateClass::Login, now).is_denied());
        assert!(!limiter.allow_at("b", RateClass::Login, now).is_denied());
        assert!(!limiter.allow_at("a", RateClass::Signup, now).is_denied());
    }

    #[test]
    fn test_unlimited_class() {
        let limiter = limiter();
        for _ in 0..1000 {
            assert_eq!(
                limiter.allow_at("a", RateClass::ListPosts, t0()),
                RateDecision::Unlimited
            );
        }
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_purges_expired_windows_when_full() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_tracked_keys: 3,
            ..RateLimitConfig::default()
        });
        let now = t0();
        for client in ["a", "b", "c"] {
            limiter.allow_at(client, RateClass::Signup, now);
        }
        assert_eq!(limiter.tracked_keys(), 3);

        limiter.allow_at("d", RateClass::Signup, now + Duration::from_secs(120));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_concurrent_requests_counted_once_each() {
        let limiter = std::sync::Arc::new(limiter());
        let now = t0();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..5)
                        .filter(|_| !limiter.allow_at("c", RateClass::ReadPost, now).is_denied())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 20);
    }

    #[test]
    fn test_quota_display() {
        assert_eq!(Quota::per_minute(10).to_string(), "10 per 1m");
    }
}
