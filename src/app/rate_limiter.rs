use anyhow::Result;
use redis::AsyncCommands;

use crate::config::rate_limits::{unix_now, RateLimitPolicy};
use crate::infra::cache::RedisCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the current window closes.
    pub reset_at: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: RedisCache,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(cache: RedisCache, policy: RateLimitPolicy) -> Self {
        Self { cache, policy }
    }

    /// Counts one request from `client` and reports whether it is over budget.
    pub async fn hit(&self, client: &str) -> Result<RateLimitDecision> {
        let now = unix_now();
        let key = format!("ratelimit:images:{}:{}", client, self.policy.window_at(now));

        let mut conn = self.cache.connection().await?;
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let ttl = i64::try_from(self.policy.window_seconds).unwrap_or(i64::MAX);
            let _: () = conn.expire(&key, ttl).await?;
        }

        let limit = self.policy.max_requests;
        let limited = count > u64::from(limit);
        if limited {
            tracing::debug!(client = client, count = count, limit = limit, "Rate limit exceeded");
        }

        Ok(RateLimitDecision {
            limited,
            limit,
            remaining: u32::try_from(u64::from(limit).saturating_sub(count)).unwrap_or(0),
            reset_at: self.policy.reset_at(now),
        })
    }
}
