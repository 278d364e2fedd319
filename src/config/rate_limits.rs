use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed-window request budget applied per client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 600,
        }
    }
}

impl RateLimitPolicy {
    pub fn window_at(&self, unix_seconds: u64) -> u64 {
        unix_seconds / self.window_seconds.max(1)
    }

    /// Unix time at which the window containing `unix_seconds` ends.
    pub fn reset_at(&self, unix_seconds: u64) -> u64 {
        let window_seconds = self.window_seconds.max(1);
        (self.window_at(unix_seconds) + 1) * window_seconds
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
