//! Sliding-window rate limiter for enhancement requests, keyed by client.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            hits: HashMap::new(),
        }
    }

    /// Records a request for `key` at `now`.
    ///
    /// Returns `Err(retry_after)` without recording when the window is full.
    pub fn check(&mut self, key: &str, now: Instant) -> Result<(), Duration> {
        let hits = self.hits.entry(key.to_string()).or_default();
        while hits
            .front()
            .is_some_and(|at| now.duration_since(*at) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() >= self.max_requests {
            let oldest = hits.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }
        hits.push_back(now);
        Ok(())
    }

    /// Drops clients with no hits inside the window.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.hits.retain(|_, hits| {
            hits.back()
                .is_some_and(|last| now.duration_since(*last) < window)
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.len()
    }
}
