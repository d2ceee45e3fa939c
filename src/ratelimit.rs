//! Sliding-window rate limiter for outbound API calls
//!
//! Enforces a requests-per-minute ceiling over a rolling 60-second horizon.
//! The window state lives behind an async mutex; the lock is never held
//! across the sleep, so concurrent waiters re-check the window after waking.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Length of the sliding window.
const WINDOW: Duration = Duration::from_secs(60);

/// Concurrency-safe requests-per-minute limiter.
///
/// At most `rpm` calls to [`wait_for_slot`](RateLimiter::wait_for_slot)
/// return within any rolling 60-second window, for all interleavings.
pub struct RateLimiter {
    rpm: usize,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `rpm` requests per minute.
    pub fn new(rpm: usize) -> Self {
        Self {
            rpm: rpm.max(1),
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Suspend until a request slot is available, then claim it.
    ///
    /// Cancellation propagates: dropping the returned future while it sleeps
    /// releases nothing (the slot was never claimed).
    pub async fn wait_for_slot(&self) {
        loop {
            let delay = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while window.front().is_some_and(|t| now.duration_since(*t) >= WINDOW) {
                    window.pop_front();
                }
                if window.len() < self.rpm {
                    window.push_back(now);
                    return;
                }
                // Oldest entry decides when the next slot opens.
                let oldest = *window.front().expect("window is non-empty");
                (oldest + WINDOW).saturating_duration_since(now)
            };
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_rpm_immediately() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.wait_for_slot().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_when_window_is_full() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait_for_slot().await;
        }
        // Slots at 0s, 0s, 60s, 60s, 120s.
        assert!(start.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn window_holds_under_concurrency() {
        let limiter = Arc::new(RateLimiter::new(4));
        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.wait_for_slot().await;
                Instant::now()
            }));
        }
        let mut completions = Vec::new();
        for h in handles {
            completions.push(h.await.unwrap());
        }
        completions.sort();
        // No more than 4 completions inside any rolling 60-second window.
        for (i, t) in completions.iter().enumerate() {
            let in_window = completions
                .iter()
                .filter(|u| **u >= *t && u.duration_since(*t) < WINDOW)
                .count();
            assert!(in_window <= 4, "window starting at completion {} holds {}", i, in_window);
        }
    }
}
