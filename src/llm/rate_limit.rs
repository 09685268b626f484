//! Sliding-window rate limiter for the completion API.
//!
//! Bounds outbound request rate and, optionally, estimated token volume
//! over a trailing window. State is process-local and resets on restart.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{self, Instant};

/// Sliding-window limiter. `admit` suspends the caller until one more
/// request (and its estimated tokens) fits inside the window.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    token_budget: Option<u64>,
    state: Mutex<WindowState>,
}

#[derive(Default)]
struct WindowState {
    admissions: VecDeque<Instant>,
    usage: VecDeque<UsageRecord>,
}

struct UsageRecord {
    at: Instant,
    tokens: u64,
}

impl WindowState {
    /// Drop records that have aged out of the trailing window.
    fn prune(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while self.admissions.front().is_some_and(|&t| t <= cutoff) {
            self.admissions.pop_front();
        }
        while self.usage.front().is_some_and(|u| u.at <= cutoff) {
            self.usage.pop_front();
        }
    }
}

impl RateLimiter {
    /// Limiter admitting at most `max_requests` per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            token_budget: None,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Additionally bound the rolling sum of estimated tokens per window.
    pub fn with_token_budget(mut self, max_tokens: u64) -> Self {
        self.token_budget = Some(max_tokens);
        self
    }

    /// Wait until one more unit of work fits in the window, then record it.
    ///
    /// Both the request count and the projected token sum are re-checked
    /// after every wait, so a burst may wait repeatedly. Admission order is
    /// whatever order callers acquire the internal lock — FIFO-ish, no
    /// stronger fairness.
    pub async fn admit(&self, estimated_tokens: u64) {
        loop {
            let deadline = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.prune(now, self.window);

                match self.blocked_until(&state, estimated_tokens) {
                    Some(deadline) => Some(deadline),
                    None => {
                        state.admissions.push_back(now);
                        if self.token_budget.is_some() {
                            state.usage.push_back(UsageRecord {
                                at: now,
                                tokens: estimated_tokens,
                            });
                        }
                        None
                    }
                }
            };

            match deadline {
                Some(deadline) => {
                    tracing::debug!(
                        wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis()
                            as u64,
                        "Rate limit hit, waiting"
                    );
                    time::sleep_until(deadline).await;
                }
                None => return,
            }
        }
    }

    /// When the next admission becomes possible, or `None` if it fits now.
    fn blocked_until(&self, state: &WindowState, estimated_tokens: u64) -> Option<Instant> {
        if state.admissions.len() >= self.max_requests {
            return state.admissions.front().map(|&oldest| oldest + self.window);
        }
        if let Some(budget) = self.token_budget {
            let spent: u64 = state.usage.iter().map(|u| u.tokens).sum();
            if spent + estimated_tokens > budget {
                // A single oversized request with an empty window is admitted
                // anyway — waiting would never help it.
                return state.usage.front().map(|u| u.at + self.window);
            }
        }
        None
    }
}
