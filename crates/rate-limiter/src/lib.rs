//! Sliding-window request accounting plus exponential backoff for the market-data
//! provider. Mirrors the single-window limiter in the provider client this workspace
//! descends from, generalized to the minute+hour ceilings and backoff state the
//! engine's fetcher needs.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub rpm_max: usize,
    pub rph_max: usize,
    pub min_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_retries: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rpm_max: 500,
            rph_max: 20_000,
            min_interval: Duration::from_millis(50),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_retries: 5,
        }
    }
}

struct State {
    minute_window: VecDeque<Instant>,
    hour_window: VecDeque<Instant>,
    last_request: Option<Instant>,
    consecutive_errors: u32,
    backoff_until: Option<Instant>,
}

/// Gate in front of every outbound request to the market-data provider.
///
/// `acquire()` is the only suspension point; it purges stale entries from both
/// sliding windows, computes the longest of the four wait conditions in the spec
/// (min-interval, minute-slot, hour-slot, backoff), sleeps for that long, then
/// records the request.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                minute_window: VecDeque::new(),
                hour_window: VecDeque::new(),
                last_request: None,
                consecutive_errors: 0,
                backoff_until: None,
            }),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                purge(&mut state.minute_window, now, Duration::from_secs(60));
                purge(&mut state.hour_window, now, Duration::from_secs(3600));

                let min_interval_wait = state
                    .last_request
                    .map(|last| {
                        let elapsed = now.saturating_duration_since(last);
                        self.config.min_interval.saturating_sub(elapsed)
                    })
                    .unwrap_or_default();

                let minute_wait = window_wait(&state.minute_window, self.config.rpm_max, now, Duration::from_secs(60));
                let hour_wait = window_wait(&state.hour_window, self.config.rph_max, now, Duration::from_secs(3600));

                let backoff_wait = state
                    .backoff_until
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or_default();

                let wait = min_interval_wait.max(minute_wait).max(hour_wait).max(backoff_wait);

                if wait.is_zero() {
                    state.minute_window.push_back(now);
                    state.hour_window.push_back(now);
                    state.last_request = Some(now);
                    return;
                }
                wait
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter suspending caller");
            tokio::time::sleep(wait).await;
        }
    }

    /// Clears backoff and the consecutive-error counter after a successful call.
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_errors = 0;
        state.backoff_until = None;
    }

    /// Records a rate-limit (429/crumb) error; returns the backoff duration applied.
    pub async fn record_rate_limit_error(&self) -> Duration {
        let mut state = self.state.lock().await;
        state.consecutive_errors += 1;
        let backoff = self.backoff_for(state.consecutive_errors);
        state.backoff_until = Some(Instant::now() + backoff);
        backoff
    }

    pub async fn should_retry(&self) -> bool {
        let state = self.state.lock().await;
        state.consecutive_errors <= self.config.max_retries
    }

    fn backoff_for(&self, consecutive_errors: u32) -> Duration {
        let scaled = self.config.initial_backoff.as_secs_f64()
            * self.config.backoff_multiplier.powi(consecutive_errors.saturating_sub(1) as i32);
        Duration::from_secs_f64(scaled).min(self.config.max_backoff)
    }
}

fn purge(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(&front) = window.front() {
        if now.saturating_duration_since(front) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn window_wait(window: &VecDeque<Instant>, max: usize, now: Instant, span: Duration) -> Duration {
    if window.len() < max {
        return Duration::ZERO;
    }
    match window.front() {
        Some(&oldest) => span.saturating_sub(now.saturating_duration_since(oldest)),
        None => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn acquires_up_to_rpm_ceiling_immediately() {
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            rpm_max: 5,
            rph_max: 1000,
            min_interval: Duration::ZERO,
            ..Default::default()
        }));

        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(Instant::now().saturating_duration_since(start) < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_acquisition_suspends_past_the_minute_window() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            rpm_max: 5,
            rph_max: 1000,
            min_interval: Duration::ZERO,
            ..Default::default()
        });

        for _ in 0..5 {
            limiter.acquire().await;
        }
        let start = Instant::now();
        limiter.acquire().await;
        assert!(Instant::now().saturating_duration_since(start) >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn backoff_grows_exponentially_and_clears_on_success() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let b1 = limiter.record_rate_limit_error().await;
        let b2 = limiter.record_rate_limit_error().await;
        assert!(b2 >= b1);
        limiter.record_success().await;
        assert!(limiter.should_retry().await);
    }

    #[tokio::test]
    async fn should_retry_false_after_max_retries_exhausted() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_retries: 2,
            ..Default::default()
        });
        for _ in 0..3 {
            limiter.record_rate_limit_error().await;
        }
        assert!(!limiter.should_retry().await);
    }
}
