//! Shared rate-limit budget for heavy calls.
//!
//! The window opens at the first heavy call. Once `budget` heavy calls have
//! been made inside it, the next heavy call blocks until the window has run
//! its full length, then a fresh window starts. Light and weightless calls
//! never wait.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::RatelimitWeight;

/// Time source for the limiter, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Calls counted in the current window and when that window opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub calls_in_window: u32,
    pub window_start: Option<Instant>,
}

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    window: Duration,
    budget: u32,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    pub fn new(window: Duration, budget: u32) -> Self {
        Self::with_clock(window, budget, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, budget: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            window,
            budget: budget.max(1),
            state: Mutex::new(RateLimitState::default()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn state(&self) -> RateLimitState {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, RateLimitState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Account for one call of `weight`, blocking first if a heavy call
    /// would exceed the budget.
    pub fn acquire(&self, weight: RatelimitWeight) {
        if weight != RatelimitWeight::Heavy {
            return;
        }

        let mut state = self.lock();
        let now = self.clock.now();
        match state.window_start {
            Some(start) if now.duration_since(start) < self.window => {}
            _ => {
                state.window_start = Some(now);
                state.calls_in_window = 0;
            }
        }

        if state.calls_in_window >= self.budget {
            let wait = self.remaining(&state, now);
            info!(
                "Rate limit budget of {} heavy calls spent, waiting {}s for the window to reset",
                self.budget,
                wait.as_secs()
            );
            self.clock.sleep(wait);
            state.window_start = Some(self.clock.now());
            state.calls_in_window = 0;
        }

        state.calls_in_window += 1;
        debug!(
            "Heavy call {}/{} in current window",
            state.calls_in_window, self.budget
        );
    }

    /// Block until the current window resets. Used when the service itself
    /// reports that it is being called too fast.
    pub fn wait_for_reset(&self) {
        let mut state = self.lock();
        let now = self.clock.now();
        let wait = match state.window_start {
            Some(_) => self.remaining(&state, now),
            None => self.window,
        };
        info!("Waiting {}s for the rate limit window to reset", wait.as_secs());
        self.clock.sleep(wait);
        state.window_start = Some(self.clock.now());
        state.calls_in_window = 0;
    }

    fn remaining(&self, state: &RateLimitState, now: Instant) -> Duration {
        match state.window_start {
            Some(start) => self.window.saturating_sub(now.duration_since(start)),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Clock that only advances when slept on.
    pub struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
        slept: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
                slept: Mutex::new(Vec::new()),
            }
        }

        pub fn advance(&self, duration: Duration) {
            *self.offset.lock().unwrap() += duration;
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
            self.advance(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;

    fn limiter(budget: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(Duration::from_secs(60), budget, clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_light_calls_never_wait() {
        let (limiter, clock) = limiter(1);
        for _ in 0..10 {
            limiter.acquire(RatelimitWeight::Light);
            limiter.acquire(RatelimitWeight::None);
        }
        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.state().calls_in_window, 0);
    }

    #[test]
    fn test_heavy_calls_wait_when_budget_spent() {
        let (limiter, clock) = limiter(3);
        for _ in 0..3 {
            limiter.acquire(RatelimitWeight::Heavy);
        }
        assert!(clock.sleeps().is_empty());

        clock.advance(Duration::from_secs(20));
        limiter.acquire(RatelimitWeight::Heavy);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(40)]);
        assert_eq!(limiter.state().calls_in_window, 1);
    }

    #[test]
    fn test_window_expiry_resets_budget() {
        let (limiter, clock) = limiter(2);
        limiter.acquire(RatelimitWeight::Heavy);
        limiter.acquire(RatelimitWeight::Heavy);
        clock.advance(Duration::from_secs(61));
        limiter.acquire(RatelimitWeight::Heavy);
        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.state().calls_in_window, 1);
    }

    #[test]
    fn test_wait_for_reset() {
        let (limiter, clock) = limiter(5);
        limiter.acquire(RatelimitWeight::Heavy);
        clock.advance(Duration::from_secs(15));
        limiter.wait_for_reset();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(45)]);
        assert_eq!(limiter.state().calls_in_window, 0);
    }
}
