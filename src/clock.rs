//! Monotonic time sources with pause/resume.
//!
//! The clock is the only state shared mutably between the check loop, the
//! render task and the keyboard task, so every implementation keeps its
//! state behind a single mutex.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// A stoppable monotonic time source.
pub trait Clock: Send + Sync {
    /// Time accumulated since the clock was created, excluding paused spans.
    fn elapsed(&self) -> Duration;

    fn pause(&self);

    fn resume(&self);

    fn is_paused(&self) -> bool;

    /// Flips between paused and running, returning `true` if now paused.
    fn toggle_pause(&self) -> bool {
        if self.is_paused() {
            self.resume();
            false
        } else {
            self.pause();
            true
        }
    }

    /// Blocks the calling thread for `duration` of this clock's time.
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug)]
struct MonotonicState {
    origin: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

/// Wall-independent clock backed by [`Instant`].
#[derive(Debug)]
pub struct MonotonicClock {
    state: Mutex<MonotonicState>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonotonicState {
                origin: Instant::now(),
                paused_at: None,
                paused_total: Duration::ZERO,
            }),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn elapsed(&self) -> Duration {
        let state = self.state.lock();
        let now = state.paused_at.unwrap_or_else(Instant::now);
        now.saturating_duration_since(state.origin)
            .saturating_sub(state.paused_total)
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if state.paused_at.is_none() {
            state.paused_at = Some(Instant::now());
            debug!("clock paused");
        }
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        if let Some(paused_at) = state.paused_at.take() {
            let span = paused_at.elapsed();
            state.paused_total += span;
            debug!(?span, "clock resumed");
        }
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused_at.is_some()
    }

    fn toggle_pause(&self) -> bool {
        let mut state = self.state.lock();
        match state.paused_at.take() {
            Some(paused_at) => {
                state.paused_total += paused_at.elapsed();
                false
            }
            None => {
                state.paused_at = Some(Instant::now());
                true
            }
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    paused: bool,
    sleeps: Vec<Duration>,
}

/// A clock that only moves when told to. Sleeping on it advances it
/// instantly, which makes scheduling behaviour reproducible.
#[derive(Debug, Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward unless it is paused.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        if !state.paused {
            state.now = state.now.saturating_add(by);
        }
    }

    /// Every duration passed to [`Clock::sleep`], in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.state.lock().now
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn resume(&self) {
        self.state.lock().paused = false;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.sleeps.push(duration);
        if !state.paused {
            state.now = state.now.saturating_add(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let first = clock.elapsed();
        thread::sleep(Duration::from_millis(5));
        assert!(clock.elapsed() > first);
    }

    #[test]
    fn paused_monotonic_clock_stands_still() {
        let clock = MonotonicClock::new();
        clock.pause();
        assert!(clock.is_paused());
        let frozen = clock.elapsed();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.elapsed(), frozen);

        clock.resume();
        assert!(!clock.is_paused());
        thread::sleep(Duration::from_millis(5));
        let after = clock.elapsed();
        assert!(after > frozen);
        // the paused span is not counted
        assert!(after < frozen + Duration::from_millis(20));
    }

    #[test]
    fn toggle_pause_alternates() {
        let clock = MonotonicClock::new();
        assert!(clock.toggle_pause());
        assert!(clock.is_paused());
        assert!(!clock.toggle_pause());
        assert!(!clock.is_paused());
    }

    #[test]
    fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_millis(300));
        clock.advance(Duration::from_millis(200));
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(300)]);

        clock.pause();
        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
    }
}
