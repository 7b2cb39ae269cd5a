//! Timer module: the record for one timer, countdown or stopwatch run.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::SharedClock;
use crate::error::TimerError;
use crate::saturating;

/// A non-negative length of time split into whole seconds and the
/// remaining milliseconds. `millis` is always below 1000.
///
/// Ordering is lexicographic on `(seconds, millis)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeSpan {
    seconds: u32,
    millis: u16,
}

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan { seconds: 0, millis: 0 };

    /// The longest representable length; also what overflowing inputs clamp to.
    pub const MAX: TimeSpan = TimeSpan {
        seconds: u32::MAX,
        millis: 999,
    };

    /// Builds a span, carrying whole seconds out of `millis`.
    pub fn new(seconds: u32, millis: u32) -> Self {
        Self {
            seconds: saturating::add(seconds, millis / 1000),
            millis: (millis % 1000) as u16,
        }
    }

    pub fn from_secs(seconds: u32) -> Self {
        Self { seconds, millis: 0 }
    }

    /// Truncates to millisecond resolution; anything past `u32::MAX`
    /// seconds becomes [`TimeSpan::MAX`].
    pub fn from_duration(duration: Duration) -> Self {
        match u32::try_from(duration.as_secs()) {
            Ok(seconds) => Self {
                seconds,
                millis: duration.subsec_millis() as u16,
            },
            Err(_) => Self::MAX,
        }
    }

    pub fn seconds(self) -> u32 {
        self.seconds
    }

    pub fn millis(self) -> u16 {
        self.millis
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.seconds)) + Duration::from_millis(u64::from(self.millis))
    }

    pub fn as_millis(self) -> u64 {
        u64::from(self.seconds) * 1000 + u64::from(self.millis)
    }

    /// `self - elapsed`, borrowing one second when the millisecond part of
    /// `elapsed` is larger. Collapses to zero once `elapsed` reaches `self`.
    pub fn remaining_after(self, elapsed: TimeSpan) -> TimeSpan {
        if elapsed >= self {
            return Self::ZERO;
        }
        let mut seconds = self.seconds - elapsed.seconds;
        let millis = if elapsed.millis > self.millis {
            // elapsed < self with a larger millisecond part means seconds >= 1 here
            seconds -= 1;
            1000 - (elapsed.millis - self.millis)
        } else {
            self.millis - elapsed.millis
        };
        Self { seconds, millis }
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.seconds, self.millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Counts up from zero to the target.
    Timer,
    /// Counts down from the target to zero.
    Countdown,
    /// Counts up without a target until stopped.
    Stopwatch,
}

/// Rendering granularity. Internal timekeeping is always millisecond based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    #[value(alias = "ms")]
    Millisecond,
    #[value(alias = "s")]
    Second,
    #[value(alias = "m")]
    Minute,
    #[value(alias = "h")]
    Hour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    pub show_text: bool,
    pub show_percent: bool,
    pub show_bar: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_text: true,
            show_percent: false,
            show_bar: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The quit key was pressed.
    User,
    /// A signal or Ctrl-C arrived.
    Interrupt,
}

const NOT_CANCELLED: u8 = 0;
const CANCELLED_BY_USER: u8 = 1;
const CANCELLED_BY_INTERRUPT: u8 = 2;

/// Set-once cancellation flag shared between the run's tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicU8>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Only the first request counts; returns
    /// whether this call was it.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let code = match reason {
            CancelReason::User => CANCELLED_BY_USER,
            CancelReason::Interrupt => CANCELLED_BY_INTERRUPT,
        };
        self.0
            .compare_exchange(NOT_CANCELLED, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire) != NOT_CANCELLED
    }

    pub fn reason(&self) -> Option<CancelReason> {
        match self.0.load(Ordering::Acquire) {
            CANCELLED_BY_USER => Some(CancelReason::User),
            CANCELLED_BY_INTERRUPT => Some(CancelReason::Interrupt),
            _ => None,
        }
    }
}

/// One timer, countdown or stopwatch run. Single use: built, handed to the
/// check loop, dropped after the final render.
pub struct Timer {
    mode: TimerMode,
    target: TimeSpan,
    start: Duration,
    clock: SharedClock,
    precision: Precision,
    display: DisplayOptions,
    cancel: CancelToken,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("mode", &self.mode)
            .field("target", &self.target)
            .field("start", &self.start)
            .field("precision", &self.precision)
            .field("display", &self.display)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Timer {
    pub fn new_timer(
        target: TimeSpan,
        clock: Option<SharedClock>,
        precision: Precision,
        display: DisplayOptions,
    ) -> Result<Self, TimerError> {
        Self::build(TimerMode::Timer, target, clock, precision, display)
    }

    pub fn new_countdown(
        target: TimeSpan,
        clock: Option<SharedClock>,
        precision: Precision,
        display: DisplayOptions,
    ) -> Result<Self, TimerError> {
        Self::build(TimerMode::Countdown, target, clock, precision, display)
    }

    pub fn new_stopwatch(
        clock: Option<SharedClock>,
        precision: Precision,
        display: DisplayOptions,
    ) -> Result<Self, TimerError> {
        Self::build(TimerMode::Stopwatch, TimeSpan::ZERO, clock, precision, display)
    }

    fn build(
        mode: TimerMode,
        target: TimeSpan,
        clock: Option<SharedClock>,
        precision: Precision,
        display: DisplayOptions,
    ) -> Result<Self, TimerError> {
        let clock = clock.ok_or(TimerError::MissingClock)?;
        let start = clock.elapsed();
        debug!(?mode, %target, ?start, "timer created");
        Ok(Self {
            mode,
            target,
            start,
            clock,
            precision,
            display,
            cancel: CancelToken::new(),
        })
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn target(&self) -> TimeSpan {
        self.target
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn display(&self) -> DisplayOptions {
        self.display
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn request_cancel(&self, reason: CancelReason) -> bool {
        self.cancel.cancel(reason)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time since this timer was created, as measured by its clock.
    pub fn elapsed(&self) -> TimeSpan {
        TimeSpan::from_duration(self.clock.elapsed().saturating_sub(self.start))
    }

    /// `target - elapsed` for modes that have a target.
    pub fn remaining(&self) -> Option<TimeSpan> {
        self.remaining_at(self.elapsed())
    }

    pub fn remaining_at(&self, elapsed: TimeSpan) -> Option<TimeSpan> {
        match self.mode {
            TimerMode::Stopwatch => None,
            TimerMode::Timer | TimerMode::Countdown => Some(self.target.remaining_after(elapsed)),
        }
    }

    /// Whether `elapsed` has reached the target. A stopwatch never does.
    pub fn is_target_reached(&self, elapsed: TimeSpan) -> bool {
        self.mode != TimerMode::Stopwatch && elapsed >= self.target
    }
}
