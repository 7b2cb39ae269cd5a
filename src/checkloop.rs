//! The cooperative wait loop that decides when a run is over.
//!
//! The loop never sleeps longer than one wake quantum, so a cancellation
//! request is seen at most one quantum after it is made. When the remaining
//! time is shorter than the quantum it sleeps exactly that long and wakes at
//! the deadline.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::TimerError;
use crate::render::{Render, RenderTicker};
use crate::timer::Timer;

pub const DEFAULT_QUANTUM: Duration = Duration::from_millis(500);

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The target was reached.
    Completed,
    /// Cancellation was requested first.
    Cancelled,
}

#[derive(Debug)]
pub struct CheckLoop {
    timer: Arc<Timer>,
    quantum: Duration,
}

impl CheckLoop {
    /// `quantum` must be non-zero and shorter than one second.
    pub fn new(timer: Arc<Timer>, quantum: Duration) -> Result<Self, TimerError> {
        if quantum.is_zero() || quantum >= Duration::from_secs(1) {
            return Err(TimerError::InvalidQuantum(quantum.as_millis()));
        }
        Ok(Self { timer, quantum })
    }

    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    /// Sleeps in bounded steps until the target is reached or cancellation
    /// is requested. A stopwatch only ever ends by cancellation.
    pub fn wait(&self) -> RunOutcome {
        let clock = self.timer.clock();
        while !self.timer.is_cancel_requested() {
            let elapsed = self.timer.elapsed();
            if self.timer.is_target_reached(elapsed) {
                debug!(%elapsed, "target reached");
                return RunOutcome::Completed;
            }
            let nap = match self.timer.remaining_at(elapsed) {
                Some(remaining) => remaining.as_duration().min(self.quantum),
                None => self.quantum,
            };
            trace!(%elapsed, ?nap, "sleeping");
            clock.sleep(nap);
        }
        debug!(reason = ?self.timer.cancel_token().reason(), "cancelled");
        RunOutcome::Cancelled
    }

    /// Waits, then stops the periodic render, draws the final frame and
    /// returns the outcome.
    pub fn run(self, ticker: Option<RenderTicker>, render: &dyn Render) -> RunOutcome {
        let outcome = self.wait();
        if let Some(ticker) = ticker {
            ticker.stop();
        }
        render.render(true);
        outcome
    }

    /// Runs the loop on its own thread; the outcome is sent exactly once.
    pub fn spawn(
        self,
        ticker: Option<RenderTicker>,
        render: Arc<dyn Render>,
        outcome: Sender<RunOutcome>,
    ) -> Result<JoinHandle<()>, TimerError> {
        thread::Builder::new()
            .name("check-loop".into())
            .spawn(move || {
                let result = self.run(ticker, render.as_ref());
                if outcome.send(result).is_err() {
                    debug!(?result, "nobody is waiting for the outcome");
                }
            })
            .map_err(|source| TimerError::ThreadStart {
                name: "check loop",
                source,
            })
    }
}
