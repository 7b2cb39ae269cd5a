//! # utimer
//!
//! Time tracking for a command-line timer, countdown and stopwatch.
//!
//! A [`timer::Timer`] is built from a parsed length and a shared
//! [`clock::Clock`], then driven by a [`checkloop::CheckLoop`] that sleeps in
//! bounded quanta while a [`render::RenderTicker`] redraws the status line.
//! [`context::RunContext`] wires these tasks together for one run.
//!
//! ```rust,no_run
//! use utimer::clock::MonotonicClock;
//! use utimer::context::{RunContext, RunSettings};
//! use utimer::parse::parse_length;
//! use utimer::render::TerminalWidth;
//! use utimer::timer::{DisplayOptions, Precision, Timer};
//!
//! let length = parse_length("1m30s").unwrap();
//! let clock = Some(MonotonicClock::shared());
//! let timer =
//!     Timer::new_countdown(length, clock, Precision::Second, DisplayOptions::default()).unwrap();
//! let summary = RunContext::new(timer, TerminalWidth::default(), RunSettings::default())
//!     .run(std::io::stdout())
//!     .unwrap();
//! println!("{:?}", summary.outcome);
//! ```

pub mod checkloop;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod parse;
pub mod render;
pub mod saturating;
pub mod timer;
