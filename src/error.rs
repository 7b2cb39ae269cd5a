use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn a length pattern such as `1h30m500ms` into a duration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no time length given")]
    Empty,
    #[error("expected a number at '{rest}'")]
    MissingNumber { rest: String },
    #[error("unknown unit '{suffix}' (use d, h, m, s or ms)")]
    UnknownUnit { suffix: String },
}

/// Failures that prevent a run from starting.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("a timer cannot be created without a clock")]
    MissingClock,
    #[error("wake quantum must be between 1 and 999 milliseconds, got {0} ms")]
    InvalidQuantum(u128),
    #[error("the check loop ended without reporting an outcome")]
    LoopAborted,
    #[error("failed to start the {name} thread")]
    ThreadStart {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not write config file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
