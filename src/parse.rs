//! Parsing of time length patterns such as `31m27s300ms` or `30d9h50s`.
//!
//! A pattern is a run of `<number><unit>` tokens. Units are `d`, `h`, `m`,
//! `s` and `ms`; a number with no unit at the end of the pattern counts as
//! seconds. Numbers too large for a `u32` are clamped and reported as
//! [`OverflowWarning`]s instead of failing the parse.

use std::fmt;

use tracing::{debug, warn};

use crate::error::ParseError;
use crate::saturating;
use crate::timer::TimeSpan;

/// A number in the pattern that did not fit and was clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowWarning {
    /// Digits as they appeared in the pattern.
    pub digits: String,
    /// What follows the number, empty at the end of the pattern.
    pub rest: String,
    pub clamped_to: u32,
}

impl fmt::Display for OverflowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rest.is_empty() {
            write!(f, "The last number is too big. It has been changed into: {}", self.clamped_to)
        } else {
            write!(
                f,
                "The number before '{}' is too big. It has been changed into: {}",
                self.rest, self.clamped_to
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLength {
    pub length: TimeSpan,
    pub warnings: Vec<OverflowWarning>,
}

enum Unit {
    Millis,
    Seconds(u32),
}

/// Parses a time length pattern, logging any overflow warnings.
pub fn parse_length(pattern: &str) -> Result<TimeSpan, ParseError> {
    let parsed = parse_length_with_warnings(pattern)?;
    for warning in &parsed.warnings {
        warn!("{warning}");
    }
    Ok(parsed.length)
}

/// Parses a time length pattern and hands back overflow warnings to the caller.
pub fn parse_length_with_warnings(pattern: &str) -> Result<ParsedLength, ParseError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut seconds = 0u32;
    let mut millis = 0u32;
    let mut warnings = Vec::new();
    let mut rest = pattern;

    while !rest.is_empty() {
        debug!(rest, "parsing");
        let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits_len == 0 {
            return Err(ParseError::MissingNumber { rest: rest.to_string() });
        }
        let (digits, after) = rest.split_at(digits_len);
        let value = match digits.parse::<u32>() {
            Ok(value) => value,
            Err(_) => {
                warnings.push(OverflowWarning {
                    digits: digits.to_string(),
                    rest: after.to_string(),
                    clamped_to: u32::MAX,
                });
                u32::MAX
            }
        };

        let (unit, consumed) = unit_at(after)?;
        match unit {
            Unit::Millis => {
                debug!(value, "adding milliseconds");
                seconds = saturating::add(seconds, value / 1000);
                millis += value % 1000;
                if millis >= 1000 {
                    seconds = saturating::add(seconds, 1);
                    millis -= 1000;
                }
            }
            Unit::Seconds(factor) => {
                let value = saturating::multiply(value, factor);
                debug!(value, factor, "adding seconds");
                seconds = saturating::add(seconds, value);
            }
        }
        rest = &after[consumed..];
    }

    Ok(ParsedLength {
        length: TimeSpan::new(seconds, millis),
        warnings,
    })
}

/// Identifies the unit at the start of `suffix` and how many bytes it spans.
fn unit_at(suffix: &str) -> Result<(Unit, usize), ParseError> {
    if suffix.starts_with("ms") {
        return Ok((Unit::Millis, 2));
    }
    let factor = match suffix.bytes().next() {
        None => return Ok((Unit::Seconds(1), 0)),
        Some(b's') => 1,
        Some(b'm') => 60,
        Some(b'h') => 60 * 60,
        Some(b'd') => 60 * 60 * 24,
        Some(_) => {
            let end = suffix
                .char_indices()
                .find(|(_, ch)| ch.is_ascii_digit())
                .map_or(suffix.len(), |(index, _)| index);
            return Err(ParseError::UnknownUnit {
                suffix: suffix[..end].to_string(),
            });
        }
    };
    Ok((Unit::Seconds(factor), 1))
}
