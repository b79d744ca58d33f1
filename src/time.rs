//! Exact scheduling time.
//!
//! All table arithmetic is performed on [`Time`], a fixed-point count of
//! microseconds since experiment start. Schedules are built by summing
//! thousands of small increments (per-slice settle times, per-step trigger
//! delays), so the representation must not accumulate rounding drift and the
//! finished table must be bit-reproducible for the same plan. Binary floating
//! point is therefore never used internally; `f64` appears only at the
//! configuration boundary, where a value is converted to microseconds exactly
//! once.
//!
//! For interop with external executors, `Time` converts to and from a
//! decimal-millisecond string (`"65"`, `"0.5"`, `"12.345"`) with at most
//! three fractional digits, which is the microsecond resolution of the type.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SeqResult, SequencerError};

const MICROS_PER_MS: u64 = 1_000;

/// Non-negative, exact time since experiment start.
///
/// Internally a `u64` count of microseconds. Supports addition, checked
/// subtraction, and total ordering; `Ord::max` is the `max(a, b)` of the
/// scheduling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The experiment start instant.
    pub const ZERO: Time = Time(0);

    /// Builds a time from whole milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Time(ms * MICROS_PER_MS)
    }

    /// Builds a time from microseconds.
    pub const fn from_micros(us: u64) -> Self {
        Time(us)
    }

    /// Converts a millisecond quantity arriving as `f64` (velocity-derived
    /// motion estimates, configuration files) into an exact time, rounding to
    /// the nearest microsecond. This is the only sanctioned float-to-time
    /// boundary; the conversion is deterministic for a given input.
    pub fn from_ms_f64(ms: f64) -> SeqResult<Self> {
        if !ms.is_finite() {
            return Err(SequencerError::InvalidTime(
                ms.to_string(),
                "not a finite number",
            ));
        }
        if ms < 0.0 {
            return Err(SequencerError::InvalidTime(
                ms.to_string(),
                "time must be non-negative",
            ));
        }
        let micros = (ms * MICROS_PER_MS as f64).round();
        if micros > u64::MAX as f64 {
            return Err(SequencerError::InvalidTime(
                ms.to_string(),
                "time out of range",
            ));
        }
        Ok(Time(micros as u64))
    }

    /// Raw microsecond count.
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Whole milliseconds, if this time falls on a millisecond boundary.
    pub const fn as_integer_millis(self) -> Option<u64> {
        if self.0 % MICROS_PER_MS == 0 {
            Some(self.0 / MICROS_PER_MS)
        } else {
            None
        }
    }

    /// Checked subtraction; `None` if the result would be negative.
    pub const fn checked_sub(self, rhs: Time) -> Option<Time> {
        match self.0.checked_sub(rhs.0) {
            Some(us) => Some(Time(us)),
            None => None,
        }
    }

    /// Subtraction for callers that disallow negative results.
    pub fn sub(self, rhs: Time) -> SeqResult<Time> {
        self.checked_sub(rhs).ok_or(SequencerError::TimeUnderflow {
            minuend: self,
            subtrahend: rhs,
        })
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        // Saturating: the schedule horizon is bounded by u64 microseconds
        // (~584k years), so saturation is unreachable in practice.
        Time(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Time {
    /// Decimal milliseconds with trailing zeros trimmed (`"65"`, `"65.5"`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MICROS_PER_MS;
        let frac = self.0 % MICROS_PER_MS;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{frac:03}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for Time {
    type Err = SequencerError;

    fn from_str(s: &str) -> SeqResult<Self> {
        let invalid = |reason| SequencerError::InvalidTime(s.to_string(), reason);
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty value"));
        }
        // u64::parse would accept a leading '+'; the grammar is digits only.
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("expected non-negative decimal milliseconds"));
        }
        let whole_ms: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("time out of range"))?
        };
        if frac.len() > 3 {
            return Err(invalid("at most three fractional digits (1 us resolution)"));
        }
        let mut frac_us: u64 = 0;
        if !frac.is_empty() {
            let parsed: u64 = frac.parse().map_err(|_| invalid("time out of range"))?;
            frac_us = parsed * 10u64.pow(3 - frac.len() as u32);
        }
        whole_ms
            .checked_mul(MICROS_PER_MS)
            .and_then(|us| us.checked_add(frac_us))
            .map(Time)
            .ok_or_else(|| invalid("time out of range"))
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct TimeVisitor;

impl Visitor<'_> for TimeVisitor {
    type Value = Time;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("decimal milliseconds as a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Time, E> {
        v.parse().map_err(de::Error::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Time, E> {
        Ok(Time::from_millis(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Time, E> {
        u64::try_from(v)
            .map(Time::from_millis)
            .map_err(|_| de::Error::custom("time must be non-negative"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Time, E> {
        Time::from_ms_f64(v).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        deserializer.deserialize_any(TimeVisitor)
    }
}
