//! Custom error types for the sequencer.
//!
//! This module defines the primary error type, `SequencerError`, for the
//! entire crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of table construction.
//!
//! ## Error Taxonomy
//!
//! - **`Configuration`**: a required timing parameter is missing, or
//!   non-positive where positivity is required (zero units-per-step, missing
//!   settle time, unknown resource id). Fatal to the current planning run;
//!   retrying with the same input reproduces the same error.
//! - **`UnavailableTiming`**: a timing oracle could not answer a query, for
//!   example because the underlying device descriptor was never configured.
//!   The planner surfaces these to its caller as `Configuration` errors.
//! - **`OutOfOrder`**: an append would violate per-resource causal order in
//!   the action table. This is a programming-logic fault in the planner, not
//!   a user-facing condition; the documented algorithm cannot produce it, and
//!   the table enforces it defensively on every append.
//! - **`TimeUnderflow` / `InvalidTime`**: exact-time arithmetic and parsing
//!   failures from the [`crate::time`] module.
//!
//! All errors abort the entire `generate` call; there is no partial table.

use thiserror::Error;

use crate::resource::ResourceId;
use crate::time::Time;

/// Convenience alias for results using the crate error type.
pub type SeqResult<T> = std::result::Result<T, SequencerError>;

/// Error type covering every failure mode of plan validation and table
/// construction.
#[derive(Error, Debug)]
pub enum SequencerError {
    /// Semantic configuration error: a required parameter is missing,
    /// non-positive, or refers to an unknown resource.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A timing oracle could not answer a query for `resource`.
    #[error("Timing for '{quantity}' unavailable on resource '{resource}'")]
    UnavailableTiming {
        /// Resource the query was issued against.
        resource: ResourceId,
        /// Name of the quantity that could not be answered.
        quantity: &'static str,
    },

    /// An append would have scheduled `attempted` before the most recent
    /// entry for the same resource. Defensive invariant check; unreachable
    /// through the documented planning algorithm.
    #[error(
        "Out-of-order append for resource '{resource}': attempted {attempted} ms \
         but last scheduled entry is at {last} ms"
    )]
    OutOfOrder {
        /// Resource whose causal order would have been violated.
        resource: ResourceId,
        /// Timestamp of the most recently appended entry for the resource.
        last: Time,
        /// Timestamp the rejected append carried.
        attempted: Time,
    },

    /// Exact-time subtraction would have produced a negative value.
    #[error("Time underflow: {minuend} ms - {subtrahend} ms is negative")]
    TimeUnderflow {
        /// Left-hand side of the subtraction.
        minuend: Time,
        /// Right-hand side of the subtraction.
        subtrahend: Time,
    },

    /// A decimal-millisecond string could not be parsed into a [`Time`].
    #[error("Invalid time value '{0}': {1}")]
    InvalidTime(String, &'static str),

    /// I/O error while writing a table dump.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SequencerError::Configuration("slice height must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: slice height must be positive"
        );
    }

    #[test]
    fn test_out_of_order_display() {
        let err = SequencerError::OutOfOrder {
            resource: ResourceId::new("cam0"),
            last: Time::from_millis(10),
            attempted: Time::from_millis(5),
        };
        let text = err.to_string();
        assert!(text.contains("cam0"));
        assert!(text.contains("10"));
        assert!(text.contains('5'));
    }
}
