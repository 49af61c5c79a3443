//! Validation errors for target tables.

use crate::types::InstrumentId;

/// Errors returned when building a [`Targets`](crate::Targets) table.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TargetError {
    /// A target percent outside `[0, 100]` (or NaN).
    #[error("target percent for {what} is {percent}, expected 0..=100")]
    PercentOutOfRange { what: String, percent: f64 },
    /// The same instrument appears twice in the model.
    #[error("instrument {0} appears more than once in the target model")]
    DuplicateInstrument(InstrumentId),
    /// Tolerance must be a non-negative finite percent.
    #[error("tolerance percent must be >= 0, got {0}")]
    InvalidTolerance(f64),
}
