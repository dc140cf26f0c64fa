use std::time::Duration;

/// Error type for this crate.
///
/// Every variant describes a rejected configuration value. Runtime paths never
/// return errors: held work always runs eventually, and broken internal
/// invariants panic instead of degrading silently.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HoldbackError {
    /// A window limit of zero.
    #[error("limit must be at least 1")]
    InvalidLimit,
    /// A zero-length window.
    #[error("duration must be greater than 0, got {0:?}")]
    InvalidDuration(Duration),
    /// A uniforming rate outside `[0, 1]` (or NaN).
    #[error("uniforming rate must be between 0 and 1, got {0}")]
    InvalidUniformingRate(f64),
    /// A store or buffer capacity of zero.
    #[error("{0} must be at least 1")]
    InvalidCapacity(&'static str),
    /// A load rate that is not a positive finite number.
    #[error("load rate must be a positive finite number, got {0}")]
    InvalidLoadRate(f64),
}
