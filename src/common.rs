use std::{
    ops::Deref,
    time::{Duration, Instant},
};

use crate::HoldbackError;

/// Capacity hints above this are not preallocated.
pub(crate) const PREALLOCATE_MAX: usize = 4_096;

/// Unit of work accepted by a [`RateLimiter`](crate::RateLimiter).
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A value paired with the instant it was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamped<T> {
    /// When `value` was recorded.
    pub timestamp: Instant,
    /// The recorded value.
    pub value: T,
}

impl<T> Timestamped<T> {
    /// Pair `value` with `timestamp`.
    pub fn new(value: T, timestamp: Instant) -> Self {
        Self { timestamp, value }
    }

    /// Drop the timestamp.
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Maximum number of executions admitted per window. At least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limit(usize);

impl Deref for Limit {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<usize> for Limit {
    type Error = HoldbackError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        if value < 1 {
            return Err(HoldbackError::InvalidLimit);
        }

        Ok(Self(value))
    }
}

/// Length of the trailing window a limit applies to. Strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowDuration(Duration);

impl WindowDuration {
    /// Window of `secs` seconds.
    pub fn from_secs(secs: u64) -> Result<Self, HoldbackError> {
        Self::try_from(Duration::from_secs(secs))
    }

    /// Window of `millis` milliseconds.
    pub fn from_millis(millis: u64) -> Result<Self, HoldbackError> {
        Self::try_from(Duration::from_millis(millis))
    }
}

impl Deref for WindowDuration {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Duration> for WindowDuration {
    type Error = HoldbackError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        if value.is_zero() {
            return Err(HoldbackError::InvalidDuration(value));
        }

        Ok(Self(value))
    }
}

/// How strongly releases are stretched toward even spacing.
///
/// `0` releases held work as soon as a window slot frees. `1` spaces releases
/// exactly `duration / limit` apart. Values in between blend linearly.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct UniformingRate(f64);

impl UniformingRate {
    /// Release as soon as capacity frees.
    pub const BURST: Self = Self(0.0);
    /// Release at exactly `duration / limit` intervals.
    pub const UNIFORM: Self = Self(1.0);
}

impl Deref for UniformingRate {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for UniformingRate {
    type Error = HoldbackError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&value) {
            return Err(HoldbackError::InvalidUniformingRate(value));
        }

        Ok(Self(value))
    }
}

macro_rules! capacity_newtype {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name(usize);

        impl Deref for $name {
            type Target = usize;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl TryFrom<usize> for $name {
            type Error = HoldbackError;

            fn try_from(value: usize) -> Result<Self, Self::Error> {
                if value < 1 {
                    return Err(HoldbackError::InvalidCapacity($label));
                }

                Ok(Self(value))
            }
        }
    };
}

capacity_newtype!(
    /// Upper bound on the total number of items a store holds. At least 1.
    MaxStoredItems,
    "max stored items"
);

capacity_newtype!(
    /// Upper bound on the number of distinct keys a store tracks. At least 1.
    MaxKeys,
    "max keys"
);

capacity_newtype!(
    /// Upper bound on the items held for a single key. At least 1.
    MaxPerKey,
    "max items per key"
);

/// Ceiling of the load counter. Zero is allowed: every submission is then held
/// and only the tick releases work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MaxLoad(u64);

impl Deref for MaxLoad {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for MaxLoad {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Ticks per second of a [`LoadBudgetLimiter`](crate::LoadBudgetLimiter).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadRate(f64);

impl LoadRate {
    /// Time between two ticks.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.0)
    }
}

impl Deref for LoadRate {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for LoadRate {
    type Error = HoldbackError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !(value > 0.0 && value.is_finite()) {
            return Err(HoldbackError::InvalidLoadRate(value));
        }

        // A period that rounds to zero would spin the ticker.
        match Duration::try_from_secs_f64(1.0 / value) {
            Ok(period) if !period.is_zero() => Ok(Self(value)),
            _ => Err(HoldbackError::InvalidLoadRate(value)),
        }
    }
}
