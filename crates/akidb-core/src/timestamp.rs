//! Hybrid logical timestamps.
//!
//! A timestamp packs wall-clock milliseconds in the high bits and an 18-bit
//! logical counter in the low bits, so that ordering on the raw `u64` agrees
//! with physical time while still giving every event a unique value.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LOGICAL_BITS: u32 = 18;
const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// Hybrid timestamp: `physical_ms << 18 | logical`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp; sorts before every real position.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Wraps a raw hybrid value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw hybrid value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Builds a timestamp from a wall-clock instant and a logical counter.
    ///
    /// Instants before the Unix epoch clamp to zero physical time.
    #[must_use]
    pub fn compose(physical: DateTime<Utc>, logical: u32) -> Self {
        let millis = u64::try_from(physical.timestamp_millis()).unwrap_or(0);
        Self((millis << LOGICAL_BITS) | (u64::from(logical) & LOGICAL_MASK))
    }

    /// Timestamp for the current wall-clock instant.
    #[must_use]
    pub fn now() -> Self {
        Self::compose(Utc::now(), 0)
    }

    /// Embedded wall-clock time.
    #[must_use]
    pub fn physical(self) -> DateTime<Utc> {
        let millis = i64::try_from(self.0 >> LOGICAL_BITS).unwrap_or(i64::MAX);
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Embedded logical counter.
    #[must_use]
    pub fn logical(self) -> u32 {
        (self.0 & LOGICAL_MASK) as u32
    }

    /// Time elapsed between the embedded physical time and `now`.
    ///
    /// Timestamps from the future report a zero age.
    #[must_use]
    pub fn age(self, now: DateTime<Utc>) -> Duration {
        (now - self.physical()).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
