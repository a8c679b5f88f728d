//! A second-precision UTC timestamp for validity intervals and channel bookkeeping.

#[allow(missing_docs)]
mod error;

use std::{
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

use serde::{Deserialize, Serialize};

pub use crate::error::{TimestampError, TimestampResult};

/// A second-precision UTC timestamp, as carried in validity intervals on the wire.
///
/// It is assumed to be untrustworthy: peers may send any value in the full
/// +/- i64 range, so all arithmetic is overflow-checked and conversion to a
/// calendar date is fallible. A bound received from a remote peer must never
/// be able to panic the gossip loop.
///
/// Serializes as a bare integer, which is also the wire representation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

/// Display as RFC3339 Date+Time where chrono can represent it, otherwise as the raw
/// number of seconds.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Some(ts) => write!(f, "{}", ts),
            None => write!(f, "({}s)", self.0),
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self)
    }
}

impl From<i64> for Timestamp {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}

impl From<Timestamp> for i64 {
    fn from(t: Timestamp) -> Self {
        t.0
    }
}

/// Timestamp + Into<Duration>: an overflow-checked, unsigned offset. Sub-second
/// precision of the Duration is truncated.
impl<D: Into<Duration>> Add<D> for Timestamp {
    type Output = TimestampResult<Timestamp>;

    fn add(self, rhs: D) -> Self::Output {
        self.checked_add(&rhs.into())
            .ok_or(TimestampError::Overflow)
    }
}

impl<D: Into<Duration>> Add<D> for &Timestamp {
    type Output = TimestampResult<Timestamp>;

    fn add(self, rhs: D) -> Self::Output {
        self.to_owned() + rhs
    }
}

/// Timestamp - Into<Duration>.
impl<D: Into<Duration>> Sub<D> for Timestamp {
    type Output = TimestampResult<Timestamp>;

    fn sub(self, rhs: D) -> Self::Output {
        self.checked_sub(&rhs.into())
            .ok_or(TimestampError::Overflow)
    }
}

impl<D: Into<Duration>> Sub<D> for &Timestamp {
    type Output = TimestampResult<Timestamp>;

    fn sub(self, rhs: D) -> Self::Output {
        self.to_owned() - rhs
    }
}

impl Timestamp {
    /// The smallest possible Timestamp
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    /// The largest possible Timestamp
    pub const MAX: Timestamp = Timestamp(i64::MAX);
    /// The UNIX epoch
    pub const ZERO: Timestamp = Timestamp(0);

    /// Construct from seconds since the UNIX epoch
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Access time as seconds since the UNIX epoch
    pub const fn as_secs(&self) -> i64 {
        self.0
    }

    /// The current wall-clock time, truncated to the second.
    #[cfg(feature = "now")]
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    #[cfg(feature = "now")]
    fn to_rfc3339(&self) -> Option<String> {
        chrono::DateTime::<chrono::Utc>::from_timestamp(self.0, 0)
            .map(|ts| ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }

    #[cfg(not(feature = "now"))]
    fn to_rfc3339(&self) -> Option<String> {
        None
    }

    /// Signed difference `self - rhs` in seconds, `None` on overflow.
    pub fn checked_difference_signed(&self, rhs: &Timestamp) -> Option<i64> {
        self.0.checked_sub(rhs.0)
    }

    /// How long ago `earlier` was, seen from `self`.
    /// `None` if `earlier` is actually in the future of `self`.
    pub fn elapsed_since(&self, earlier: &Timestamp) -> Option<Duration> {
        let secs = self.checked_difference_signed(earlier)?;
        u64::try_from(secs).ok().map(Duration::from_secs)
    }

    /// Add an unsigned Duration.
    ///
    /// ```
    /// use dcache_timestamp::Timestamp;
    /// use std::time::Duration;
    ///
    /// assert_eq!(
    ///     Timestamp::from_secs(10).checked_add(&Duration::from_secs(5)),
    ///     Some(Timestamp::from_secs(15))
    /// );
    /// assert_eq!(Timestamp::MAX.checked_add(&Duration::from_secs(1)), None);
    /// ```
    pub fn checked_add(&self, rhs: &Duration) -> Option<Timestamp> {
        let secs = i64::try_from(rhs.as_secs()).ok()?;
        Some(Self(self.0.checked_add(secs)?))
    }

    /// Subtract an unsigned Duration.
    pub fn checked_sub(&self, rhs: &Duration) -> Option<Timestamp> {
        let secs = i64::try_from(rhs.as_secs()).ok()?;
        Some(Self(self.0.checked_sub(secs)?))
    }

    /// Add a duration, clamping to MAX if overflow
    pub fn saturating_add(&self, rhs: &Duration) -> Timestamp {
        self.checked_add(rhs).unwrap_or(Self::MAX)
    }

    /// Subtract a duration, clamping to MIN if overflow
    pub fn saturating_sub(&self, rhs: &Duration) -> Timestamp {
        self.checked_sub(rhs).unwrap_or(Self::MIN)
    }
}

/// Distance between two Timestamps in seconds (subject to overflow).
impl Sub<Timestamp> for Timestamp {
    type Output = TimestampResult<i64>;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.checked_difference_signed(&rhs)
            .ok_or(TimestampError::Overflow)
    }
}
