//! Bag Timestamps
//!
//! This module defines the `Time` type used to stamp every recorded message.
//!
//! ## Structure
//! A timestamp is a `(sec, nsec)` pair of unsigned 32-bit integers, matching
//! the fixed 8-byte representation used throughout the bag format: `sec` and
//! `nsec` are each stored as 4 little-endian bytes in data-record headers and
//! in index entries.
//!
//! ## Ordering
//! `Time` is totally ordered by `(sec, nsec)`. `Time::MIN` and `Time::MAX`
//! bound every representable timestamp and are the default query interval.

use serde::{Deserialize, Serialize};

/// A message timestamp: seconds and nanoseconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    /// Whole seconds
    pub sec: u32,

    /// Nanoseconds within the second (0..1_000_000_000)
    pub nsec: u32,
}

impl Time {
    /// The smallest representable timestamp
    pub const MIN: Time = Time { sec: 0, nsec: 0 };

    /// The largest representable timestamp
    pub const MAX: Time = Time {
        sec: u32::MAX,
        nsec: 999_999_999,
    };

    pub const fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Build a timestamp from fractional seconds. Convenience for callers
    /// that think in floating-point seconds; nanoseconds are rounded.
    pub fn from_secs(secs: f64) -> Self {
        let sec = secs.trunc() as u32;
        let nsec = ((secs - secs.trunc()) * 1e9).round() as u32;
        Self { sec, nsec }
    }

    /// Fractional seconds, lossy for large values
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 * 1e-9
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}
