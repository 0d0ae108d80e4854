//! Monotonic wall-clock timestamps with explicit microsecond precision.
//!
//! Flow lifetimes are compared and subtracted constantly (active/inactive cutoffs,
//! inter-packet time deltas). Carrying seconds and microseconds as separate integer
//! fields, rather than a floating-point number of seconds, avoids the precision loss
//! that would otherwise creep into long-lived flows and keeps subtraction from
//! underflowing on a signed-seconds representation.

use std::fmt;
use std::ops::Sub;

/// A point in time expressed as whole seconds since an arbitrary epoch plus a
/// microseconds remainder in `0..1_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub secs: u64,
    pub micros: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { secs: 0, micros: 0 };

    /// A timestamp that compares greater than any real capture timestamp, used to
    /// force a full drain of the flow cache on shutdown (`spec.md` §5).
    pub const INFINITE: Timestamp = Timestamp {
        secs: u64::MAX,
        micros: 999_999,
    };

    pub fn new(secs: u64, micros: u32) -> Self {
        let extra_secs = micros / 1_000_000;
        Timestamp {
            secs: secs + extra_secs as u64,
            micros: micros % 1_000_000,
        }
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        let whole = secs.trunc() as u64;
        let micros = ((secs.fract()) * 1_000_000.0).round() as u32;
        Timestamp::new(whole, micros)
    }

    /// Seconds elapsed since `self`, saturating at zero if `other` is not later.
    pub fn saturating_sub_secs(&self, other: &Timestamp) -> u64 {
        if self.secs > other.secs || (self.secs == other.secs && self.micros >= other.micros) {
            let mut secs = self.secs - other.secs;
            if self.micros < other.micros {
                secs -= 1;
            }
            secs
        } else {
            0
        }
    }

    /// The whole-millisecond delta `self - other`, saturating at zero if `self`
    /// precedes `other`. Used for the `ipt` (inter-packet time) field, matching the
    /// original source's `timeval_to_milliseconds(a - b)`.
    pub fn delta_millis(&self, other: &Timestamp) -> u64 {
        if *self < *other {
            return 0;
        }
        let secs = self.secs - other.secs;
        let (secs, micros) = if self.micros < other.micros {
            (secs - 1, self.micros + 1_000_000 - other.micros)
        } else {
            (secs, self.micros - other.micros)
        };
        secs * 1000 + (micros / 1000) as u64
    }

    /// Whether `self < cutoff`, i.e. this timestamp precedes the given cutoff.
    pub fn precedes(&self, cutoff: &Timestamp) -> bool {
        self < cutoff
    }
}

impl Sub for Timestamp {
    type Output = u64;

    /// Millisecond delta, matching [`Timestamp::delta_millis`].
    fn sub(self, rhs: Timestamp) -> u64 {
        self.delta_millis(&rhs)
    }
}

impl fmt::Display for Timestamp {
    /// Renders as `sec.usec` with a zero-padded six-digit microsecond field, per
    /// `spec.md` §6 ("Timestamps are printed as sec.usec (six-digit microseconds)").
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pads_microseconds() {
        assert_eq!(Timestamp::new(1, 0).to_string(), "1.000000");
        assert_eq!(Timestamp::new(1, 500_000).to_string(), "1.500000");
        assert_eq!(Timestamp::new(1, 5).to_string(), "1.000005");
    }

    #[test]
    fn delta_millis_matches_scenario_2() {
        let t0 = Timestamp::new(1, 0);
        let t1 = Timestamp::new(1, 100_000);
        assert_eq!(t1.delta_millis(&t0), 100);
        assert_eq!(t0.delta_millis(&t1), 0);
    }

    #[test]
    fn carries_overflowing_micros_into_seconds() {
        let t = Timestamp::new(1, 1_500_000);
        assert_eq!(t.secs, 2);
        assert_eq!(t.micros, 500_000);
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Timestamp::new(1, 999_999) < Timestamp::new(2, 0));
        assert!(Timestamp::new(1, 0) < Timestamp::new(1, 1));
    }
}
