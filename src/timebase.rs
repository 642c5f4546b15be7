// src/timebase.rs

//! Rational time bases and timestamp rebasing.
//!
//! Every stream expresses its timestamps in its own `(numerator, denominator)` unit of seconds.
//! Moving a packet between streams (source → muxer, encoder → muxer) means converting its
//! timestamps between those units without drifting.

use std::fmt;

use serde::Serialize;

/// A rational unit of seconds: one tick lasts `num / den` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// A time base of `1 / rate`, e.g. one tick per audio sample.
    pub const fn per_second(rate: i32) -> Self {
        Self { num: 1, den: rate }
    }

    /// Both terms positive; anything else cannot express a timestamp.
    pub fn is_valid(self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Convert a tick count into seconds.
    pub fn to_seconds(self, ticks: i64) -> f64 {
        ticks as f64 * self.num as f64 / self.den as f64
    }

    /// Number of ticks covering at least `seconds` whole seconds.
    ///
    /// Rounds up when the time base does not divide a second evenly (e.g. 1001/30000), so a
    /// span of `ticks_for_seconds(n)` ticks is never shorter than `n` seconds.
    pub fn ticks_for_seconds(self, seconds: u32) -> i64 {
        let numer = seconds as i128 * self.den as i128;
        let denom = self.num as i128;
        if denom <= 0 {
            return 0;
        }
        let ticks = (numer + denom - 1) / denom;
        clamp_i64(ticks)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rebase a timestamp from `from` units into `to` units.
///
/// Computes `ts * from.num * to.den / (from.den * to.num)` in 128-bit arithmetic, so the result
/// is exact whenever the ratio is exact and otherwise truncates toward zero. Invalid time bases
/// leave the timestamp untouched.
pub fn rebase(ts: i64, from: TimeBase, to: TimeBase) -> i64 {
    if from == to || !from.is_valid() || !to.is_valid() {
        return ts;
    }

    let numer = ts as i128 * from.num as i128 * to.den as i128;
    let denom = from.den as i128 * to.num as i128;
    clamp_i64(numer / denom)
}

/// [`rebase`] lifted over optional timestamps.
pub fn rebase_opt(ts: Option<i64>, from: TimeBase, to: TimeBase) -> Option<i64> {
    ts.map(|ts| rebase(ts, from, to))
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const MPEG: TimeBase = TimeBase::per_second(90_000);
    const AUDIO_48K: TimeBase = TimeBase::per_second(48_000);

    #[test]
    fn even_ratios_round_trip_exactly() {
        let there = rebase(90_000, MPEG, AUDIO_48K);
        assert_eq!(there, 48_000);
        assert_eq!(rebase(there, AUDIO_48K, MPEG), 90_000);
    }

    #[test]
    fn uneven_ratios_truncate_toward_zero() {
        // 1 tick of 1/3s is 333.33.. ms.
        let thirds = TimeBase::per_second(3);
        let millis = TimeBase::per_second(1000);
        assert_eq!(rebase(1, thirds, millis), 333);
        assert_eq!(rebase(-1, thirds, millis), -333);
    }

    #[test]
    fn rebasing_preserves_order() {
        let ntsc = TimeBase::new(1001, 30_000);
        let mut previous = i64::MIN;
        for ts in (-5_000..5_000).step_by(7) {
            let rebased = rebase(ts, ntsc, TimeBase::per_second(16_000));
            assert!(rebased >= previous, "{ts} rebased to {rebased} < {previous}");
            previous = rebased;
        }
    }

    #[test]
    fn large_timestamps_do_not_overflow() {
        let ts = i64::MAX / 2;
        let rebased = rebase(ts, TimeBase::per_second(1), TimeBase::per_second(90_000));
        assert_eq!(rebased, i64::MAX);
    }

    #[test]
    fn invalid_time_bases_are_identity() {
        assert_eq!(rebase(42, TimeBase::new(0, 1), MPEG), 42);
        assert_eq!(rebase_opt(None, MPEG, AUDIO_48K), None);
    }

    #[test]
    fn ticks_for_seconds_rounds_up() {
        assert_eq!(TimeBase::per_second(1000).ticks_for_seconds(10), 10_000);
        // 10s at 1001/30000 is 299.7 ticks.
        assert_eq!(TimeBase::new(1001, 30_000).ticks_for_seconds(10), 300);
    }
}
