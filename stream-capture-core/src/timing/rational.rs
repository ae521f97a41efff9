use serde::{Deserialize, Serialize};

/// A time base: the duration of one timestamp unit, as a fraction of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

/// 100-nanosecond ticks, the documented unit of network source timestamps.
pub const TICKS_100NS: Rational = Rational::new(1, 10_000_000);

/// Microseconds.
pub const MICROSECONDS: Rational = Rational::new(1, 1_000_000);

impl Rational {
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }
}

/// Convert `value` from time base `from` to time base `to`, rounding to the
/// nearest unit with halves away from zero.
///
/// Intermediate math is done in 128 bits so large tick counts cannot overflow.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    if from == to {
        return value;
    }
    let n = value as i128 * from.num as i128 * to.den as i128;
    let d = from.den as i128 * to.num as i128;
    if d == 0 {
        return 0;
    }
    let (n, d) = if d < 0 { (-n, -d) } else { (n, d) };
    let rounded = if n >= 0 { (n + d / 2) / d } else { -((-n + d / 2) / d) };
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rescale_is_passthrough() {
        assert_eq!(rescale(12345, TICKS_100NS, TICKS_100NS), 12345);
    }

    #[test]
    fn ticks_to_frame_time_base() {
        // One second of 100ns ticks at 30 fps is 30 frames.
        assert_eq!(rescale(10_000_000, TICKS_100NS, Rational::new(1, 30)), 30);
        // 1.5 frames rounds away from zero.
        assert_eq!(rescale(500_000, TICKS_100NS, Rational::new(1, 30)), 2);
    }

    #[test]
    fn fractional_ntsc_time_base() {
        let tb = Rational::new(1001, 30000);
        // 1001 / 30000 s == 333_667 ticks (rounded)
        assert_eq!(rescale(1, tb, TICKS_100NS), 333_667);
        assert_eq!(rescale(333_667, TICKS_100NS, tb), 1);
    }

    #[test]
    fn negative_values_round_symmetrically() {
        let millis = Rational::new(1, 1_000);
        assert_eq!(rescale(-15, millis, Rational::new(1, 100)), -2);
        assert_eq!(rescale(15, millis, Rational::new(1, 100)), 2);
    }

    #[test]
    fn large_values_do_not_overflow() {
        let day_in_ticks = 24 * 3600 * 10_000_000i64;
        assert_eq!(rescale(day_in_ticks, TICKS_100NS, Rational::new(1, 48_000)), 24 * 3600 * 48_000);
    }
}
