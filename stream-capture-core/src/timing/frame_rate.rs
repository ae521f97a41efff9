use serde::{Deserialize, Serialize};

use super::rational::{rescale, Rational, TICKS_100NS};

/// Lowest frame rate accepted from a source.
pub const MIN_ACCEPTED_FPS: f64 = 1.0;

/// Highest frame rate accepted from a source.
pub const MAX_ACCEPTED_FPS: f64 = 240.0;

/// A frame rate expressed as `num / den` frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

/// Outcome of validating a source-reported frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRateDecision {
    pub rate: FrameRate,
    /// True when the source rate was missing or out of range and the fallback was used.
    pub substituted: bool,
}

impl FrameRate {
    pub const DEFAULT: FrameRate = FrameRate::new(60, 1);

    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn fps(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Whether this rate is inside the accepted `[1, 240]` fps window.
    pub fn is_accepted(&self) -> bool {
        if self.num == 0 || self.den == 0 {
            return false;
        }
        let fps = self.fps();
        (MIN_ACCEPTED_FPS..=MAX_ACCEPTED_FPS).contains(&fps)
    }

    /// Validate a source-reported rate, substituting `fallback` when the rate is
    /// absent or implies an fps outside `[1, 240]`.
    pub fn from_source(reported: Option<(u32, u32)>, fallback: FrameRate) -> FrameRateDecision {
        match reported.map(|(num, den)| FrameRate::new(num, den)) {
            Some(rate) if rate.is_accepted() => FrameRateDecision {
                rate,
                substituted: false,
            },
            other => {
                match other {
                    Some(rate) => log::warn!(
                        "source frame rate {}/{} outside [{}, {}] fps, using {}/{}",
                        rate.num,
                        rate.den,
                        MIN_ACCEPTED_FPS,
                        MAX_ACCEPTED_FPS,
                        fallback.num,
                        fallback.den
                    ),
                    None => log::warn!(
                        "source did not report a frame rate, using {}/{}",
                        fallback.num,
                        fallback.den
                    ),
                }
                FrameRateDecision {
                    rate: fallback,
                    substituted: true,
                }
            }
        }
    }

    /// Stream/codec time base: one unit per frame.
    pub fn time_base(&self) -> Rational {
        Rational::new(self.den as i64, self.num as i64)
    }

    /// Expected interval between frames in 100ns ticks.
    pub fn tick_interval(&self) -> i64 {
        rescale(1, self.time_base(), TICKS_100NS)
    }

    /// Nearest whole fps, never below 1. Used for keyframe interval.
    pub fn rounded(&self) -> u32 {
        (self.fps().round() as u32).max(1)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_rates_inside_window() {
        for fps in [1u32, 24, 25, 30, 50, 60, 120, 240] {
            let decision = FrameRate::from_source(Some((fps, 1)), FrameRate::DEFAULT);
            assert!(!decision.substituted, "{fps} fps should be accepted");
            assert_eq!(decision.rate, FrameRate::new(fps, 1));
            assert_eq!(decision.rate.time_base(), Rational::new(1, fps as i64));
            assert_eq!(decision.rate.tick_interval(), (10_000_000f64 / fps as f64).round() as i64);
        }
    }

    #[test]
    fn accepts_ntsc_fractional_rate() {
        let decision = FrameRate::from_source(Some((30000, 1001)), FrameRate::DEFAULT);
        assert!(!decision.substituted);
        assert_eq!(decision.rate.time_base(), Rational::new(1001, 30000));
        assert_eq!(decision.rate.tick_interval(), 333_667);
        assert_eq!(decision.rate.rounded(), 30);
    }

    #[test]
    fn substitutes_default_for_out_of_range_rates() {
        let cases = [None, Some((0, 0)), Some((0, 1)), Some((30, 0)), Some((1, 2)), Some((241, 1)), Some((1000, 1))];
        for reported in cases {
            let decision = FrameRate::from_source(reported, FrameRate::DEFAULT);
            assert!(decision.substituted, "{reported:?} should be substituted");
            assert_eq!(decision.rate, FrameRate::new(60, 1));
        }
    }

    #[test]
    fn default_rate_tick_interval() {
        assert_eq!(FrameRate::DEFAULT.tick_interval(), 166_667);
    }
}
