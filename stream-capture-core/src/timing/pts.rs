//! Presentation timestamp derivation for the video path.
//!
//! Network sources stamp frames in 100ns ticks, but some senders actually use
//! microseconds. The estimator starts in ticks and switches to microseconds
//! (once, never back) after `window` consecutive positive deltas shorter than
//! `ratio` × the expected frame interval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::frame_rate::FrameRate;
use super::rational::{rescale, Rational, MICROSECONDS, TICKS_100NS};

/// Unit the source's timestamps are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampUnit {
    Ticks100ns,
    Microseconds,
}

impl TimestampUnit {
    pub fn time_base(self) -> Rational {
        match self {
            Self::Ticks100ns => TICKS_100NS,
            Self::Microseconds => MICROSECONDS,
        }
    }

    /// Express a wall-clock duration in this unit.
    pub fn from_duration(self, duration: Duration) -> i64 {
        match self {
            Self::Ticks100ns => (duration.as_nanos() / 100) as i64,
            Self::Microseconds => duration.as_micros() as i64,
        }
    }
}

/// Parameters of the tick/microsecond detection heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitDetection {
    /// Consecutive short deltas required before switching.
    pub window: u32,
    /// A delta is short when below `ratio` × expected tick interval.
    pub ratio: f64,
}

impl Default for UnitDetection {
    fn default() -> Self {
        Self { window: 3, ratio: 0.5 }
    }
}

/// Computes monotonically non-decreasing presentation timestamps in the
/// writer's video time base.
#[derive(Debug, Clone)]
pub struct PtsEstimator {
    time_base: Rational,
    expected_tick: i64,
    detection: UnitDetection,
    unit: TimestampUnit,
    short_delta_streak: u32,
    epoch: Option<i64>,
    paused_at_epoch: Duration,
    previous: Option<i64>,
    synthetic: i64,
    last_pts: Option<i64>,
}

impl PtsEstimator {
    pub fn new(frame_rate: FrameRate, detection: UnitDetection) -> Self {
        Self {
            time_base: frame_rate.time_base(),
            expected_tick: frame_rate.tick_interval(),
            detection,
            unit: TimestampUnit::Ticks100ns,
            short_delta_streak: 0,
            epoch: None,
            paused_at_epoch: Duration::ZERO,
            previous: None,
            synthetic: 0,
            last_pts: None,
        }
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn unit(&self) -> TimestampUnit {
        self.unit
    }

    /// Compute the PTS for the next frame.
    ///
    /// `paused_total` is the session's cumulative paused duration; only the
    /// part accumulated since this segment's epoch is subtracted.
    pub fn next_pts(&mut self, source_timestamp: Option<i64>, paused_total: Duration) -> i64 {
        let synthetic = self.synthetic;
        self.synthetic += 1;

        let pts = match source_timestamp {
            None => synthetic,
            Some(ts) => {
                let epoch = match self.epoch {
                    Some(epoch) => epoch,
                    None => {
                        self.epoch = Some(ts);
                        self.paused_at_epoch = paused_total;
                        ts
                    }
                };
                if let Some(previous) = self.previous {
                    self.observe_delta(ts - previous);
                }
                self.previous = Some(ts);

                let paused = self
                    .unit
                    .from_duration(paused_total.saturating_sub(self.paused_at_epoch));
                let delta = (ts - epoch - paused).max(0);
                rescale(delta, self.unit.time_base(), self.time_base)
            }
        };

        let pts = match self.last_pts {
            Some(last) if pts < last => last,
            _ => pts,
        };
        self.last_pts = Some(pts);
        pts
    }

    /// Restart the timestamp domain for a new segment. The detected unit is kept.
    pub fn reset_segment(&mut self) {
        self.epoch = None;
        self.previous = None;
        self.synthetic = 0;
        self.last_pts = None;
        self.short_delta_streak = 0;
        self.paused_at_epoch = Duration::ZERO;
    }

    fn observe_delta(&mut self, delta: i64) {
        if self.unit != TimestampUnit::Ticks100ns {
            return;
        }
        let threshold = self.expected_tick as f64 * self.detection.ratio;
        if delta > 0 && (delta as f64) < threshold {
            self.short_delta_streak += 1;
            if self.short_delta_streak >= self.detection.window.max(1) {
                log::info!(
                    "source timestamp deltas ({delta}) below {threshold:.0} ticks for {} frames, interpreting as microseconds",
                    self.short_delta_streak
                );
                self.unit = TimestampUnit::Microseconds;
            }
        } else {
            self.short_delta_streak = 0;
        }
    }
}
