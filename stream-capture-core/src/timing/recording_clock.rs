use std::time::{Duration, Instant};

/// Pause-aware elapsed-time accounting for one recording.
///
/// The cumulative paused duration kept here is the single value subtracted from
/// both the displayed elapsed time and the media timestamp computation.
#[derive(Debug, Clone, Default)]
pub struct RecordingClock {
    started_at: Option<Instant>,
    paused_total: Duration,
    /// Raw elapsed time at the moment the current pause began.
    pause_started: Option<Duration>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Start the elapsed clock. Called on the first received frame.
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.paused_total = Duration::ZERO;
        self.pause_started = None;
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started.is_some()
    }

    /// Record the pause instant. Returns false if not started or already paused.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.pause_started.is_some() {
            return false;
        }
        let Some(raw) = self.raw_elapsed(now) else {
            return false;
        };
        self.pause_started = Some(raw);
        true
    }

    /// Fold the finished pause into the accumulator. Returns the pause length.
    pub fn resume(&mut self, now: Instant) -> Option<Duration> {
        let pause_started = self.pause_started.take()?;
        let raw = self.raw_elapsed(now)?;
        let paused_for = raw.saturating_sub(pause_started);
        self.paused_total += paused_for;
        Some(paused_for)
    }

    /// Total time spent in completed pauses.
    pub fn paused_total(&self) -> Duration {
        self.paused_total
    }

    /// Recorded (unpaused) time. Frozen while paused.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(raw) = self.raw_elapsed(now) else {
            return Duration::ZERO;
        };
        match self.pause_started {
            Some(pause_started) => pause_started.saturating_sub(self.paused_total),
            None => raw.saturating_sub(self.paused_total),
        }
    }

    fn raw_elapsed(&self, now: Instant) -> Option<Duration> {
        self.started_at.map(|start| now.saturating_duration_since(start))
    }
}
