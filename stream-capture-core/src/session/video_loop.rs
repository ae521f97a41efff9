use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use super::shared::SessionShared;
use crate::models::config::{NoSignalPolicy, RecordingConfig, SourceSettings};
use crate::models::error::CaptureError;
use crate::models::event::SessionEvent;
use crate::models::frame::RawVideoFrame;
use crate::models::state::SessionState;
use crate::processing::pixel_convert::{even_dimension, to_preview};
use crate::timing::frame_rate::FrameRate;
use crate::timing::pts::PtsEstimator;
use crate::traits::video_source::{CaptureOutcome, VideoReceiver};
use crate::writer::muxing_writer::MuxingWriter;

const NO_SIGNAL: &str = "No signal";

/// What one iteration of the video loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStep {
    /// A frame was received (and written unless paused).
    Frame,
    /// The poll timed out.
    Timeout,
    /// Paused; the source was not polled.
    Paused,
    /// The running flag is clear or the loop hit a fatal error.
    Stopped,
}

/// Polls the video source, stamps frames and drives the writer.
///
/// ```text
/// [VideoReceiver] → preview throttle → PtsEstimator → [MuxingWriter] → rollover?
/// ```
pub struct VideoCaptureLoop {
    shared: Arc<SessionShared>,
    receiver: Box<dyn VideoReceiver>,
    writer: Arc<MuxingWriter>,
    settings: SourceSettings,
    estimator: Option<PtsEstimator>,
    last_preview: Option<Instant>,
    last_frame: Option<Instant>,
    timeout_streak: u32,
}

impl VideoCaptureLoop {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        receiver: Box<dyn VideoReceiver>,
        writer: Arc<MuxingWriter>,
        settings: SourceSettings,
    ) -> Self {
        Self {
            shared,
            receiver,
            writer,
            settings,
            estimator: None,
            last_preview: None,
            last_frame: None,
            timeout_streak: 0,
        }
    }

    /// Run until the running flag clears. Returns the receiver so the
    /// caller releases the connection only after the thread has exited.
    pub fn run(mut self) -> Box<dyn VideoReceiver> {
        log::info!("[slot {}] Video loop started for {}", self.shared.slot, self.settings.source_name);
        loop {
            match self.step() {
                VideoStep::Stopped => break,
                VideoStep::Paused => thread::sleep(self.shared.options.paused_sleep),
                VideoStep::Frame | VideoStep::Timeout => {}
            }
        }
        log::info!("[slot {}] Video loop exited", self.shared.slot);
        self.receiver
    }

    /// One bounded iteration.
    pub fn step(&mut self) -> VideoStep {
        if !self.shared.is_running() {
            return VideoStep::Stopped;
        }
        if self.shared.is_paused() {
            return VideoStep::Paused;
        }

        match self.receiver.capture(self.shared.options.poll_timeout) {
            CaptureOutcome::Frame(frame) => {
                if self.on_frame(frame) {
                    VideoStep::Frame
                } else {
                    VideoStep::Stopped
                }
            }
            CaptureOutcome::Timeout => {
                if self.on_timeout() {
                    VideoStep::Timeout
                } else {
                    VideoStep::Stopped
                }
            }
            CaptureOutcome::Disconnected(reason) => {
                self.shared.fail(CaptureError::Connection(format!(
                    "{} disconnected: {}",
                    self.settings.source_name, reason
                )));
                VideoStep::Stopped
            }
        }
    }

    /// Returns false when the frame ended the session.
    fn on_frame(&mut self, frame: RawVideoFrame) -> bool {
        let now = self.shared.clock.now();
        self.last_frame = Some(now);
        if self.timeout_streak >= self.shared.options.no_signal_threshold {
            log::info!("[slot {}] Signal restored", self.shared.slot);
            let state = self.shared.state();
            self.shared.set_status(state.clone(), state.label());
        }
        self.timeout_streak = 0;

        self.publish_preview(&frame, now);

        if !self.shared.recording_started.swap(true, Ordering::SeqCst) {
            self.shared.timing.lock().start(now);
            self.shared.set_state(SessionState::Recording);
        }

        // Paused between the flag check and the poll returning.
        if self.shared.is_paused() {
            return true;
        }

        if !self.writer.is_open() {
            if let Err(e) = self.open_writer(&frame) {
                self.shared.fail(e);
                return false;
            }
        }

        let Some(estimator) = self.estimator.as_mut() else {
            return true;
        };
        let pts = estimator.next_pts(frame.timestamp, self.shared.paused_total());
        // Per-frame failures are counted and logged by the writer.
        let _ = self.writer.write_video_frame(&frame, pts, estimator.time_base());

        if self.writer.needs_rollover() {
            match self.writer.rollover() {
                Ok(path) => {
                    estimator.reset_segment();
                    self.shared.publish(SessionEvent::SegmentRolledOver {
                        slot: self.shared.slot,
                        index: self.writer.segment_index(),
                        path,
                    });
                }
                Err(e) => {
                    self.shared.fail(e);
                    return false;
                }
            }
        }
        true
    }

    fn publish_preview(&mut self, frame: &RawVideoFrame, now: Instant) {
        let due = match self.last_preview {
            Some(last) => now.saturating_duration_since(last) >= self.shared.options.preview_interval,
            None => true,
        };
        if !due {
            return;
        }
        let Some(image) = to_preview(frame) else {
            return;
        };
        self.last_preview = Some(now);
        let image = Arc::new(image);
        *self.shared.preview.lock() = Some(Arc::clone(&image));
        self.shared.publish(SessionEvent::PreviewUpdated {
            slot: self.shared.slot,
            image,
        });
    }

    fn open_writer(&mut self, frame: &RawVideoFrame) -> Result<(), CaptureError> {
        let decision = FrameRate::from_source(frame.frame_rate, self.shared.options.default_frame_rate);
        let mut config = RecordingConfig::from_settings(
            &self.settings,
            even_dimension(frame.width),
            even_dimension(frame.height),
            decision.rate,
        );
        config.encoder = self.shared.options.encoder.clone();
        config.write_metadata = self.shared.options.write_metadata;

        let path = self.writer.start(config).map_err(|e| match e {
            CaptureError::WriterOpen(_) => e,
            other => CaptureError::WriterOpen(other.to_string()),
        })?;
        log::info!(
            "[slot {}] Recording {}x{} @ {:.2} fps to {}",
            self.shared.slot,
            frame.width,
            frame.height,
            decision.rate.fps(),
            path.display()
        );
        self.estimator = Some(PtsEstimator::new(decision.rate, self.shared.options.unit_detection));
        self.shared.publish(SessionEvent::RecordingStarted {
            slot: self.shared.slot,
            path,
        });
        Ok(())
    }

    /// Returns false when the no-signal policy ended the session.
    fn on_timeout(&mut self) -> bool {
        self.timeout_streak = self.timeout_streak.saturating_add(1);
        let threshold = self.shared.options.no_signal_threshold;

        // Silence after the first frame is left to the no-signal policy.
        if self.timeout_streak == threshold && !self.shared.is_recording_started() {
            log::warn!(
                "[slot {}] No frames from {} after {} polls",
                self.shared.slot,
                self.settings.source_name,
                threshold
            );
            let state = self.shared.state();
            self.shared.set_status(state, NO_SIGNAL);
        }

        if let (NoSignalPolicy::AbortAfter(limit), Some(last)) = (self.shared.options.no_signal_policy, self.last_frame) {
            let silent_for = self.shared.clock.now().saturating_duration_since(last);
            if silent_for >= limit {
                self.shared.fail(CaptureError::Connection(format!(
                    "no frames from {} for {:.1} s",
                    self.settings.source_name,
                    silent_for.as_secs_f64()
                )));
                return false;
            }
        }
        true
    }
}
