use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::events::EventBus;
use crate::models::config::SessionOptions;
use crate::models::error::CaptureError;
use crate::models::event::SessionEvent;
use crate::models::frame::PreviewImage;
use crate::models::state::SessionState;
use crate::timing::clock::Clock;
use crate::timing::recording_clock::RecordingClock;

/// State shared between a session and its capture threads.
///
/// Flags are lock-free atomics. The pause-timing accumulator, the preview
/// buffer and the state/status pair each sit behind their own lock.
pub(crate) struct SessionShared {
    pub slot: usize,
    pub options: SessionOptions,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventBus>,

    pub running: AtomicBool,
    pub paused: AtomicBool,
    pub recording_started: AtomicBool,

    pub timing: Arc<Mutex<RecordingClock>>,
    pub preview: Mutex<Option<Arc<PreviewImage>>>,
    status: Mutex<(SessionState, String)>,
}

impl SessionShared {
    pub fn new(slot: usize, options: SessionOptions, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
        Self {
            slot,
            options,
            clock,
            events,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            recording_started: AtomicBool::new(false),
            timing: Arc::new(Mutex::new(RecordingClock::new())),
            preview: Mutex::new(None),
            status: Mutex::new((SessionState::Idle, SessionState::Idle.label().to_string())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_recording_started(&self) -> bool {
        self.recording_started.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.status.lock().0.clone()
    }

    pub fn status(&self) -> String {
        self.status.lock().1.clone()
    }

    /// Cumulative completed pause time.
    pub fn paused_total(&self) -> Duration {
        self.timing.lock().paused_total()
    }

    /// Pause-excluded recording time.
    pub fn recorded_elapsed(&self) -> Duration {
        self.timing.lock().elapsed(self.clock.now())
    }

    /// Pause the recorded timeline. Returns false unless a recording has
    /// begun and is not already paused.
    pub fn pause(&self) -> bool {
        if !self.is_running() || !self.is_recording_started() {
            return false;
        }
        if !self.timing.lock().pause(self.clock.now()) {
            return false;
        }
        self.paused.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Paused);
        true
    }

    /// Fold the pause into the accumulator and continue recording.
    pub fn resume(&self) -> bool {
        if !self.is_recording_started() {
            return false;
        }
        let Some(paused_for) = self.timing.lock().resume(self.clock.now()) else {
            return false;
        };
        self.paused.store(false, Ordering::SeqCst);
        log::info!("[slot {}] Resumed after {} ms", self.slot, paused_for.as_millis());
        if self.is_running() {
            self.set_state(SessionState::Recording);
        }
        true
    }

    /// Displayed recording time in milliseconds. Frozen while paused.
    pub fn elapsed_ms(&self) -> u64 {
        if !self.is_running() && !self.is_recording_started() {
            return 0;
        }
        self.recorded_elapsed().as_millis() as u64
    }

    /// Clear flags, timing and preview ahead of a new run.
    pub fn reset(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.recording_started.store(false, Ordering::SeqCst);
        self.timing.lock().reset();
        *self.preview.lock() = None;
    }

    /// Set state and status text, emitting StatusChanged when either changes.
    pub fn set_status(&self, state: SessionState, message: &str) {
        {
            let mut status = self.status.lock();
            if status.0 == state && status.1 == message {
                return;
            }
            *status = (state.clone(), message.to_string());
        }
        self.events.publish(SessionEvent::StatusChanged {
            slot: self.slot,
            state,
            message: message.to_string(),
        });
    }

    pub fn set_state(&self, state: SessionState) {
        let label = state.label();
        self.set_status(state, label);
    }

    /// Report a non-fatal error.
    pub fn report(&self, error: CaptureError) {
        log::warn!("[slot {}] {}", self.slot, error);
        self.events.publish(SessionEvent::Error {
            slot: self.slot,
            error,
        });
    }

    /// Stop the session's loops and move to `Error`.
    pub fn fail(&self, error: CaptureError) {
        log::error!("[slot {}] {}", self.slot, error);
        self.running.store(false, Ordering::SeqCst);
        let message = error.to_string();
        self.events.publish(SessionEvent::Error {
            slot: self.slot,
            error,
        });
        self.set_status(SessionState::Error(message.clone()), &message);
    }

    pub fn publish(&self, event: SessionEvent) {
        self.events.publish(event);
    }
}
