use std::sync::mpsc::Receiver;
use std::sync::Arc;

use super::capture_session::CaptureSession;
use super::directory::DeviceDirectory;
use super::events::EventBus;
use crate::models::config::{SessionOptions, SourceSettings};
use crate::models::error::CaptureError;
use crate::models::event::SessionEvent;
use crate::models::recording_result::RecordingResult;
use crate::timing::clock::{Clock, SystemClock};
use crate::traits::media_sink::SinkFactory;

/// A fixed-size set of capture sessions sharing one device directory and one
/// event bus. Slot numbers are the session indices.
pub struct SessionDeck {
    directory: Arc<DeviceDirectory>,
    events: Arc<EventBus>,
    options: SessionOptions,
    clock: Arc<dyn Clock>,
    sink_factory: Option<SinkFactory>,
    sessions: Vec<CaptureSession>,
}

impl SessionDeck {
    pub fn new(directory: Arc<DeviceDirectory>, options: SessionOptions) -> Self {
        Self {
            directory,
            events: Arc::new(EventBus::new(options.event_capacity)),
            options,
            clock: Arc::new(SystemClock),
            sink_factory: None,
            sessions: Vec::new(),
        }
    }

    /// Clock for sessions created after this call.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Encoder backend for sessions created after this call.
    pub fn with_sink_factory(mut self, factory: SinkFactory) -> Self {
        self.sink_factory = Some(factory);
        self
    }

    pub fn directory(&self) -> &Arc<DeviceDirectory> {
        &self.directory
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, slot: usize) -> Option<&CaptureSession> {
        self.sessions.get(slot)
    }

    pub fn session_mut(&mut self, slot: usize) -> Option<&mut CaptureSession> {
        self.sessions.get_mut(slot)
    }

    /// Grow or shrink to `count` slots. Removed sessions are stopped.
    pub fn resize(&mut self, count: usize) {
        while self.sessions.len() > count {
            if let Some(mut session) = self.sessions.pop() {
                log::info!("Removing slot {}", session.slot());
                session.stop();
            }
        }
        while self.sessions.len() < count {
            let slot = self.sessions.len();
            let mut session = CaptureSession::new(slot, Arc::clone(&self.directory), Arc::clone(&self.events))
                .with_options(self.options.clone())
                .with_clock(Arc::clone(&self.clock));
            if let Some(factory) = &self.sink_factory {
                session = session.with_sink_factory(Arc::clone(factory));
            }
            self.sessions.push(session);
        }
    }

    pub fn apply_settings(&mut self, slot: usize, settings: SourceSettings) -> Result<(), CaptureError> {
        match self.sessions.get_mut(slot) {
            Some(session) => session.apply_settings(settings),
            None => Err(CaptureError::Configuration(format!("no slot {}", slot))),
        }
    }

    /// Start every slot. Returns the slots that refused to start.
    pub fn start_all(&mut self) -> Vec<(usize, CaptureError)> {
        let mut failures = Vec::new();
        for session in &mut self.sessions {
            if let Err(e) = session.start() {
                failures.push((session.slot(), e));
            }
        }
        failures
    }

    /// Stop every slot and collect the finished recordings.
    pub fn stop_all(&mut self) -> Vec<RecordingResult> {
        self.sessions.iter_mut().filter_map(|s| s.stop()).collect()
    }

    /// Resume paused slots, pause recording ones.
    pub fn toggle_pause_all(&self) {
        for session in &self.sessions {
            session.toggle_pause();
        }
    }

    /// Slots that are recording or paused.
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.state().is_active()).count()
    }
}
