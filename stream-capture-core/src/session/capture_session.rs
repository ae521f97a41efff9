use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::audio_loop::AudioCaptureLoop;
use super::directory::DeviceDirectory;
use super::events::EventBus;
use super::shared::SessionShared;
use super::video_loop::VideoCaptureLoop;
use crate::models::config::{SessionOptions, SourceSettings};
use crate::models::error::CaptureError;
use crate::models::event::SessionEvent;
use crate::models::frame::{AudioLayout, PreviewImage};
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;
use crate::storage::remux::spawn_remux;
use crate::timing::clock::{Clock, SystemClock};
use crate::traits::media_sink::{MediaSink, SinkFactory};
use crate::traits::video_source::VideoReceiver;
use crate::writer::ffmpeg_sink::FfmpegSink;
use crate::writer::muxing_writer::MuxingWriter;

/// Per-source capture orchestrator.
///
/// Owns a settings snapshot, the state machine, the capture threads and the
/// writer of the current recording:
/// ```text
/// [VideoReceiver] → VideoCaptureLoop ─┐
///                                     ├→ [MuxingWriter] → [MediaSink] → segment files
/// [AudioCapture]  → AudioCaptureLoop ─┘
/// ```
/// `start` and `stop` are idempotent and may be repeated on one instance.
pub struct CaptureSession {
    shared: Arc<SessionShared>,
    directory: Arc<DeviceDirectory>,
    settings: SourceSettings,
    sink_factory: SinkFactory,
    writer: Option<Arc<MuxingWriter>>,
    video_handle: Option<JoinHandle<Option<Box<dyn VideoReceiver>>>>,
    audio_handle: Option<JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(slot: usize, directory: Arc<DeviceDirectory>, events: Arc<EventBus>) -> Self {
        let sink_factory: SinkFactory = Arc::new(|| Box::new(FfmpegSink::new()) as Box<dyn MediaSink>);
        Self {
            shared: Arc::new(SessionShared::new(
                slot,
                SessionOptions::default(),
                Arc::new(SystemClock),
                events,
            )),
            directory,
            settings: SourceSettings::default(),
            sink_factory,
            writer: None,
            video_handle: None,
            audio_handle: None,
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.rebuild_shared(options, Arc::clone(&self.shared.clock));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.rebuild_shared(self.shared.options.clone(), clock);
        self
    }

    /// Replace the encoder backend created for each recording.
    pub fn with_sink_factory(mut self, factory: SinkFactory) -> Self {
        self.sink_factory = factory;
        self
    }

    fn rebuild_shared(&mut self, options: SessionOptions, clock: Arc<dyn Clock>) {
        let events = Arc::clone(&self.shared.events);
        self.shared = Arc::new(SessionShared::new(self.shared.slot, options, clock, events));
    }

    /// Replace the settings snapshot. Rejected while a recording runs.
    pub fn apply_settings(&mut self, settings: SourceSettings) -> Result<(), CaptureError> {
        if self.shared.is_running() {
            return Err(CaptureError::Configuration(
                "settings cannot change while the session is running".into(),
            ));
        }
        self.settings = settings;
        Ok(())
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    pub fn slot(&self) -> usize {
        self.shared.slot
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Last status text, e.g. "Recording" or "No signal".
    pub fn status(&self) -> String {
        self.shared.status()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn is_recording_started(&self) -> bool {
        self.shared.is_recording_started()
    }

    /// Latest preview snapshot.
    pub fn preview(&self) -> Option<Arc<PreviewImage>> {
        self.shared.preview.lock().clone()
    }

    /// Path of the segment currently being written.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.writer.as_ref().and_then(|w| w.current_path())
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.shared.elapsed_ms()
    }

    /// Begin capturing. A no-op when already running.
    ///
    /// Fails without spawning anything if the settings are incomplete or the
    /// source is not currently enumerated.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.shared.is_running() {
            return Ok(());
        }
        // A previous run that ended in Error still holds its threads and writer.
        if let Some(result) = self.teardown() {
            log::info!(
                "[slot {}] Finalized previous recording ({} segments)",
                self.shared.slot,
                result.segments.len()
            );
            self.shared.publish(SessionEvent::RecordingStopped {
                slot: self.shared.slot,
                result: Some(result),
            });
        }

        if let Err(e) = self.settings.validate() {
            log::warn!("[slot {}] Not starting: {}", self.shared.slot, e);
            return Err(e);
        }
        let source = self.settings.source_name.clone();
        if !self.directory.has_video_source(&source) {
            let e = CaptureError::SourceUnavailable(source);
            log::warn!("[slot {}] Not starting: {}", self.shared.slot, e);
            return Err(e);
        }

        self.shared.reset();
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(SessionState::Connecting);

        let writer = Arc::new(
            MuxingWriter::new((self.sink_factory)(), Arc::clone(&self.shared.clock))
                .with_recording_clock(Arc::clone(&self.shared.timing))
                .with_source_name(&source),
        );
        self.writer = Some(Arc::clone(&writer));

        if let Err(e) = self.spawn_video(Arc::clone(&writer)) {
            self.shared.fail(e.clone());
            return Err(e);
        }
        if let Some(device) = self.settings.audio_device.clone() {
            if let Err(e) = self.spawn_audio(device, writer) {
                // Video keeps running without audio.
                self.shared.report(e);
            }
        }
        log::info!("[slot {}] Session started for {}", self.shared.slot, source);
        Ok(())
    }

    fn spawn_video(&mut self, writer: Arc<MuxingWriter>) -> Result<(), CaptureError> {
        let shared = Arc::clone(&self.shared);
        let directory = Arc::clone(&self.directory);
        let settings = self.settings.clone();
        let handle = thread::Builder::new()
            .name(format!("video-capture-{}", self.shared.slot))
            .spawn(move || match directory.connect_video(&settings.source_name) {
                Ok(receiver) => Some(VideoCaptureLoop::new(shared, receiver, writer, settings).run()),
                Err(e) => {
                    shared.fail(match e {
                        CaptureError::Connection(_) => e,
                        other => CaptureError::Connection(other.to_string()),
                    });
                    None
                }
            })
            .map_err(|e| CaptureError::Connection(format!("failed to spawn video thread: {}", e)))?;
        self.video_handle = Some(handle);
        Ok(())
    }

    fn spawn_audio(&mut self, device: String, writer: Arc<MuxingWriter>) -> Result<(), CaptureError> {
        let shared = Arc::clone(&self.shared);
        let directory = Arc::clone(&self.directory);
        let handle = thread::Builder::new()
            .name(format!("audio-capture-{}", self.shared.slot))
            .spawn(move || AudioCaptureLoop::run_device(shared, directory, device, writer, AudioLayout::default()))
            .map_err(|e| CaptureError::Device(format!("failed to spawn audio thread: {}", e)))?;
        self.audio_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing, finalize the output and return what was recorded.
    ///
    /// Idempotent: on an idle session this returns None without any state
    /// change or event.
    pub fn stop(&mut self) -> Option<RecordingResult> {
        let active = self.shared.is_running() || self.writer.is_some() || self.video_handle.is_some();
        if !active {
            return None;
        }
        let result = self.teardown();
        self.shared.reset();
        self.shared.set_state(SessionState::Idle);

        if let (Some(remux), Some(result)) = (self.shared.options.remux.clone(), result.as_ref()) {
            let paths = result.segments.iter().map(|s| s.path.clone()).collect();
            spawn_remux(remux, self.shared.options.encoder.clone(), paths);
        }
        log::info!("[slot {}] Session stopped", self.shared.slot);
        self.shared.publish(SessionEvent::RecordingStopped {
            slot: self.shared.slot,
            result: result.clone(),
        });
        result
    }

    /// Clear the running flag, join both threads, release the connection
    /// and close the writer.
    fn teardown(&mut self) -> Option<RecordingResult> {
        self.shared.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.video_handle.take() {
            match handle.join() {
                Ok(Some(receiver)) => {
                    drop(receiver);
                    log::debug!("[slot {}] Released video connection", self.shared.slot);
                }
                Ok(None) => {}
                Err(_) => log::error!("[slot {}] Video thread panicked", self.shared.slot),
            }
        }
        if let Some(handle) = self.audio_handle.take() {
            if handle.join().is_err() {
                log::error!("[slot {}] Audio thread panicked", self.shared.slot);
            }
        }

        let writer = self.writer.take()?;
        let segments = writer.stop();
        if segments.is_empty() {
            return None;
        }
        Some(RecordingResult::new(self.settings.effective_label(), segments))
    }

    /// Freeze the recorded timeline. A no-op before the first frame.
    pub fn pause(&self) -> bool {
        let paused = self.shared.pause();
        if paused {
            log::info!("[slot {}] Paused at {} ms", self.shared.slot, self.shared.elapsed_ms());
        }
        paused
    }

    pub fn resume(&self) -> bool {
        self.shared.resume()
    }

    /// Resume if paused, else pause.
    pub fn toggle_pause(&self) -> bool {
        if self.shared.is_paused() {
            self.resume()
        } else {
            self.pause()
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
