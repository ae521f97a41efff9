use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;

use super::naming::segment_file_name;
use crate::models::config::RecordingConfig;
use crate::models::error::CaptureError;
use crate::models::frame::{AudioFrame, RawVideoFrame};
use crate::models::recording_result::{RecordingMetadata, SegmentInfo};
use crate::processing::pixel_convert::to_yuv420;
use crate::storage::checksum::sha256_file;
use crate::storage::metadata::write_metadata;
use crate::timing::clock::Clock;
use crate::timing::rational::{rescale, Rational, MICROSECONDS};
use crate::timing::recording_clock::RecordingClock;
use crate::traits::media_sink::{MediaSink, SegmentLayout};

/// Encodes and muxes one recording into one or more segment files.
///
/// All operations take `&self` and serialize on an internal lock, so the
/// video and audio loops can share one writer. `rollover` and `stop` hold the
/// lock for the whole close-then-open sequence; no frame can interleave with
/// a context swap.
pub struct MuxingWriter {
    inner: Mutex<WriterInner>,
    clock: Arc<dyn Clock>,
    recording_clock: Option<Arc<Mutex<RecordingClock>>>,
    source_name: String,
}

struct WriterInner {
    sink: Box<dyn MediaSink>,
    config: Option<RecordingConfig>,
    recording_id: String,
    segment_index: u32,
    segment: Option<OpenSegment>,
    closed: Vec<SegmentInfo>,
    encode_failures: u64,
}

struct OpenSegment {
    index: u32,
    path: PathBuf,
    started_at: DateTime<Utc>,
    opened_at: Instant,
    /// Audio PTS that maps to zero in this segment.
    audio_origin: Option<i64>,
    last_video_pts: Option<i64>,
    audio_end: i64,
}

impl MuxingWriter {
    pub fn new(sink: Box<dyn MediaSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(WriterInner {
                sink,
                config: None,
                recording_id: String::new(),
                segment_index: 0,
                segment: None,
                closed: Vec::new(),
                encode_failures: 0,
            }),
            clock,
            recording_clock: None,
            source_name: String::new(),
        }
    }

    /// Rebase each segment's audio against the session's pause-aware
    /// recording time at the moment the segment opens.
    pub fn with_recording_clock(mut self, recording_clock: Arc<Mutex<RecordingClock>>) -> Self {
        self.recording_clock = Some(recording_clock);
        self
    }

    /// Source name recorded in metadata sidecars.
    pub fn with_source_name(mut self, name: &str) -> Self {
        self.source_name = name.to_string();
        self
    }

    /// Open the first segment of a new recording.
    ///
    /// Creates the output folder, names the file and opens the sink. On
    /// failure nothing is left open.
    pub fn start(&self, config: RecordingConfig) -> Result<PathBuf, CaptureError> {
        config.validate()?;
        let mut inner = self.inner.lock();
        if inner.segment.is_some() {
            log::warn!("Writer restarted while a segment was open; closing it first");
            self.close_segment(&mut inner);
        }

        fs::create_dir_all(&config.output_folder).map_err(|e| {
            CaptureError::WriterOpen(format!(
                "failed to create output folder {}: {}",
                config.output_folder.display(),
                e
            ))
        })?;

        inner.recording_id = uuid::Uuid::new_v4().to_string();
        inner.segment_index = 1;
        inner.closed.clear();
        inner.encode_failures = 0;
        inner.config = Some(config);
        self.open_segment(&mut inner)
    }

    /// Convert, rescale and submit one video frame.
    ///
    /// `pts` is expressed in `time_base` and rescaled into the codec time
    /// base (one unit per frame).
    pub fn write_video_frame(&self, frame: &RawVideoFrame, pts: i64, time_base: Rational) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let (Some(config), Some(segment)) = (inner.config.as_ref(), inner.segment.as_mut()) else {
            return Err(CaptureError::WriterEncode("no segment is open".into()));
        };

        let codec_pts = rescale(pts, time_base, config.frame_rate.time_base());
        let result = to_yuv420(frame, config.width, config.height)
            .and_then(|yuv| inner.sink.write_video(&yuv, codec_pts));
        match result {
            Ok(()) => {
                segment.last_video_pts = Some(segment.last_video_pts.map_or(codec_pts, |p| p.max(codec_pts)));
                Ok(())
            }
            Err(e) => Err(Self::note_failure(&mut inner.encode_failures, e)),
        }
    }

    /// Submit planar audio. `pts` counts samples on the recording timeline
    /// and is rebased to the current segment. Ignored for video-only
    /// recordings.
    pub fn write_audio_frame(&self, frame: &AudioFrame, pts: i64) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let (Some(config), Some(segment)) = (inner.config.as_ref(), inner.segment.as_mut()) else {
            return Err(CaptureError::WriterEncode("no segment is open".into()));
        };
        let Some(layout) = config.audio else {
            return Ok(());
        };
        if frame.channels() != layout.channels as usize || frame.sample_rate != layout.sample_rate {
            let e = CaptureError::WriterEncode(format!(
                "audio frame {} Hz x{} does not match {} Hz x{}",
                frame.sample_rate,
                frame.channels(),
                layout.sample_rate,
                layout.channels
            ));
            return Err(Self::note_failure(&mut inner.encode_failures, e));
        }

        let origin = *segment.audio_origin.get_or_insert(pts);
        let segment_pts = pts - origin;
        match inner.sink.write_audio(frame, segment_pts) {
            Ok(()) => {
                segment.audio_end = segment.audio_end.max(segment_pts + frame.frames() as i64);
                Ok(())
            }
            Err(e) => Err(Self::note_failure(&mut inner.encode_failures, e)),
        }
    }

    /// Whether segmentation is on and the current segment has run its length.
    pub fn needs_rollover(&self) -> bool {
        let inner = self.inner.lock();
        let (Some(config), Some(segment)) = (inner.config.as_ref(), inner.segment.as_ref()) else {
            return false;
        };
        match config.segment_duration() {
            Some(length) => self.clock.now().saturating_duration_since(segment.opened_at) >= length,
            None => false,
        }
    }

    /// Close the current segment and open the next one.
    pub fn rollover(&self) -> Result<PathBuf, CaptureError> {
        let mut inner = self.inner.lock();
        if inner.config.is_none() {
            return Err(CaptureError::WriterEncode("rollover without an active recording".into()));
        }
        self.close_segment(&mut inner);
        inner.segment_index += 1;
        self.open_segment(&mut inner)
    }

    /// Close the current segment and return every segment of the recording.
    /// Safe to call when nothing is open.
    pub fn stop(&self) -> Vec<SegmentInfo> {
        let mut inner = self.inner.lock();
        self.close_segment(&mut inner);
        if inner.encode_failures > 0 {
            log::warn!("Recording finished with {} failed frame writes", inner.encode_failures);
        }
        inner.config = None;
        std::mem::take(&mut inner.closed)
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().segment.is_some()
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.inner.lock().segment.as_ref().map(|s| s.path.clone())
    }

    /// 1-based index of the open segment, 0 when idle.
    pub fn segment_index(&self) -> u32 {
        let inner = self.inner.lock();
        inner.segment.as_ref().map_or(0, |s| s.index)
    }

    pub fn encode_failures(&self) -> u64 {
        self.inner.lock().encode_failures
    }

    fn note_failure(count: &mut u64, error: CaptureError) -> CaptureError {
        *count += 1;
        if *count == 1 || *count % 100 == 0 {
            log::warn!("Frame write failed ({} so far): {}", count, error);
        }
        error
    }

    fn open_segment(&self, inner: &mut WriterInner) -> Result<PathBuf, CaptureError> {
        let Some(config) = inner.config.as_ref() else {
            return Err(CaptureError::WriterOpen("no recording configured".into()));
        };
        let part = config.segmented.then_some(inner.segment_index);
        let path = segment_file_name(
            &config.output_folder,
            &config.label,
            Local::now(),
            part,
            config.encoder.container.extension(),
        );
        let layout = SegmentLayout {
            width: config.width,
            height: config.height,
            frame_rate: config.frame_rate,
            audio: config.audio,
            encoder: config.encoder.clone(),
        };

        if let Err(e) = inner.sink.open(&path, &layout) {
            log::error!("Failed to open segment {}: {}", path.display(), e);
            if inner.sink.is_open() {
                let _ = inner.sink.finish();
            }
            inner.config = None;
            return Err(match e {
                CaptureError::WriterOpen(_) => e,
                other => CaptureError::WriterOpen(other.to_string()),
            });
        }

        let audio_origin = match (&self.recording_clock, config.audio) {
            (Some(clock), Some(layout)) => {
                let elapsed = clock.lock().elapsed(self.clock.now());
                Some(rescale(
                    elapsed.as_micros() as i64,
                    MICROSECONDS,
                    Rational::new(1, layout.sample_rate as i64),
                ))
            }
            _ => None,
        };

        log::info!("Opened segment {} at {}", inner.segment_index, path.display());
        inner.segment = Some(OpenSegment {
            index: inner.segment_index,
            path: path.clone(),
            started_at: Utc::now(),
            opened_at: self.clock.now(),
            audio_origin,
            last_video_pts: None,
            audio_end: 0,
        });
        Ok(path)
    }

    fn close_segment(&self, inner: &mut WriterInner) {
        let Some(segment) = inner.segment.take() else {
            return;
        };
        if let Err(e) = inner.sink.finish() {
            log::error!("Failed to finalize {}: {}", segment.path.display(), e);
        }

        let duration_secs = match inner.config.as_ref() {
            Some(config) => {
                let video = segment
                    .last_video_pts
                    .map(|pts| Duration::from_secs_f64((pts + 1) as f64 / config.frame_rate.fps()));
                let audio = config
                    .audio
                    .filter(|_| segment.audio_end > 0)
                    .map(|a| Duration::from_secs_f64(segment.audio_end as f64 / a.sample_rate as f64));
                video.or(audio).unwrap_or_default().as_secs_f64()
            }
            None => 0.0,
        };
        let bytes = fs::metadata(&segment.path).map(|m| m.len()).unwrap_or(0);
        let checksum = match sha256_file(&segment.path) {
            Ok(sum) => sum,
            Err(e) => {
                log::warn!("{}", e);
                String::new()
            }
        };

        let info = SegmentInfo {
            index: segment.index,
            path: segment.path,
            started_at: segment.started_at,
            duration_secs,
            bytes,
            checksum,
        };

        if let Some(config) = inner.config.as_ref().filter(|c| c.write_metadata) {
            let metadata = RecordingMetadata::for_segment(&inner.recording_id, &self.source_name, config, &info);
            if let Err(e) = write_metadata(&metadata, &info.path) {
                log::warn!("Failed to write metadata for {}: {}", info.path.display(), e);
            }
        }

        log::info!(
            "Closed segment {} ({:.1}s, {} bytes): {}",
            info.index,
            info.duration_secs,
            info.bytes,
            info.path.display()
        );
        inner.closed.push(info);
    }
}
