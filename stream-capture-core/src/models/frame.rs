use serde::{Deserialize, Serialize};

/// Pixel layouts a video source may deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba,
    Rgbx,
    Bgra,
    Bgrx,
    /// Packed 4:2:2, byte order U Y0 V Y1.
    Uyvy,
}

impl PixelFormat {
    /// Bytes in one tightly packed row. UYVY rows always hold whole pixel
    /// pairs, so an odd width rounds up.
    pub fn row_bytes(self, width: u32) -> usize {
        let width = width as usize;
        match self {
            Self::Rgba | Self::Rgbx | Self::Bgra | Self::Bgrx => width * 4,
            Self::Uyvy => width.div_ceil(2) * 4,
        }
    }
}

/// A video frame as delivered by the acquisition API.
///
/// Owned for exactly one loop iteration: moved into the writer and dropped
/// after conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVideoFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, at least `format.row_bytes(width)`.
    pub stride: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    /// Source-reported frame rate as `(numerator, denominator)`.
    pub frame_rate: Option<(u32, u32)>,
    /// Source timestamp, nominally in 100ns ticks.
    pub timestamp: Option<i64>,
}

impl RawVideoFrame {
    /// A tightly packed frame (stride == one packed row).
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: format.row_bytes(width),
            format,
            data,
            frame_rate: None,
            timestamp: None,
        }
    }

    pub fn with_frame_rate(mut self, num: u32, den: u32) -> Self {
        self.frame_rate = Some((num, den));
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether `data` holds at least `height` rows of `stride` bytes.
    pub fn is_complete(&self) -> bool {
        let row = self.format.row_bytes(self.width);
        self.stride >= row && self.data.len() >= self.stride * self.height as usize
    }
}

/// A planar YUV 4:2:0 frame, the encoder's input layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Yuv420Frame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl Yuv420Frame {
    /// Total payload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.y.len() + self.u.len() + self.v.len()
    }
}

/// Latest preview snapshot published to the UI layer, always RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Sample encodings delivered by audio clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    F32,
    I16,
}

/// Native format of an audio capture client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

/// Interleaved samples `[L0, R0, L1, R1, ...]` straight from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum InterleavedSamples {
    F32(Vec<f32>),
    I16(Vec<i16>),
}

impl InterleavedSamples {
    pub fn len(&self) -> usize {
        match self {
            Self::F32(s) => s.len(),
            Self::I16(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One buffer pulled from an audio capture client.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: InterleavedSamples,
}

impl AudioBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// Output audio layout of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioLayout {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioLayout {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Planar f32 audio, one `Vec` per channel, the encoder's input layout.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub planes: Vec<Vec<f32>>,
}

impl AudioFrame {
    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    pub fn frames(&self) -> usize {
        self.planes.first().map(Vec::len).unwrap_or(0)
    }

    pub fn silence(sample_rate: u32, channels: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            planes: vec![vec![0.0; frames]; channels],
        }
    }
}
