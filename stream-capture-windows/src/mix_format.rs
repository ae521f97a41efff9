//! Interpretation of a shared-mode mix format and its packet bytes.
//!
//! Kept free of Windows types so it builds and tests everywhere.

use stream_capture_core::models::error::CaptureError;
use stream_capture_core::models::frame::{AudioFormat, InterleavedSamples, SampleFormat};

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// The fields of a `WAVEFORMATEX` (and its extensible sub-format) the
/// capture path needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub block_align: u16,
    /// `Data1` of the extensible sub-format GUID; for the PCM and float
    /// sub-formats it equals the plain format tag.
    pub sub_format: Option<u32>,
}

impl MixFormat {
    pub fn sample_format(&self) -> Result<SampleFormat, CaptureError> {
        let tag = match (self.format_tag, self.sub_format) {
            (WAVE_FORMAT_EXTENSIBLE, Some(sub)) => sub as u16,
            (tag, _) => tag,
        };
        match (tag, self.bits_per_sample) {
            (WAVE_FORMAT_IEEE_FLOAT, 32) => Ok(SampleFormat::F32),
            (WAVE_FORMAT_PCM, 16) => Ok(SampleFormat::I16),
            (tag, bits) => Err(CaptureError::Device(format!(
                "unsupported mix format: tag {:#06x}, {} bits",
                tag, bits
            ))),
        }
    }

    pub fn audio_format(&self) -> Result<AudioFormat, CaptureError> {
        Ok(AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            sample_format: self.sample_format()?,
        })
    }
}

/// Decode one packet of little-endian interleaved samples. `silent` packets
/// decode to zeros of the same length.
pub fn decode_packet(format: SampleFormat, bytes: &[u8], silent: bool) -> InterleavedSamples {
    match format {
        SampleFormat::F32 => {
            let count = bytes.len() / 4;
            if silent {
                return InterleavedSamples::F32(vec![0.0; count]);
            }
            InterleavedSamples::F32(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            )
        }
        SampleFormat::I16 => {
            let count = bytes.len() / 2;
            if silent {
                return InterleavedSamples::I16(vec![0; count]);
            }
            InterleavedSamples::I16(bytes.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect())
        }
    }
}
