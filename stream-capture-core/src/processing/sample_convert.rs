use crate::models::frame::{AudioBuffer, AudioFrame, AudioLayout, InterleavedSamples};

/// Pure-math conversion of device buffers into the writer's planar layout.
///
/// Pipeline: i16/f32 interleaved → f32 → channel remap → linear resample →
/// planar. Works on plain slices with no platform dependencies. One converter
/// serves one continuous device stream.
#[derive(Debug, Clone)]
pub struct SampleConverter {
    pub target: AudioLayout,
    resampler: Resampler,
}

impl SampleConverter {
    pub fn new(target: AudioLayout) -> Self {
        Self {
            target,
            resampler: Resampler::default(),
        }
    }

    /// Convert the next device buffer into a planar frame at the target layout.
    pub fn convert(&mut self, buffer: &AudioBuffer) -> AudioFrame {
        let target_channels = self.target.channels as usize;
        if buffer.channels == 0 || buffer.samples.is_empty() {
            return AudioFrame::silence(self.target.sample_rate, target_channels, 0);
        }
        let samples = to_f32(&buffer.samples);
        let remapped = remap_channels(&samples, buffer.channels as usize, target_channels);
        let resampled = self
            .resampler
            .process(&remapped, target_channels, buffer.sample_rate, self.target.sample_rate);
        AudioFrame {
            sample_rate: self.target.sample_rate,
            planes: deinterleave(&resampled, target_channels),
        }
    }
}

/// Convert device samples to f32 in `[-1.0, 1.0]`.
pub fn to_f32(samples: &InterleavedSamples) -> Vec<f32> {
    match samples {
        InterleavedSamples::F32(s) => s.clone(),
        InterleavedSamples::I16(s) => s.iter().map(|&v| v as f32 / 32768.0).collect(),
    }
}

/// Remap interleaved audio between channel counts.
///
/// Downmix to mono averages every channel; other reductions keep the leading
/// channels. Mono upmix duplicates; other expansions pad with silence.
pub fn remap_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / from;
    let mut output = Vec::with_capacity(frame_count * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else if from == 1 {
            output.extend(std::iter::repeat(frame[0]).take(to));
        } else {
            for ch in 0..to {
                output.push(if ch < from { frame[ch] } else { 0.0 });
            }
        }
    }
    output
}

/// Streaming linear-interpolation resampler for interleaved audio.
///
/// The read position and the last input frame carry over between buffers, so
/// the output length tracks the true rate ratio over any run of buffers.
#[derive(Debug, Clone, Default)]
pub struct Resampler {
    /// Source position of the next output frame, in units of
    /// 1 / target_rate source frames. Negative values lie between the carried
    /// frame and the start of the next buffer.
    position: i64,
    carry: Vec<f32>,
    rates: (u32, u32),
}

impl Resampler {
    pub fn reset(&mut self) {
        self.position = 0;
        self.carry.clear();
    }

    /// Resample one buffer. Matching rates pass through unchanged.
    pub fn process(&mut self, samples: &[f32], channels: usize, source_rate: u32, target_rate: u32) -> Vec<f32> {
        if channels == 0 || samples.len() < channels || source_rate == 0 || target_rate == 0 {
            return samples.to_vec();
        }
        if (source_rate, target_rate) != self.rates || (!self.carry.is_empty() && self.carry.len() != channels) {
            self.reset();
            self.rates = (source_rate, target_rate);
        }
        if source_rate == target_rate {
            return samples.to_vec();
        }

        let frame_count = (samples.len() / channels) as i64;
        let (step, unit) = (source_rate as i64, target_rate as i64);
        let last = (frame_count - 1) * unit;
        let mut output = Vec::with_capacity(((frame_count * unit) / step + 1) as usize * channels);

        while self.position <= last {
            let index = self.position.div_euclid(unit);
            let weight = self.position.rem_euclid(unit);
            let a = frame_at(samples, &self.carry, channels, index);
            if weight == 0 {
                output.extend_from_slice(a);
            } else {
                let b = frame_at(samples, &self.carry, channels, index + 1);
                let fraction = weight as f32 / unit as f32;
                output.extend(a.iter().zip(b).map(|(&a, &b)| a * (1.0 - fraction) + b * fraction));
            }
            self.position += step;
        }

        self.position -= frame_count * unit;
        let tail = (frame_count as usize - 1) * channels;
        self.carry.clear();
        self.carry.extend_from_slice(&samples[tail..tail + channels]);
        output
    }
}

/// Frame `index` of `samples`, where -1 is the frame carried from the
/// previous buffer.
fn frame_at<'a>(samples: &'a [f32], carry: &'a [f32], channels: usize, index: i64) -> &'a [f32] {
    if index < 0 {
        carry
    } else {
        let start = index as usize * channels;
        &samples[start..start + channels]
    }
}

/// Split `[L0, R0, L1, R1, ...]` into one plane per channel.
pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }
    let frame_count = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frame_count); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }
    planes
}

/// Pack planar audio as interleaved little-endian f32 bytes.
pub fn interleave_f32le(frame: &AudioFrame) -> Vec<u8> {
    let frames = frame.frames();
    let mut data = Vec::with_capacity(frames * frame.channels() * 4);
    for i in 0..frames {
        for plane in &frame.planes {
            let sample = plane.get(i).copied().unwrap_or(0.0);
            data.extend_from_slice(&sample.to_le_bytes());
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn i16_scales_to_unit_range() {
        let out = to_f32(&InterleavedSamples::I16(vec![0, 16384, -32768]));
        assert_eq!(out, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn stereo_downmix_averages() {
        let out = remap_channels(&[0.2, 0.4, 1.0, 0.0], 2, 1);
        assert_relative_eq!(out[0], 0.3, epsilon = 1e-6);
        assert_relative_eq!(out[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn mono_upmix_duplicates() {
        assert_eq!(remap_channels(&[0.1, 0.2], 1, 2), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn surround_keeps_front_pair() {
        let six = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(remap_channels(&six, 6, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn resample_same_rate_is_passthrough() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(Resampler::default().process(&samples, 2, 48000, 48000), samples);
    }

    #[test]
    fn resample_upsample_2x_interpolates_across_buffers() {
        let mut resampler = Resampler::default();
        let first = resampler.process(&[0.0, 1.0], 1, 24000, 48000);
        assert_eq!(first, vec![0.0, 0.5, 1.0]);
        // The midpoint between buffers comes out at the start of the next one.
        let second = resampler.process(&[2.0, 3.0], 1, 24000, 48000);
        assert_eq!(second.len(), 4);
        assert_relative_eq!(second[0], 1.5, epsilon = 1e-6);
        assert_relative_eq!(second[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn resample_441_to_48k_frame_count() {
        let mut resampler = Resampler::default();
        let samples = vec![0.0f32; 441 * 2];
        let total: usize = (0..100).map(|_| resampler.process(&samples, 2, 44100, 48000).len()).sum();
        // The final output frame falls after the last input frame and waits
        // for the next buffer.
        assert!((47_999..=48_000).contains(&(total / 2)));
    }

    #[test]
    fn odd_sized_buffers_do_not_drift() {
        // 5880 buffers of 448 frames at 44.1 kHz is 59.733 s, or 2_867_200
        // frames at 48 kHz.
        let mut converter = SampleConverter::new(AudioLayout::default());
        let buffer = AudioBuffer {
            sample_rate: 44_100,
            channels: 2,
            samples: InterleavedSamples::F32(vec![0.25; 448 * 2]),
        };
        let total: i64 = (0..5880).map(|_| converter.convert(&buffer).frames() as i64).sum();
        assert!((total - 2_867_200).abs() <= 1, "converted {} frames", total);
    }

    #[test]
    fn rate_change_restarts_the_stream() {
        let mut resampler = Resampler::default();
        resampler.process(&[0.0; 441], 1, 44100, 48000);
        let out = resampler.process(&[1.0; 480], 1, 96000, 48000);
        assert_eq!(out.len(), 240);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn deinterleave_splits_planes() {
        let planes = deinterleave(&[1.0, 4.0, 2.0, 5.0, 3.0, 6.0], 2);
        assert_eq!(planes, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn convert_full_pipeline() {
        let mut converter = SampleConverter::new(AudioLayout::default());
        let buffer = AudioBuffer {
            sample_rate: 48000,
            channels: 1,
            samples: InterleavedSamples::I16(vec![16384; 480]),
        };
        let frame = converter.convert(&buffer);
        assert_eq!(frame.channels(), 2);
        assert_eq!(frame.frames(), 480);
        assert_relative_eq!(frame.planes[1][100], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn interleave_packs_little_endian() {
        let frame = AudioFrame {
            sample_rate: 48000,
            planes: vec![vec![1.0], vec![-1.0]],
        };
        let bytes = interleave_f32le(&frame);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-1.0f32).to_le_bytes());
    }
}
