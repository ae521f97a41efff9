//! WASAPI shared-mode loopback client for one render endpoint.
//!
//! Captures the mix going to the endpoint using `AUDCLNT_STREAMFLAGS_LOOPBACK`
//! in the device's native mix format. No permissions are needed; DRM-protected
//! audio arrives silenced.

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::AvSetMmThreadCharacteristicsW;

use stream_capture_core::models::error::CaptureError;
use stream_capture_core::models::frame::{AudioBuffer, AudioFormat, SampleFormat};
use stream_capture_core::traits::audio_source::{AudioCapture, AudioPoll};

use crate::com::ComScope;
use crate::mix_format::{decode_packet, MixFormat, WAVE_FORMAT_EXTENSIBLE};

/// Shared-mode buffer length in 100ns units (100 ms).
const BUFFER_DURATION: i64 = 1_000_000;

/// Loopback capture of a render endpoint, identified by MMDevice id.
///
/// Nothing is opened until `start`; all COM objects are created, used and
/// released on the thread that calls `start`, `poll` and `stop`.
pub struct WasapiLoopbackCapture {
    device_id: String,
    device_name: String,
    format: Option<(MixFormat, SampleFormat)>,
    stream: Option<LoopbackStream>,
}

/// Live client objects. Field order is drop order: COM is uninitialized last.
struct LoopbackStream {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    _com: ComScope,
}

// SAFETY: COM objects exist only between start and stop, which the audio
// loop calls on its own thread together with every poll.
unsafe impl Send for WasapiLoopbackCapture {}

impl WasapiLoopbackCapture {
    pub fn new(device_id: String, device_name: String) -> Self {
        Self {
            device_id,
            device_name,
            format: None,
            stream: None,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn open(&self) -> Result<(LoopbackStream, MixFormat, SampleFormat), CaptureError> {
        let com = ComScope::enter()?;
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::Device(format!("failed to create enumerator: {}", e)))?;

            let wide: Vec<u16> = self.device_id.encode_utf16().chain(std::iter::once(0)).collect();
            let device = enumerator
                .GetDevice(PCWSTR(wide.as_ptr()))
                .map_err(|e| CaptureError::Device(format!("'{}' is no longer available: {}", self.device_name, e)))?;

            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::Device(format!("Activate failed: {}", e)))?;

            let mix_ptr = audio_client
                .GetMixFormat()
                .map_err(|e| CaptureError::Device(format!("GetMixFormat failed: {}", e)))?;
            let mix = read_mix_format(mix_ptr);

            let initialized = mix.sample_format().and_then(|sample_format| {
                audio_client
                    .Initialize(
                        AUDCLNT_SHAREMODE_SHARED,
                        AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                        BUFFER_DURATION,
                        0,
                        mix_ptr,
                        None,
                    )
                    .map(|_| sample_format)
                    .map_err(|e| CaptureError::Device(format!("IAudioClient::Initialize (loopback) failed: {}", e)))
            });
            CoTaskMemFree(Some(mix_ptr as *const _));
            let sample_format = initialized?;

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| CaptureError::Device(format!("GetService failed: {}", e)))?;

            let mut task_index: u32 = 0;
            let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
            if AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index).is_err() {
                log::debug!("MMCSS registration failed; capturing at normal priority");
            }

            audio_client
                .Start()
                .map_err(|e| CaptureError::Device(format!("IAudioClient::Start failed: {}", e)))?;

            Ok((
                LoopbackStream {
                    audio_client,
                    capture_client,
                    _com: com,
                },
                mix,
                sample_format,
            ))
        }
    }
}

impl AudioCapture for WasapiLoopbackCapture {
    fn format(&self) -> AudioFormat {
        match self.format {
            Some((mix, sample_format)) => AudioFormat {
                sample_rate: mix.sample_rate,
                channels: mix.channels,
                sample_format,
            },
            None => AudioFormat {
                sample_rate: 48_000,
                channels: 2,
                sample_format: SampleFormat::F32,
            },
        }
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let (stream, mix, sample_format) = self.open()?;
        log::info!(
            "Loopback on '{}': {} Hz, {} ch, {:?}",
            self.device_name,
            mix.sample_rate,
            mix.channels,
            sample_format
        );
        self.format = Some((mix, sample_format));
        self.stream = Some(stream);
        Ok(())
    }

    fn poll(&mut self) -> Result<AudioPoll, CaptureError> {
        let (Some(stream), Some((mix, sample_format))) = (self.stream.as_ref(), self.format) else {
            return Err(CaptureError::Device("loopback client is not started".into()));
        };

        unsafe {
            let packet_length = stream
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| CaptureError::Device(format!("GetNextPacketSize failed: {}", e)))?;
            if packet_length == 0 {
                return Ok(AudioPoll::Unavailable);
            }

            let mut data: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;
            stream
                .capture_client
                .GetBuffer(&mut data, &mut num_frames, &mut flags, None, None)
                .map_err(|e| CaptureError::Device(format!("GetBuffer failed: {}", e)))?;

            if num_frames == 0 || data.is_null() {
                let _ = stream.capture_client.ReleaseBuffer(num_frames);
                return Ok(AudioPoll::Empty);
            }

            let len = num_frames as usize * mix.block_align as usize;
            let bytes = std::slice::from_raw_parts(data, len);
            let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
            let samples = decode_packet(sample_format, bytes, silent);

            stream
                .capture_client
                .ReleaseBuffer(num_frames)
                .map_err(|e| CaptureError::Device(format!("ReleaseBuffer failed: {}", e)))?;

            Ok(AudioPoll::Data(AudioBuffer {
                sample_rate: mix.sample_rate,
                channels: mix.channels,
                samples,
            }))
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let result = unsafe { stream.audio_client.Stop() };
        drop(stream);
        result.map_err(|e| CaptureError::Device(format!("IAudioClient::Stop failed: {}", e)))
    }
}

impl Drop for WasapiLoopbackCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Copy the fields we need out of a (possibly extensible) mix format.
unsafe fn read_mix_format(ptr: *const WAVEFORMATEX) -> MixFormat {
    let wf = std::ptr::read_unaligned(ptr);
    let sub_format = if wf.wFormatTag == WAVE_FORMAT_EXTENSIBLE && wf.cbSize >= 22 {
        let ext = std::ptr::read_unaligned(ptr as *const WAVEFORMATEXTENSIBLE);
        Some(ext.SubFormat.data1)
    } else {
        None
    };
    MixFormat {
        format_tag: wf.wFormatTag,
        channels: wf.nChannels,
        sample_rate: wf.nSamplesPerSec,
        bits_per_sample: wf.wBitsPerSample,
        block_align: wf.nBlockAlign,
        sub_format,
    }
}
