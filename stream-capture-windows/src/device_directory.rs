//! Render-endpoint enumeration and name resolution via the MMDevice API.

use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::VT_LPWSTR;

use stream_capture_core::models::error::CaptureError;
use stream_capture_core::traits::audio_source::{AudioCapture, AudioDeviceDirectory};

use crate::com::ComScope;
use crate::wasapi_loopback::WasapiLoopbackCapture;

/// An active render endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderEndpoint {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Audio half of the device directory: loopback-capable render endpoints,
/// listed by friendly name.
///
/// Holds no COM state; each call initializes COM on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiDeviceDirectory;

impl WasapiDeviceDirectory {
    pub fn new() -> Self {
        Self
    }

    /// Active render endpoints in enumeration order.
    pub fn render_endpoints(&self) -> Result<Vec<RenderEndpoint>, CaptureError> {
        let _com = ComScope::enter()?;
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::Device(format!("failed to create enumerator: {}", e)))?;

            let collection = enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::Device(format!("EnumAudioEndpoints failed: {}", e)))?;
            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::Device(format!("GetCount failed: {}", e)))?;

            let default_id = enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok());

            let mut endpoints = Vec::new();
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let id = match device.GetId() {
                    Ok(id) => id.to_string().unwrap_or_default(),
                    Err(_) => continue,
                };
                let name = friendly_name(&device).unwrap_or_else(|| format!("Device {}", i));
                let is_default = default_id.as_deref() == Some(id.as_str());
                endpoints.push(RenderEndpoint { id, name, is_default });
            }
            Ok(endpoints)
        }
    }
}

impl AudioDeviceDirectory for WasapiDeviceDirectory {
    fn list_audio_devices(&self) -> Result<Vec<String>, CaptureError> {
        Ok(self.render_endpoints()?.into_iter().map(|e| e.name).collect())
    }

    fn resolve_audio_device(&self, name: &str) -> Result<Box<dyn AudioCapture>, CaptureError> {
        let endpoint = self
            .render_endpoints()?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| CaptureError::Device(format!("audio device not found: {}", name)))?;
        log::debug!("Resolved '{}' to endpoint {}", name, endpoint.id);
        Ok(Box::new(WasapiLoopbackCapture::new(endpoint.id, endpoint.name)))
    }
}

/// Read `PKEY_Device_FriendlyName` from a device's property store.
fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        let mut value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;

        let name = if value.Anonymous.Anonymous.vt == VT_LPWSTR {
            let pwsz = value.Anonymous.Anonymous.Anonymous.pwszVal;
            if pwsz.is_null() {
                None
            } else {
                pwsz.to_string().ok()
            }
        } else {
            None
        };

        let _ = PropVariantClear(&mut value);
        name
    }
}
