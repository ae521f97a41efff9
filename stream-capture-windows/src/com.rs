use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use stream_capture_core::models::error::CaptureError;

/// COM initialization for the current thread, undone on drop.
///
/// A thread already initialized in another apartment is accepted as-is and
/// left alone on drop.
pub(crate) struct ComScope {
    owned: bool,
}

impl ComScope {
    pub fn enter() -> Result<Self, CaptureError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { owned: false });
        }
        hr.ok()
            .map_err(|e| CaptureError::Device(format!("CoInitializeEx failed: {}", e)))?;
        Ok(Self { owned: true })
    }
}

impl Drop for ComScope {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                CoUninitialize();
            }
        }
    }
}
