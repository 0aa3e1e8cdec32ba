//! COM apartment lifetime for the calling thread.

use super::AudioError;
use tracing::debug;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};

/// COM initialization guard that uninitializes COM on drop.
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Initialize COM for the current thread.
    ///
    /// A thread the host already put into the multithreaded apartment keeps
    /// it; the guard then leaves uninitialization to the host.
    pub fn new() -> Result<Self, AudioError> {
        // Apartment-threaded for the UI thread that owns the plugin
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            debug!("COM already initialized in another apartment mode");
            return Ok(Self { initialized: false });
        }
        hr.ok().map_err(AudioError::ComInitFailed)?;
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}
