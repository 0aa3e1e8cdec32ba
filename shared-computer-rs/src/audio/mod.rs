//! Default render endpoint volume control.
//!
//! [`EndpointVolume`] is the slice of `IAudioEndpointVolume` this crate uses.
//! [`VolumeCorrector`] drives an endpoint toward the configured level.

#[cfg(windows)]
pub mod com;
pub mod corrector;
#[cfg(windows)]
pub mod volume;

#[cfg(windows)]
pub use com::ComGuard;
pub use corrector::{Correction, CorrectionError, VolumeCorrector};
#[cfg(windows)]
pub use volume::VolumeController;

use thiserror::Error;

/// Audio service error types.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No default render device available")]
    NoDefaultDevice,

    #[cfg(windows)]
    #[error("COM initialization failed: {0}")]
    ComInitFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Failed to create device enumerator: {0}")]
    EnumerationFailed(#[source] windows::core::Error),

    #[error("Volume control not available for device")]
    VolumeNotAvailable,

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsError(#[source] windows::core::Error),

    #[error("Audio endpoint access is not supported on this platform")]
    Unsupported,
}

/// Volume and mute control of one audio endpoint.
pub trait EndpointVolume {
    /// Master volume as a scalar in `0.0..=1.0`.
    fn volume_scalar(&self) -> Result<f32, AudioError>;

    fn set_volume_scalar(&self, level: f32) -> Result<(), AudioError>;

    fn is_muted(&self) -> Result<bool, AudioError>;

    fn set_mute(&self, muted: bool) -> Result<(), AudioError>;

    /// Master volume in whole percent.
    fn volume_percent(&self) -> Result<u8, AudioError> {
        Ok(scalar_to_percent(self.volume_scalar()?))
    }
}

pub(crate) fn scalar_to_percent(scalar: f32) -> u8 {
    (scalar.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Open the volume control of the system default render endpoint.
///
/// COM must be initialized on the calling thread.
#[cfg(windows)]
pub fn open_default_render_endpoint() -> Result<Box<dyn EndpointVolume>, AudioError> {
    Ok(Box::new(VolumeController::default_render()?))
}

#[cfg(not(windows))]
pub fn open_default_render_endpoint() -> Result<Box<dyn EndpointVolume>, AudioError> {
    Err(AudioError::Unsupported)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Calls made against a [`FakeEndpoint`].
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum EndpointCall {
        GetVolume,
        SetVolume(f32),
        GetMute,
        SetMute(bool),
    }

    /// Endpoint that keeps its state in memory and records every call.
    pub struct FakeEndpoint {
        pub scalar: Cell<f32>,
        pub muted: Cell<bool>,
        pub calls: RefCell<Vec<EndpointCall>>,
        /// Fail every call after this many have succeeded.
        pub fail_after: Option<usize>,
    }

    impl FakeEndpoint {
        pub fn new(scalar: f32, muted: bool) -> Self {
            Self {
                scalar: Cell::new(scalar),
                muted: Cell::new(muted),
                calls: RefCell::new(Vec::new()),
                fail_after: None,
            }
        }

        fn record(&self, call: EndpointCall) -> Result<(), AudioError> {
            let mut calls = self.calls.borrow_mut();
            if self.fail_after.is_some_and(|n| calls.len() >= n) {
                return Err(AudioError::VolumeNotAvailable);
            }
            calls.push(call);
            Ok(())
        }

        pub fn set_volume_calls(&self) -> Vec<f32> {
            self.calls
                .borrow()
                .iter()
                .filter_map(|c| match c {
                    EndpointCall::SetVolume(v) => Some(*v),
                    _ => None,
                })
                .collect()
        }
    }

    impl EndpointVolume for FakeEndpoint {
        fn volume_scalar(&self) -> Result<f32, AudioError> {
            self.record(EndpointCall::GetVolume)?;
            Ok(self.scalar.get())
        }

        fn set_volume_scalar(&self, level: f32) -> Result<(), AudioError> {
            self.record(EndpointCall::SetVolume(level))?;
            self.scalar.set(level);
            Ok(())
        }

        fn is_muted(&self) -> Result<bool, AudioError> {
            self.record(EndpointCall::GetMute)?;
            Ok(self.muted.get())
        }

        fn set_mute(&self, muted: bool) -> Result<(), AudioError> {
            self.record(EndpointCall::SetMute(muted))?;
            self.muted.set(muted);
            Ok(())
        }
    }

    #[test]
    fn test_volume_percent_rounds() {
        assert_eq!(FakeEndpoint::new(0.29, false).volume_percent().unwrap(), 29);
        assert_eq!(FakeEndpoint::new(0.556, false).volume_percent().unwrap(), 56);
        assert_eq!(FakeEndpoint::new(1.5, false).volume_percent().unwrap(), 100);
    }
}
