//! Startup volume correction.
//!
//! With an endpoint handle the master volume and mute flag are set directly.
//! Without one, volume keys are pressed as a rough substitute.

use super::{AudioError, EndpointVolume};
use crate::config::{Settings, VolumeMode};
use crate::host::Host;
use crate::keyboard::{Keyboard, KeyboardError, VirtualKey};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Reads per correction; the first read after logon can be stale.
const ATTEMPTS: usize = 2;

/// Settle time between attempts.
const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Scalar difference below f32 noise of the endpoint; 0.05 percent.
const SCALAR_TOLERANCE: f32 = 0.0005;

/// Volume change per volume-key press, in percent.
const KEY_STEP_PERCENT: u8 = 2;

/// Key presses handled per second when waiting out the fallback.
const KEYS_PER_SECOND: f64 = 62.0;

/// Error from a volume correction.
#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("Audio endpoint error: {0}")]
    Device(#[from] AudioError),

    #[error("Volume key fallback failed: {0}")]
    Keyboard(#[from] KeyboardError),
}

/// Which path a correction took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Mode is NeverChange.
    Skipped,
    /// Volume and mute were set on the endpoint.
    Device,
    /// No endpoint; volume keys were pressed.
    KeyFallback { presses: usize },
}

/// Drives the default render endpoint toward a target level and unmutes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeCorrector {
    mode: VolumeMode,
    target: u8,
}

impl VolumeCorrector {
    pub fn new(mode: VolumeMode, target: u8) -> Self {
        Self {
            mode,
            target: target.min(100),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.change_volume_level, settings.volume_level)
    }

    fn target_scalar(&self) -> f32 {
        self.target as f32 / 100.0
    }

    /// Whether a scalar read from the device must be replaced by the target.
    /// Compared unrounded, so 0.496 is below a minimum of 50%.
    fn needs_change(&self, current: f32) -> bool {
        let target = self.target_scalar();
        current < target - SCALAR_TOLERANCE
            || (self.mode == VolumeMode::SetExact && current > target + SCALAR_TOLERANCE)
    }

    /// Run the correction.
    ///
    /// Device errors are returned as they happen, without switching to the
    /// key fallback. The fallback is only used when `endpoint` is `None`.
    pub fn run(
        &self,
        endpoint: Option<&dyn EndpointVolume>,
        keyboard: &dyn Keyboard,
        host: &dyn Host,
    ) -> Result<Correction, CorrectionError> {
        if self.mode == VolumeMode::NeverChange {
            debug!("Volume mode is NeverChange, leaving volume alone");
            return Ok(Correction::Skipped);
        }

        match endpoint {
            Some(endpoint) => {
                self.correct_device(endpoint, host)?;
                Ok(Correction::Device)
            }
            None => {
                let presses = self.press_volume_keys(keyboard, host)?;
                Ok(Correction::KeyFallback { presses })
            }
        }
    }

    fn correct_device(
        &self,
        endpoint: &dyn EndpointVolume,
        host: &dyn Host,
    ) -> Result<(), AudioError> {
        for _ in 0..ATTEMPTS {
            host.process_pending_events();

            let level = endpoint.volume_scalar()?;
            info!("Speaker level at startup: {:.1}%", level * 100.0);
            if self.needs_change(level) {
                endpoint.set_volume_scalar(self.target_scalar())?;
            }

            let muted = endpoint.is_muted()?;
            info!("Speakers at startup: {}", mute_label(muted));
            if muted {
                endpoint.set_mute(false)?;
            }

            host.pause(SETTLE_DELAY);

            info!(
                "Speakers after correction: {}%, {}",
                endpoint.volume_percent()?,
                mute_label(endpoint.is_muted()?)
            );
        }

        Ok(())
    }

    /// Volume down then up by the target amount. Only guarantees a minimum,
    /// and only if each key press moves the volume by two percent.
    fn press_volume_keys(
        &self,
        keyboard: &dyn Keyboard,
        host: &dyn Host,
    ) -> Result<usize, KeyboardError> {
        let repeats = (self.target / KEY_STEP_PERCENT) as usize;
        info!(
            "No audio endpoint, pressing volume keys {} times each way",
            repeats
        );

        for key in [VirtualKey::VolumeDown, VirtualKey::VolumeUp] {
            for _ in 0..repeats {
                keyboard.press(key)?;
            }
        }

        host.pause(Duration::from_secs_f64(self.target as f64 / KEYS_PER_SECOND));
        Ok(repeats * 2)
    }
}

fn mute_label(muted: bool) -> &'static str {
    if muted {
        "Muted"
    } else {
        "Unmuted"
    }
}
