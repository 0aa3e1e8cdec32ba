//! Shared Computer - Library
//!
//! Session helper for computers shared between several people. At session
//! start it puts NumLock and the system volume into a known state, and it
//! restores NumLock when the session ends.
//!
//! ## Features
//!
//! - NumLock policy applied at start and after profile switches
//! - Volume minimum or exact level, with volume-key fallback
//! - Settings stored in the Registry and edited in a small dialog
//! - Tray host with Start with Windows option
//! - C ABI for embedding in another host (`shared-computer-ffi`)

pub mod audio;
pub mod config;
pub mod host;
pub mod keyboard;
pub mod plugin;
pub mod settings;

#[cfg(windows)]
pub mod app;
#[cfg(windows)]
pub mod platform;
#[cfg(windows)]
pub mod tray;
#[cfg(windows)]
pub mod ui;

pub use audio::{AudioError, Correction, CorrectionError, EndpointVolume, VolumeCorrector};
pub use config::{
    ConfigError, ConfigStore, KeyboardLayout, MemoryConfigStore, NumLockPolicy, Settings,
    SettingsDefaults, VolumeMode,
};
pub use host::{Host, HostError};
pub use keyboard::{Keyboard, KeyboardError, VirtualKey};
pub use plugin::SharedComputerPlugin;
pub use settings::{InitialValueSource, SettingsForm};

#[cfg(windows)]
pub use platform::RegistryConfigStore;
