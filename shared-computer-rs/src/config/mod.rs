//! Session settings and their persistence.
//!
//! The three persisted fields keep the integer codes used by the settings
//! store (`0`, `1`, `2`) so values written by older installs stay readable.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Lowest level accepted when the volume is set to an exact value.
pub const MIN_EXACT_VOLUME_LEVEL: u8 = 20;

/// Highest volume level, in percent.
pub const MAX_VOLUME_LEVEL: u8 = 100;

/// Desired NumLock state at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum NumLockPolicy {
    Off,
    On,
    NeverChange,
}

impl NumLockPolicy {
    pub const ALL: [NumLockPolicy; 3] = [Self::Off, Self::On, Self::NeverChange];

    /// The toggle state this policy asks for, or `None` for NeverChange.
    pub fn target_state(self) -> Option<bool> {
        match self {
            NumLockPolicy::Off => Some(false),
            NumLockPolicy::On => Some(true),
            NumLockPolicy::NeverChange => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NumLockPolicy::Off => "Off",
            NumLockPolicy::On => "On",
            NumLockPolicy::NeverChange => "Never change",
        }
    }
}

impl TryFrom<u32> for NumLockPolicy {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NumLockPolicy::Off),
            1 => Ok(NumLockPolicy::On),
            2 => Ok(NumLockPolicy::NeverChange),
            other => Err(ConfigError::InvalidValue {
                key: "numLockActivation".to_string(),
                value: other,
            }),
        }
    }
}

impl From<NumLockPolicy> for u32 {
    fn from(policy: NumLockPolicy) -> Self {
        match policy {
            NumLockPolicy::Off => 0,
            NumLockPolicy::On => 1,
            NumLockPolicy::NeverChange => 2,
        }
    }
}

/// How the startup volume is corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum VolumeMode {
    /// Raise the volume to the target if it is lower.
    EnsureMinimum,
    /// Move the volume to exactly the target.
    SetExact,
    NeverChange,
}

impl VolumeMode {
    pub const ALL: [VolumeMode; 3] = [Self::EnsureMinimum, Self::SetExact, Self::NeverChange];

    pub fn label(self) -> &'static str {
        match self {
            VolumeMode::EnsureMinimum => "Ensure a minimum of",
            VolumeMode::SetExact => "Set exactly to",
            VolumeMode::NeverChange => "Never change",
        }
    }

    /// Range accepted for the level in this mode, or `None` when the level
    /// is not used.
    pub fn level_range(self) -> Option<(u8, u8)> {
        match self {
            VolumeMode::EnsureMinimum => Some((0, MAX_VOLUME_LEVEL)),
            VolumeMode::SetExact => Some((MIN_EXACT_VOLUME_LEVEL, MAX_VOLUME_LEVEL)),
            VolumeMode::NeverChange => None,
        }
    }
}

impl TryFrom<u32> for VolumeMode {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VolumeMode::EnsureMinimum),
            1 => Ok(VolumeMode::SetExact),
            2 => Ok(VolumeMode::NeverChange),
            other => Err(ConfigError::InvalidValue {
                key: "changeVolumeLevel".to_string(),
                value: other,
            }),
        }
    }
}

impl From<VolumeMode> for u32 {
    fn from(mode: VolumeMode) -> Self {
        match mode {
            VolumeMode::EnsureMinimum => 0,
            VolumeMode::SetExact => 1,
            VolumeMode::NeverChange => 2,
        }
    }
}

/// Physical keyboard layout of the machine, used to pick the NumLock default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyboardLayout {
    #[default]
    Desktop,
    /// Laptops usually share the numpad with letter keys, so NumLock is left alone.
    Laptop,
}

impl fmt::Display for KeyboardLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyboardLayout::Desktop => write!(f, "desktop"),
            KeyboardLayout::Laptop => write!(f, "laptop"),
        }
    }
}

/// Default values used when the store holds nothing for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsDefaults {
    pub num_lock_activation: NumLockPolicy,
    pub change_volume_level: VolumeMode,
    pub volume_level: u8,
}

impl SettingsDefaults {
    pub fn for_layout(layout: KeyboardLayout) -> Self {
        let num_lock_activation = match layout {
            KeyboardLayout::Desktop => NumLockPolicy::Off,
            KeyboardLayout::Laptop => NumLockPolicy::NeverChange,
        };

        Self {
            num_lock_activation,
            change_volume_level: VolumeMode::EnsureMinimum,
            volume_level: 50,
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            num_lock_activation: self.num_lock_activation,
            change_volume_level: self.change_volume_level,
            volume_level: self.volume_level,
        }
    }
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self::for_layout(KeyboardLayout::Desktop)
    }
}

/// Persisted session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub num_lock_activation: NumLockPolicy,
    pub change_volume_level: VolumeMode,
    pub volume_level: u8,
}

impl Settings {
    /// Clamp the level into the range allowed by the current mode.
    pub fn normalized(self) -> Self {
        let (min, max) = self
            .change_volume_level
            .level_range()
            .unwrap_or((0, MAX_VOLUME_LEVEL));
        let volume_level = self.volume_level.clamp(min, max);

        if volume_level != self.volume_level {
            warn!(
                "Volume level {} out of range for {:?}, using {}",
                self.volume_level, self.change_volume_level, volume_level
            );
        }

        Self {
            volume_level,
            ..self
        }
    }

    /// Build settings from raw stored codes, falling back to `defaults` for
    /// any code that is missing or unknown.
    pub fn from_codes(
        num_lock: Option<u32>,
        volume_mode: Option<u32>,
        volume_level: Option<u32>,
        defaults: &SettingsDefaults,
    ) -> Self {
        let num_lock_activation = match num_lock.map(NumLockPolicy::try_from) {
            Some(Ok(policy)) => policy,
            Some(Err(e)) => {
                warn!("{}, using default", e);
                defaults.num_lock_activation
            }
            None => defaults.num_lock_activation,
        };

        let change_volume_level = match volume_mode.map(VolumeMode::try_from) {
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                warn!("{}, using default", e);
                defaults.change_volume_level
            }
            None => defaults.change_volume_level,
        };

        let volume_level = volume_level
            .map(|v| v.min(MAX_VOLUME_LEVEL as u32) as u8)
            .unwrap_or(defaults.volume_level);

        Settings {
            num_lock_activation,
            change_volume_level,
            volume_level,
        }
        .normalized()
    }
}

impl Default for Settings {
    fn default() -> Self {
        SettingsDefaults::default().settings()
    }
}

/// Settings store error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access settings store: {0}")]
    StoreAccess(String),

    #[error("Failed to write setting: {key}")]
    WriteFailed { key: String },

    #[error("Invalid value {value} for setting: {key}")]
    InvalidValue { key: String, value: u32 },
}

/// Persistent storage for [`Settings`].
pub trait ConfigStore {
    fn load(&self) -> Result<Settings, ConfigError>;

    /// Write all three fields together.
    fn save(&self, settings: &Settings) -> Result<(), ConfigError>;
}

/// In-process store. Used when the host owns persistence.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    settings: RefCell<Settings>,
}

impl MemoryConfigStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RefCell::new(settings.normalized()),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        Ok(*self.settings.borrow())
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        *self.settings.borrow_mut() = settings.normalized();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_defaults() {
        let desktop = SettingsDefaults::for_layout(KeyboardLayout::Desktop);
        assert_eq!(desktop.num_lock_activation, NumLockPolicy::Off);
        assert_eq!(desktop.change_volume_level, VolumeMode::EnsureMinimum);
        assert_eq!(desktop.volume_level, 50);

        let laptop = SettingsDefaults::for_layout(KeyboardLayout::Laptop);
        assert_eq!(laptop.num_lock_activation, NumLockPolicy::NeverChange);
    }

    #[test]
    fn test_exact_mode_clamps_to_minimum() {
        let settings = Settings {
            num_lock_activation: NumLockPolicy::On,
            change_volume_level: VolumeMode::SetExact,
            volume_level: 5,
        }
        .normalized();
        assert_eq!(settings.volume_level, MIN_EXACT_VOLUME_LEVEL);

        let settings = Settings {
            change_volume_level: VolumeMode::EnsureMinimum,
            ..settings
        };
        assert_eq!(settings.normalized().volume_level, MIN_EXACT_VOLUME_LEVEL);
    }

    #[test]
    fn test_from_codes_falls_back_on_unknown() {
        let defaults = SettingsDefaults::for_layout(KeyboardLayout::Laptop);
        let settings = Settings::from_codes(Some(7), Some(1), Some(250), &defaults);

        assert_eq!(settings.num_lock_activation, NumLockPolicy::NeverChange);
        assert_eq!(settings.change_volume_level, VolumeMode::SetExact);
        assert_eq!(settings.volume_level, 100);

        let settings = Settings::from_codes(None, None, None, &defaults);
        assert_eq!(settings, defaults.settings());
    }

    #[test]
    fn test_json_uses_stored_codes() {
        let settings = Settings {
            num_lock_activation: NumLockPolicy::On,
            change_volume_level: VolumeMode::NeverChange,
            volume_level: 35,
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(
            json,
            r#"{"numLockActivation":1,"changeVolumeLevel":2,"volumeLevel":35}"#
        );

        let bad = r#"{"numLockActivation":3,"changeVolumeLevel":0,"volumeLevel":35}"#;
        assert!(serde_json::from_str::<Settings>(bad).is_err());
    }

    #[test]
    fn test_memory_store_saves_normalized() {
        let store = MemoryConfigStore::default();
        store
            .save(&Settings {
                num_lock_activation: NumLockPolicy::Off,
                change_volume_level: VolumeMode::SetExact,
                volume_level: 10,
            })
            .unwrap();

        assert_eq!(store.load().unwrap().volume_level, 20);
    }
}
