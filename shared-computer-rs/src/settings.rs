//! Settings dialog state.
//!
//! Holds the values shown by the dialog and the rules that tie them
//! together. Rendering lives in [`crate::ui`]; this type has no UI
//! dependency so the same rules serve every front end.

use crate::audio::EndpointVolume;
use crate::config::{
    ConfigError, ConfigStore, NumLockPolicy, Settings, VolumeMode, MAX_VOLUME_LEVEL,
};
use tracing::debug;

/// Level shown when the current system volume cannot be read.
const UNREADABLE_LEVEL: u8 = 1;

/// Where the level spinner takes its displayed value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialValueSource {
    /// The stored setting.
    #[default]
    Configuration,
    /// The current volume of the default output device.
    CurrentSystem,
}

impl InitialValueSource {
    pub const ALL: [InitialValueSource; 2] = [Self::Configuration, Self::CurrentSystem];

    pub fn label(self) -> &'static str {
        match self {
            InitialValueSource::Configuration => "Set in the add-on configuration",
            InitialValueSource::CurrentSystem => "Current system volume level",
        }
    }
}

/// Values and enablement of the settings dialog controls.
#[derive(Debug, Clone)]
pub struct SettingsForm {
    stored: Settings,
    num_lock: NumLockPolicy,
    volume_mode: VolumeMode,
    level: u8,
    level_range: (u8, u8),
    level_enabled: bool,
    initial_value_source: InitialValueSource,
}

impl SettingsForm {
    pub const TITLE: &'static str = "Shared Computer settings";
    pub const NUM_LOCK_LABEL: &'static str = "Activate NumLock:";
    pub const VOLUME_MODE_LABEL: &'static str = "System Volume at Start:";
    pub const INITIAL_VALUE_LABEL: &'static str = "Initial value for volume level:";
    pub const LEVEL_LABEL: &'static str = "Volume Level:";

    /// Open the form on the values currently in `store`.
    pub fn open(store: &dyn ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self::new(store.load()?))
    }

    pub fn new(stored: Settings) -> Self {
        let mut form = Self {
            stored,
            num_lock: stored.num_lock_activation,
            volume_mode: stored.change_volume_level,
            level: stored.volume_level,
            level_range: (0, MAX_VOLUME_LEVEL),
            level_enabled: true,
            initial_value_source: InitialValueSource::Configuration,
        };
        form.select_volume_mode(stored.change_volume_level);
        form
    }

    pub fn num_lock(&self) -> NumLockPolicy {
        self.num_lock
    }

    pub fn volume_mode(&self) -> VolumeMode {
        self.volume_mode
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Inclusive bounds of the level spinner.
    pub fn level_range(&self) -> (u8, u8) {
        self.level_range
    }

    pub fn level_enabled(&self) -> bool {
        self.level_enabled
    }

    pub fn initial_value_source(&self) -> InitialValueSource {
        self.initial_value_source
    }

    pub fn select_num_lock(&mut self, policy: NumLockPolicy) {
        self.num_lock = policy;
    }

    /// Change the volume mode. NeverChange disables the level spinner and
    /// keeps its last range; the other modes set the range and re-clamp.
    pub fn select_volume_mode(&mut self, mode: VolumeMode) {
        self.volume_mode = mode;
        match mode.level_range() {
            Some(range) => {
                self.level_range = range;
                self.level_enabled = true;
                self.set_level(self.level);
            }
            None => self.level_enabled = false,
        }
    }

    /// Set the spinner value, clamped to its range.
    pub fn set_level(&mut self, level: u8) {
        let (min, max) = self.level_range;
        self.level = level.clamp(min, max);
    }

    /// Switch where the spinner's value comes from. `endpoint` is only read.
    pub fn select_initial_value_source(
        &mut self,
        source: InitialValueSource,
        endpoint: Option<&dyn EndpointVolume>,
    ) {
        self.initial_value_source = source;
        let level = match source {
            InitialValueSource::Configuration => self.stored.volume_level,
            InitialValueSource::CurrentSystem => match endpoint.map(|e| e.volume_percent()) {
                Some(Ok(level)) => level,
                Some(Err(e)) => {
                    debug!("Could not read system volume: {}", e);
                    UNREADABLE_LEVEL
                }
                None => UNREADABLE_LEVEL,
            },
        };
        self.set_level(level);
    }

    /// The three fields as they will be stored.
    pub fn settings(&self) -> Settings {
        Settings {
            num_lock_activation: self.num_lock,
            change_volume_level: self.volume_mode,
            volume_level: self.level,
        }
    }

    /// Write all three fields to `store` in one save.
    pub fn commit(&mut self, store: &dyn ConfigStore) -> Result<Settings, ConfigError> {
        let settings = self.settings().normalized();
        store.save(&settings)?;
        self.stored = settings;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeEndpoint;
    use crate::config::MemoryConfigStore;

    fn stored(mode: VolumeMode, level: u8) -> Settings {
        Settings {
            num_lock_activation: NumLockPolicy::Off,
            change_volume_level: mode,
            volume_level: level,
        }
    }

    #[test]
    fn test_open_reflects_store() {
        let store = MemoryConfigStore::new(stored(VolumeMode::SetExact, 70));
        let form = SettingsForm::open(&store).unwrap();

        assert_eq!(form.num_lock(), NumLockPolicy::Off);
        assert_eq!(form.volume_mode(), VolumeMode::SetExact);
        assert_eq!(form.level(), 70);
        assert_eq!(form.level_range(), (20, 100));
        assert!(form.level_enabled());
    }

    #[test]
    fn test_mode_controls_level_range() {
        let mut form = SettingsForm::new(stored(VolumeMode::EnsureMinimum, 10));
        assert_eq!(form.level_range(), (0, 100));

        form.select_volume_mode(VolumeMode::SetExact);
        assert_eq!(form.level_range(), (20, 100));
        assert_eq!(form.level(), 20);

        form.select_volume_mode(VolumeMode::NeverChange);
        assert!(!form.level_enabled());

        form.select_volume_mode(VolumeMode::EnsureMinimum);
        assert!(form.level_enabled());
        form.set_level(5);
        assert_eq!(form.level(), 5);
        form.set_level(150);
        assert_eq!(form.level(), 100);
    }

    #[test]
    fn test_initial_value_from_system() {
        let mut form = SettingsForm::new(stored(VolumeMode::EnsureMinimum, 50));
        let endpoint = FakeEndpoint::new(0.35, true);

        form.select_initial_value_source(InitialValueSource::CurrentSystem, Some(&endpoint));
        assert_eq!(form.level(), 35);
        // Read only: the device is left as it was.
        assert!(endpoint.set_volume_calls().is_empty());
        assert!(endpoint.muted.get());

        form.select_initial_value_source(InitialValueSource::Configuration, Some(&endpoint));
        assert_eq!(form.level(), 50);
    }

    #[test]
    fn test_unreadable_system_volume_shows_one() {
        let mut form = SettingsForm::new(stored(VolumeMode::EnsureMinimum, 50));
        form.select_initial_value_source(InitialValueSource::CurrentSystem, None);
        assert_eq!(form.level(), 1);

        let mut form = SettingsForm::new(stored(VolumeMode::SetExact, 50));
        let mut endpoint = FakeEndpoint::new(0.35, false);
        endpoint.fail_after = Some(0);
        form.select_initial_value_source(InitialValueSource::CurrentSystem, Some(&endpoint));
        assert_eq!(form.level(), 20);
    }

    #[test]
    fn test_commit_writes_all_fields() {
        let store = MemoryConfigStore::new(stored(VolumeMode::EnsureMinimum, 50));
        let mut form = SettingsForm::open(&store).unwrap();

        form.select_num_lock(NumLockPolicy::On);
        form.select_volume_mode(VolumeMode::SetExact);
        form.set_level(80);
        let saved = form.commit(&store).unwrap();

        assert_eq!(
            saved,
            Settings {
                num_lock_activation: NumLockPolicy::On,
                change_volume_level: VolumeMode::SetExact,
                volume_level: 80,
            }
        );
        assert_eq!(store.load().unwrap(), saved);
    }
}
