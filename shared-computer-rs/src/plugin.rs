//! Session plugin lifecycle.
//!
//! Construction corrects NumLock right away and asks the host for an idle
//! callback to correct the volume, since the audio stack may still be
//! starting. Termination puts NumLock back the way the session found it.

use crate::audio::{AudioError, Correction, CorrectionError, EndpointVolume, VolumeCorrector};
use crate::config::{ConfigError, ConfigStore, Settings, VolumeMode};
use crate::host::{Host, HostError};
use crate::keyboard::{apply_num_lock_policy, Keyboard, NumLockSnapshot};
use tracing::{debug, info, warn};

/// One session of the shared computer helper.
pub struct SharedComputerPlugin<H: Host> {
    host: H,
    store: Box<dyn ConfigStore>,
    settings: Settings,
    keyboard: Box<dyn Keyboard>,
    /// Default render endpoint, held for the plugin's lifetime.
    endpoint: Option<Box<dyn EndpointVolume>>,
    snapshot: Option<NumLockSnapshot>,
    pending_volume: Option<VolumeCorrector>,
    profile_registered: bool,
    menu_item_added: bool,
    terminated: bool,
}

impl<H: Host> SharedComputerPlugin<H> {
    /// Start a session.
    ///
    /// `endpoint` is the result of opening the default render endpoint. On
    /// error the volume correction uses volume keys instead.
    pub fn new(
        host: H,
        store: Box<dyn ConfigStore>,
        keyboard: Box<dyn Keyboard>,
        endpoint: Result<Box<dyn EndpointVolume>, AudioError>,
    ) -> Result<Self, ConfigError> {
        let settings = store.load()?;

        let endpoint = match endpoint {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                info!("Default audio endpoint unavailable ({}), using volume keys", e);
                None
            }
        };

        let mut plugin = Self {
            host,
            store,
            settings,
            keyboard,
            endpoint,
            snapshot: None,
            pending_volume: None,
            profile_registered: false,
            menu_item_added: false,
            terminated: false,
        };
        plugin.start();
        Ok(plugin)
    }

    fn start(&mut self) {
        info!(
            "Session start: NumLock {:?}, volume {:?} {}%",
            self.settings.num_lock_activation,
            self.settings.change_volume_level,
            self.settings.volume_level
        );

        if self.settings.change_volume_level != VolumeMode::NeverChange {
            self.pending_volume = Some(VolumeCorrector::from_settings(&self.settings));
            self.host.schedule_idle();
        }

        match NumLockSnapshot::capture(self.keyboard.as_ref()) {
            Ok(snapshot) => self.snapshot = Some(snapshot),
            Err(e) => warn!("Could not read NumLock state: {}", e),
        }
        self.sync_num_lock();

        match self.host.register_profile_switch() {
            Ok(()) => self.profile_registered = true,
            Err(HostError::Unsupported(what)) => {
                debug!("Host has no {}, NumLock follows startup settings only", what)
            }
            Err(e) => warn!("Profile switch registration failed: {}", e),
        }

        match self.host.add_settings_menu_item() {
            Ok(()) => self.menu_item_added = true,
            Err(e) => warn!("Could not add settings menu item: {}", e),
        }
    }

    fn sync_num_lock(&self) {
        if let Err(e) = apply_num_lock_policy(self.keyboard.as_ref(), self.settings.num_lock_activation)
        {
            warn!("NumLock correction failed: {}", e);
        }
    }

    /// Run the deferred volume correction. Only the first call after
    /// construction does anything; later calls return `Ok(None)`.
    pub fn on_idle(&mut self) -> Result<Option<Correction>, CorrectionError> {
        let Some(corrector) = self.pending_volume.take() else {
            return Ok(None);
        };

        let result = corrector.run(self.endpoint.as_deref(), self.keyboard.as_ref(), &self.host);
        if self.host.session_ending() {
            info!("Session ended during volume correction");
            self.terminate();
        }

        let correction = result?;
        debug!("Volume correction finished: {:?}", correction);
        Ok(Some(correction))
    }

    /// Run the session in one go for logon scripts: the volume correction
    /// runs now and NumLock stays as corrected, also when the correction fails.
    pub fn run_once(mut self) -> Result<Option<Correction>, CorrectionError> {
        self.release_num_lock();
        let result = self.on_idle();
        self.terminate();
        result
    }

    /// The host switched configuration profile: reload and re-apply NumLock.
    pub fn handle_profile_switch(&mut self) -> Result<(), ConfigError> {
        self.reload_settings()?;
        debug!(
            "Profile switched, NumLock policy {:?}",
            self.settings.num_lock_activation
        );
        self.sync_num_lock();
        Ok(())
    }

    /// Re-read settings from the store without acting on them.
    pub fn reload_settings(&mut self) -> Result<Settings, ConfigError> {
        self.settings = self.store.load()?;
        Ok(self.settings)
    }

    /// Store settings confirmed in the settings dialog. Returns what was
    /// stored after range clamping.
    pub fn commit_settings(&mut self, settings: Settings) -> Result<Settings, ConfigError> {
        let settings = settings.normalized();
        self.store.save(&settings)?;
        self.settings = settings;
        info!("Settings saved: {:?}", settings);
        Ok(settings)
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Current system volume, for the settings dialog.
    pub fn current_volume_percent(&self) -> Result<u8, AudioError> {
        match &self.endpoint {
            Some(endpoint) => endpoint.volume_percent(),
            None => Err(AudioError::NoDefaultDevice),
        }
    }

    /// Leave NumLock as corrected when the session ends.
    pub fn release_num_lock(&mut self) {
        self.snapshot = None;
    }

    /// End the session. Safe to call more than once.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.pending_volume = None;

        if let Some(snapshot) = self.snapshot {
            if let Err(e) = snapshot.restore(self.keyboard.as_ref()) {
                warn!("NumLock restore failed: {}", e);
            }
        }

        if self.profile_registered {
            let _ = self.host.unregister_profile_switch();
            self.profile_registered = false;
        }

        if self.menu_item_added {
            let _ = self.host.remove_settings_menu_item();
            self.menu_item_added = false;
        }

        info!("Session ended");
    }
}

impl<H: Host> Drop for SharedComputerPlugin<H> {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeEndpoint;
    use crate::config::{MemoryConfigStore, NumLockPolicy};
    use crate::host::testing::RecordingHost;
    use crate::keyboard::testing::RecordingKeyboard;
    use crate::keyboard::{KeyboardError, VirtualKey};
    use std::rc::Rc;

    /// Shares one fake between the test and the plugin.
    struct Shared<T>(Rc<T>);

    impl Keyboard for Shared<RecordingKeyboard> {
        fn is_toggled(&self, key: VirtualKey) -> Result<bool, KeyboardError> {
            self.0.is_toggled(key)
        }

        fn press(&self, key: VirtualKey) -> Result<(), KeyboardError> {
            self.0.press(key)
        }
    }

    impl EndpointVolume for Shared<FakeEndpoint> {
        fn volume_scalar(&self) -> Result<f32, AudioError> {
            self.0.volume_scalar()
        }

        fn set_volume_scalar(&self, level: f32) -> Result<(), AudioError> {
            self.0.set_volume_scalar(level)
        }

        fn is_muted(&self) -> Result<bool, AudioError> {
            self.0.is_muted()
        }

        fn set_mute(&self, muted: bool) -> Result<(), AudioError> {
            self.0.set_mute(muted)
        }
    }

    fn settings(num_lock: NumLockPolicy, mode: VolumeMode, level: u8) -> Settings {
        Settings {
            num_lock_activation: num_lock,
            change_volume_level: mode,
            volume_level: level,
        }
    }

    fn plugin(
        host: RecordingHost,
        settings: Settings,
        keyboard: &Rc<RecordingKeyboard>,
        endpoint: Option<&Rc<FakeEndpoint>>,
    ) -> SharedComputerPlugin<RecordingHost> {
        let endpoint: Result<Box<dyn EndpointVolume>, AudioError> = match endpoint {
            Some(e) => Ok(Box::new(Shared(Rc::clone(e)))),
            None => Err(AudioError::Unsupported),
        };
        SharedComputerPlugin::new(
            host,
            Box::new(MemoryConfigStore::new(settings)),
            Box::new(Shared(Rc::clone(keyboard))),
            endpoint,
        )
        .unwrap()
    }

    #[test]
    fn test_construction_applies_num_lock_and_defers_volume() {
        let keyboard = Rc::new(RecordingKeyboard::with_num_lock(false));
        let endpoint = Rc::new(FakeEndpoint::new(0.20, true));
        let mut plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::On, VolumeMode::EnsureMinimum, 50),
            &keyboard,
            Some(&endpoint),
        );

        assert!(keyboard.num_lock.get());
        assert_eq!(plugin.host().idle_requests.get(), 1);
        assert!(plugin.host().menu_item.get());
        // Nothing touches the device before the idle tick.
        assert!(endpoint.calls.borrow().is_empty());

        assert_eq!(plugin.on_idle().unwrap(), Some(Correction::Device));
        assert_eq!(endpoint.scalar.get(), 0.50);
        assert!(!endpoint.muted.get());

        // The correction runs once per session.
        assert_eq!(plugin.on_idle().unwrap(), None);
    }

    #[test]
    fn test_never_change_volume_is_not_scheduled() {
        let keyboard = Rc::new(RecordingKeyboard::default());
        let endpoint = Rc::new(FakeEndpoint::new(0.10, true));
        let mut plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::NeverChange, VolumeMode::NeverChange, 50),
            &keyboard,
            Some(&endpoint),
        );

        assert_eq!(plugin.host().idle_requests.get(), 0);
        assert_eq!(plugin.on_idle().unwrap(), None);
        assert!(endpoint.calls.borrow().is_empty());
        assert!(keyboard.pressed.borrow().is_empty());
    }

    #[test]
    fn test_missing_endpoint_falls_back_to_keys() {
        let keyboard = Rc::new(RecordingKeyboard::default());
        let mut plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::NeverChange, VolumeMode::SetExact, 40),
            &keyboard,
            None,
        );

        assert_eq!(
            plugin.on_idle().unwrap(),
            Some(Correction::KeyFallback { presses: 40 })
        );
        assert_eq!(keyboard.count(VirtualKey::VolumeDown), 20);
        assert_eq!(keyboard.count(VirtualKey::VolumeUp), 20);
        assert!(plugin.current_volume_percent().is_err());
    }

    #[test]
    fn test_terminate_restores_snapshot() {
        let keyboard = Rc::new(RecordingKeyboard::with_num_lock(true));
        let mut plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::Off, VolumeMode::NeverChange, 50),
            &keyboard,
            None,
        );
        assert!(!keyboard.num_lock.get());

        plugin.terminate();
        assert!(keyboard.num_lock.get());
        assert_eq!(keyboard.count(VirtualKey::NumLock), 2);
        assert!(!plugin.host().menu_item.get());

        // Second terminate and drop do nothing more.
        plugin.terminate();
        drop(plugin);
        assert_eq!(keyboard.count(VirtualKey::NumLock), 2);
    }

    #[test]
    fn test_released_num_lock_is_kept() {
        let keyboard = Rc::new(RecordingKeyboard::with_num_lock(true));
        let mut plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::Off, VolumeMode::NeverChange, 50),
            &keyboard,
            None,
        );

        plugin.release_num_lock();
        plugin.terminate();
        assert!(!keyboard.num_lock.get());
        assert_eq!(keyboard.count(VirtualKey::NumLock), 1);
    }

    #[test]
    fn test_run_once_keeps_num_lock_when_correction_fails() {
        let keyboard = Rc::new(RecordingKeyboard::with_num_lock(true));
        let mut endpoint = FakeEndpoint::new(0.30, false);
        endpoint.fail_after = Some(0);
        let endpoint = Rc::new(endpoint);
        let plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::Off, VolumeMode::EnsureMinimum, 50),
            &keyboard,
            Some(&endpoint),
        );

        let result = plugin.run_once();
        assert!(matches!(result, Err(CorrectionError::Device(_))));
        assert!(!keyboard.num_lock.get());
        assert_eq!(*keyboard.pressed.borrow(), vec![VirtualKey::NumLock]);
    }

    #[test]
    fn test_session_end_during_correction_restores_num_lock() {
        let keyboard = Rc::new(RecordingKeyboard::with_num_lock(true));
        let endpoint = Rc::new(FakeEndpoint::new(0.30, false));
        let host = RecordingHost {
            end_session_on_flush: true,
            ..RecordingHost::default()
        };
        let mut plugin = plugin(
            host,
            settings(NumLockPolicy::Off, VolumeMode::EnsureMinimum, 50),
            &keyboard,
            Some(&endpoint),
        );
        assert!(!keyboard.num_lock.get());

        assert_eq!(plugin.on_idle().unwrap(), Some(Correction::Device));
        assert!(keyboard.num_lock.get());
        assert!(!plugin.host().menu_item.get());

        drop(plugin);
        assert_eq!(keyboard.count(VirtualKey::NumLock), 2);
    }

    #[test]
    fn test_terminate_without_change_sends_nothing() {
        let keyboard = Rc::new(RecordingKeyboard::with_num_lock(true));
        let mut plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::On, VolumeMode::NeverChange, 50),
            &keyboard,
            None,
        );

        plugin.terminate();
        assert!(keyboard.pressed.borrow().is_empty());
    }

    #[test]
    fn test_profile_switch_reapplies_policy() {
        let keyboard = Rc::new(RecordingKeyboard::with_num_lock(false));
        let mut plugin = plugin(
            RecordingHost::with_profiles(),
            settings(NumLockPolicy::Off, VolumeMode::NeverChange, 50),
            &keyboard,
            None,
        );
        assert!(plugin.host().profile_registered.get());
        assert!(keyboard.pressed.borrow().is_empty());

        plugin
            .commit_settings(settings(NumLockPolicy::On, VolumeMode::NeverChange, 50))
            .unwrap();
        // Committing alone does not touch the keyboard.
        assert!(!keyboard.num_lock.get());

        plugin.handle_profile_switch().unwrap();
        assert!(keyboard.num_lock.get());

        plugin.terminate();
        assert!(!plugin.host().profile_registered.get());
        assert!(!keyboard.num_lock.get());
    }

    #[test]
    fn test_host_without_profiles_still_runs() {
        let keyboard = Rc::new(RecordingKeyboard::with_num_lock(true));
        let mut plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::Off, VolumeMode::NeverChange, 50),
            &keyboard,
            None,
        );

        assert!(!plugin.host().profile_registered.get());
        assert!(!keyboard.num_lock.get());
        plugin.terminate();
        assert!(keyboard.num_lock.get());
    }

    #[test]
    fn test_commit_clamps_exact_level() {
        let keyboard = Rc::new(RecordingKeyboard::default());
        let mut plugin = plugin(
            RecordingHost::default(),
            settings(NumLockPolicy::NeverChange, VolumeMode::NeverChange, 50),
            &keyboard,
            None,
        );

        let stored = plugin
            .commit_settings(settings(NumLockPolicy::On, VolumeMode::SetExact, 5))
            .unwrap();
        assert_eq!(stored.volume_level, 20);
        assert_eq!(plugin.reload_settings().unwrap(), stored);
    }
}
