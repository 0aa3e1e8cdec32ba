//! Windows Registry settings store.
//!
//! Settings live as DWORD values under `HKCU\Software\SharedComputer`.
//! The logon autostart entry lives under the per-user `Run` key.

use crate::config::{ConfigError, ConfigStore, Settings, SettingsDefaults};
use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegDeleteValueW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW,
    HKEY, HKEY_CURRENT_USER, KEY_READ, KEY_WRITE, REG_CREATE_KEY_DISPOSITION, REG_DWORD,
    REG_OPTION_NON_VOLATILE, REG_SZ,
};

/// Registry-based settings store.
pub struct RegistryConfigStore {
    app_key_path: Vec<u16>,
    run_key_path: Vec<u16>,
    value_name: Vec<u16>,
    defaults: SettingsDefaults,
}

impl RegistryConfigStore {
    const APP_KEY: &'static str = r"Software\SharedComputer";
    const RUN_KEY: &'static str = r"Software\Microsoft\Windows\CurrentVersion\Run";
    const APP_NAME: &'static str = "SharedComputer";
    const NUM_LOCK_VALUE: &'static str = "NumLockActivation";
    const VOLUME_MODE_VALUE: &'static str = "ChangeVolumeLevel";
    const VOLUME_LEVEL_VALUE: &'static str = "VolumeLevel";

    /// Create a store; `defaults` fill in values that were never written.
    pub fn new(defaults: SettingsDefaults) -> Self {
        Self {
            app_key_path: Self::to_wide(Self::APP_KEY),
            run_key_path: Self::to_wide(Self::RUN_KEY),
            value_name: Self::to_wide(Self::APP_NAME),
            defaults,
        }
    }

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Read one DWORD from the app key. Missing key or value gives `None`.
    fn read_dword(&self, hkey: HKEY, name: &str) -> Option<u32> {
        let value_name = Self::to_wide(name);
        let mut data: u32 = 0;
        let mut data_size = std::mem::size_of::<u32>() as u32;

        let result = unsafe {
            RegQueryValueExW(
                hkey,
                PCWSTR::from_raw(value_name.as_ptr()),
                None,
                None,
                Some(&mut data as *mut u32 as *mut u8),
                Some(&mut data_size),
            )
        };

        if result.is_ok() {
            Some(data)
        } else {
            None
        }
    }

    fn write_dword(&self, hkey: HKEY, name: &str, data: u32) -> Result<(), ConfigError> {
        let value_name = Self::to_wide(name);

        let result = unsafe {
            RegSetValueExW(
                hkey,
                PCWSTR::from_raw(value_name.as_ptr()),
                0,
                REG_DWORD,
                Some(std::slice::from_raw_parts(
                    &data as *const u32 as *const u8,
                    std::mem::size_of::<u32>(),
                )),
            )
        };

        if result.is_err() {
            Err(ConfigError::WriteFailed {
                key: name.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Check if "Start with Windows" is enabled.
    pub fn is_startup_enabled(&self) -> Result<bool, ConfigError> {
        unsafe {
            let mut hkey = HKEY::default();
            let result = RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(self.run_key_path.as_ptr()),
                0,
                KEY_READ,
                &mut hkey,
            );

            if result.is_err() {
                return Ok(false);
            }

            let mut data_size = 0u32;
            let result = RegQueryValueExW(
                hkey,
                PCWSTR::from_raw(self.value_name.as_ptr()),
                None,
                None,
                None,
                Some(&mut data_size),
            );

            let _ = RegCloseKey(hkey);

            Ok(result.is_ok() && data_size > 0)
        }
    }

    /// Enable or disable "Start with Windows".
    pub fn set_startup_enabled(&self, enabled: bool) -> Result<(), ConfigError> {
        unsafe {
            let mut hkey = HKEY::default();
            let result = RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(self.run_key_path.as_ptr()),
                0,
                KEY_WRITE,
                &mut hkey,
            );

            if result.is_err() {
                return Err(ConfigError::StoreAccess(
                    "Failed to open Run key".to_string(),
                ));
            }

            let result = if enabled {
                let exe_path = std::env::current_exe().map_err(|_| ConfigError::WriteFailed {
                    key: Self::APP_NAME.to_string(),
                })?;
                let exe_path_wide = Self::to_wide(&format!("\"{}\"", exe_path.display()));

                RegSetValueExW(
                    hkey,
                    PCWSTR::from_raw(self.value_name.as_ptr()),
                    0,
                    REG_SZ,
                    Some(std::slice::from_raw_parts(
                        exe_path_wide.as_ptr() as *const u8,
                        exe_path_wide.len() * 2,
                    )),
                )
            } else {
                RegDeleteValueW(hkey, PCWSTR::from_raw(self.value_name.as_ptr()))
            };

            let _ = RegCloseKey(hkey);

            if result.is_err() && enabled {
                Err(ConfigError::WriteFailed {
                    key: Self::APP_NAME.to_string(),
                })
            } else {
                Ok(())
            }
        }
    }
}

impl Default for RegistryConfigStore {
    fn default() -> Self {
        Self::new(SettingsDefaults::default())
    }
}

impl ConfigStore for RegistryConfigStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        let mut hkey = HKEY::default();
        let result = unsafe {
            RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(self.app_key_path.as_ptr()),
                0,
                KEY_READ,
                &mut hkey,
            )
        };

        if result.is_err() {
            debug!("No stored settings, using defaults");
            return Ok(self.defaults.settings());
        }

        let num_lock = self.read_dword(hkey, Self::NUM_LOCK_VALUE);
        let volume_mode = self.read_dword(hkey, Self::VOLUME_MODE_VALUE);
        let volume_level = self.read_dword(hkey, Self::VOLUME_LEVEL_VALUE);

        unsafe {
            let _ = RegCloseKey(hkey);
        }

        Ok(Settings::from_codes(
            num_lock,
            volume_mode,
            volume_level,
            &self.defaults,
        ))
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let mut hkey = HKEY::default();
        let mut disposition = REG_CREATE_KEY_DISPOSITION::default();

        let result = unsafe {
            RegCreateKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(self.app_key_path.as_ptr()),
                0,
                PCWSTR::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_WRITE,
                None,
                &mut hkey,
                Some(&mut disposition),
            )
        };

        if result.is_err() {
            return Err(ConfigError::StoreAccess(format!(
                "Failed to create {}",
                Self::APP_KEY
            )));
        }

        let written = self
            .write_dword(
                hkey,
                Self::NUM_LOCK_VALUE,
                settings.num_lock_activation.into(),
            )
            .and_then(|_| {
                self.write_dword(
                    hkey,
                    Self::VOLUME_MODE_VALUE,
                    settings.change_volume_level.into(),
                )
            })
            .and_then(|_| {
                self.write_dword(
                    hkey,
                    Self::VOLUME_LEVEL_VALUE,
                    settings.volume_level as u32,
                )
            });

        unsafe {
            let _ = RegCloseKey(hkey);
        }

        written
    }
}
