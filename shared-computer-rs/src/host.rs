//! Services the hosting application provides to the plugin.
//!
//! Both the tray application and the C ABI implement [`Host`]. All calls
//! happen on the host's UI thread.

use std::time::Duration;
use thiserror::Error;

/// Host service error types.
#[derive(Debug, Error)]
pub enum HostError {
    /// The host has no such service (older hosts without profile switches).
    #[error("Host does not support {0}")]
    Unsupported(&'static str),

    #[error("Settings menu item error: {0}")]
    Menu(String),
}

/// Host lifecycle and event-loop services.
pub trait Host {
    /// Handle whatever is queued on the host's event loop.
    fn process_pending_events(&self);

    /// Block the calling thread.
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Whether the user session ended while the host was flushing events
    /// for a running correction.
    fn session_ending(&self) -> bool {
        false
    }

    /// Ask the host to call [`crate::SharedComputerPlugin::on_idle`] once its
    /// event loop is idle.
    fn schedule_idle(&self);

    /// Start delivering configuration profile switches to the plugin.
    fn register_profile_switch(&self) -> Result<(), HostError>;

    fn unregister_profile_switch(&self) -> Result<(), HostError>;

    /// Add the "Shared Computer settings..." entry to the host's menu.
    fn add_settings_menu_item(&self) -> Result<(), HostError>;

    fn remove_settings_menu_item(&self) -> Result<(), HostError>;
}
