//! UI module for the tray menu and settings dialog.

pub mod dialog;
pub mod menu;

pub use dialog::{DialogOutcome, SettingsDialog};
