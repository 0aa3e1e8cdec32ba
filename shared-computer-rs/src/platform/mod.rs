//! Platform-specific module for Windows utilities.
//!
//! This module contains the Registry settings store and the logon
//! autostart entry.

pub mod registry;

pub use registry::RegistryConfigStore;
