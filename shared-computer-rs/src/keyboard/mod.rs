//! Keyboard state queries and synthetic key presses.
//!
//! NumLock is a toggle: a press flips it, it does not set it. Every change
//! therefore compares the current state first and presses at most once.

#[cfg(windows)]
mod win32;

#[cfg(windows)]
pub use win32::WindowsKeyboard;

use crate::config::NumLockPolicy;
use thiserror::Error;
use tracing::{debug, info};

/// Keys this crate ever sends or queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualKey {
    NumLock,
    VolumeUp,
    VolumeDown,
}

/// Keyboard backend error types.
#[derive(Debug, Error)]
pub enum KeyboardError {
    #[error("Key injection failed for {key:?}")]
    InjectionFailed { key: VirtualKey },
}

/// Key-state query and key injection primitives.
pub trait Keyboard {
    /// Current toggle state of a key (NumLock on/off).
    fn is_toggled(&self, key: VirtualKey) -> Result<bool, KeyboardError>;

    /// Send one complete press (down and up) of a key.
    fn press(&self, key: VirtualKey) -> Result<(), KeyboardError>;
}

/// Bring NumLock to the state `policy` asks for.
///
/// Returns whether a key was sent.
pub fn apply_num_lock_policy(
    keyboard: &dyn Keyboard,
    policy: NumLockPolicy,
) -> Result<bool, KeyboardError> {
    match policy.target_state() {
        Some(wanted) => toggle_num_lock_to(keyboard, wanted),
        None => Ok(false),
    }
}

/// Press NumLock once if its state differs from `wanted`.
fn toggle_num_lock_to(keyboard: &dyn Keyboard, wanted: bool) -> Result<bool, KeyboardError> {
    let current = keyboard.is_toggled(VirtualKey::NumLock)?;
    if current == wanted {
        debug!("NumLock already {}", on_off(current));
        return Ok(false);
    }

    keyboard.press(VirtualKey::NumLock)?;
    info!("NumLock switched {} -> {}", on_off(current), on_off(wanted));
    Ok(true)
}

fn on_off(state: bool) -> &'static str {
    if state {
        "on"
    } else {
        "off"
    }
}

/// NumLock state found when the session started.
#[derive(Debug, Clone, Copy)]
pub struct NumLockSnapshot {
    state: bool,
}

impl NumLockSnapshot {
    pub fn capture(keyboard: &dyn Keyboard) -> Result<Self, KeyboardError> {
        let state = keyboard.is_toggled(VirtualKey::NumLock)?;
        debug!("NumLock at session start: {}", on_off(state));
        Ok(Self { state })
    }

    /// Put NumLock back to the captured state. Compares against the
    /// snapshot, never against the configured policy.
    pub fn restore(&self, keyboard: &dyn Keyboard) -> Result<bool, KeyboardError> {
        toggle_num_lock_to(keyboard, self.state)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Keyboard that records presses and flips NumLock like real hardware.
    #[derive(Default)]
    pub struct RecordingKeyboard {
        pub num_lock: Cell<bool>,
        pub pressed: RefCell<Vec<VirtualKey>>,
    }

    impl RecordingKeyboard {
        pub fn with_num_lock(on: bool) -> Self {
            let keyboard = Self::default();
            keyboard.num_lock.set(on);
            keyboard
        }

        pub fn count(&self, key: VirtualKey) -> usize {
            self.pressed.borrow().iter().filter(|k| **k == key).count()
        }
    }

    impl Keyboard for RecordingKeyboard {
        fn is_toggled(&self, key: VirtualKey) -> Result<bool, KeyboardError> {
            match key {
                VirtualKey::NumLock => Ok(self.num_lock.get()),
                _ => Ok(false),
            }
        }

        fn press(&self, key: VirtualKey) -> Result<(), KeyboardError> {
            if key == VirtualKey::NumLock {
                self.num_lock.set(!self.num_lock.get());
            }
            self.pressed.borrow_mut().push(key);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingKeyboard;
    use super::*;

    #[test]
    fn test_policy_mismatch_sends_one_press() {
        for (policy, initial) in [(NumLockPolicy::Off, true), (NumLockPolicy::On, false)] {
            let keyboard = RecordingKeyboard::with_num_lock(initial);

            assert!(apply_num_lock_policy(&keyboard, policy).unwrap());
            assert_eq!(keyboard.count(VirtualKey::NumLock), 1);
            assert_eq!(keyboard.num_lock.get(), !initial);
        }
    }

    #[test]
    fn test_policy_match_sends_nothing() {
        for (policy, initial) in [(NumLockPolicy::Off, false), (NumLockPolicy::On, true)] {
            let keyboard = RecordingKeyboard::with_num_lock(initial);

            assert!(!apply_num_lock_policy(&keyboard, policy).unwrap());
            assert!(keyboard.pressed.borrow().is_empty());
        }
    }

    #[test]
    fn test_never_change_sends_nothing() {
        for initial in [false, true] {
            let keyboard = RecordingKeyboard::with_num_lock(initial);

            assert!(!apply_num_lock_policy(&keyboard, NumLockPolicy::NeverChange).unwrap());
            assert!(keyboard.pressed.borrow().is_empty());
        }
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let keyboard = RecordingKeyboard::with_num_lock(false);
        apply_num_lock_policy(&keyboard, NumLockPolicy::On).unwrap();
        apply_num_lock_policy(&keyboard, NumLockPolicy::On).unwrap();
        assert_eq!(keyboard.count(VirtualKey::NumLock), 1);
    }

    #[test]
    fn test_restore_uses_snapshot_not_policy() {
        let keyboard = RecordingKeyboard::with_num_lock(false);
        let snapshot = NumLockSnapshot::capture(&keyboard).unwrap();
        apply_num_lock_policy(&keyboard, NumLockPolicy::On).unwrap();

        assert!(snapshot.restore(&keyboard).unwrap());
        assert!(!keyboard.num_lock.get());
        assert_eq!(keyboard.count(VirtualKey::NumLock), 2);

        // Already back at the snapshot.
        assert!(!snapshot.restore(&keyboard).unwrap());
        assert_eq!(keyboard.count(VirtualKey::NumLock), 2);
    }
}
