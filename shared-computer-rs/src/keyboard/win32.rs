//! Windows keyboard backend via GetKeyState and SendInput.

use super::{Keyboard, KeyboardError, VirtualKey};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetKeyState, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, VIRTUAL_KEY, VK_NUMLOCK, VK_VOLUME_DOWN,
    VK_VOLUME_UP,
};

/// Keyboard backed by the Win32 input APIs of the calling thread.
pub struct WindowsKeyboard;

impl WindowsKeyboard {
    pub fn new() -> Self {
        Self
    }

    fn vk(key: VirtualKey) -> VIRTUAL_KEY {
        match key {
            VirtualKey::NumLock => VK_NUMLOCK,
            VirtualKey::VolumeUp => VK_VOLUME_UP,
            VirtualKey::VolumeDown => VK_VOLUME_DOWN,
        }
    }
}

impl Default for WindowsKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard for WindowsKeyboard {
    fn is_toggled(&self, key: VirtualKey) -> Result<bool, KeyboardError> {
        // Low-order bit is the toggle state.
        // SAFETY: GetKeyState has no preconditions
        let state = unsafe { GetKeyState(Self::vk(key).0 as i32) };
        Ok(state & 1 != 0)
    }

    fn press(&self, key: VirtualKey) -> Result<(), KeyboardError> {
        let vk = Self::vk(key);
        // All three keys are extended keys.
        let inputs = [
            key_input(vk, KEYEVENTF_EXTENDEDKEY),
            key_input(vk, KEYEVENTF_EXTENDEDKEY | KEYEVENTF_KEYUP),
        ];

        // SAFETY: inputs is a valid array of KEYBDINPUT structures
        let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            return Err(KeyboardError::InjectionFailed { key });
        }
        Ok(())
    }
}

fn key_input(vk: VIRTUAL_KEY, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}
