use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::UI::WindowsAndMessaging::*;

// Menu command IDs
pub const CMD_SETTINGS: u32 = 1;
pub const CMD_TOGGLE_STARTUP: u32 = 2;
pub const CMD_EXIT: u32 = 3;

/// Show the tray context menu at the specified position
pub fn show_context_menu(hwnd: HWND, x: i32, y: i32, show_settings: bool, is_startup: bool) {
    unsafe {
        let Ok(menu) = CreatePopupMenu() else {
            return;
        };

        if show_settings {
            let _ = AppendMenuW(
                menu,
                MF_STRING,
                CMD_SETTINGS as usize,
                w!("&Shared Computer settings..."),
            );
            let _ = AppendMenuW(menu, MF_SEPARATOR, 0, None);
        }

        let startup_flags = if is_startup {
            MF_STRING | MF_CHECKED
        } else {
            MF_STRING
        };
        let _ = AppendMenuW(
            menu,
            startup_flags,
            CMD_TOGGLE_STARTUP as usize,
            w!("Start with Windows"),
        );

        let _ = AppendMenuW(menu, MF_SEPARATOR, 0, None);

        let _ = AppendMenuW(menu, MF_STRING, CMD_EXIT as usize, w!("Exit"));

        // Required so the menu closes when clicking elsewhere
        let _ = SetForegroundWindow(hwnd);
        let _ = TrackPopupMenu(menu, TPM_RIGHTBUTTON, x, y, 0, hwnd, None);

        let _ = DestroyMenu(menu);
    }
}
