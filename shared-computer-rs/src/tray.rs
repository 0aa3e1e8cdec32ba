use crate::app::WM_TRAY_ICON;
use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::UI::Shell::*;
use windows::Win32::UI::WindowsAndMessaging::*;

const TRAY_ICON_ID: u32 = 1;

/// Manages the system tray icon
pub struct TrayIcon {
    hwnd: HWND,
}

impl TrayIcon {
    pub fn new(hwnd: HWND, tooltip: &str) -> Result<Self> {
        let icon = unsafe { LoadIconW(None, IDI_APPLICATION)? };

        let tray = Self { hwnd };
        tray.add(icon, tooltip)?;

        Ok(tray)
    }

    fn add(&self, icon: HICON, tooltip: &str) -> Result<()> {
        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: self.hwnd,
            uID: TRAY_ICON_ID,
            uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP | NIF_SHOWTIP,
            uCallbackMessage: WM_TRAY_ICON,
            hIcon: icon,
            ..Default::default()
        };

        let tooltip_wide: Vec<u16> = tooltip.encode_utf16().chain(std::iter::once(0)).collect();
        let len = std::cmp::min(tooltip_wide.len(), nid.szTip.len());
        nid.szTip[..len].copy_from_slice(&tooltip_wide[..len]);

        unsafe {
            if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
                let err = GetLastError();
                return Err(Error::new(HRESULT::from_win32(err.0), "Shell_NotifyIconW failed"));
            }

            // Set version for modern behavior
            nid.Anonymous.uVersion = NOTIFYICON_VERSION_4;
            let _ = Shell_NotifyIconW(NIM_SETVERSION, &nid);
        }

        Ok(())
    }

    pub fn remove(&self) {
        let nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: self.hwnd,
            uID: TRAY_ICON_ID,
            ..Default::default()
        };

        unsafe {
            let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
        }
    }
}
