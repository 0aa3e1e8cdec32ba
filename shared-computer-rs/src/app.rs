//! Tray application: the standalone host for the session plugin.
//!
//! A hidden top-level window owns the tray icon and receives
//! `WM_ENDSESSION`, so NumLock is restored at logoff as well as on Exit.

use crate::audio::{self, ComGuard};
use crate::config::SettingsDefaults;
use crate::host::{Host, HostError};
use crate::keyboard::WindowsKeyboard;
use crate::platform::RegistryConfigStore;
use crate::plugin::SharedComputerPlugin;
use crate::tray::TrayIcon;
use crate::ui;
use std::cell::{Cell, RefCell};
use std::process::Command;
use std::rc::Rc;
use tracing::{debug, error, info, warn};
use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::UI::Shell::NIN_SELECT;
use windows::Win32::UI::WindowsAndMessaging::*;

pub const WM_TRAY_ICON: u32 = WM_APP + 1;
const WM_SESSION_IDLE: u32 = WM_APP + 2;
const WM_SETTINGS_CLOSED: u32 = WM_APP + 3;

/// [`Host`] backed by the hidden window's message queue.
pub struct WindowHost {
    hwnd: HWND,
    settings_item: Cell<bool>,
}

impl WindowHost {
    fn new(hwnd: HWND) -> Self {
        Self {
            hwnd,
            settings_item: Cell::new(false),
        }
    }
}

impl Host for WindowHost {
    /// Dispatch queued messages of other windows. Messages for the host
    /// window are posted again afterwards, since the plugin is busy.
    fn process_pending_events(&self) {
        let mut deferred = Vec::new();
        let mut quit = None;

        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    quit = Some(msg.wParam.0 as i32);
                    break;
                }
                if msg.hwnd == self.hwnd {
                    deferred.push(msg);
                    continue;
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            for msg in deferred {
                let _ = PostMessageW(msg.hwnd, msg.message, msg.wParam, msg.lParam);
            }
            if let Some(code) = quit {
                PostQuitMessage(code);
            }
        }
    }

    fn session_ending(&self) -> bool {
        SESSION_ENDING.get()
    }

    fn schedule_idle(&self) {
        unsafe {
            if let Err(e) = PostMessageW(self.hwnd, WM_SESSION_IDLE, WPARAM(0), LPARAM(0)) {
                error!("Could not schedule volume correction: {}", e);
            }
        }
    }

    fn register_profile_switch(&self) -> std::result::Result<(), HostError> {
        Err(HostError::Unsupported("configuration profiles"))
    }

    fn unregister_profile_switch(&self) -> std::result::Result<(), HostError> {
        Err(HostError::Unsupported("configuration profiles"))
    }

    fn add_settings_menu_item(&self) -> std::result::Result<(), HostError> {
        self.settings_item.set(true);
        Ok(())
    }

    fn remove_settings_menu_item(&self) -> std::result::Result<(), HostError> {
        if !self.settings_item.replace(false) {
            return Err(HostError::Menu("settings item not present".to_string()));
        }
        Ok(())
    }
}

struct AppState {
    hwnd: HWND,
    plugin: SharedComputerPlugin<WindowHost>,
    tray_icon: TrayIcon,
    startup: RegistryConfigStore,
    settings_open: bool,
}

impl AppState {
    fn run_idle(&mut self) {
        if let Err(e) = self.plugin.on_idle() {
            warn!("Volume correction failed: {}", e);
        }
    }

    fn show_menu(&self, x: i32, y: i32) {
        let show_settings = self.plugin.host().settings_item.get() && !self.settings_open;
        let is_startup = self.startup.is_startup_enabled().unwrap_or(false);
        ui::menu::show_context_menu(self.hwnd, x, y, show_settings, is_startup);
    }

    fn toggle_startup(&self) {
        let enabled = self.startup.is_startup_enabled().unwrap_or(false);
        match self.startup.set_startup_enabled(!enabled) {
            Ok(()) => info!("Start with Windows: {}", !enabled),
            Err(e) => warn!("Could not change startup entry: {}", e),
        }
    }

    /// Launch the settings dialog as a child process and post
    /// `WM_SETTINGS_CLOSED` once it exits.
    fn open_settings(&mut self) {
        if self.settings_open {
            return;
        }

        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                warn!("Cannot locate executable for settings dialog: {}", e);
                return;
            }
        };

        let mut child = match Command::new(exe).arg("settings").spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Could not open settings dialog: {}", e);
                return;
            }
        };

        self.settings_open = true;
        // HWND is not Send; pass the raw value.
        let hwnd = self.hwnd.0 as isize;
        std::thread::spawn(move || {
            let _ = child.wait();
            unsafe {
                let _ = PostMessageW(
                    HWND(hwnd as *mut _),
                    WM_SETTINGS_CLOSED,
                    WPARAM(0),
                    LPARAM(0),
                );
            }
        });
    }

    fn settings_closed(&mut self) {
        self.settings_open = false;
        match self.plugin.reload_settings() {
            Ok(settings) => debug!("Settings reloaded: {:?}", settings),
            Err(e) => warn!("Could not reload settings: {}", e),
        }
    }
}

thread_local! {
    static APP_STATE: RefCell<Option<Rc<RefCell<AppState>>>> = const { RefCell::new(None) };
    /// Set by `WM_ENDSESSION` arriving while the app state is busy.
    static SESSION_ENDING: Cell<bool> = const { Cell::new(false) };
}

/// Run `f` on the app state. Returns `None` when there is no state or when
/// the state is already in use further up the stack.
fn with_app_state<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut AppState) -> R,
{
    APP_STATE.with(|state| {
        let app = state.borrow().as_ref().cloned()?;
        let result = match app.try_borrow_mut() {
            Ok(mut app) => Some(f(&mut app)),
            Err(_) => {
                debug!("App state busy, message skipped");
                None
            }
        };
        result
    })
}

/// Run the tray host until Exit or logoff.
pub fn run(defaults: SettingsDefaults) -> anyhow::Result<()> {
    let _com = ComGuard::new()?;

    let hwnd = unsafe { create_host_window()? };

    let plugin = SharedComputerPlugin::new(
        WindowHost::new(hwnd),
        Box::new(RegistryConfigStore::new(defaults)),
        Box::new(WindowsKeyboard::new()),
        audio::open_default_render_endpoint(),
    )?;
    let tray_icon = TrayIcon::new(hwnd, "Shared Computer")?;

    let app_state = AppState {
        hwnd,
        plugin,
        tray_icon,
        startup: RegistryConfigStore::new(defaults),
        settings_open: false,
    };
    APP_STATE.with(|state| *state.borrow_mut() = Some(Rc::new(RefCell::new(app_state))));

    unsafe {
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).into() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    // Dropping the plugin terminates the session if that has not happened yet.
    APP_STATE.with(|state| state.borrow_mut().take());
    Ok(())
}

/// Host for a one-shot correction without a window. The idle tick runs
/// right away in [`apply_once`].
struct OneShotHost;

impl Host for OneShotHost {
    fn process_pending_events(&self) {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    fn schedule_idle(&self) {}

    fn register_profile_switch(&self) -> std::result::Result<(), HostError> {
        Err(HostError::Unsupported("configuration profiles"))
    }

    fn unregister_profile_switch(&self) -> std::result::Result<(), HostError> {
        Err(HostError::Unsupported("configuration profiles"))
    }

    fn add_settings_menu_item(&self) -> std::result::Result<(), HostError> {
        Ok(())
    }

    fn remove_settings_menu_item(&self) -> std::result::Result<(), HostError> {
        Ok(())
    }
}

/// Apply the stored settings once and leave NumLock as set.
pub fn apply_once(defaults: SettingsDefaults) -> anyhow::Result<()> {
    let _com = ComGuard::new()?;

    let plugin = SharedComputerPlugin::new(
        OneShotHost,
        Box::new(RegistryConfigStore::new(defaults)),
        Box::new(WindowsKeyboard::new()),
        audio::open_default_render_endpoint(),
    )?;

    let correction = plugin.run_once()?;
    info!("Volume correction: {:?}", correction);
    Ok(())
}

unsafe fn create_host_window() -> Result<HWND> {
    let instance = windows::Win32::System::LibraryLoader::GetModuleHandleW(None)?;

    let window_class = w!("SharedComputerWindow");
    let wc = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        lpfnWndProc: Some(window_proc),
        hInstance: instance.into(),
        lpszClassName: window_class,
        ..Default::default()
    };

    RegisterClassExW(&wc);

    CreateWindowExW(
        WINDOW_EX_STYLE::default(),
        window_class,
        w!("Shared Computer"),
        WS_OVERLAPPEDWINDOW,
        CW_USEDEFAULT,
        CW_USEDEFAULT,
        CW_USEDEFAULT,
        CW_USEDEFAULT,
        None,
        None,
        instance,
        None,
    )
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_TRAY_ICON => {
            let event = (lparam.0 & 0xFFFF) as u32;
            if matches!(event, NIN_SELECT | WM_LBUTTONUP | WM_RBUTTONUP | WM_CONTEXTMENU) {
                let mut pt = POINT::default();
                let _ = GetCursorPos(&mut pt);
                with_app_state(|app| app.show_menu(pt.x, pt.y));
            }
            LRESULT(0)
        }
        WM_SESSION_IDLE => {
            with_app_state(|app| app.run_idle());
            LRESULT(0)
        }
        WM_SETTINGS_CLOSED => {
            with_app_state(|app| app.settings_closed());
            LRESULT(0)
        }
        WM_COMMAND => {
            let cmd_id = (wparam.0 & 0xFFFF) as u32;
            handle_menu_command(cmd_id);
            LRESULT(0)
        }
        WM_ENDSESSION => {
            if wparam.0 != 0 {
                info!("Windows session ending");
                if with_app_state(|app| app.plugin.terminate()).is_none() {
                    SESSION_ENDING.set(true);
                }
            }
            LRESULT(0)
        }
        WM_DESTROY => {
            with_app_state(|app| {
                app.tray_icon.remove();
                app.plugin.terminate();
            });
            PostQuitMessage(0);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

fn handle_menu_command(cmd_id: u32) {
    match cmd_id {
        ui::menu::CMD_SETTINGS => {
            with_app_state(|app| app.open_settings());
        }
        ui::menu::CMD_TOGGLE_STARTUP => {
            with_app_state(|app| app.toggle_startup());
        }
        ui::menu::CMD_EXIT => {
            // WM_DESTROY needs the app state, so release it first.
            if let Some(hwnd) = with_app_state(|app| app.hwnd) {
                unsafe {
                    let _ = DestroyWindow(hwnd);
                }
            }
        }
        _ => {}
    }
}
