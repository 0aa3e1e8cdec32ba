//! FFI bindings for the Shared Computer session helper.
//!
//! This crate provides C ABI functions for hosting the session inside
//! another application, which owns the event loop and the settings UI.
//! All functions use panic::catch_unwind to prevent Rust panics from
//! unwinding across the FFI boundary.

use shared_computer_rs::{
    AudioError, ConfigError, ConfigStore, CorrectionError, EndpointVolume, Host, HostError,
    KeyboardError, MemoryConfigStore, Settings, SettingsDefaults, SharedComputerPlugin,
};
use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic;
use std::ptr;
use std::rc::Rc;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Error Handling
// ============================================================================

/// Error codes returned by FFI functions.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidHandle = -1,
    InvalidArgument = -2,
    DeviceError = -3,
    ComError = -4,
    JsonError = -5,
    KeyboardError = -6,
    ConfigError = -7,
    Unsupported = -8,
    Panic = -99,
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::NoDefaultDevice => ErrorCode::DeviceError,
            AudioError::VolumeNotAvailable => ErrorCode::DeviceError,
            AudioError::Unsupported => ErrorCode::Unsupported,
            #[cfg(windows)]
            AudioError::ComInitFailed(_)
            | AudioError::EnumerationFailed(_)
            | AudioError::WindowsError(_) => ErrorCode::ComError,
        }
    }
}

impl From<&KeyboardError> for ErrorCode {
    fn from(err: &KeyboardError) -> Self {
        match err {
            KeyboardError::InjectionFailed { .. } => ErrorCode::KeyboardError,
        }
    }
}

impl From<&CorrectionError> for ErrorCode {
    fn from(err: &CorrectionError) -> Self {
        match err {
            CorrectionError::Device(e) => e.into(),
            CorrectionError::Keyboard(e) => e.into(),
        }
    }
}

impl From<&ConfigError> for ErrorCode {
    fn from(_: &ConfigError) -> Self {
        ErrorCode::ConfigError
    }
}

/// Thread-local storage for the last error.
thread_local! {
    static LAST_ERROR: RefCell<Option<(ErrorCode, String)>> = const { RefCell::new(None) };
}

fn set_last_error(code: ErrorCode, message: impl Into<String>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some((code, message.into()));
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

fn record<E>(err: &E) -> i32
where
    for<'a> ErrorCode: From<&'a E>,
    E: std::fmt::Display,
{
    let code = ErrorCode::from(err);
    set_last_error(code, err.to_string());
    code as i32
}

/// Log to stderr once per process. Leaves an existing subscriber of the
/// embedding application in place.
fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env("SHARED_COMPUTER_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    });
}

// ============================================================================
// Host
// ============================================================================

/// Host services when embedded. The embedding application pumps its own
/// loop between calls, calls `sc_plugin_idle` when idle, forwards profile
/// switches and shows the settings item in its own menu.
struct FfiHost {
    idle_requested: Cell<bool>,
}

impl Host for FfiHost {
    fn process_pending_events(&self) {}

    fn schedule_idle(&self) {
        self.idle_requested.set(true);
    }

    fn register_profile_switch(&self) -> Result<(), HostError> {
        Ok(())
    }

    fn unregister_profile_switch(&self) -> Result<(), HostError> {
        Ok(())
    }

    fn add_settings_menu_item(&self) -> Result<(), HostError> {
        Ok(())
    }

    fn remove_settings_menu_item(&self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Settings store shared between the plugin and the profile switch entry
/// point, which replaces its content before the plugin reloads.
struct SharedStore(Rc<MemoryConfigStore>);

impl ConfigStore for SharedStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        self.0.load()
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        self.0.save(settings)
    }
}

// ============================================================================
// Session Handle Type
// ============================================================================

/// Opaque handle to a session. Actually points to a SessionEngine struct.
pub type PluginHandle = *mut c_void;

/// Internal session state. The plugin drops before the COM guard.
struct SessionEngine {
    plugin: SharedComputerPlugin<FfiHost>,
    store: Rc<MemoryConfigStore>,
    #[cfg(windows)]
    _com: Option<shared_computer_rs::audio::ComGuard>,
}

impl SessionEngine {
    #[cfg(windows)]
    fn start(settings: Settings) -> Result<Self, i32> {
        use shared_computer_rs::audio::{self, ComGuard};
        use shared_computer_rs::keyboard::WindowsKeyboard;

        let (com, endpoint) =
            endpoint_with_com(ComGuard::new(), audio::open_default_render_endpoint);
        let store = Rc::new(MemoryConfigStore::new(settings));
        let plugin = SharedComputerPlugin::new(
            FfiHost {
                idle_requested: Cell::new(false),
            },
            Box::new(SharedStore(Rc::clone(&store))),
            Box::new(WindowsKeyboard::new()),
            endpoint,
        )
        .map_err(|e| record(&e))?;

        Ok(Self {
            plugin,
            store,
            _com: com,
        })
    }

    #[cfg(not(windows))]
    fn start(_settings: Settings) -> Result<Self, i32> {
        set_last_error(
            ErrorCode::Unsupported,
            "Session hosting is only supported on Windows",
        );
        Err(ErrorCode::Unsupported as i32)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Open the endpoint only once COM is up. Without COM the session still
/// starts and corrects the volume with keys.
fn endpoint_with_com<G>(
    com: Result<G, AudioError>,
    open: impl FnOnce() -> Result<Box<dyn EndpointVolume>, AudioError>,
) -> (Option<G>, Result<Box<dyn EndpointVolume>, AudioError>) {
    match com {
        Ok(guard) => (Some(guard), open()),
        Err(e) => {
            tracing::warn!("COM unavailable, volume keys only: {}", e);
            (None, Err(e))
        }
    }
}

/// Allocate a C string from a Rust string. Caller must free with sc_free_string.
fn alloc_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        // Interior NUL: hand out an empty string instead.
        Err(_) => CString::default().into_raw(),
    }
}

/// Parse a C string to a Rust string slice.
unsafe fn parse_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Parse settings JSON. Null means the desktop defaults.
unsafe fn parse_settings(json: *const c_char) -> Result<Settings, i32> {
    if json.is_null() {
        return Ok(SettingsDefaults::default().settings());
    }
    let Some(json_str) = parse_c_str(json) else {
        set_last_error(ErrorCode::InvalidArgument, "Settings are not valid UTF-8");
        return Err(ErrorCode::InvalidArgument as i32);
    };
    match serde_json::from_str::<Settings>(json_str) {
        Ok(settings) => Ok(settings.normalized()),
        Err(e) => {
            set_last_error(ErrorCode::JsonError, e.to_string());
            Err(ErrorCode::JsonError as i32)
        }
    }
}

/// Borrow the session behind a handle.
unsafe fn engine<'a>(handle: PluginHandle) -> Result<&'a mut SessionEngine, i32> {
    if handle.is_null() {
        set_last_error(ErrorCode::InvalidHandle, "Null plugin handle");
        return Err(ErrorCode::InvalidHandle as i32);
    }
    Ok(&mut *(handle as *mut SessionEngine))
}

fn settings_json(settings: &Settings) -> *mut c_char {
    match serde_json::to_string(settings) {
        Ok(json) => alloc_c_string(&json),
        Err(e) => {
            set_last_error(ErrorCode::JsonError, e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// FFI Functions - Lifecycle
// ============================================================================

/// Start a session: applies NumLock and requests the idle tick.
///
/// # Arguments
/// * `settings_json` - Settings JSON (can be null for defaults)
///
/// # Returns
/// Handle to the session, or null on failure. Check sc_last_error_code() on failure.
///
/// # Safety
/// The returned handle must be freed with sc_plugin_destroy().
#[no_mangle]
pub extern "C" fn sc_plugin_create(settings_json: *const c_char) -> PluginHandle {
    clear_last_error();
    init_tracing();

    let result = panic::catch_unwind(|| {
        let settings = unsafe { parse_settings(settings_json)? };
        let engine = Box::new(SessionEngine::start(settings)?);
        Ok::<_, i32>(Box::into_raw(engine) as PluginHandle)
    });

    match result {
        Ok(Ok(handle)) => handle,
        Ok(Err(_)) => ptr::null_mut(),
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during session start");
            ptr::null_mut()
        }
    }
}

/// Run the deferred volume correction. Call once the host is idle; only the
/// first call after sc_plugin_create() does anything.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn sc_plugin_idle(handle: PluginHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = unsafe { engine(handle)? };
        engine.plugin.host().idle_requested.set(false);
        match engine.plugin.on_idle() {
            Ok(correction) => {
                tracing::debug!("Idle tick: {:?}", correction);
                Ok(())
            }
            Err(e) => Err(record(&e)),
        }
    });

    match result {
        Ok(Ok(())) => ErrorCode::Success as i32,
        Ok(Err(code)) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during volume correction");
            ErrorCode::Panic as i32
        }
    }
}

/// Whether the session still waits for its idle tick.
///
/// # Returns
/// 1 if sc_plugin_idle() has work to do, 0 if not, negative error code on failure.
#[no_mangle]
pub extern "C" fn sc_plugin_idle_pending(handle: PluginHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = unsafe { engine(handle)? };
        Ok::<_, i32>(i32::from(engine.plugin.host().idle_requested.get()))
    });

    match result {
        Ok(Ok(pending)) => pending,
        Ok(Err(code)) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during idle query");
            ErrorCode::Panic as i32
        }
    }
}

/// The host switched configuration profile. The new profile's settings
/// replace the current ones and NumLock is applied again.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn sc_plugin_profile_switched(
    handle: PluginHandle,
    settings_json: *const c_char,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = unsafe { engine(handle)? };
        if settings_json.is_null() {
            set_last_error(ErrorCode::InvalidArgument, "Null settings");
            return Err(ErrorCode::InvalidArgument as i32);
        }
        let settings = unsafe { parse_settings(settings_json)? };
        engine.store.save(&settings).map_err(|e| record(&e))?;
        engine.plugin.handle_profile_switch().map_err(|e| record(&e))
    });

    match result {
        Ok(Ok(())) => ErrorCode::Success as i32,
        Ok(Err(code)) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during profile switch");
            ErrorCode::Panic as i32
        }
    }
}

/// End the session, restoring NumLock, and free the handle.
///
/// # Safety
/// The handle must have been created by sc_plugin_create() and must not be used after this call.
#[no_mangle]
pub extern "C" fn sc_plugin_destroy(handle: PluginHandle) {
    if handle.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| {
        let mut engine = unsafe { Box::from_raw(handle as *mut SessionEngine) };
        engine.plugin.terminate();
    });
}

// ============================================================================
// FFI Functions - Settings
// ============================================================================

/// Get the session's current settings.
///
/// # Returns
/// Settings JSON. Caller must free with sc_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn sc_plugin_get_settings(handle: PluginHandle) -> *mut c_char {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = unsafe { engine(handle).ok()? };
        Some(settings_json(&engine.plugin.settings()))
    });

    match result {
        Ok(Some(json)) => json,
        Ok(None) => ptr::null_mut(),
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during get settings");
            ptr::null_mut()
        }
    }
}

/// Store settings confirmed in the host's settings dialog. They take effect
/// at the next session start.
///
/// # Returns
/// The stored settings after range clamping, as JSON. Caller must free with
/// sc_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn sc_plugin_apply_settings(
    handle: PluginHandle,
    settings_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = unsafe { engine(handle)? };
        if settings_json.is_null() {
            set_last_error(ErrorCode::InvalidArgument, "Null settings");
            return Err(ErrorCode::InvalidArgument as i32);
        }
        let settings = unsafe { parse_settings(settings_json)? };
        engine
            .plugin
            .commit_settings(settings)
            .map_err(|e| record(&e))
    });

    match result {
        Ok(Ok(stored)) => self::settings_json(&stored),
        Ok(Err(_)) => ptr::null_mut(),
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during apply settings");
            ptr::null_mut()
        }
    }
}

/// Current system volume in percent, for "current system volume" in the
/// host's settings dialog.
///
/// # Returns
/// 0..=100, or -1 on failure.
#[no_mangle]
pub extern "C" fn sc_plugin_current_volume(handle: PluginHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = unsafe { engine(handle)? };
        engine
            .plugin
            .current_volume_percent()
            .map_err(|e| record(&e))
    });

    match result {
        Ok(Ok(percent)) => i32::from(percent),
        Ok(Err(_)) => -1,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during volume read");
            -1
        }
    }
}

// ============================================================================
// FFI Functions - Memory Management
// ============================================================================

/// Free a string allocated by this library.
///
/// # Safety
/// The pointer must have been returned by one of the sc_* functions.
/// Do not call this on strings from other sources.
#[no_mangle]
pub extern "C" fn sc_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = CString::from_raw(ptr);
    });
}

// ============================================================================
// FFI Functions - Error Handling
// ============================================================================

/// Get the last error code.
///
/// # Returns
/// The error code from the last failed operation, or 0 if no error.
#[no_mangle]
pub extern "C" fn sc_last_error_code() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(code, _)| *code as i32)
            .unwrap_or(0)
    })
}

/// Get the last error message.
///
/// # Returns
/// Error message string. Caller must free with sc_free_string().
/// Returns null if no error.
#[no_mangle]
pub extern "C" fn sc_last_error_message() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(_, msg)| alloc_c_string(msg))
            .unwrap_or(ptr::null_mut())
    })
}

// ============================================================================
// FFI Functions - Utility
// ============================================================================

/// Get the library version.
///
/// # Returns
/// Version string. Caller must free with sc_free_string().
#[no_mangle]
pub extern "C" fn sc_version() -> *mut c_char {
    alloc_c_string(env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Tests
// ============================================================================
