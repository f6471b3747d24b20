//! luainput-core ABI module
//!
//! This module defines the ABI contract between:
//! - **Host**: the Mupen64Plus core, which loads this plugin and calls its exports
//! - **Script**: the user's Lua file, which returns a table of entry points
//!
//! ## Host types
//! The `#[repr(C)]` structures mirror `m64p_plugin.h` (input API 2.1.1). The host owns
//! every one of them; the plugin only writes through the pointers it is handed.
//!
//! ## Script entry points (host -> script)
//! The script file must evaluate to a table. Every field is optional:
//! - `InitiateController(n) -> { Present = bool, RawData = bool, Plugin = PAK_* }`
//! - `RomOpen()`, `RomClosed()`
//! - `GetKeys(n) -> integer` (button bitmask)
//! - `ControllerCommand(n, tx_len, rx_len, tx, rx)`
//! - `ReadController(n, tx_len, rx_len, tx, rx) -> string` (reply bytes)
//! - `KeyDown(keymod, keysym)`, `KeyUp(keymod, keysym)`
//!
//! `n` is the 1-based controller number.
//!
//! ## Script globals (plugin -> script)
//! `PAK_NONE`, `PAK_MEMPAK`, `PAK_RUMBLEPAK`, `PAK_TRANSFERPAK`, `PAK_RAW`.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};

/// Number of controller ports on the console.
pub const MAX_CONTROLLERS: usize = 4;

pub const PLUGIN_NAME: &CStr = c"Mupen64Plus Lua Input Plugin";
pub const PLUGIN_VERSION: c_int = 0x010000;
pub const INPUT_API_VERSION: c_int = 0x020101;

/// `m64p_plugin_type` value for input plugins.
pub const PLUGIN_TYPE_INPUT: c_int = 4;

/// Split a packed `0xMMmmpp` version into its printable parts.
pub const fn version_split(version: c_int) -> (c_int, c_int, c_int) {
    ((version >> 16) & 0xffff, (version >> 8) & 0xff, version & 0xff)
}

/// `m64p_error` status code.
///
/// Kept as a transparent integer so values coming back from the host can never be
/// out of range for the Rust type.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct M64pError(pub c_int);

impl M64pError {
    pub const SUCCESS: Self = Self(0);
    pub const NOT_INIT: Self = Self(1);
    pub const ALREADY_INIT: Self = Self(2);
    pub const NO_MEMORY: Self = Self(7);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

/// `m64p_msg_level` values accepted by the debug callback.
pub mod msg_level {
    use std::os::raw::c_int;

    pub const ERROR: c_int = 1;
    pub const WARNING: c_int = 2;
    pub const INFO: c_int = 3;
    pub const STATUS: c_int = 4;
    pub const VERBOSE: c_int = 5;
}

/// Host-side pak ids written to `Control::plugin`.
pub mod host_pak {
    use std::os::raw::c_int;

    pub const NONE: c_int = 1;
    pub const MEMPAK: c_int = 2;
    pub const RUMBLE_PAK: c_int = 3;
    pub const TRANSFER_PAK: c_int = 4;
    pub const RAW: c_int = 5;
}

/// `CONTROL`: per-port description the host reads after `InitiateControllers`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Control {
    pub present: c_int,
    pub raw_data: c_int,
    pub plugin: c_int,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            present: 0,
            raw_data: 0,
            plugin: host_pak::NONE,
        }
    }
}

/// `CONTROL_INFO`: points at an array of [`MAX_CONTROLLERS`] `Control` entries.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct ControlInfo {
    pub controls: *mut Control,
}

/// `BUTTONS`: the C side is a union of a `u32` and bitfields; only the raw value is used.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Buttons {
    pub value: u32,
}

/// Host debug sink: `(context, level, message)`.
pub type DebugCallback = unsafe extern "C" fn(*mut c_void, c_int, *const c_char);

/// Opaque handles handed out by the host.
pub type M64pDynlibHandle = *mut c_void;
pub type M64pHandle = *mut c_void;

/// Configuration functions exported by the core library.
pub type ConfigOpenSectionFn = unsafe extern "C" fn(*const c_char, *mut M64pHandle) -> c_int;
pub type ConfigSetDefaultStringFn =
    unsafe extern "C" fn(M64pHandle, *const c_char, *const c_char, *const c_char) -> c_int;
pub type ConfigGetParamStringFn = unsafe extern "C" fn(M64pHandle, *const c_char) -> *const c_char;

/// Core symbol names used by the plugin.
pub mod core_symbols {
    use std::ffi::CStr;

    pub const CONFIG_OPEN_SECTION: &CStr = c"ConfigOpenSection";
    pub const CONFIG_SET_DEFAULT_STRING: &CStr = c"ConfigSetDefaultString";
    pub const CONFIG_GET_PARAM_STRING: &CStr = c"ConfigGetParamString";
}

/// Script entry point names (the keys looked up in the returned table).
pub mod hooks {
    /// Called once per port while the host initializes controllers.
    pub const INITIATE_CONTROLLER: &str = "InitiateController";
    pub const ROM_OPEN: &str = "RomOpen";
    pub const ROM_CLOSED: &str = "RomClosed";
    /// Called once per frame per port.
    pub const GET_KEYS: &str = "GetKeys";
    pub const CONTROLLER_COMMAND: &str = "ControllerCommand";
    pub const READ_CONTROLLER: &str = "ReadController";
    pub const KEY_DOWN: &str = "KeyDown";
    pub const KEY_UP: &str = "KeyUp";
}

/// Field names read from an `InitiateController` result.
pub mod controller_fields {
    pub const PRESENT: &str = "Present";
    pub const RAW_DATA: &str = "RawData";
    pub const PLUGIN: &str = "Plugin";
}

/// Version tuple reported through `PluginGetVersion`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VersionInfo {
    pub plugin_type: c_int,
    pub plugin_version: c_int,
    pub api_version: c_int,
    pub name: &'static CStr,
    pub capabilities: c_int,
}

pub const VERSION_INFO: VersionInfo = VersionInfo {
    plugin_type: PLUGIN_TYPE_INPUT,
    plugin_version: PLUGIN_VERSION,
    api_version: INPUT_API_VERSION,
    name: PLUGIN_NAME,
    capabilities: 0,
};
