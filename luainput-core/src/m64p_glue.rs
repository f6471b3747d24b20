use std::os::raw::{c_char, c_int, c_uchar, c_void};
use std::slice;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::{LuaInputPlugin, SessionState};
use crate::abi::{
    Buttons, ControlInfo, DebugCallback, M64pDynlibHandle, M64pError, MAX_CONTROLLERS,
    VERSION_INFO,
};
use crate::command::{HEADER_LEN, frame_len};
use crate::config::{ConfigStore, HostConfig, MemoryConfig};
use crate::error::EnvError;
use crate::logging;

static PLUGIN: OnceLock<Mutex<LuaInputPlugin>> = OnceLock::new();

fn plugin() -> MutexGuard<'static, LuaInputPlugin> {
    let lock = PLUGIN.get_or_init(|| Mutex::new(LuaInputPlugin::default()));
    // A panic inside a hook must not wedge every later host call.
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// View the command frame at `command`, sized from its own length bytes.
///
/// # Safety
/// `command` must be null or point at a PIF frame at least as long as its header declares.
unsafe fn command_frame<'a>(command: *mut c_uchar) -> Option<&'a mut [u8]> {
    if command.is_null() {
        return None;
    }
    let header = unsafe { slice::from_raw_parts(command, HEADER_LEN) };
    let len = frame_len(header[0], header[1]);
    Some(unsafe { slice::from_raw_parts_mut(command, len) })
}

#[unsafe(export_name = "PluginStartup")]
pub unsafe extern "C" fn plugin_startup(
    core: M64pDynlibHandle,
    context: *mut c_void,
    debug_callback: Option<DebugCallback>,
) -> c_int {
    let mut plugin = plugin();
    // A second startup must not steal the running instance's debug sink.
    if plugin.state() != SessionState::Uninitialized {
        return EnvError::AlreadyInitialized.code().0;
    }

    logging::install(debug_callback, context);

    let config: Box<dyn ConfigStore + Send> = match unsafe { HostConfig::resolve(core) } {
        Ok(host) => Box::new(host),
        Err(e) => {
            log::warn!("using in-memory settings: {e:#}");
            Box::new(MemoryConfig::default())
        }
    };

    match plugin.startup(config) {
        Ok(()) => M64pError::SUCCESS.0,
        Err(e) => {
            log::error!("PluginStartup: {e}");
            e.code().0
        }
    }
}

#[unsafe(export_name = "PluginShutdown")]
pub unsafe extern "C" fn plugin_shutdown() -> c_int {
    match plugin().shutdown() {
        Ok(()) => {
            logging::uninstall();
            M64pError::SUCCESS.0
        }
        Err(e) => {
            log::error!("PluginShutdown: {e}");
            e.code().0
        }
    }
}

#[unsafe(export_name = "PluginGetVersion")]
pub unsafe extern "C" fn plugin_get_version(
    plugin_type: *mut c_int,
    plugin_version: *mut c_int,
    api_version: *mut c_int,
    plugin_name: *mut *const c_char,
    capabilities: *mut c_int,
) -> c_int {
    // SAFETY: each pointer is either null or valid for a single write, per the host API.
    unsafe {
        if !plugin_type.is_null() {
            *plugin_type = VERSION_INFO.plugin_type;
        }
        if !plugin_version.is_null() {
            *plugin_version = VERSION_INFO.plugin_version;
        }
        if !api_version.is_null() {
            *api_version = VERSION_INFO.api_version;
        }
        if !plugin_name.is_null() {
            *plugin_name = VERSION_INFO.name.as_ptr();
        }
        if !capabilities.is_null() {
            *capabilities = VERSION_INFO.capabilities;
        }
    }
    M64pError::SUCCESS.0
}

#[unsafe(export_name = "InitiateControllers")]
pub unsafe extern "C" fn initiate_controllers(info: ControlInfo) {
    if info.controls.is_null() {
        log::warn!("InitiateControllers called without a controller array");
        return;
    }
    // SAFETY: the host passes an array of four CONTROL entries.
    let controls = unsafe { slice::from_raw_parts_mut(info.controls, MAX_CONTROLLERS) };
    plugin().initiate_controllers(controls);
}

#[unsafe(export_name = "ControllerCommand")]
pub unsafe extern "C" fn controller_command(control: c_int, command: *mut c_uchar) {
    if control < 0 {
        return;
    }
    if let Some(frame) = unsafe { command_frame(command) } {
        plugin().controller_command(control, frame);
    }
}

#[unsafe(export_name = "ReadController")]
pub unsafe extern "C" fn read_controller(control: c_int, command: *mut c_uchar) {
    if control < 0 {
        return;
    }
    if let Some(frame) = unsafe { command_frame(command) } {
        plugin().read_controller(control, frame);
    }
}

#[unsafe(export_name = "GetKeys")]
pub unsafe extern "C" fn get_keys(control: c_int, keys: *mut Buttons) {
    // SAFETY: the host passes null or a valid BUTTONS for the duration of the call.
    if let Some(keys) = unsafe { keys.as_mut() } {
        plugin().get_keys(control, keys);
    }
}

#[unsafe(export_name = "RomOpen")]
pub unsafe extern "C" fn rom_open() -> c_int {
    plugin().rom_open().is_ok().into()
}

#[unsafe(export_name = "RomClosed")]
pub unsafe extern "C" fn rom_closed() {
    plugin().rom_closed();
}

#[unsafe(export_name = "SDL_KeyDown")]
pub unsafe extern "C" fn sdl_key_down(keymod: c_int, keysym: c_int) {
    plugin().key_down(keymod, keysym);
}

#[unsafe(export_name = "SDL_KeyUp")]
pub unsafe extern "C" fn sdl_key_up(keymod: c_int, keysym: c_int) {
    plugin().key_up(keymod, keysym);
}
