//! Configuration access.
//!
//! The plugin reads one setting: the path of the Lua script. On a real host the
//! value lives in the core's configuration system (`mupen64plus.cfg`), reached
//! through function pointers exported by the core library. `MemoryConfig` stands
//! in when those are unavailable and in tests.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use std::ptr;

use anyhow::{Context, anyhow, bail};

use crate::abi::{
    ConfigGetParamStringFn, ConfigOpenSectionFn, ConfigSetDefaultStringFn, M64pDynlibHandle,
    M64pError, M64pHandle,
};

pub const SECTION: &str = "Input-Lua";
pub const SCRIPT_KEY: &str = "LuaScript";
pub const SCRIPT_HELP: &str = "Path to the Lua script implementing the controllers";

/// Key/value settings grouped in sections.
pub trait ConfigStore {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Register `key` with a default value; existing values are kept.
    fn set_default_string(
        &mut self,
        section: &str,
        key: &str,
        default: &str,
        help: &str,
    ) -> anyhow::Result<()>;
}

/// Script path used when nothing is configured.
pub fn default_script_path() -> PathBuf {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    match home {
        Some(home) => PathBuf::from(home)
            .join(".config")
            .join("mupen64plus")
            .join("mupen.lua"),
        None => PathBuf::from("mupen.lua"),
    }
}

/// Configured script path, falling back to [`default_script_path`].
pub fn script_path(config: &dyn ConfigStore) -> PathBuf {
    config
        .get_string(SECTION, SCRIPT_KEY)
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_script_path)
}

/// Register the plugin's settings with their defaults.
pub fn register_defaults(config: &mut dyn ConfigStore) -> anyhow::Result<()> {
    let default = default_script_path();
    config.set_default_string(SECTION, SCRIPT_KEY, &default.to_string_lossy(), SCRIPT_HELP)
}

/// In-process settings.
#[derive(Debug, Default, Clone)]
pub struct MemoryConfig {
    values: HashMap<(String, String), String>,
}

impl MemoryConfig {
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.values
            .insert((section.to_string(), key.to_string()), value.into());
    }
}

impl ConfigStore for MemoryConfig {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }

    fn set_default_string(
        &mut self,
        section: &str,
        key: &str,
        default: &str,
        _help: &str,
    ) -> anyhow::Result<()> {
        self.values
            .entry((section.to_string(), key.to_string()))
            .or_insert_with(|| default.to_string());
        Ok(())
    }
}

/// Settings stored by the emulator core.
#[derive(Clone, Copy)]
pub struct HostConfig {
    open_section: ConfigOpenSectionFn,
    set_default_string: ConfigSetDefaultStringFn,
    get_param_string: ConfigGetParamStringFn,
}

impl HostConfig {
    /// Look up the configuration functions in the core library.
    ///
    /// # Safety
    /// `core` must be the library handle the host passed to `PluginStartup`.
    #[cfg(unix)]
    pub unsafe fn resolve(core: M64pDynlibHandle) -> anyhow::Result<Self> {
        use crate::abi::core_symbols;

        if core.is_null() {
            bail!("core library handle is null");
        }

        let lookup = |name: &CStr| {
            // SAFETY: `core` is a live dlopen handle per the caller's contract.
            let sym = unsafe { libc::dlsym(core, name.as_ptr()) };
            if sym.is_null() {
                Err(anyhow!("core does not export {}", name.to_string_lossy()))
            } else {
                Ok(sym)
            }
        };

        let open_section = lookup(core_symbols::CONFIG_OPEN_SECTION)?;
        let set_default_string = lookup(core_symbols::CONFIG_SET_DEFAULT_STRING)?;
        let get_param_string = lookup(core_symbols::CONFIG_GET_PARAM_STRING)?;

        // SAFETY: the symbols are the documented Mupen64Plus config API.
        unsafe {
            Ok(Self {
                open_section: std::mem::transmute::<*mut libc::c_void, ConfigOpenSectionFn>(
                    open_section,
                ),
                set_default_string: std::mem::transmute::<
                    *mut libc::c_void,
                    ConfigSetDefaultStringFn,
                >(set_default_string),
                get_param_string: std::mem::transmute::<*mut libc::c_void, ConfigGetParamStringFn>(
                    get_param_string,
                ),
            })
        }
    }

    #[cfg(not(unix))]
    pub unsafe fn resolve(_core: M64pDynlibHandle) -> anyhow::Result<Self> {
        bail!("core symbol lookup is only implemented for unix hosts")
    }

    fn section(&self, name: &str) -> anyhow::Result<M64pHandle> {
        let c_name = CString::new(name).context("section name contains NUL")?;
        let mut handle: M64pHandle = ptr::null_mut();
        let status = M64pError(unsafe { (self.open_section)(c_name.as_ptr(), &mut handle) });
        if !status.is_success() || handle.is_null() {
            bail!("ConfigOpenSection({name}) failed with status {}", status.0);
        }
        Ok(handle)
    }
}

impl ConfigStore for HostConfig {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        let handle = self.section(section).ok()?;
        let c_key = CString::new(key).ok()?;
        let value = unsafe { (self.get_param_string)(handle, c_key.as_ptr()) };
        if value.is_null() {
            return None;
        }
        // SAFETY: the core returns a NUL-terminated string it keeps alive.
        Some(unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned())
    }

    fn set_default_string(
        &mut self,
        section: &str,
        key: &str,
        default: &str,
        help: &str,
    ) -> anyhow::Result<()> {
        let handle = self.section(section)?;
        let c_key = CString::new(key).context("key contains NUL")?;
        let c_default = CString::new(default).context("default value contains NUL")?;
        let c_help = CString::new(help).context("help text contains NUL")?;

        let status = M64pError(unsafe {
            (self.set_default_string)(handle, c_key.as_ptr(), c_default.as_ptr(), c_help.as_ptr())
        });
        if !status.is_success() {
            bail!("ConfigSetDefaultString({section}.{key}) failed with status {}", status.0);
        }
        Ok(())
    }
}
