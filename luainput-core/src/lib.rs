//! luainput-core: a Mupen64Plus input plugin whose controllers are implemented in Lua.
//!
//! The host drives the plugin through a fixed set of exports (see `crate::m64p_glue`).
//! Each one is forwarded to an entry point of a user script:
//! - The script file is run once per ROM session and must return a table of functions.
//! - Hooks are optional; a missing hook means "no behaviour".
//! - Script errors are logged through the host's debug callback and never reach the host.
//!
//! The ABI surface (host structs, hook names, script globals) is defined in `crate::abi`.
//!
//! Runtime backend: Lua 5.4 through `mlua::ffi` (see `crate::runtime`).

pub mod abi;
pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
mod input;
mod loader;
pub mod logging;
mod m64p_glue;
pub mod runtime;
pub mod state;

#[cfg(test)]
mod tests;

use crate::abi::{Control, MAX_CONTROLLERS, VERSION_INFO, hooks, version_split};
use crate::config::ConfigStore;
use crate::error::{CallError, EnvError, LoadError};
use crate::runtime::value::Value;
use crate::runtime::{EntryTable, ScriptEnvironment};
use crate::state::ControllerState;

/// Where the plugin is in the host-driven lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// Before `PluginStartup` or after `PluginShutdown`.
    Uninitialized,
    /// Runtime up, no script loaded.
    Initialized,
    /// A script's entry table is live.
    RomLoaded,
}

/// The plugin instance.
#[derive(Default)]
pub struct LuaInputPlugin {
    env: ScriptEnvironment,
    entry: Option<EntryTable>,
    controllers: [ControllerState; MAX_CONTROLLERS],
    config: Option<Box<dyn ConfigStore + Send>>,
}

impl LuaInputPlugin {
    pub fn state(&self) -> SessionState {
        if !self.env.is_started() {
            SessionState::Uninitialized
        } else if self.entry.is_some() {
            SessionState::RomLoaded
        } else {
            SessionState::Initialized
        }
    }

    pub fn controller(&self, slot: usize) -> Option<&ControllerState> {
        self.controllers.get(slot)
    }

    pub fn script_environment(&self) -> &ScriptEnvironment {
        &self.env
    }

    /// Start the script runtime and register the plugin's settings.
    pub fn startup(&mut self, mut config: Box<dyn ConfigStore + Send>) -> Result<(), EnvError> {
        self.env.start()?;

        if let Err(e) = config::register_defaults(config.as_mut()) {
            log::warn!("could not register default settings: {e:#}");
        }
        self.config = Some(config);
        self.controllers = Default::default();
        Ok(())
    }

    /// Close any open session and destroy the runtime.
    pub fn shutdown(&mut self) -> Result<(), EnvError> {
        if self.entry.is_some() {
            log::warn!("shutdown while a ROM is open; closing the script session first");
            self.rom_closed();
        }
        self.env.stop()?;
        self.config = None;
        self.controllers = Default::default();
        Ok(())
    }

    /// Load the script for a new ROM session (if not already loaded) and run `RomOpen`.
    pub fn rom_open(&mut self) -> Result<(), LoadError> {
        if let Err(e) = self.ensure_loaded() {
            log::error!("cannot open ROM session: {e}");
            return Err(e);
        }
        self.call_hook(hooks::ROM_OPEN, &[], 0);
        Ok(())
    }

    /// Run the `RomClosed` hook and release the script.
    pub fn rom_closed(&mut self) {
        if self.entry.is_none() {
            return;
        }
        self.call_hook(hooks::ROM_CLOSED, &[], 0);
        if let Some(table) = self.entry.take() {
            self.env.release_script(table);
        }
        log::debug!("script session closed");
    }

    /// Ask the script how each port is populated and report it to the host.
    ///
    /// Every entry of `controls` is reset first, so a failed load leaves the host
    /// with no controllers rather than stale ones.
    pub fn initiate_controllers(&mut self, controls: &mut [Control]) {
        self.controllers = Default::default();
        controls.fill(ControllerState::default().to_host());

        if !self.env.is_started() {
            log::warn!("InitiateControllers called before PluginStartup");
            return;
        }
        if let Err(e) = self.ensure_loaded() {
            log::error!("controllers left unplugged: {e}");
            return;
        }

        for slot in 0..MAX_CONTROLLERS {
            let state = match self.call_hook(hooks::INITIATE_CONTROLLER, &[Value::from(slot + 1)], 1) {
                Some(results) if results.is_empty() => ControllerState::unconfigured(slot),
                Some(results) => ControllerState::from_script(results.first()),
                None => ControllerState::default(),
            };

            self.controllers[slot] = state;
            if let Some(control) = controls.get_mut(slot) {
                *control = state.to_host();
            }
        }

        let (major, minor, patch) = version_split(VERSION_INFO.plugin_version);
        log::info!(
            "{} version {major}.{minor}.{patch} initialized.",
            VERSION_INFO.name.to_string_lossy()
        );
    }

    fn ensure_loaded(&mut self) -> Result<(), LoadError> {
        if self.entry.is_some() {
            return Ok(());
        }

        let path = match &self.config {
            Some(config) => config::script_path(config.as_ref()),
            None => config::default_script_path(),
        };
        let table = self.env.load_script(&path)?;
        log::info!("loaded input script {}", path.display());
        self.entry = Some(table);
        Ok(())
    }

    /// Invoke a hook of the live script.
    ///
    /// Returns `None` when no session is active or the call failed; failures are
    /// logged here so callers only decide what to do with results.
    fn call_hook(&self, name: &str, args: &[Value], results: usize) -> Option<Vec<Value>> {
        let table = self.entry.as_ref()?;
        match bridge::invoke(&self.env, Some(table), name, args, results) {
            Ok(values) => Some(values),
            Err(CallError::Runtime(msg)) => {
                log::error!("{name} failed: {msg}");
                None
            }
            Err(e) => {
                log::warn!("{name} skipped: {e}");
                None
            }
        }
    }
}
