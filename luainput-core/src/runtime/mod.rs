//! Script environment: owns the Lua state and the entry tables loaded into it.
//!
//! The plugin uses the raw C API (`mlua::ffi`) rather than mlua's safe wrapper so
//! the bridge can reason about stack depth, registry references and the message
//! handler explicitly.

pub mod stack;
pub mod value;

use std::os::raw::c_int;
use std::path::Path;
use std::ptr::NonNull;

use mlua::ffi::{self, lua_State};

use crate::error::{EnvError, LoadError};
use crate::loader;
use crate::state::PakType;

/// One Lua state with the standard library and the plugin's globals installed.
pub struct LuaRuntime {
    state: NonNull<lua_State>,
}

// The state is only touched through `&LuaRuntime`/`&mut LuaRuntime`, and the glue
// keeps the single instance behind a mutex.
unsafe impl Send for LuaRuntime {}

impl LuaRuntime {
    pub fn new() -> Result<Self, EnvError> {
        // SAFETY: plain constructor; null means allocation failure.
        let raw = unsafe { ffi::luaL_newstate() };
        let state = NonNull::new(raw).ok_or(EnvError::CreateFailed)?;
        let rt = Self { state };

        // Library setup allocates; run it protected so a failure is an error
        // instead of a Lua panic.
        unsafe {
            ffi::lua_pushcfunction(rt.as_ptr(), open_environment);
            if ffi::lua_pcall(rt.as_ptr(), 0, 0, 0) != ffi::LUA_OK {
                return Err(EnvError::CreateFailed);
            }
        }
        Ok(rt)
    }

    pub(crate) fn as_ptr(&self) -> *mut lua_State {
        self.state.as_ptr()
    }

    /// Current number of values on the evaluation stack.
    pub fn stack_depth(&self) -> i32 {
        unsafe { ffi::lua_gettop(self.as_ptr()) }
    }
}

/// Standard library plus the `PAK_*` globals.
unsafe extern "C-unwind" fn open_environment(state: *mut lua_State) -> c_int {
    unsafe {
        ffi::luaL_openlibs(state);
        for pak in PakType::ALL {
            ffi::lua_pushinteger(state, pak.script_id());
            ffi::lua_setglobal(state, pak.global_name().as_ptr());
        }
    }
    0
}

impl Drop for LuaRuntime {
    fn drop(&mut self) {
        unsafe { ffi::lua_close(self.as_ptr()) };
    }
}

/// Durable reference to the table a script returned.
///
/// Only obtainable from [`ScriptEnvironment::load_script`] and consumed by
/// [`ScriptEnvironment::release_script`], so it cannot be released twice.
#[derive(Debug)]
#[must_use = "an entry table must be released with ScriptEnvironment::release_script"]
pub struct EntryTable {
    reference: c_int,
    generation: u64,
}

impl EntryTable {
    pub(crate) fn reference(&self) -> c_int {
        self.reference
    }
}

/// Lifecycle owner for the Lua runtime.
#[derive(Default)]
pub struct ScriptEnvironment {
    runtime: Option<LuaRuntime>,
    /// Bumped on every start so tables from a previous runtime are recognized.
    generation: u64,
}

impl ScriptEnvironment {
    pub fn start(&mut self) -> Result<(), EnvError> {
        if self.runtime.is_some() {
            return Err(EnvError::AlreadyInitialized);
        }
        self.runtime = Some(LuaRuntime::new()?);
        self.generation += 1;
        log::debug!("lua runtime started (generation {})", self.generation);
        Ok(())
    }

    /// Destroy the runtime. Outstanding entry tables become stale.
    pub fn stop(&mut self) -> Result<(), EnvError> {
        match self.runtime.take() {
            Some(rt) => {
                drop(rt);
                log::debug!("lua runtime stopped (generation {})", self.generation);
                Ok(())
            }
            None => Err(EnvError::NotInitialized),
        }
    }

    pub fn is_started(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn runtime(&self) -> Option<&LuaRuntime> {
        self.runtime.as_ref()
    }

    /// The runtime `table` was loaded into, if it is still alive.
    pub(crate) fn runtime_for(&self, table: &EntryTable) -> Option<&LuaRuntime> {
        self.runtime
            .as_ref()
            .filter(|_| table.generation == self.generation)
    }

    /// Compile and run the file at `path`, keeping the table it returns.
    pub fn load_script(&mut self, path: &Path) -> Result<EntryTable, LoadError> {
        let rt = self.runtime.as_ref().ok_or(EnvError::NotInitialized)?;
        let reference = loader::load_entry_table(rt, path)?;
        Ok(EntryTable {
            reference,
            generation: self.generation,
        })
    }

    /// Drop the durable reference held by `table`.
    pub fn release_script(&mut self, table: EntryTable) {
        let Some(rt) = self.runtime_for(&table) else {
            // Its runtime is gone and took the registry with it.
            return;
        };
        unsafe { ffi::luaL_unref(rt.as_ptr(), ffi::LUA_REGISTRYINDEX, table.reference) };
    }
}
