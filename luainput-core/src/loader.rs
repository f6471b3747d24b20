//! Script loading: compile a Lua file, run it, and anchor the table it returns.

use std::ffi::CString;
use std::os::raw::c_int;
use std::path::Path;
use std::ptr;

use mlua::ffi::{self, lua_State};

use crate::error::LoadError;
use crate::runtime::LuaRuntime;
use crate::runtime::stack::{StackGuard, error_message, traceback_handler, type_name};

/// Load `path` into `rt` and return a registry reference to its result table.
pub(crate) fn load_entry_table(rt: &LuaRuntime, path: &Path) -> Result<c_int, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| LoadError::Load(format!("{}: path contains a NUL byte", path.display())))?;

    let state = rt.as_ptr();
    let _frame = StackGuard::new(rt);

    unsafe {
        if ffi::lua_checkstack(state, 4) == 0 {
            return Err(LoadError::Load("lua stack exhausted".to_string()));
        }

        ffi::lua_pushcfunction(state, traceback_handler);
        let handler = ffi::lua_gettop(state);

        if ffi::luaL_loadfilex(state, c_path.as_ptr(), ptr::null()) != ffi::LUA_OK {
            return Err(LoadError::Load(error_message(state, -1)));
        }

        if ffi::lua_pcall(state, 0, 1, handler) != ffi::LUA_OK {
            return Err(LoadError::Execution(error_message(state, -1)));
        }

        if ffi::lua_type(state, -1) != ffi::LUA_TTABLE {
            return Err(LoadError::NotATable(type_name(state, -1)));
        }

        ffi::lua_pushcfunction(state, anchor_table);
        ffi::lua_pushvalue(state, -2);
        if ffi::lua_pcall(state, 1, 1, handler) != ffi::LUA_OK {
            return Err(LoadError::Load(error_message(state, -1)));
        }
        // The guard drops the handler, the table and the returned reference.
        Ok(ffi::lua_tointegerx(state, -1, ptr::null_mut()) as c_int)
    }
}

/// `(table) -> reference`: `luaL_ref` may grow the registry, so it runs protected.
unsafe extern "C-unwind" fn anchor_table(state: *mut lua_State) -> c_int {
    unsafe {
        let reference = ffi::luaL_ref(state, ffi::LUA_REGISTRYINDEX);
        ffi::lua_pushinteger(state, reference.into());
    }
    1
}
