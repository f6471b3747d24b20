//! Evaluation stack bookkeeping for raw Lua calls.

use std::ffi::CStr;
use std::os::raw::c_int;
use std::ptr;

use mlua::ffi::{self, lua_State};

use super::LuaRuntime;

/// Restores the Lua stack to the depth it had when the guard was created.
///
/// Every raw call path takes one of these first, so early returns and error
/// branches cannot leave values behind.
pub(crate) struct StackGuard<'rt> {
    runtime: &'rt LuaRuntime,
    top: c_int,
}

impl<'rt> StackGuard<'rt> {
    pub(crate) fn new(runtime: &'rt LuaRuntime) -> Self {
        // SAFETY: the runtime owns a live state for as long as the borrow lasts.
        let top = unsafe { ffi::lua_gettop(runtime.as_ptr()) };
        Self { runtime, top }
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        unsafe { ffi::lua_settop(self.runtime.as_ptr(), self.top) };
    }
}

/// Message handler installed under every protected call.
///
/// Turns the error object into a string and appends a traceback.
pub(crate) unsafe extern "C-unwind" fn traceback_handler(state: *mut lua_State) -> c_int {
    unsafe {
        let mut msg = ffi::lua_tostring(state, 1);
        if msg.is_null() {
            // Non-string error object: honour __tostring, else describe its type.
            msg = ffi::luaL_tolstring(state, 1, ptr::null_mut());
        }
        ffi::luaL_traceback(state, state, msg, 1);
        1
    }
}

/// Copy the string at `idx` without disturbing the stack.
pub(crate) unsafe fn error_message(state: *mut lua_State, idx: c_int) -> String {
    unsafe {
        if ffi::lua_type(state, idx) == ffi::LUA_TSTRING {
            let mut len = 0usize;
            let data = ffi::lua_tolstring(state, idx, &mut len);
            let bytes = std::slice::from_raw_parts(data as *const u8, len);
            return String::from_utf8_lossy(bytes).into_owned();
        }
        format!("(error object is a {} value)", type_name(state, idx))
    }
}

/// Lua type name of the value at `idx`.
pub(crate) unsafe fn type_name(state: *mut lua_State, idx: c_int) -> String {
    unsafe {
        let name = ffi::lua_typename(state, ffi::lua_type(state, idx));
        if name.is_null() {
            return "unknown".to_string();
        }
        CStr::from_ptr(name).to_string_lossy().into_owned()
    }
}
