//! Call bridge: invoke a named entry point of the loaded script.
//!
//! Every call runs under a traceback message handler and a [`StackGuard`], so the
//! Lua stack is back at its entry depth on every exit path: success, a missing
//! entry point, a script error, or an argument list that does not fit.

use std::os::raw::c_int;
use std::ptr;

use mlua::ffi::{self, lua_State};

use crate::error::CallError;
use crate::runtime::stack::{StackGuard, error_message, traceback_handler};
use crate::runtime::value::{self, Value};
use crate::runtime::{EntryTable, ScriptEnvironment};

/// Slots used besides arguments and results: handler, entry table, and the
/// resolver call (`prepare_call`, its setup pointer, a copy of the table).
const FRAME_SLOTS: usize = 5;

/// Call `table[name](args...)` and collect exactly `results` values.
///
/// An entry point that is absent or not a function yields an empty list. Scripts
/// returning fewer values than requested are padded with [`Value::Nil`].
pub fn invoke(
    env: &ScriptEnvironment,
    table: Option<&EntryTable>,
    name: &str,
    args: &[Value],
    results: usize,
) -> Result<Vec<Value>, CallError> {
    let table = table.ok_or(CallError::NoActiveSession)?;
    let rt = env.runtime_for(table).ok_or(CallError::NoActiveSession)?;

    let nargs = c_int::try_from(args.len())
        .map_err(|_| CallError::Argument(format!("{} arguments", args.len())))?;
    let nresults = c_int::try_from(results)
        .map_err(|_| CallError::Argument(format!("{results} results requested")))?;
    let slots = args.iter().map(value::push_slots).sum::<usize>() + results + FRAME_SLOTS;
    let slots = c_int::try_from(slots)
        .map_err(|_| CallError::Argument(format!("{slots} stack slots needed")))?;

    let state = rt.as_ptr();
    let _frame = StackGuard::new(rt);
    let mut setup = CallSetup { name, args, slots };

    unsafe {
        if ffi::lua_checkstack(state, slots) == 0 {
            return Err(CallError::Argument(format!(
                "cannot reserve {slots} stack slots for {name}"
            )));
        }

        ffi::lua_pushcfunction(state, traceback_handler);
        let handler = ffi::lua_gettop(state);

        if ffi::lua_rawgeti(state, ffi::LUA_REGISTRYINDEX, table.reference().into()) != ffi::LUA_TTABLE {
            return Err(CallError::NoActiveSession);
        }
        let entries = ffi::lua_gettop(state);

        // Resolve the entry point and push the arguments under protection: both
        // allocate, and an allocation failure outside `pcall` would abort.
        ffi::lua_pushcfunction(state, prepare_call);
        ffi::lua_pushlightuserdata(state, (&raw mut setup).cast());
        ffi::lua_pushvalue(state, entries);
        if ffi::lua_pcall(state, 2, ffi::LUA_MULTRET, handler) != ffi::LUA_OK {
            return Err(CallError::Runtime(error_message(state, -1)));
        }
        if ffi::lua_gettop(state) == entries {
            return Ok(Vec::new());
        }

        if ffi::lua_pcall(state, nargs, nresults, handler) != ffi::LUA_OK {
            return Err(CallError::Runtime(error_message(state, -1)));
        }

        let first = ffi::lua_gettop(state) - nresults + 1;
        Ok((first..first + nresults)
            .map(|idx| value::read(state, idx))
            .collect())
    }
}

struct CallSetup<'a> {
    name: &'a str,
    args: &'a [Value],
    slots: c_int,
}

/// Protected half of [`invoke`]: `(setup, entries) -> function, args...`.
///
/// Returns nothing when the entry point is absent or not a function.
unsafe extern "C-unwind" fn prepare_call(state: *mut lua_State) -> c_int {
    unsafe {
        let setup = &*ffi::lua_touserdata(state, 1).cast::<CallSetup<'_>>();
        ffi::luaL_checkstack(state, setup.slots, ptr::null());

        ffi::lua_pushlstring(state, setup.name.as_ptr().cast(), setup.name.len());
        if ffi::lua_rawget(state, 2) != ffi::LUA_TFUNCTION {
            return 0;
        }
        for arg in setup.args {
            value::push(state, arg);
        }
        // `invoke` already checked that the argument count fits.
        setup.args.len() as c_int + 1
    }
}
