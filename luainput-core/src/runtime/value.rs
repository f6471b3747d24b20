//! Values passed to and returned from script entry points.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::os::raw::{c_int, c_void};
use std::ptr;

use mlua::ffi::{self, lua_State};

/// Nested tables deeper than this read back as `Nil`.
const MAX_TABLE_DEPTH: usize = 8;

/// Owned copy of a Lua value.
///
/// Results are copied out before the stack is unwound, so nothing here refers
/// back into the runtime.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Also stands in for missing results and types that do not cross the boundary.
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Bytes(Vec<u8>),
    /// String-keyed fields only.
    Table(BTreeMap<String, Value>),
}

impl Value {
    /// Integer view; floats with an exact integer value are accepted.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Self::Integer(n) => Some(n),
            Self::Number(n) if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 => {
                Some(n as i64)
            }
            _ => None,
        }
    }

    /// String view that also accepts numbers, as `tostring` would print them.
    ///
    /// Integral floats keep a trailing `.0`; other floats use the shortest
    /// representation that reads back to the same value.
    pub fn as_string_like(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Self::Bytes(b) => Some(Cow::Borrowed(b)),
            Self::Integer(n) => Some(Cow::Owned(n.to_string().into_bytes())),
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(Cow::Owned(format!("{n:.1}").into_bytes()))
            }
            Self::Number(n) => Some(Cow::Owned(n.to_string().into_bytes())),
            _ => None,
        }
    }

    /// Flag view used for host `c_int` booleans: `nil`, `false` and `0` are off.
    pub fn as_flag(&self) -> bool {
        match *self {
            Self::Nil => false,
            Self::Boolean(b) => b,
            Self::Integer(n) => n != 0,
            Self::Number(n) => n != 0.0,
            _ => true,
        }
    }

    /// Field of a table value.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Table(fields) => fields.get(key),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Integer(n as i64)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }
}

/// Stack slots needed to push `value`.
pub(crate) fn push_slots(value: &Value) -> usize {
    match value {
        Value::Table(fields) => 3 + fields.values().map(push_slots).max().unwrap_or(0),
        _ => 1,
    }
}

/// Push `value` onto the stack. Callers reserve [`push_slots`] first.
pub(crate) unsafe fn push(state: *mut lua_State, value: &Value) {
    unsafe {
        match value {
            Value::Nil => ffi::lua_pushnil(state),
            Value::Boolean(b) => ffi::lua_pushboolean(state, *b as c_int),
            Value::Integer(n) => ffi::lua_pushinteger(state, *n),
            Value::Number(n) => ffi::lua_pushnumber(state, *n),
            Value::Bytes(b) => {
                ffi::lua_pushlstring(state, b.as_ptr().cast(), b.len());
            }
            Value::Table(fields) => {
                let nrec = c_int::try_from(fields.len()).unwrap_or(0);
                ffi::lua_createtable(state, 0, nrec);
                let table = ffi::lua_gettop(state);
                for (key, field) in fields {
                    ffi::lua_pushlstring(state, key.as_ptr().cast(), key.len());
                    push(state, field);
                    ffi::lua_rawset(state, table);
                }
            }
        }
    }
}

/// Copy the value at `idx` out of the runtime. The stack is left as it was.
///
/// Each table is copied at most once per read; any further reference to it
/// (a cycle or a shared subtable) reads back as `Nil`.
pub(crate) unsafe fn read(state: *mut lua_State, idx: c_int) -> Value {
    let mut reader = TableReader {
        state,
        seen: HashSet::new(),
    };
    unsafe { reader.read_at_depth(ffi::lua_absindex(state, idx), 0) }
}

struct TableReader {
    state: *mut lua_State,
    seen: HashSet<*const c_void>,
}

impl TableReader {
    unsafe fn read_at_depth(&mut self, idx: c_int, depth: usize) -> Value {
        let state = self.state;
        unsafe {
            match ffi::lua_type(state, idx) {
                ffi::LUA_TBOOLEAN => Value::Boolean(ffi::lua_toboolean(state, idx) != 0),
                ffi::LUA_TNUMBER => {
                    if ffi::lua_isinteger(state, idx) != 0 {
                        Value::Integer(ffi::lua_tointegerx(state, idx, ptr::null_mut()))
                    } else {
                        Value::Number(ffi::lua_tonumberx(state, idx, ptr::null_mut()))
                    }
                }
                ffi::LUA_TSTRING => Value::Bytes(string_bytes(state, idx)),
                ffi::LUA_TTABLE if depth < MAX_TABLE_DEPTH => {
                    if self.seen.insert(ffi::lua_topointer(state, idx)) {
                        self.read_table(idx, depth)
                    } else {
                        Value::Nil
                    }
                }
                _ => Value::Nil,
            }
        }
    }

    unsafe fn read_table(&mut self, idx: c_int, depth: usize) -> Value {
        let state = self.state;
        unsafe {
            let mut fields = BTreeMap::new();
            if ffi::lua_checkstack(state, 2) == 0 {
                return Value::Table(fields);
            }

            ffi::lua_pushnil(state);
            while ffi::lua_next(state, idx) != 0 {
                // Only string keys are copied; `lua_tolstring` on other key types would
                // convert them in place and break the traversal.
                if ffi::lua_type(state, -2) == ffi::LUA_TSTRING {
                    let key = String::from_utf8_lossy(&string_bytes(state, -2)).into_owned();
                    let value = self.read_at_depth(ffi::lua_gettop(state), depth + 1);
                    fields.insert(key, value);
                }
                ffi::lua_pop(state, 1);
            }
            Value::Table(fields)
        }
    }
}

unsafe fn string_bytes(state: *mut lua_State, idx: c_int) -> Vec<u8> {
    unsafe {
        let mut len = 0usize;
        let data = ffi::lua_tolstring(state, idx, &mut len);
        if data.is_null() {
            return Vec::new();
        }
        std::slice::from_raw_parts(data as *const u8, len).to_vec()
    }
}
