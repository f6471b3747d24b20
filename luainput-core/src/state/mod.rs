//! Per-controller state cached by the plugin.
//!
//! The host keeps its own `Control` array; this module owns the plugin-side copy
//! and the translation between script values and host fields.

use std::ffi::CStr;
use std::os::raw::c_int;

use crate::abi::{Control, MAX_CONTROLLERS, controller_fields, host_pak};
use crate::runtime::value::Value;

/// Accessory plugged into a controller.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PakType {
    #[default]
    None,
    MemPak,
    RumblePak,
    TransferPak,
    Raw,
}

impl PakType {
    pub const ALL: [PakType; 5] = [
        PakType::None,
        PakType::MemPak,
        PakType::RumblePak,
        PakType::TransferPak,
        PakType::Raw,
    ];

    /// Id exposed to scripts through the `PAK_*` globals.
    pub fn script_id(self) -> i64 {
        match self {
            Self::None => 0,
            Self::MemPak => 1,
            Self::RumblePak => 2,
            Self::TransferPak => 3,
            Self::Raw => 4,
        }
    }

    pub fn from_script_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|pak| pak.script_id() == id)
    }

    /// Id written to `Control::plugin`.
    pub fn host_id(self) -> c_int {
        match self {
            Self::None => host_pak::NONE,
            Self::MemPak => host_pak::MEMPAK,
            Self::RumblePak => host_pak::RUMBLE_PAK,
            Self::TransferPak => host_pak::TRANSFER_PAK,
            Self::Raw => host_pak::RAW,
        }
    }

    /// Lua global holding [`PakType::script_id`].
    pub fn global_name(self) -> &'static CStr {
        match self {
            Self::None => c"PAK_NONE",
            Self::MemPak => c"PAK_MEMPAK",
            Self::RumblePak => c"PAK_RUMBLEPAK",
            Self::TransferPak => c"PAK_TRANSFERPAK",
            Self::Raw => c"PAK_RAW",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ControllerState {
    pub present: bool,
    pub raw_mode: bool,
    pub pak: PakType,
    /// Last bitmask returned by the `GetKeys` hook.
    pub buttons: u32,
}

impl ControllerState {
    /// Build a state from an `InitiateController` result.
    ///
    /// Anything other than a table means the port is empty.
    pub fn from_script(value: Option<&Value>) -> Self {
        let Some(value @ Value::Table(_)) = value else {
            return Self::default();
        };

        let flag = |key| value.field(key).is_some_and(Value::as_flag);
        let pak = value
            .field(controller_fields::PLUGIN)
            .and_then(Value::as_integer)
            .and_then(PakType::from_script_id)
            .unwrap_or_default();

        Self {
            present: flag(controller_fields::PRESENT),
            raw_mode: flag(controller_fields::RAW_DATA),
            pak,
            buttons: 0,
        }
    }

    /// State used when the script defines no `InitiateController` hook: the first
    /// port is a raw controller, the rest are empty.
    pub fn unconfigured(slot: usize) -> Self {
        Self {
            present: slot == 0,
            raw_mode: slot == 0,
            ..Self::default()
        }
    }

    pub fn to_host(&self) -> Control {
        Control {
            present: self.present.into(),
            raw_data: self.raw_mode.into(),
            plugin: self.pak.host_id(),
        }
    }
}

/// Map a host controller number to a slot index, rejecting anything outside 0..4.
pub fn slot_index(control: c_int) -> Option<usize> {
    usize::try_from(control)
        .ok()
        .filter(|&slot| slot < MAX_CONTROLLERS)
}
