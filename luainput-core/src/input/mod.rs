//! Per-frame input operations.
//!
//! Responsibilities:
//! - Poll the script for button state (`GetKeys`).
//! - Hand raw PIF commands to the script and copy its replies back.
//! - Forward keyboard events.
//!
//! All of these are silent no-ops unless a script session is live and the
//! controller number names one of the four ports.

use std::os::raw::c_int;

use crate::abi::{Buttons, hooks};
use crate::command::{self, CommandView};
use crate::runtime::value::Value;
use crate::state::slot_index;
use crate::{LuaInputPlugin, SessionState};

/// Arguments shared by the two raw command hooks.
fn command_args(slot: usize, view: &CommandView<'_>) -> [Value; 5] {
    [
        Value::from(slot + 1),
        Value::from(view.tx_len()),
        Value::from(view.rx_len()),
        Value::from(view.tx()),
        Value::from(view.rx()),
    ]
}

impl LuaInputPlugin {
    fn active_slot(&self, control: c_int) -> Option<usize> {
        if self.state() != SessionState::RomLoaded {
            return None;
        }
        slot_index(control)
    }

    /// Fill `keys` with the button mask for `control`.
    ///
    /// If the script has no answer, `keys` keeps whatever the host put there.
    pub fn get_keys(&mut self, control: c_int, keys: &mut Buttons) {
        let Some(slot) = self.active_slot(control) else {
            return;
        };
        let Some(results) = self.call_hook(hooks::GET_KEYS, &[Value::from(slot + 1)], 1) else {
            return;
        };
        let Some(mask) = results.first().and_then(Value::as_integer) else {
            return;
        };

        // Only the low 32 bits are meaningful to the host.
        let mask = mask as u32;
        self.controllers[slot].buttons = mask;
        keys.value = mask;
    }

    /// Notify the script of a raw command about to be processed.
    pub fn controller_command(&mut self, control: c_int, frame: &mut [u8]) {
        let Some(slot) = self.active_slot(control) else {
            return;
        };
        let view = match command::decode(frame) {
            Ok(view) => view,
            Err(e) => {
                log::warn!("ControllerCommand on port {}: {e}", slot + 1);
                return;
            }
        };
        self.call_hook(hooks::CONTROLLER_COMMAND, &command_args(slot, &view), 0);
    }

    /// Let the script answer a raw command by writing into the reply region.
    pub fn read_controller(&mut self, control: c_int, frame: &mut [u8]) {
        let Some(slot) = self.active_slot(control) else {
            return;
        };
        let mut view = match command::decode(frame) {
            Ok(view) => view,
            Err(e) => {
                log::warn!("ReadController on port {}: {e}", slot + 1);
                return;
            }
        };
        let Some(results) = self.call_hook(hooks::READ_CONTROLLER, &command_args(slot, &view), 1)
        else {
            return;
        };

        if let Some(reply) = results.first().and_then(Value::as_string_like) {
            let written = view.write_reply(&reply);
            if written < reply.len() {
                log::trace!(
                    "ReadController reply on port {} clamped from {} to {written} bytes",
                    slot + 1,
                    reply.len()
                );
            }
        }
    }

    pub fn key_down(&mut self, keymod: c_int, keysym: c_int) {
        self.key_event(hooks::KEY_DOWN, keymod, keysym);
    }

    pub fn key_up(&mut self, keymod: c_int, keysym: c_int) {
        self.key_event(hooks::KEY_UP, keymod, keysym);
    }

    fn key_event(&mut self, hook: &str, keymod: c_int, keysym: c_int) {
        if self.state() != SessionState::RomLoaded {
            return;
        }
        self.call_hook(hook, &[Value::from(keymod), Value::from(keysym)], 0);
    }
}
