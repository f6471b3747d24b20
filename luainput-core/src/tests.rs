use std::io::Write;

use tempfile::NamedTempFile;

use crate::abi::{Buttons, Control, MAX_CONTROLLERS, host_pak};
use crate::config::{MemoryConfig, SCRIPT_KEY, SECTION};
use crate::error::{EnvError, LoadError};
use crate::state::{ControllerState, PakType};
use crate::{LuaInputPlugin, SessionState};

fn script(contents: &str) -> NamedTempFile {
    let mut temp = NamedTempFile::new().expect("temp script");
    write!(temp, "{contents}").expect("write script");
    temp
}

fn config_for(path: &std::path::Path) -> Box<MemoryConfig> {
    let mut config = MemoryConfig::default();
    config.set(SECTION, SCRIPT_KEY, path.to_string_lossy());
    Box::new(config)
}

fn started(script: &NamedTempFile) -> LuaInputPlugin {
    let mut plugin = LuaInputPlugin::default();
    plugin.startup(config_for(script.path())).expect("startup");
    plugin
}

fn loaded(script: &NamedTempFile) -> LuaInputPlugin {
    let mut plugin = started(script);
    plugin.rom_open().expect("rom open");
    assert_eq!(plugin.state(), SessionState::RomLoaded);
    plugin
}

/// PIF frame with `tx` request bytes, an `rx_len` reply region filled with 0xFF,
/// and two sentinel bytes after the frame.
fn pif_frame(tx: &[u8], rx_len: u8) -> Vec<u8> {
    let mut buf = vec![tx.len() as u8, rx_len];
    buf.extend_from_slice(tx);
    buf.extend(std::iter::repeat_n(0xFF, rx_len as usize));
    buf.extend([0xFE, 0xFE]);
    buf
}

const FIRST_PORT_ONLY: &str = r#"
    local M = {}
    function M.InitiateController(n)
        if n == 1 then
            return { Present = true, RawData = true, Plugin = 0 }
        end
        return { Present = false }
    end
    return M
"#;

#[test]
fn initiate_controllers_reports_script_configuration() {
    let file = script(FIRST_PORT_ONLY);
    let mut plugin = loaded(&file);

    let mut controls = [Control {
        present: 7,
        raw_data: 7,
        plugin: 7,
    }; MAX_CONTROLLERS];
    plugin.initiate_controllers(&mut controls);

    assert_eq!(
        controls[0],
        Control {
            present: 1,
            raw_data: 1,
            plugin: host_pak::NONE
        }
    );
    for control in &controls[1..] {
        assert_eq!(control.present, 0);
        assert_eq!(control.raw_data, 0);
        assert_eq!(control.plugin, host_pak::NONE);
    }
}

#[test]
fn initiate_controllers_loads_the_script_when_it_comes_first() {
    let file = script(FIRST_PORT_ONLY);
    let mut plugin = started(&file);
    assert_eq!(plugin.state(), SessionState::Initialized);

    let mut controls = [Control::default(); MAX_CONTROLLERS];
    plugin.initiate_controllers(&mut controls);
    assert_eq!(plugin.state(), SessionState::RomLoaded);
    assert_eq!(controls[0].present, 1);

    // RomOpen reuses the session instead of loading a second copy.
    plugin.rom_open().expect("rom open");
    assert_eq!(plugin.state(), SessionState::RomLoaded);
}

#[test]
fn pak_constants_map_to_host_ids() {
    let file = script(
        r#"
        local paks = { PAK_MEMPAK, PAK_RUMBLEPAK, PAK_TRANSFERPAK, PAK_RAW }
        return {
            InitiateController = function(n)
                return { Present = 1, RawData = 0, Plugin = paks[n] }
            end,
        }
        "#,
    );
    let mut plugin = loaded(&file);

    let mut controls = [Control::default(); MAX_CONTROLLERS];
    plugin.initiate_controllers(&mut controls);

    let plugins: Vec<_> = controls.iter().map(|c| c.plugin).collect();
    assert_eq!(
        plugins,
        vec![
            host_pak::MEMPAK,
            host_pak::RUMBLE_PAK,
            host_pak::TRANSFER_PAK,
            host_pak::RAW
        ]
    );
    assert_eq!(
        plugin.controller(1).map(|c| c.pak),
        Some(PakType::RumblePak)
    );
    assert!(controls.iter().all(|c| c.present == 1 && c.raw_data == 0));
}

#[test]
fn self_referencing_controller_table_is_read_once() {
    let file = script(
        r#"
        local ctx = {}
        for i = 1, 16 do ctx["k" .. i] = ctx end
        return {
            InitiateController = function(n)
                return { Present = true, RawData = true, Plugin = PAK_RAW, Ctx = ctx }
            end,
        }
        "#,
    );
    let mut plugin = loaded(&file);

    let mut controls = [Control::default(); MAX_CONTROLLERS];
    plugin.initiate_controllers(&mut controls);

    assert!(controls.iter().all(|c| *c
        == Control {
            present: 1,
            raw_data: 1,
            plugin: host_pak::RAW
        }));
}

#[test]
fn missing_initiate_hook_exposes_one_raw_controller() {
    let file = script("return {}");
    let mut plugin = loaded(&file);

    let mut controls = [Control::default(); MAX_CONTROLLERS];
    plugin.initiate_controllers(&mut controls);

    assert_eq!(controls[0], ControllerState::unconfigured(0).to_host());
    assert_eq!((controls[0].present, controls[0].raw_data), (1, 1));
    assert!(controls[1..].iter().all(|c| c.present == 0));
}

#[test]
fn failing_initiate_hook_leaves_port_empty() {
    let file = script(
        r#"
        return {
            InitiateController = function(n)
                if n == 2 then error("port two is broken") end
                return { Present = true }
            end,
        }
        "#,
    );
    let mut plugin = loaded(&file);

    let mut controls = [Control::default(); MAX_CONTROLLERS];
    plugin.initiate_controllers(&mut controls);

    let present: Vec<_> = controls.iter().map(|c| c.present).collect();
    assert_eq!(present, vec![1, 0, 1, 1]);
}

#[test]
fn failed_load_resets_host_controls() {
    let mut plugin = LuaInputPlugin::default();
    plugin
        .startup(config_for(std::path::Path::new("/nonexistent/mupen.lua")))
        .expect("startup");

    let mut controls = [Control {
        present: 1,
        raw_data: 1,
        plugin: host_pak::RAW,
    }; MAX_CONTROLLERS];
    plugin.initiate_controllers(&mut controls);

    assert!(controls.iter().all(|c| *c == Control::default()));
    assert_eq!(plugin.state(), SessionState::Initialized);
}

#[test]
fn get_keys_keeps_last_value_when_hook_fails() {
    let file = script(
        r#"
        local calls = 0
        return {
            GetKeys = function(n)
                calls = calls + 1
                if calls > 1 then error("controller unplugged") end
                return 0x0080
            end,
        }
        "#,
    );
    let mut plugin = loaded(&file);

    let mut keys = Buttons::default();
    plugin.get_keys(0, &mut keys);
    assert_eq!(keys.value, 0x0080);
    assert_eq!(plugin.controller(0).map(|c| c.buttons), Some(0x0080));

    plugin.get_keys(0, &mut keys);
    assert_eq!(keys.value, 0x0080);
    assert_eq!(plugin.controller(0).map(|c| c.buttons), Some(0x0080));
}

#[test]
fn get_keys_passes_one_based_port_and_ignores_bad_ports() {
    let file = script("return { GetKeys = function(n) return n * 16 end }");
    let mut plugin = loaded(&file);

    let mut keys = Buttons::default();
    plugin.get_keys(2, &mut keys);
    assert_eq!(keys.value, 3 * 16);

    let mut untouched = Buttons { value: 0xDEAD };
    plugin.get_keys(4, &mut untouched);
    plugin.get_keys(-1, &mut untouched);
    assert_eq!(untouched.value, 0xDEAD);
}

#[test]
fn get_keys_ignores_non_integer_results() {
    let file = script("return { GetKeys = function() return 'A' end }");
    let mut plugin = loaded(&file);

    let mut keys = Buttons { value: 0x1234 };
    plugin.get_keys(0, &mut keys);
    assert_eq!(keys.value, 0x1234);
}

const ECHO_REPLY: &str = r#"
    local last
    return {
        ControllerCommand = function(n, tx_len, rx_len, tx, rx)
            last = { n = n, tx_len = tx_len, rx_len = rx_len, tx = tx, rx = rx }
        end,
        ReadController = function(n, tx_len, rx_len, tx, rx)
            if tx == "exact" then return "\1\2\3" end
            if tx == "long" then return "\1\2\3\4\5\6\7\8" end
            if tx == "short" then return "\9" end
            if tx == "last" then
                return string.char(last.n, last.tx_len, last.rx_len) .. last.tx .. last.rx
            end
            return nil
        end,
    }
"#;

#[test]
fn read_controller_writes_reply_of_exact_length() {
    let file = script(ECHO_REPLY);
    let mut plugin = loaded(&file);

    let mut buf = pif_frame(b"exact", 3);
    plugin.read_controller(0, &mut buf);
    assert_eq!(&buf[7..10], &[1, 2, 3]);
    assert_eq!(&buf[10..], &[0xFE, 0xFE]);
}

#[test]
fn read_controller_clamps_long_replies() {
    let file = script(ECHO_REPLY);
    let mut plugin = loaded(&file);

    let mut buf = pif_frame(b"long", 3);
    let header_and_tx = buf[..6].to_vec();
    plugin.read_controller(1, &mut buf);

    assert_eq!(&buf[..6], &header_and_tx[..]);
    assert_eq!(&buf[6..9], &[1, 2, 3]);
    assert_eq!(&buf[9..], &[0xFE, 0xFE]);
}

#[test]
fn read_controller_short_reply_keeps_tail() {
    let file = script(ECHO_REPLY);
    let mut plugin = loaded(&file);

    let mut buf = pif_frame(b"short", 3);
    plugin.read_controller(0, &mut buf);
    assert_eq!(&buf[7..10], &[9, 0xFF, 0xFF]);
}

#[test]
fn read_controller_without_reply_changes_nothing() {
    let file = script(ECHO_REPLY);
    let mut plugin = loaded(&file);

    let mut buf = pif_frame(b"other", 4);
    let before = buf.clone();
    plugin.read_controller(0, &mut buf);
    assert_eq!(buf, before);
}

#[test]
fn read_controller_accepts_numeric_replies_as_text() {
    let file = script("return { ReadController = function() return 123 end }");
    let mut plugin = loaded(&file);

    let mut buf = pif_frame(b"n", 3);
    plugin.read_controller(0, &mut buf);
    assert_eq!(&buf[3..6], b"123");
    assert_eq!(&buf[6..], &[0xFE, 0xFE]);
}

#[test]
fn controller_command_sees_frame_contents() {
    let file = script(ECHO_REPLY);
    let mut plugin = loaded(&file);

    let mut command = pif_frame(&[0xAB, 0xCD], 2);
    plugin.controller_command(3, &mut command);

    // Reply: port, tx_len, rx_len, tx bytes, rx snapshot.
    let mut read = pif_frame(b"last", 8);
    plugin.read_controller(0, &mut read);
    assert_eq!(&read[6..14], &[4, 2, 2, 0xAB, 0xCD, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn truncated_command_is_dropped() {
    let file = script(ECHO_REPLY);
    let mut plugin = loaded(&file);

    let mut buf = vec![5, 3, 0x00];
    plugin.read_controller(0, &mut buf);
    assert_eq!(buf, vec![5, 3, 0x00]);
}

#[test]
fn per_frame_calls_without_rom_are_noops() {
    let file = script(
        r#"
        return {
            GetKeys = function() return 0xFFFF end,
            ReadController = function() return "\0\0\0" end,
        }
        "#,
    );

    let mut plugin = LuaInputPlugin::default();
    let mut keys = Buttons { value: 0x0042 };
    let mut buf = pif_frame(b"x", 3);
    let before = buf.clone();

    for state in [SessionState::Uninitialized, SessionState::Initialized] {
        if state == SessionState::Initialized {
            plugin.startup(config_for(file.path())).expect("startup");
        }
        assert_eq!(plugin.state(), state);

        plugin.get_keys(0, &mut keys);
        plugin.controller_command(0, &mut buf);
        plugin.read_controller(0, &mut buf);
        plugin.key_down(0, 32);
        plugin.key_up(0, 32);
        plugin.rom_closed();

        assert_eq!(keys.value, 0x0042);
        assert_eq!(buf, before);
        assert_eq!(plugin.controller(0), Some(&ControllerState::default()));
    }
}

#[test]
fn key_events_reach_the_script() {
    let file = script(
        r#"
        local pressed = 0
        return {
            KeyDown = function(mod, sym) pressed = pressed | (1 << (sym - 97)) end,
            KeyUp = function(mod, sym) pressed = pressed & ~(1 << (sym - 97)) end,
            GetKeys = function() return pressed end,
        }
        "#,
    );
    let mut plugin = loaded(&file);
    let mut keys = Buttons::default();

    plugin.key_down(0, 97);
    plugin.key_down(0, 99);
    plugin.get_keys(0, &mut keys);
    assert_eq!(keys.value, 0b101);

    plugin.key_up(0, 97);
    plugin.get_keys(0, &mut keys);
    assert_eq!(keys.value, 0b100);
}

#[test]
fn rom_open_hook_runs_on_every_open() {
    let file = script(
        r#"
        local opened = 0
        return {
            RomOpen = function() opened = opened + 1 end,
            GetKeys = function() return opened end,
        }
        "#,
    );
    let mut plugin = loaded(&file);
    plugin.rom_open().expect("second rom open");

    let mut keys = Buttons::default();
    plugin.get_keys(0, &mut keys);
    assert_eq!(keys.value, 2);

    // A new session re-runs the chunk, so script locals start over.
    plugin.rom_closed();
    plugin.rom_open().expect("reopen");
    plugin.get_keys(0, &mut keys);
    assert_eq!(keys.value, 1);
}

#[test]
fn rom_closed_ends_the_session() {
    let file = script("return { RomClosed = function() error('cleanup failed') end }");
    let mut plugin = loaded(&file);

    plugin.rom_closed();
    assert_eq!(plugin.state(), SessionState::Initialized);

    let depth = plugin
        .script_environment()
        .runtime()
        .map(|rt| rt.stack_depth());
    assert_eq!(depth, Some(0));
}

#[test]
fn rom_open_reports_load_failures() {
    let mut plugin = LuaInputPlugin::default();
    let missing = std::path::Path::new("/nonexistent/input.lua");
    plugin.startup(config_for(missing)).expect("startup");

    assert_eq!(
        plugin.rom_open(),
        Err(LoadError::NotFound(missing.to_path_buf()))
    );
    assert_eq!(plugin.state(), SessionState::Initialized);

    let file = script("return 'not a table'");
    let mut plugin = started(&file);
    assert_eq!(
        plugin.rom_open(),
        Err(LoadError::NotATable("string".to_string()))
    );
}

#[test]
fn rom_open_before_startup_is_rejected() {
    let mut plugin = LuaInputPlugin::default();
    assert_eq!(
        plugin.rom_open(),
        Err(LoadError::Environment(EnvError::NotInitialized))
    );
}

#[test]
fn startup_and_shutdown_are_not_reentrant() {
    let file = script("return {}");
    let mut plugin = started(&file);

    assert_eq!(
        plugin.startup(config_for(file.path())),
        Err(EnvError::AlreadyInitialized)
    );
    plugin.shutdown().expect("shutdown");
    assert_eq!(plugin.shutdown(), Err(EnvError::NotInitialized));
    assert_eq!(plugin.state(), SessionState::Uninitialized);
}

#[test]
fn shutdown_closes_an_open_rom() {
    let file = script("return { GetKeys = function() return 1 end }");
    let mut plugin = loaded(&file);

    plugin.shutdown().expect("shutdown");
    assert_eq!(plugin.state(), SessionState::Uninitialized);

    // Restart with the same plugin value and load a fresh session.
    plugin.startup(config_for(file.path())).expect("restart");
    plugin.rom_open().expect("rom open");
    let mut keys = Buttons::default();
    plugin.get_keys(0, &mut keys);
    assert_eq!(keys.value, 1);
}
