//! `log` backend that forwards records to the host's debug callback.

use std::ffi::CString;
use std::os::raw::{c_int, c_void};
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::abi::{DebugCallback, msg_level};

#[derive(Clone, Copy)]
struct DebugSink {
    callback: DebugCallback,
    context: *mut c_void,
}

// The context pointer is opaque to the plugin and only handed back to the host.
unsafe impl Send for DebugSink {}

struct HostLogger {
    sink: Mutex<Option<DebugSink>>,
}

static LOGGER: HostLogger = HostLogger {
    sink: Mutex::new(None),
};

/// Route log records to `callback`. Passing `None` silences the plugin.
pub fn install(callback: Option<DebugCallback>, context: *mut c_void) {
    *LOGGER.lock_sink() = callback.map(|callback| DebugSink { callback, context });

    // Only the first call registers the logger; later calls just swap the sink.
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}

/// Forget the host callback, e.g. on plugin shutdown.
pub fn uninstall() {
    *LOGGER.lock_sink() = None;
}

fn host_level(level: Level) -> c_int {
    match level {
        Level::Error => msg_level::ERROR,
        Level::Warn => msg_level::WARNING,
        Level::Info => msg_level::INFO,
        Level::Debug => msg_level::STATUS,
        Level::Trace => msg_level::VERBOSE,
    }
}

impl HostLogger {
    fn lock_sink(&self) -> std::sync::MutexGuard<'_, Option<DebugSink>> {
        match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Log for HostLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        self.lock_sink().is_some()
    }

    fn log(&self, record: &Record) {
        // Copy the sink out so the host callback runs without the lock held.
        let Some(sink) = *self.lock_sink() else {
            return;
        };

        let text = record.args().to_string().replace('\0', "\u{FFFD}");
        let Ok(message) = CString::new(text) else {
            return;
        };
        unsafe { (sink.callback)(sink.context, host_level(record.level()), message.as_ptr()) };
    }

    fn flush(&self) {}
}
