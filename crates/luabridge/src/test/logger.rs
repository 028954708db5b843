//! Capturing backend for the `log` facade, used to assert on warnings.

use std::sync::{Mutex, Once};

use log::{Level, LevelFilter, Metadata, Record};

static MESSAGES: Mutex<Vec<String>> = Mutex::new(Vec::new());
static INIT: Once = Once::new();
static LOGGER: CapturingLogger = CapturingLogger;

struct CapturingLogger;

impl log::Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Warn {
            MESSAGES.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Install the capturing logger (idempotent; process-wide).
pub fn install() {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Warn);
    });
}

/// Number of captured warnings containing `fragment`.
pub fn warnings_containing(fragment: &str) -> usize {
    MESSAGES
        .lock()
        .unwrap()
        .iter()
        .filter(|message| message.contains(fragment))
        .count()
}
