//! Serial console sink
//!
//! Worker instances report progress and results on their serial port. A workflow
//! run writes every line it reads into a [`SerialConsole`]; callers query it for
//! `<serial-output key:'k' value:'v'>` pairs and for the raw log afterwards.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

static SERIAL_OUTPUT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<serial-output key:'([^']+)' value:'([^']*)'>")
        .expect("serial output pattern is a valid regex")
});

#[derive(Debug, Default)]
struct ConsoleState {
    lines: Vec<String>,
    values: HashMap<String, String>,
}

/// Thread-safe recorder for serial console output of one workflow run
#[derive(Debug, Default)]
pub struct SerialConsole {
    state: Mutex<ConsoleState>,
}

impl SerialConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one serial line read from `instance`
    pub fn record(&self, instance: &str, line: &str) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        for captures in SERIAL_OUTPUT_PATTERN.captures_iter(line) {
            // Later values for the same key win
            state
                .values
                .insert(captures[1].to_string(), captures[2].to_string());
        }
        state.lines.push(format!("{}: {}", instance, line));
    }

    /// Value most recently reported under `key`, if any
    pub fn output_value(&self, key: &str) -> Option<String> {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.values.get(key).cloned()
    }

    /// All recorded lines in arrival order
    pub fn logs(&self) -> Vec<String> {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.lines.clone()
    }
}
