use std::sync::{Arc, Mutex, PoisonError};

use crate::config::MAX_STATUS_LEN;

pub const EMPTY_LOG_SENTINEL: &str = "No events yet.<br>";
pub const STATUS_RELEASED: &str = "Button released.";
pub const STATUS_PRESSED: &str = "Button pressed!";

/// Append-only text log with a hard byte capacity.
///
/// An append that does not fit discards everything before it, so the log then
/// holds only the newest entry.
#[derive(Debug, Clone)]
pub struct EventLog {
    text: String,
    capacity: usize,
    pristine: bool,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let mut log = Self {
            text: String::with_capacity(capacity),
            capacity,
            pristine: true,
        };
        push_truncated(&mut log.text, EMPTY_LOG_SENTINEL, capacity);
        log
    }

    pub fn append(&mut self, entry: &str) {
        if self.pristine {
            self.text.clear();
            self.pristine = false;
        }

        if self.text.len() + entry.len() > self.capacity {
            self.text.clear();
        }
        push_truncated(&mut self.text, entry, self.capacity);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// True until the first entry replaces the placeholder text.
    pub fn is_pristine(&self) -> bool {
        self.pristine
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Clone)]
pub struct MonitorState {
    temperature_c: f32,
    status: String,
    event_log: EventLog,
}

impl MonitorState {
    pub fn new(event_log_capacity: usize) -> Self {
        Self {
            temperature_c: 0.0,
            status: STATUS_RELEASED.to_string(),
            event_log: EventLog::new(event_log_capacity),
        }
    }

    pub fn temperature_c(&self) -> f32 {
        self.temperature_c
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn set_temperature(&mut self, value: f32) {
        self.temperature_c = value;
    }

    pub fn set_status(&mut self, text: &str) {
        self.status.clear();
        push_truncated(&mut self.status, text, MAX_STATUS_LEN);
    }

    pub fn append_event(&mut self, text: &str) {
        self.event_log.append(text);
    }
}

/// Handle to the process-wide monitor state.
///
/// Every read and write goes through [`SharedStore::with`], which is the one
/// exclusive-access section shared by the event loop and stack callbacks.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<MonitorState>>,
}

impl SharedStore {
    pub fn new(event_log_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MonitorState::new(event_log_capacity))),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MonitorState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_temperature(&self, value: f32) {
        self.with(|state| state.set_temperature(value));
    }

    pub fn set_status(&self, text: &str) {
        self.with(|state| state.set_status(text));
    }

    pub fn append_event(&self, text: &str) {
        self.with(|state| state.append_event(text));
    }

    pub fn snapshot(&self) -> MonitorState {
        self.with(|state| state.clone())
    }
}

fn push_truncated(target: &mut String, text: &str, capacity: usize) {
    let room = capacity.saturating_sub(target.len());
    if text.len() <= room {
        target.push_str(text);
        return;
    }

    let mut end = room;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    target.push_str(&text[..end]);
}
