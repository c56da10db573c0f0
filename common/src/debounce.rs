#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

/// Time-window debouncer for a sampled digital level.
///
/// A new stable level is committed only after the raw level has stayed the
/// same for strictly longer than the window since its last change.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window_ms: u64,
    raw: bool,
    stable: bool,
    last_change_ms: u64,
}

impl Debouncer {
    pub fn new(window_ms: u64, initial_level: bool, now_ms: u64) -> Self {
        Self {
            window_ms,
            raw: initial_level,
            stable: initial_level,
            last_change_ms: now_ms,
        }
    }

    pub fn stable(&self) -> bool {
        self.stable
    }

    /// Feeds one raw sample; returns the newly committed level, if any.
    pub fn update(&mut self, raw: bool, now_ms: u64) -> Option<bool> {
        if raw != self.raw {
            self.raw = raw;
            self.last_change_ms = now_ms;
        }

        let settled = now_ms.saturating_sub(self.last_change_ms) > self.window_ms;
        if settled && self.raw != self.stable {
            self.stable = self.raw;
            return Some(self.stable);
        }

        None
    }
}

/// Debounced push button with configurable polarity.
#[derive(Debug, Clone)]
pub struct ButtonMonitor {
    debouncer: Debouncer,
    active_low: bool,
}

impl ButtonMonitor {
    pub fn new(window_ms: u64, active_low: bool, now_ms: u64) -> Self {
        // Start in the released level so a held button at boot still yields a press.
        Self {
            debouncer: Debouncer::new(window_ms, active_low, now_ms),
            active_low,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.debouncer.stable() != self.active_low
    }

    pub fn update(&mut self, raw_level: bool, now_ms: u64) -> Option<ButtonEdge> {
        let level = self.debouncer.update(raw_level, now_ms)?;
        if level != self.active_low {
            Some(ButtonEdge::Pressed)
        } else {
            Some(ButtonEdge::Released)
        }
    }
}
