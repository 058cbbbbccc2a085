use std::time::{Duration, Instant};

/// Keys a Bluetooth remote may share with the host and must never trigger resets
pub const IGNORED_KEYS: [&str; 10] = [
    "F1", "F2", "F5", "F12", "Escape", "Tab", "Meta", "Control", "Alt", "Shift",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAction {
    ResetTripA,
    ResetAll,
}

/// Single-button remote: a short press resets Trip A, holding it resets everything.
///
/// Time is passed in by the caller so the machine stays free of timers; call
/// [`RemoteButton::poll`] from the render loop to fire the long press while
/// the key is still held.
#[derive(Debug, Clone)]
pub struct RemoteButton {
    long_press: Duration,
    pressed_at: Option<Instant>,
    long_fired: bool,
}

impl RemoteButton {
    pub fn new(long_press: Duration) -> Self {
        Self {
            long_press,
            pressed_at: None,
            long_fired: false,
        }
    }

    /// Hold time in seconds. A value too large for a `Duration` means the
    /// long press never fires.
    pub fn from_secs(long_press_secs: f64) -> Self {
        let long_press = Duration::try_from_secs_f64(long_press_secs.max(0.0)).unwrap_or(Duration::MAX);
        Self::new(long_press)
    }

    pub fn is_ignored(key: &str) -> bool {
        IGNORED_KEYS.contains(&key)
    }

    /// Key pressed. Auto-repeat and a second key during a press are ignored.
    pub fn key_down(&mut self, key: &str, repeat: bool, now: Instant) {
        if repeat || Self::is_ignored(key) || self.pressed_at.is_some() {
            return;
        }
        log::debug!("Remote key down: {}", key);
        self.pressed_at = Some(now);
        self.long_fired = false;
    }

    /// Fire the long press once the hold time has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<RemoteAction> {
        let pressed_at = self.pressed_at?;
        if self.long_fired || now.saturating_duration_since(pressed_at) < self.long_press {
            return None;
        }
        self.long_fired = true;
        log::info!("Remote long press: reset all");
        Some(RemoteAction::ResetAll)
    }

    /// Key released. Ends the press; returns the action it triggers, if any.
    pub fn key_up(&mut self, key: &str, now: Instant) -> Option<RemoteAction> {
        if Self::is_ignored(key) {
            return None;
        }
        let action = match self.poll(now) {
            Some(action) => Some(action),
            None if self.pressed_at.is_some() && !self.long_fired => {
                log::info!("Remote short press: reset Trip A");
                Some(RemoteAction::ResetTripA)
            }
            None => None,
        };
        self.pressed_at = None;
        self.long_fired = false;
        action
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_at.is_some()
    }
}

impl Default for RemoteButton {
    fn default() -> Self {
        Self::from_secs(3.0)
    }
}
