//! Typing debounce state
//!
//! Converts a possibly rapid stream of typing signals per connection into
//! two edge-triggered notifications: started typing, and stopped typing
//! after a quiet period. The expiry timer is an owned task handle so the
//! session teardown path can cancel it deterministically.

use tokio::task::JoinHandle;

/// Per-connection typing state
///
/// At most one pending expiry timer exists at any time; a new signal
/// replaces (aborts) the previous one rather than stacking.
#[derive(Debug, Default)]
pub struct TypingState {
    /// Last broadcast state: is this connection currently shown as typing?
    active: bool,
    /// Pending expiry timer, if armed
    timer: Option<JoinHandle<()>>,
}

impl TypingState {
    /// Record a typing signal and arm the given expiry timer
    ///
    /// Any previously pending timer is aborted first. Returns true only on
    /// the idle -> typing edge, i.e. when a start notification is due.
    pub fn signal(&mut self, timer: JoinHandle<()>) -> bool {
        if let Some(pending) = self.timer.replace(timer) {
            pending.abort();
        }
        let started = !self.active;
        self.active = true;
        started
    }

    /// Leave the typing state (explicit stop or timer expiry)
    ///
    /// Aborts any pending timer. Returns true only if the connection was
    /// marked typing, i.e. when a stop notification is due.
    pub fn quiesce(&mut self) -> bool {
        self.cancel();
        std::mem::replace(&mut self.active, false)
    }

    /// Abort any pending timer without touching the typing flag
    ///
    /// Part of session teardown: a timer must never fire for a connection
    /// that no longer exists.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.timer.take() {
            pending.abort();
        }
    }

    /// Whether this connection is currently shown as typing
    pub fn is_active(&self) -> bool {
        self.active
    }
}
