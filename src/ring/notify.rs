// Watermark notification gate.
//
// A latched signal flag plus a condvar under one lock, instead of a user
// callback invoked synchronously inside the peer's release call: `fire`
// runs strictly after the cursor store that made the bytes visible, and a
// waiter that missed the window still observes the latched flag, so no
// wakeup is lost and no re-entrancy is possible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Delivery mode of a notifier registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Deregisters itself after the first firing; re-arming requires an
    /// explicit re-registration.
    OneShot,
    /// Stays armed and fires on every favorable crossing.
    Persistent,
}

struct GateState {
    /// Armed registration: byte watermark plus delivery mode.
    notifier: Option<(usize, NotifyMode)>,
    /// Latched signal, consumed by `wait`.
    signaled: bool,
    /// Level at the last observation; crossings are detected against it.
    last_level: usize,
}

/// One endpoint's notification gate.
///
/// State machine: Unregistered -> Armed -> (Fired -> Unregistered on
/// OneShot, or back to Armed on Persistent).
pub(crate) struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                notifier: None,
                signaled: false,
                last_level: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Arm the gate. Replaces any previous registration, clears a stale
    /// latched signal so a OneShot cannot fire from history, and rebases the
    /// crossing detector so the first at-or-above event after arming fires.
    pub fn register(&self, watermark: usize, mode: NotifyMode) {
        let mut s = self.state.lock();
        s.notifier = Some((watermark, mode));
        s.signaled = false;
        s.last_level = 0;
    }

    /// Record the current level without firing. Called on unfavorable level
    /// changes so the next favorable one is seen as a crossing.
    pub fn observe(&self, level: usize) {
        self.state.lock().last_level = level;
    }

    /// Fire if `available` has crossed the armed watermark in the favorable
    /// direction. Edge-triggered: a level that stays at or above the
    /// watermark fires only once until it drops below. A watermark of zero
    /// fires on any arrival, which is how a reader blocked indefinitely gets
    /// woken by the first byte or by an attribute.
    pub fn fire_if(&self, available: usize) {
        let mut s = self.state.lock();
        let prev = s.last_level;
        s.last_level = available;
        let Some((watermark, mode)) = s.notifier else {
            return;
        };
        if watermark == 0 || (prev < watermark && available >= watermark) {
            s.signaled = true;
            if mode == NotifyMode::OneShot {
                s.notifier = None;
            }
            self.cond.notify_one();
        }
    }

    /// Unconditional wake, independent of any registration. Used for
    /// out-of-band notifications (end-of-transfer, attribute-space freed,
    /// peer close).
    pub fn force(&self) {
        let mut s = self.state.lock();
        s.signaled = true;
        self.cond.notify_one();
    }

    /// Wake every waiter without latching a signal; waiters re-check their
    /// abort flag. Used on terminate.
    pub fn interrupt(&self) {
        let _s = self.state.lock();
        self.cond.notify_all();
    }

    /// Block until the gate fires. `None` waits forever; `Some` expiry is
    /// the retryable `TimedOut`. `aborted` turns the wait into `Closed` as
    /// soon as it is observed set.
    pub fn wait(&self, timeout: Option<Duration>, aborted: &AtomicBool) -> Result<()> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut s = self.state.lock();
        loop {
            if s.signaled {
                s.signaled = false;
                return Ok(());
            }
            if aborted.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            match deadline {
                None => self.cond.wait(&mut s),
                Some(at) => {
                    if self.cond.wait_until(&mut s, at).timed_out() {
                        return Err(Error::TimedOut);
                    }
                }
            }
        }
    }
}
