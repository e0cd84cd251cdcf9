/*!
 * Wake Event and Latch
 *
 * `WakeEvent` is a binary semaphore: a notify while nobody waits leaves the
 * event set, and the next wait consumes it. Each worker parks on its own
 * event; this is the only blocking point in the scheduler.
 */

use parking_lot::{Condvar, Mutex};

pub struct WakeEvent {
    set: Mutex<bool>,
    cond: Condvar,
}

impl WakeEvent {
    pub fn new() -> Self {
        Self {
            set: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Block until the event is set, consuming it.
    pub fn wait(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.cond.wait(&mut set);
        }
        *set = false;
    }

    /// Consume the event if it is set, without blocking.
    pub fn try_wait(&self) -> bool {
        let mut set = self.set.lock();
        let was_set = *set;
        *set = false;
        was_set
    }

    /// Set the event and wake one waiter.
    pub fn notify(&self) {
        let mut set = self.set.lock();
        *set = true;
        self.cond.notify_one();
    }
}

impl Default for WakeEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Countdown latch: `wait` returns once `arrive` has been called `count` times.
pub struct Latch {
    remaining: Mutex<usize>,
    cond: Condvar,
}

impl Latch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    pub fn arrive(&self) {
        let mut remaining = self.remaining.lock();
        debug_assert!(*remaining > 0, "latch over-arrived");
        *remaining -= 1;
        if *remaining == 0 {
            self.cond.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.cond.wait(&mut remaining);
        }
    }

    /// Non-blocking check for a cleared latch.
    pub fn is_clear(&self) -> bool {
        *self.remaining.lock() == 0
    }
}
