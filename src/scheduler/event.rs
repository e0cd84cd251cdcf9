/*!
 * Scheduler Events
 *
 * Binary events for coordinating with running work. `BlockingEvent` parks
 * the waiter outright; `BusyEvent` keeps the waiting worker useful by
 * executing pending work between checks, which is the right shape whenever
 * the notifier might itself be queued behind the waiter.
 */

use super::engine::Scheduler;
use super::types::WorkerId;
use crate::core::sync::WakeEvent;

pub struct BlockingEvent {
    inner: WakeEvent,
}

impl BlockingEvent {
    pub fn new() -> Self {
        Self {
            inner: WakeEvent::new(),
        }
    }

    /// Block until notified, consuming the notification.
    pub fn wait(&self) {
        self.inner.wait();
    }

    pub fn try_wait(&self) -> bool {
        self.inner.try_wait()
    }

    pub fn notify(&self) {
        self.inner.notify();
    }
}

impl Default for BlockingEvent {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BusyEvent {
    inner: WakeEvent,
}

impl BusyEvent {
    pub fn new() -> Self {
        Self {
            inner: WakeEvent::new(),
        }
    }

    /// Wait for a notification, executing scheduler work on `worker`'s
    /// thread in the meantime.
    pub fn wait(&self, worker: WorkerId, scheduler: &Scheduler) {
        while !self.inner.try_wait() {
            scheduler.busy_work(worker);
        }
    }

    pub fn notify(&self) {
        self.inner.notify();
    }
}

impl Default for BusyEvent {
    fn default() -> Self {
        Self::new()
    }
}
