/*!
 * Tasks
 *
 * Future-based deferred computations driven by the scheduler. A spawned task
 * owns its future; each poll runs as an ordinary work item on whichever
 * worker picks it up, and the task's waker re-submits the next poll through
 * the normal submission path - no worker is ever pinned.
 *
 * Two spawn flavors mirror the two classic task shapes: `spawn` leaves the
 * first poll to the scheduler, `spawn_now` polls once immediately on the
 * calling thread and only then hands over to the scheduler.
 *
 * Completion and awaiting race against each other; the poll-state machine
 * plus the registered-waker handshake make both orders correct. A task's
 * result has a single consumption point: the first await or `join` takes it.
 */

use super::engine::{Inner, Scheduler};
use super::types::WorkgroupId;
use super::work::WorkItem;
use super::worker::{current_worker, WorkerContext};
use crate::core::sync::WakeEvent;
use futures::task::{waker, ArcWake, AtomicWaker};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

// Poll-state machine. One poll item is in flight whenever the state is
// SCHEDULED; NOTIFIED records a wake that arrived mid-poll.
const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const POLLING: u8 = 2;
const NOTIFIED: u8 = 3;
const DONE: u8 = 4;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub(crate) struct TaskCore<T> {
    engine: Arc<Inner>,
    group: WorkgroupId,
    state: AtomicU8,
    future: Mutex<Option<BoxFuture<T>>>,
    result: Mutex<Option<T>>,
    done: AtomicBool,
    continuation: AtomicWaker,
    finished: WakeEvent,
}

impl<T: Send + 'static> TaskCore<T> {
    fn submit_poll(core: &Arc<Self>) {
        let data = Arc::into_raw(Arc::clone(core)) as usize;
        core.engine
            .submit_to_group(core.group, WorkItem::from_raw(poll_thunk::<T>, data, core.group));
    }

    /// Run one poll. Entered with state SCHEDULED.
    fn poll_step(core: &Arc<Self>) {
        core.state.store(POLLING, Ordering::SeqCst);

        let mut slot = core.future.lock();
        let future = match slot.as_mut() {
            Some(future) => future,
            None => {
                // Completed on another path; nothing left to drive
                core.state.store(DONE, Ordering::SeqCst);
                return;
            }
        };

        let poll_waker = waker(Arc::clone(core));
        let mut cx = Context::from_waker(&poll_waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => {
                *slot = None;
                drop(slot);
                *core.result.lock() = Some(value);
                core.done.store(true, Ordering::Release);
                core.state.store(DONE, Ordering::SeqCst);
                // Either the awaiter registered first and is resumed here, or
                // it registers later and sees `done` already set
                core.continuation.wake();
                core.finished.notify();
            }
            Poll::Pending => {
                drop(slot);
                if core
                    .state
                    .compare_exchange(POLLING, IDLE, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    // A wake landed mid-poll: go straight back around
                    core.state.store(SCHEDULED, Ordering::SeqCst);
                    Self::submit_poll(core);
                }
            }
        }
    }

    fn take_result(&self) -> T {
        self.result
            .lock()
            .take()
            .expect("task result consumed twice; a task has a single wait point")
    }
}

impl<T: Send + 'static> ArcWake for TaskCore<T> {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        loop {
            match arc_self.state.compare_exchange(
                IDLE,
                SCHEDULED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    TaskCore::submit_poll(arc_self);
                    return;
                }
                Err(POLLING) => {
                    if arc_self
                        .state
                        .compare_exchange(POLLING, NOTIFIED, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        return;
                    }
                    // State moved under us; retry
                }
                Err(_) => return, // already scheduled, notified, or done
            }
        }
    }
}

unsafe fn poll_thunk<T: Send + 'static>(data: usize, _ctx: &WorkerContext) {
    let core = Arc::from_raw(data as *const TaskCore<T>);
    TaskCore::poll_step(&core);
}

/// Handle to a spawned computation.
///
/// Awaitable from other tasks (`task.await` yields the result), pollable via
/// [`Task::is_done`] / [`Task::try_result`], or joinable from outside the
/// scheduler. The result can be consumed exactly once.
pub struct Task<T> {
    core: Arc<TaskCore<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static> Task<T> {
    fn spawn_in<F>(engine: &Arc<Inner>, group: WorkgroupId, future: F, eager: bool) -> Task<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let core = Arc::new(TaskCore {
            engine: Arc::clone(engine),
            group,
            state: AtomicU8::new(SCHEDULED),
            future: Mutex::new(Some(Box::pin(future))),
            result: Mutex::new(None),
            done: AtomicBool::new(false),
            continuation: AtomicWaker::new(),
            finished: WakeEvent::new(),
        });
        if eager {
            TaskCore::poll_step(&core);
        } else {
            TaskCore::submit_poll(&core);
        }
        Task { core }
    }

    pub fn is_done(&self) -> bool {
        self.core.done.load(Ordering::Acquire)
    }

    /// Take the result if the task finished. Consumes the stored value.
    pub fn try_result(&self) -> Option<T> {
        if self.is_done() {
            self.core.result.lock().take()
        } else {
            None
        }
    }

    /// Wait for completion. On a scheduler thread this executes pending work
    /// instead of blocking; elsewhere it parks on the completion event.
    pub fn join(&self, scheduler: &Scheduler) -> T {
        loop {
            if self.is_done() {
                return self.core.take_result();
            }
            match current_worker() {
                Some(worker) => scheduler.busy_work(worker),
                None => self.core.finished.wait(),
            }
        }
    }
}

impl<T: Send + 'static> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if self.core.done.load(Ordering::Acquire) {
            return Poll::Ready(self.core.take_result());
        }
        self.core.continuation.register(cx.waker());
        // Re-check: completion may have raced the registration
        if self.core.done.load(Ordering::Acquire) {
            Poll::Ready(self.core.take_result())
        } else {
            Poll::Pending
        }
    }
}

impl Scheduler {
    /// Spawn a task whose first poll is scheduled onto `group`.
    pub fn spawn<F>(&self, group: WorkgroupId, future: F) -> Task<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Task::spawn_in(self.inner(), group, future, false)
    }

    /// Spawn a task and poll it once immediately on the calling thread; it
    /// continues on `group` when woken.
    pub fn spawn_now<F>(&self, group: WorkgroupId, future: F) -> Task<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Task::spawn_in(self.inner(), group, future, true)
    }
}

impl WorkerContext {
    /// Spawn a task from inside a running task.
    pub fn spawn<F>(&self, group: WorkgroupId, future: F) -> Task<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Task::spawn_in(&self.engine, group, future, false)
    }

    /// Spawn and poll once inline before handing over to the scheduler.
    pub fn spawn_now<F>(&self, group: WorkgroupId, future: F) -> Task<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Task::spawn_in(&self.engine, group, future, true)
    }
}
