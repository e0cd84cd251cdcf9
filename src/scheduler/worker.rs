/*!
 * Workers and Worker Contexts
 *
 * Per-worker state (exclusive queue, quitting flag, wake data) plus the
 * context a running task receives. Each worker thread registers its context
 * table in a thread local so `WorkerContext::current` and inline submission
 * can find the running worker without threading references through every
 * call.
 */

use super::engine::Inner;
use super::queue::WorkQueue;
use super::types::{WorkerId, WorkgroupId};
use crate::core::sync::WakeEvent;
use std::any::Any;
use std::cell::Cell;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) struct Worker {
    pub id: WorkerId,
    pub exclusive: WorkQueue,
    pub quitting: AtomicBool,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            exclusive: WorkQueue::new(),
            quitting: AtomicBool::new(false),
        }
    }
}

/// Wake flag plus park event, cache-line aligned to keep neighboring workers
/// off each other's lines.
#[repr(align(64))]
pub(crate) struct WakeData {
    pub status: AtomicBool,
    pub event: WakeEvent,
}

impl WakeData {
    pub fn new() -> Self {
        Self {
            status: AtomicBool::new(true),
            event: WakeEvent::new(),
        }
    }
}

/// Per-worker view of workgroup membership: the groups this worker belongs
/// to, ordered by descending priority (ascending index on ties), plus the
/// combined mask.
#[derive(Clone, Copy)]
pub(crate) struct GroupRange {
    pub mask: u32,
    pub count: u8,
    pub order: [u8; super::types::MAX_GROUPS],
}

impl Default for GroupRange {
    fn default() -> Self {
        Self {
            mask: 0,
            count: 0,
            order: [0; super::types::MAX_GROUPS],
        }
    }
}

/// Handed to entry callbacks at startup.
#[derive(Debug, Clone, Copy)]
pub struct WorkerDesc {
    pub worker: WorkerId,
    pub group_mask: u32,
}

/// The handle a running task receives: who is running it, for which
/// workgroup, and a way back into the scheduler.
#[derive(Clone)]
pub struct WorkerContext {
    pub(crate) engine: Arc<Inner>,
    worker: WorkerId,
    group: WorkgroupId,
    mask: u32,
    group_offset: u32,
}

impl WorkerContext {
    pub(crate) fn new(
        engine: Arc<Inner>,
        worker: WorkerId,
        group: WorkgroupId,
        mask: u32,
        group_offset: u32,
    ) -> Self {
        Self {
            engine,
            worker,
            group,
            mask,
            group_offset,
        }
    }

    /// The worker currently running this task.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// The workgroup this task was submitted under.
    pub fn workgroup(&self) -> WorkgroupId {
        self.group
    }

    /// This worker's queue slot within the context's workgroup.
    pub fn group_offset(&self) -> u32 {
        self.group_offset
    }

    pub fn belongs_to(&self, group: WorkgroupId) -> bool {
        self.mask & group.mask_bit() != 0
    }

    /// User context supplied to `begin_execution`, if its type matches.
    pub fn user<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.engine
            .user_context
            .clone()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Submit follow-up work to a workgroup.
    pub fn submit<F>(&self, group: WorkgroupId, callable: F)
    where
        F: FnOnce(&WorkerContext) + Copy + Send + 'static,
    {
        self.engine
            .submit_to_group(group, super::work::WorkItem::new(callable, group));
    }

    /// Submit point-to-point work to a specific worker. Submitting to the
    /// running worker executes inline.
    pub fn submit_to<F>(&self, dst: WorkerId, group: WorkgroupId, callable: F)
    where
        F: FnOnce(&WorkerContext) + Copy + Send + 'static,
    {
        let item = super::work::WorkItem::new(callable, group);
        if dst == self.worker {
            let ctx = WorkerContext::current(group).expect("running worker has no context");
            item.execute(&ctx);
        } else {
            self.engine.submit_to_worker(dst, item);
        }
    }

    /// Context of the running worker for `group`. Only meaningful on a
    /// scheduler thread (inside a task, or the main thread after
    /// `begin_execution` / `take_ownership`).
    pub fn current(group: WorkgroupId) -> Option<WorkerContext> {
        REGISTRY.with(|cell| {
            let current = cell.get();
            if current.contexts.is_null() || group.index() >= current.len {
                return None;
            }
            // Safety: the registered table outlives its registration; see
            // register_current
            unsafe { Some((*current.contexts.add(group.index())).clone()) }
        })
    }
}

#[derive(Clone, Copy)]
struct Registered {
    contexts: *const WorkerContext,
    len: usize,
    worker: u32,
}

const UNSET: Registered = Registered {
    contexts: std::ptr::null(),
    len: 0,
    worker: u32::MAX,
};

thread_local! {
    static REGISTRY: Cell<Registered> = const { Cell::new(UNSET) };
}

/// Bind `contexts` as this thread's worker view. The caller keeps the slice
/// alive until `clear_current` (worker threads clear on exit; the main
/// thread's table lives inside the scheduler).
pub(crate) fn register_current(contexts: &[WorkerContext], worker: WorkerId) {
    REGISTRY.with(|cell| {
        cell.set(Registered {
            contexts: contexts.as_ptr(),
            len: contexts.len(),
            worker: worker.index() as u32,
        })
    });
}

pub(crate) fn clear_current() {
    REGISTRY.with(|cell| cell.set(UNSET));
}

/// Clear the registration only if it still points at `contexts`; another
/// scheduler may have rebound this thread since.
pub(crate) fn clear_if_registered(contexts: &[WorkerContext]) {
    REGISTRY.with(|cell| {
        if cell.get().contexts == contexts.as_ptr() {
            cell.set(UNSET);
        }
    });
}

/// Id of the worker bound to the calling thread, if any.
pub fn current_worker() -> Option<WorkerId> {
    REGISTRY.with(|cell| {
        let current = cell.get();
        (current.worker != u32::MAX).then(|| WorkerId::new(current.worker))
    })
}

/// Opaque user context passed through `begin_execution`.
pub type UserContext = Option<Arc<dyn Any + Send + Sync>>;
