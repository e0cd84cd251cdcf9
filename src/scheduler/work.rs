/*!
 * Work Item
 *
 * The unit that moves through scheduler queues: a type-erased callable stored
 * inline in a fixed 32-byte buffer next to its invoke thunk and the target
 * workgroup id. No heap allocation, trivially copyable, nothing to drop -
 * which is exactly what lets items be shuffled between queues under spin
 * locks without ownership ceremony.
 *
 * Callables must be `Copy + Send` and fit the buffer; both are enforced at
 * compile time when the item is built.
 */

use super::types::WorkgroupId;
use super::worker::WorkerContext;
use std::marker::PhantomData;
use std::mem::{align_of, size_of, MaybeUninit};

/// Inline payload capacity in bytes
pub const WORK_ITEM_PAYLOAD: usize = 32;

const PAYLOAD_WORDS: usize = WORK_ITEM_PAYLOAD / size_of::<usize>();

type Thunk = unsafe fn(*const u8, &WorkerContext);

#[derive(Clone, Copy)]
pub struct WorkItem {
    thunk: Option<Thunk>,
    payload: [MaybeUninit<usize>; PAYLOAD_WORDS],
    group: WorkgroupId,
}

// Safety: payloads are restricted to `Copy + Send` values at construction.
unsafe impl Send for WorkItem {}

struct FitsInline<F>(PhantomData<F>);

impl<F> FitsInline<F> {
    const CHECK: () = assert!(
        size_of::<F>() <= WORK_ITEM_PAYLOAD && align_of::<F>() <= align_of::<usize>(),
        "work item callable exceeds the inline buffer"
    );
}

impl WorkItem {
    /// Empty item; executing it is a no-op.
    pub const fn empty() -> Self {
        Self {
            thunk: None,
            payload: [MaybeUninit::uninit(); PAYLOAD_WORDS],
            group: WorkgroupId::DEFAULT,
        }
    }

    /// Build an item from a callable, binding the workgroup payload.
    pub fn new<F>(callable: F, group: WorkgroupId) -> Self
    where
        F: FnOnce(&WorkerContext) + Copy + Send + 'static,
    {
        let () = FitsInline::<F>::CHECK;
        let mut item = Self::empty();
        // Safety: size and alignment verified above; F is Copy so the byte
        // image is the value
        unsafe {
            (item.payload.as_mut_ptr() as *mut F).write(callable);
        }
        item.thunk = Some(invoke_callable::<F>);
        item.group = group;
        item
    }

    /// Build an item from a plain function pointer.
    pub fn from_fn(callable: fn(&WorkerContext), group: WorkgroupId) -> Self {
        Self::new(callable, group)
    }

    /// Build an item around a raw thunk and one payload word. Used by the
    /// task layer to carry a reference-counted pointer through the queues.
    pub(crate) fn from_raw(
        run: unsafe fn(usize, &WorkerContext),
        data: usize,
        group: WorkgroupId,
    ) -> Self {
        let mut item = Self::empty();
        item.payload[0] = MaybeUninit::new(data);
        item.payload[1] = MaybeUninit::new(run as usize);
        item.thunk = Some(invoke_raw);
        item.group = group;
        item
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.thunk.is_none()
    }

    /// Target workgroup, readable without invoking the callable.
    #[inline]
    pub fn group(&self) -> WorkgroupId {
        self.group
    }

    pub(crate) fn set_group(&mut self, group: WorkgroupId) {
        self.group = group;
    }

    /// Invoke the callable. Consumes the item: the payload may hold a value
    /// that must not be replayed.
    pub(crate) fn execute(self, ctx: &WorkerContext) {
        if let Some(thunk) = self.thunk {
            // Safety: thunk and payload were written together by a constructor
            unsafe { thunk(self.payload.as_ptr() as *const u8, ctx) }
        }
    }
}

impl Default for WorkItem {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("empty", &self.is_empty())
            .field("group", &self.group)
            .finish()
    }
}

unsafe fn invoke_callable<F>(payload: *const u8, ctx: &WorkerContext)
where
    F: FnOnce(&WorkerContext) + Copy + Send + 'static,
{
    let callable = (payload as *const F).read();
    callable(ctx);
}

unsafe fn invoke_raw(payload: *const u8, ctx: &WorkerContext) {
    let words = payload as *const usize;
    let data = words.read();
    let run: unsafe fn(usize, &WorkerContext) =
        std::mem::transmute(words.add(1).read());
    run(data, ctx);
}
