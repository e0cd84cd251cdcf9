/*!
 * Parallel For
 *
 * Fork/join helper over a mutable slice: chunks derived from the workgroup's
 * logical divisor fan out as work items, the caller runs the first chunk
 * inline, then helps execute pending work until every chunk has arrived at
 * the latch. Helping (rather than blocking) means a group with a single
 * worker still completes.
 */

use super::worker::WorkerContext;
use crate::core::sync::Latch;

/// Per-call frame shared with the fanned-out chunks. Work items carry only
/// its address plus a monomorphized trampoline, so the items themselves stay
/// free of the slice and body types.
struct Shared<T, F> {
    base: *mut T,
    body: *const F,
    latch: Latch,
}

unsafe fn run_chunk<T, F>(share: usize, begin: usize, end: usize, wc: &WorkerContext)
where
    F: Fn(&mut [T], &WorkerContext) + Sync,
{
    // Safety: the submitting frame outlives the latch; chunks are disjoint
    let shared = &*(share as *const Shared<T, F>);
    let slice = std::slice::from_raw_parts_mut(shared.base.add(begin), end - begin);
    (*shared.body)(slice, wc);
    shared.latch.arrive();
}

/// Apply `body` to disjoint chunks of `items` across the context's
/// workgroup. `granularity` scales the chunk count; 1 is the natural split.
pub fn parallel_for<T, F>(ctx: &WorkerContext, items: &mut [T], granularity: u32, body: F)
where
    T: Send,
    F: Fn(&mut [T], &WorkerContext) + Sync,
{
    let len = items.len();
    if len == 0 {
        return;
    }

    let group = ctx.workgroup();
    let divisor = ctx.engine.logical_divisor(group) * granularity.max(1);
    if divisor <= 1 {
        body(items, ctx);
        return;
    }

    let chunk = len.div_ceil(divisor as usize);
    let task_count = len.div_ceil(chunk);
    if task_count <= 1 {
        body(items, ctx);
        return;
    }

    let shared = Shared {
        base: items.as_mut_ptr(),
        body: &body,
        latch: Latch::new(task_count),
    };
    let share = &shared as *const Shared<T, F> as usize;
    let runner: unsafe fn(usize, usize, usize, &WorkerContext) = run_chunk::<T, F>;

    // Fan out every chunk but the first
    for index in 1..task_count {
        let begin = index * chunk;
        let end = len.min(begin + chunk);
        ctx.submit(group, move |wc: &WorkerContext| unsafe {
            runner(share, begin, end, wc)
        });
    }

    // Work before wait: the caller takes the first chunk itself, through the
    // same raw route as the fanned-out chunks
    unsafe {
        let first = std::slice::from_raw_parts_mut(shared.base, chunk.min(len));
        body(first, ctx);
    }
    shared.latch.arrive();

    while !shared.latch.is_clear() {
        ctx.engine.busy_work(ctx.worker());
    }
}

/// Element-wise form of [`parallel_for`]: `body` runs once per item, with
/// the same chunked fan-out underneath.
pub fn parallel_for_each<T, F>(ctx: &WorkerContext, items: &mut [T], granularity: u32, body: F)
where
    T: Send,
    F: Fn(&mut T, &WorkerContext) + Sync,
{
    parallel_for(ctx, items, granularity, |chunk, wc| {
        for item in chunk {
            body(item, wc);
        }
    });
}
