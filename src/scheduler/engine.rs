/*!
 * Scheduler Engine
 *
 * Work-stealing task engine. Workers drain their own workgroup queues in
 * priority order, then their exclusive queue, then steal from randomized
 * victims with adaptive backoff; an idle worker parks on its wake event and
 * is the only thing in the scheduler that ever blocks. Submission prefers
 * handing work directly to a sleeping worker, falls back to round-robin
 * try-lock placement, and force-pushes as a last resort so work is never
 * lost.
 *
 * Worker 0 is the thread that called `begin_execution`; it never runs the
 * worker loop but drains its queues during `end_execution` and `busy_work`.
 */

use super::types::{
    SchedError, SchedResult, WorkerId, WorkgroupId, MAX_GROUPS, MAX_STEAL_ATTEMPTS, WORK_SCALE,
};
use super::work::WorkItem;
use super::worker::{
    clear_current, current_worker, register_current, GroupRange, UserContext, WakeData, Worker,
    WorkerContext, WorkerDesc,
};
use super::workgroup::Workgroup;
use crate::core::sync::{backoff, BackoffConfig, Latch, SpinLock};
use log::{error, info};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Bounded retry budget for round-robin submission before the forced push
const SUBMIT_RETRIES: u32 = 4;

/// `busy_work` probe budget
const BUSY_ATTEMPTS: u32 = 3;

/// Drain loop yields every this many iterations
const DRAIN_YIELD_INTERVAL: u32 = 10;

type Entry = Arc<dyn Fn(&WorkerDesc) + Send + Sync>;

pub(crate) struct Inner {
    pub workgroups: Vec<Workgroup>,
    pub workers: Box<[Worker]>,
    pub local_work: Box<[SpinLock<Option<WorkItem>>]>,
    pub group_ranges: Box<[GroupRange]>,
    pub wake: Box<[WakeData]>,
    pub stop: AtomicBool,
    pub worker_count: u32,
    pub user_context: UserContext,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Configuring,
    Running,
    Stopped,
}

pub struct Scheduler {
    inner: Arc<Inner>,
    threads: Vec<JoinHandle<()>>,
    main_contexts: Box<[WorkerContext]>,
    state: Lifecycle,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_backoff(BackoffConfig::default())
    }

    pub fn with_backoff(backoff: BackoffConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                workgroups: Vec::new(),
                workers: Box::new([]),
                local_work: Box::new([]),
                group_ranges: Box::new([]),
                wake: Box::new([]),
                stop: AtomicBool::new(false),
                worker_count: 0,
                user_context: None,
                backoff,
            }),
            threads: Vec::new(),
            main_contexts: Box::new([]),
            state: Lifecycle::Configuring,
        }
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Arc::get_mut(&mut self.inner).expect("scheduler state shared while still configuring")
    }

    /// Register or resize a workgroup. Must happen before `begin_execution`;
    /// the highest `start + count` across groups sets the worker count.
    pub fn create_group(
        &mut self,
        group: WorkgroupId,
        start: u32,
        count: u32,
        priority: u32,
    ) {
        debug_assert!(
            self.state == Lifecycle::Configuring,
            "create_group after begin_execution"
        );
        assert!(group.index() < MAX_GROUPS, "workgroup index out of range");

        let inner = self.inner_mut();
        if group.index() >= inner.workgroups.len() {
            inner.workgroups.resize_with(group.index() + 1, Workgroup::default);
        }
        let end = inner.workgroups[group.index()].configure(start, count, priority);
        inner.worker_count = inner.worker_count.max(end);
    }

    /// Register a workgroup at the next free index.
    pub fn add_group(&mut self, start: u32, count: u32, priority: u32) -> WorkgroupId {
        let group = WorkgroupId::new(self.inner.workgroups.len() as u32);
        self.create_group(group, start, count, priority);
        group
    }

    /// Reset a workgroup to empty.
    pub fn clear_group(&mut self, group: WorkgroupId) {
        debug_assert!(
            self.state == Lifecycle::Configuring,
            "clear_group after begin_execution"
        );
        self.inner_mut().workgroups[group.index()].clear();
    }

    pub fn worker_count(&self) -> u32 {
        self.inner.worker_count
    }

    pub fn group_worker_count(&self, group: WorkgroupId) -> u32 {
        self.inner.workgroups[group.index()].count
    }

    pub fn group_start(&self, group: WorkgroupId) -> u32 {
        self.inner.workgroups[group.index()].start
    }

    /// Natural chunk count for splitting data-parallel work over a group.
    pub fn logical_divisor(&self, group: WorkgroupId) -> u32 {
        self.inner.workgroups[group.index()].count * WORK_SCALE
    }

    /// Start the worker threads. Group creation is frozen afterwards.
    pub fn begin_execution(&mut self) -> SchedResult<()> {
        self.begin_with(None, None)
    }

    /// Start the worker threads, running `entry` once on every worker before
    /// any task, with an opaque shared context reachable from
    /// `WorkerContext::user`.
    pub fn begin_execution_with<E>(
        &mut self,
        entry: E,
        user_context: UserContext,
    ) -> SchedResult<()>
    where
        E: Fn(&WorkerDesc) + Send + Sync + 'static,
    {
        self.begin_with(Some(Arc::new(entry)), user_context)
    }

    fn begin_with(&mut self, entry: Option<Entry>, user_context: UserContext) -> SchedResult<()> {
        if self.state != Lifecycle::Configuring {
            return Err(SchedError::AlreadyRan);
        }
        if self.inner.worker_count == 0 {
            return Err(SchedError::NotConfigured);
        }

        {
            let inner = self.inner_mut();
            let count = inner.worker_count as usize;

            inner.workers = (0..count).map(|w| Worker::new(WorkerId::new(w as u32))).collect();
            inner.local_work = (0..count).map(|_| SpinLock::new(None)).collect();
            inner.wake = (0..count).map(|_| WakeData::new()).collect();

            let mut ranges = vec![GroupRange::default(); count];
            for (g, group) in inner.workgroups.iter().enumerate() {
                for w in group.start..group.start + group.count {
                    let range = &mut ranges[w as usize];
                    range.mask |= 1 << g;
                    range.order[range.count as usize] = g as u8;
                    range.count += 1;
                }
            }
            for range in &mut ranges {
                let order = &mut range.order[..range.count as usize];
                order.sort_by(|&a, &b| {
                    let (pa, pb) = (
                        inner.workgroups[a as usize].priority,
                        inner.workgroups[b as usize].priority,
                    );
                    pb.cmp(&pa).then(a.cmp(&b))
                });
            }
            inner.group_ranges = ranges.into_boxed_slice();
            inner.user_context = user_context;
            inner.stop.store(false, Ordering::SeqCst);
        }

        self.state = Lifecycle::Running;
        let worker_count = self.inner.worker_count;
        let latch = Arc::new(Latch::new(worker_count as usize));

        self.main_contexts = build_contexts(&self.inner, WorkerId::MAIN);
        register_current(&self.main_contexts, WorkerId::MAIN);

        if let Some(entry) = &entry {
            entry(&WorkerDesc {
                worker: WorkerId::MAIN,
                group_mask: self.inner.group_ranges[0].mask,
            });
        }
        latch.arrive();

        for index in 1..worker_count {
            let inner = Arc::clone(&self.inner);
            let entry = entry.clone();
            let latch = Arc::clone(&latch);
            let handle = std::thread::Builder::new()
                .name(format!("groundwork-worker-{index}"))
                .spawn(move || run_worker(inner, WorkerId::new(index), entry, latch))
                .expect("failed to spawn worker thread");
            self.threads.push(handle);
        }

        latch.wait();
        info!(
            "scheduler running: {} workers across {} workgroups",
            worker_count,
            self.inner.workgroups.len()
        );
        Ok(())
    }

    /// Drain every queue, stop the workers, and join their threads. Every
    /// submission accepted before this call completes before it returns.
    pub fn end_execution(&mut self) {
        if self.state != Lifecycle::Running {
            return;
        }
        debug_assert_eq!(
            current_worker(),
            Some(WorkerId::MAIN),
            "end_execution must run on the owning thread"
        );

        self.inner.finish_pending();
        self.inner.stop.store(true, Ordering::SeqCst);

        for (offset, handle) in self.threads.drain(..).enumerate() {
            let index = offset + 1;
            while !self.inner.workers[index].quitting.load(Ordering::SeqCst) {
                self.inner.wake_worker(index);
            }
            let _ = handle.join();
        }
        self.state = Lifecycle::Stopped;
        info!("scheduler stopped");
    }

    /// Bind the calling thread as worker 0. Needed when the scheduler is
    /// driven from a different thread than the one that started it.
    pub fn take_ownership(&self) {
        register_current(&self.main_contexts, WorkerId::MAIN);
    }

    /// Submit to a workgroup: some member worker eventually runs `callable`.
    pub fn submit<F>(&self, _src: WorkerId, group: WorkgroupId, callable: F)
    where
        F: FnOnce(&WorkerContext) + Copy + Send + 'static,
    {
        self.inner
            .submit_to_group(group, WorkItem::new(callable, group));
    }

    /// Submit a prebuilt work item to a workgroup.
    pub fn submit_item(&self, _src: WorkerId, group: WorkgroupId, item: WorkItem) {
        self.inner.submit_to_group(group, item);
    }

    /// Point-to-point submission. `src == dst` executes inline on the
    /// calling thread; anything else lands on `dst`'s exclusive queue in
    /// FIFO order. The workgroup rides along in the item payload.
    pub fn submit_to<F>(&self, src: WorkerId, dst: WorkerId, group: WorkgroupId, callable: F)
    where
        F: FnOnce(&WorkerContext) + Copy + Send + 'static,
    {
        let item = WorkItem::new(callable, group);
        if src == dst {
            let ctx = WorkerContext::current(group)
                .expect("inline submission off a scheduler thread");
            item.execute(&ctx);
        } else {
            self.inner.submit_to_worker(dst, item);
        }
    }

    /// Run at most a few pending items on the calling worker's thread.
    pub fn busy_work(&self, worker: WorkerId) {
        debug_assert_eq!(current_worker(), Some(worker));
        self.inner.busy_work(worker);
    }

    pub(crate) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.state == Lifecycle::Running {
            self.end_execution();
        }
        super::worker::clear_if_registered(&self.main_contexts);
    }
}

fn build_contexts(inner: &Arc<Inner>, worker: WorkerId) -> Box<[WorkerContext]> {
    let mask = inner.group_ranges[worker.index()].mask;
    (0..inner.workgroups.len())
        .map(|g| {
            WorkerContext::new(
                Arc::clone(inner),
                worker,
                WorkgroupId::new(g as u32),
                mask,
                (worker.index() as u32).wrapping_sub(inner.workgroups[g].start),
            )
        })
        .collect()
}

fn run_worker(inner: Arc<Inner>, id: WorkerId, entry: Option<Entry>, latch: Arc<Latch>) {
    let contexts = build_contexts(&inner, id);
    register_current(&contexts, id);

    if let Some(entry) = &entry {
        entry(&WorkerDesc {
            worker: id,
            group_mask: inner.group_ranges[id.index()].mask,
        });
    }
    latch.arrive();

    let index = id.index();
    loop {
        // Take under the lock, run outside it
        let local = inner.local_work[index].lock().take();
        if let Some(item) = local {
            inner.run_item(&contexts, item);
        }

        while inner.try_run_one(&contexts, id) {}

        if inner.stop.load(Ordering::SeqCst) {
            break;
        }

        // Announce sleep; the submitter's exchange on the status bit pairs
        // with this store
        inner.wake[index].status.store(false, Ordering::Relaxed);
        inner.wake[index].event.wait();
    }

    inner.workers[index].quitting.store(true, Ordering::SeqCst);
    clear_current();
}

/// Any panic escaping a work item would silently kill its worker thread and
/// wedge the scheduler; treat it as fatal instead.
struct AbortOnPanic;

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("panic escaped a work item; aborting");
            std::process::abort();
        }
    }
}

thread_local! {
    static STEAL_SEED: Cell<u32> = const { Cell::new(0) };
}

impl Inner {
    fn run_item(&self, contexts: &[WorkerContext], item: WorkItem) {
        let ctx = &contexts[item.group().index()];
        let guard = AbortOnPanic;
        item.execute(ctx);
        std::mem::forget(guard);
    }

    fn run_item_here(&self, item: WorkItem) {
        let ctx = WorkerContext::current(item.group())
            .expect("work execution off a scheduler thread");
        let guard = AbortOnPanic;
        item.execute(&ctx);
        std::mem::forget(guard);
    }

    fn try_run_one(&self, contexts: &[WorkerContext], id: WorkerId) -> bool {
        match self.get_work(id) {
            Some(item) => {
                self.run_item(contexts, item);
                true
            }
            None => false,
        }
    }

    /// The hot path: own queues in priority order, exclusive queue, then
    /// randomized stealing under a global probe budget.
    fn get_work(&self, id: WorkerId) -> Option<WorkItem> {
        let index = id.index();
        let range = &self.group_ranges[index];

        for i in 0..range.count as usize {
            let group = &self.workgroups[range.order[i] as usize];
            if group.count == 0 || !group.contains(index) {
                continue;
            }
            let queue = &group.queues[group.queue_index_of(index)];
            if let Some(item) = queue.try_pop() {
                backoff::record_success();
                return Some(item);
            }
        }

        if let Some(item) = self.workers[index].exclusive.try_pop() {
            backoff::record_success();
            return Some(item);
        }

        let mut attempts = 0u32;
        for i in 0..range.count as usize {
            if attempts >= MAX_STEAL_ATTEMPTS {
                break;
            }
            let group = &self.workgroups[range.order[i] as usize];
            if group.count <= 1 {
                continue;
            }

            let start = next_steal_seed(index) % group.count;
            let own = index as u32 - group.start;
            let max_victims = (group.count + 1) / 2;

            for offset in 0..max_victims {
                if attempts >= MAX_STEAL_ATTEMPTS {
                    break;
                }
                let victim = (start + offset) % group.count;
                if victim == own {
                    continue;
                }
                attempts += 1;

                if let Some(item) = group.queues[victim as usize].try_pop() {
                    backoff::record_success();
                    return Some(item);
                }

                if attempts > 2 {
                    backoff::on_steal_miss(&self.backoff);
                }
            }
        }

        None
    }

    pub(crate) fn submit_to_group(&self, group: WorkgroupId, mut item: WorkItem) {
        let wg = &self.workgroups[group.index()];
        debug_assert!(wg.count > 0, "submission to an unconfigured workgroup");
        item.set_group(group);

        // A sleeping worker takes the item through its single-slot fast path
        for w in wg.start..wg.start + wg.count {
            let wake = &self.wake[w as usize];
            if !wake.status.swap(true, Ordering::AcqRel) {
                *self.local_work[w as usize].lock() = Some(item);
                wake.event.notify();
                return;
            }
        }

        // Round-robin over the group's queues, try-lock only
        let mut retry = 0;
        loop {
            let offset = wg.push_offset.fetch_add(1, Ordering::Relaxed);
            for i in 0..wg.count {
                let q = ((offset + i) % wg.count) as usize;
                match wg.queues[q].try_push(item) {
                    Ok(()) => {
                        self.wake_worker((wg.start + q as u32) as usize);
                        return;
                    }
                    Err(returned) => item = returned,
                }
            }
            retry += 1;
            if retry >= SUBMIT_RETRIES {
                break;
            }
            backoff::relax(1 << retry);
        }

        // Contention storm: force the first queue rather than dropping work
        wg.queues[0].push(item);
        self.wake_worker(wg.start as usize);
    }

    pub(crate) fn submit_to_worker(&self, dst: WorkerId, item: WorkItem) {
        self.workers[dst.index()].exclusive.push(item);
        self.wake_worker(dst.index());
    }

    fn wake_worker(&self, index: usize) {
        let wake = &self.wake[index];
        if !wake.status.swap(true, Ordering::AcqRel) {
            wake.event.notify();
        }
    }

    pub(crate) fn busy_work(&self, id: WorkerId) {
        let local = self.local_work[id.index()].lock().take();
        if let Some(item) = local {
            self.run_item_here(item);
            return;
        }
        for _ in 0..BUSY_ATTEMPTS {
            match self.get_work(id) {
                Some(item) => {
                    self.run_item_here(item);
                    return;
                }
                None => backoff::relax(1),
            }
        }
    }

    /// Loop until every queue in the scheduler looks empty, waking owners of
    /// pending work and helping out on the calling thread.
    fn finish_pending(&self) {
        let mut iterations = 0u32;
        loop {
            let mut has_work = false;

            for group in &self.workgroups {
                if group.count == 0 {
                    continue;
                }
                let occupied = group.queues.iter().any(|queue| queue.appears_occupied());
                if occupied {
                    for w in group.start..group.start + group.count {
                        self.wake_worker(w as usize);
                    }
                    has_work = true;
                }
            }

            if has_work {
                self.busy_work(WorkerId::MAIN);
            }

            for worker in self.workers.iter() {
                if worker.exclusive.appears_occupied() {
                    self.wake_worker(worker.id.index());
                    has_work = true;
                }
            }

            if !has_work {
                break;
            }

            iterations += 1;
            if iterations % DRAIN_YIELD_INTERVAL == 0 {
                std::thread::yield_now();
            }
        }
    }

    pub(crate) fn logical_divisor(&self, group: WorkgroupId) -> u32 {
        self.workgroups[group.index()].count * WORK_SCALE
    }
}

/// Per-thread LCG for victim randomization, seeded from the worker index.
fn next_steal_seed(worker_index: usize) -> u32 {
    STEAL_SEED.with(|cell| {
        let mut seed = cell.get();
        if seed == 0 {
            seed = worker_index as u32 ^ 0xAAAA_AAAA;
        }
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        cell.set(seed);
        seed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    // A one-worker scheduler runs everything on the calling thread, which
    // makes the submission and get_work paths deterministic.
    fn solo_scheduler() -> Scheduler {
        let mut scheduler = Scheduler::new();
        scheduler.create_group(WorkgroupId::DEFAULT, 0, 1, 0);
        scheduler.begin_execution().unwrap();
        scheduler
    }

    #[test]
    fn test_busy_work_drains_the_own_queue() {
        let mut scheduler = solo_scheduler();
        let counter: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(0)));

        for _ in 0..5 {
            scheduler.submit(WorkerId::MAIN, WorkgroupId::DEFAULT, move |_ctx| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }

        // Each busy_work call pops at least one queued item
        for _ in 0..5 {
            scheduler.busy_work(WorkerId::MAIN);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        scheduler.end_execution();
    }

    #[test]
    fn test_item_context_matches_the_submitted_group() {
        let mut scheduler = Scheduler::new();
        scheduler.create_group(WorkgroupId::new(0), 0, 1, 0);
        scheduler.create_group(WorkgroupId::new(1), 0, 1, 3);
        scheduler.begin_execution().unwrap();

        let seen: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(99)));
        scheduler.submit(WorkerId::MAIN, WorkgroupId::new(1), move |ctx| {
            seen.store(ctx.workgroup().index(), Ordering::SeqCst);
        });

        scheduler.end_execution();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_steal_seed_advances() {
        let first = next_steal_seed(2);
        let second = next_steal_seed(2);
        assert_ne!(first, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn test_drop_without_begin_is_quiet() {
        let mut scheduler = Scheduler::new();
        scheduler.create_group(WorkgroupId::DEFAULT, 0, 2, 0);
        // Dropped while still configuring: no threads to join, no panic
        drop(scheduler);
    }
}
