/*!
 * Task Integration Tests
 *
 * Lazy and eager spawning, awaiting between tasks, both orders of the
 * completion/continuation handshake, and joining from inside and outside
 * the scheduler
 */

use groundwork::scheduler::{Scheduler, WorkerContext, WorkgroupId};
use serial_test::serial;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const GROUP: WorkgroupId = WorkgroupId::DEFAULT;

fn running_scheduler() -> Scheduler {
    let mut scheduler = Scheduler::new();
    scheduler.create_group(GROUP, 0, 4, 0);
    scheduler.begin_execution().unwrap();
    scheduler
}

#[test]
#[serial]
fn spawned_task_produces_its_result() {
    let mut scheduler = running_scheduler();

    let task = scheduler.spawn(GROUP, async { 6 * 7 });
    assert_eq!(task.join(&scheduler), 42);

    scheduler.end_execution();
}

#[test]
#[serial]
fn eager_spawn_polls_inline() {
    let mut scheduler = running_scheduler();
    let started = Arc::new(AtomicBool::new(false));

    let flag = started.clone();
    let task = scheduler.spawn_now(GROUP, async move {
        flag.store(true, Ordering::SeqCst);
        1u32
    });

    // First poll already happened on this thread
    assert!(started.load(Ordering::SeqCst));
    assert_eq!(task.join(&scheduler), 1);

    scheduler.end_execution();
}

#[test]
#[serial]
fn chained_awaits_resolve_through_the_scheduler() {
    let mut scheduler = running_scheduler();

    fn chain(ctx: WorkerContext, depth: u32) -> Pin<Box<dyn Future<Output = u64> + Send>> {
        Box::pin(async move {
            if depth == 0 {
                1
            } else {
                let sub = ctx.spawn(ctx.workgroup(), chain(ctx.clone(), depth - 1));
                sub.await + 1
            }
        })
    }

    let ctx = WorkerContext::current(GROUP).unwrap();
    let task = scheduler.spawn(GROUP, chain(ctx, 5));
    assert_eq!(task.join(&scheduler), 6);

    scheduler.end_execution();
}

#[test]
#[serial]
fn completion_before_await_is_correct() {
    let mut scheduler = running_scheduler();

    let task = scheduler.spawn(GROUP, async { "done" });
    // Let the task finish before anyone registers a continuation
    while !task.is_done() {
        std::thread::yield_now();
    }

    let waiter = {
        let task = task.clone();
        scheduler.spawn(GROUP, async move { task.await })
    };
    assert_eq!(waiter.join(&scheduler), "done");

    scheduler.end_execution();
}

#[test]
#[serial]
fn await_before_completion_is_correct() {
    let mut scheduler = running_scheduler();

    let slow = scheduler.spawn(GROUP, async {
        std::thread::sleep(Duration::from_millis(20));
        5u64
    });

    // The awaiter registers its continuation long before the result lands
    let waiter = {
        let slow = slow.clone();
        scheduler.spawn(GROUP, async move { slow.await * 2 })
    };
    assert_eq!(waiter.join(&scheduler), 10);

    scheduler.end_execution();
}

#[test]
#[serial]
fn try_result_is_none_until_done() {
    let mut scheduler = running_scheduler();

    let task = scheduler.spawn(GROUP, async {
        std::thread::sleep(Duration::from_millis(10));
        9i32
    });
    // Either still pending (None) or finished; never a wrong value
    if let Some(value) = task.try_result() {
        assert_eq!(value, 9);
    } else {
        assert_eq!(task.join(&scheduler), 9);
    }

    scheduler.end_execution();
}

#[test]
#[serial]
fn join_from_outside_the_scheduler_parks() {
    let mut scheduler = running_scheduler();

    let task = scheduler.spawn(GROUP, async {
        std::thread::sleep(Duration::from_millis(10));
        123u32
    });

    // A foreign thread has no worker identity and waits on the completion
    // event instead of helping
    let value = std::thread::scope(|scope| {
        let task = task.clone();
        let scheduler = &scheduler;
        scope.spawn(move || task.join(scheduler)).join().unwrap()
    });
    assert_eq!(value, 123);

    scheduler.end_execution();
}

#[test]
#[serial]
fn tasks_fan_out_and_aggregate() {
    let mut scheduler = running_scheduler();
    let completed = Arc::new(AtomicUsize::new(0));

    let ctx = WorkerContext::current(GROUP).unwrap();
    let tally = completed.clone();
    let root = scheduler.spawn(GROUP, async move {
        let mut total = 0u64;
        let subtasks: Vec<_> = (0..16u64)
            .map(|value| ctx.spawn(ctx.workgroup(), async move { value * value }))
            .collect();
        for subtask in subtasks {
            total += subtask.await;
        }
        tally.fetch_add(1, Ordering::SeqCst);
        total
    });

    let expected: u64 = (0..16u64).map(|v| v * v).sum();
    assert_eq!(root.join(&scheduler), expected);
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    scheduler.end_execution();
}
