/*!
 * Scheduler Benchmarks
 *
 * Submission/drain throughput and parallel_for over a large slice
 */

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use groundwork::scheduler::{parallel_for, Scheduler, WorkerContext, WorkerId, WorkgroupId};
use std::sync::atomic::{AtomicUsize, Ordering};

const GROUP: WorkgroupId = WorkgroupId::DEFAULT;

fn bench_submit_throughput(c: &mut Criterion) {
    let mut scheduler = Scheduler::new();
    scheduler.create_group(GROUP, 0, 4, 0);
    scheduler.begin_execution().unwrap();

    let counter: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(0)));

    c.bench_function("submit_and_drain_1k", |b| {
        b.iter(|| {
            let base = counter.load(Ordering::Relaxed);
            for _ in 0..1_000 {
                scheduler.submit(WorkerId::MAIN, GROUP, move |_ctx| {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
            while counter.load(Ordering::Relaxed) < base + 1_000 {
                scheduler.busy_work(WorkerId::MAIN);
            }
        });
    });

    scheduler.end_execution();
}

fn bench_parallel_for(c: &mut Criterion) {
    let mut scheduler = Scheduler::new();
    scheduler.create_group(GROUP, 0, 4, 0);
    scheduler.begin_execution().unwrap();

    let mut values = vec![1u64; 1 << 16];

    c.bench_function("parallel_for_64k", |b| {
        b.iter(|| {
            let ctx = WorkerContext::current(GROUP).unwrap();
            parallel_for(&ctx, &mut values, 1, |chunk, _wc| {
                for value in chunk {
                    *value = value.wrapping_mul(31).wrapping_add(7);
                }
            });
            black_box(values[0])
        });
    });

    scheduler.end_execution();
}

criterion_group!(benches, bench_submit_throughput, bench_parallel_for);
criterion_main!(benches);
