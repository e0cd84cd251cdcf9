/*!
 * Allocator Benchmarks
 *
 * Allocate/deallocate churn under both strategies, and defragmentation of a
 * fragmented heap
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use groundwork::memory::{ArenaAllocator, BestFit, FirstFit, HeapSource, Strategy};

fn churn<S: Strategy>(total: usize, live_window: usize) -> usize {
    let mut alloc: ArenaAllocator<S> = ArenaAllocator::new(1 << 20);
    let mut live = Vec::with_capacity(live_window);
    let mut freed = 0;

    for round in 0..total {
        let size = 32 + (round * 37) % 480;
        if let Ok(allocation) = alloc.allocate(size, 8, round as u64) {
            live.push(allocation.block);
        }
        if live.len() >= live_window {
            alloc.deallocate(live.remove(0));
            freed += 1;
        }
    }
    for block in live {
        alloc.deallocate(block);
        freed += 1;
    }
    freed
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_churn");

    for window in [16usize, 128] {
        group.bench_with_input(
            BenchmarkId::new("best_fit", window),
            &window,
            |b, &window| b.iter(|| black_box(churn::<BestFit>(2_000, window))),
        );
        group.bench_with_input(
            BenchmarkId::new("first_fit", window),
            &window,
            |b, &window| b.iter(|| black_box(churn::<FirstFit>(2_000, window))),
        );
    }

    group.finish();
}

fn bench_defragment(c: &mut Criterion) {
    c.bench_function("defragment_fragmented_heap", |b| {
        b.iter_with_setup(
            || {
                let heap = HeapSource::new().keep_empty_arenas(true);
                let mut alloc: ArenaAllocator =
                    ArenaAllocator::with_source(64 * 1024, Box::new(heap));
                let blocks: Vec<_> = (0..512)
                    .map(|i| alloc.allocate(256, 1, i).unwrap().block)
                    .collect();
                // Free every other block to fragment the arenas
                for block in blocks.iter().step_by(2) {
                    alloc.deallocate(*block);
                }
                alloc
            },
            |mut alloc| {
                alloc.defragment().unwrap();
                black_box(alloc.free_bytes())
            },
        );
    });
}

criterion_group!(benches, bench_churn, bench_defragment);
criterion_main!(benches);
