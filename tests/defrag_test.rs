/*!
 * Defragmentation Integration Tests
 *
 * Compaction across arenas with real byte movement through `HeapSource`,
 * rebind accounting, and the capability gate
 */

use groundwork::memory::{
    ArenaAllocator, ArenaId, HeapSource, MemoryError, MemorySource,
};
use pretty_assertions::assert_eq;

/// Source without defragment support, to exercise the gate.
struct PlainSource(u64);

impl MemorySource for PlainSource {
    fn add_arena(&mut self, _arena: ArenaId, _size: usize) -> u64 {
        self.0 += 1;
        self.0
    }

    fn drop_arena(&mut self, _backing: u64) -> bool {
        true
    }

    fn remove_arena(&mut self, _backing: u64) {}
}

#[test]
fn defragment_requires_capability() {
    let mut alloc: ArenaAllocator = ArenaAllocator::with_source(512, Box::new(PlainSource(0)));
    assert_eq!(
        alloc.defragment().unwrap_err(),
        MemoryError::DefragmentUnsupported
    );

    let mut standalone: ArenaAllocator = ArenaAllocator::new(512);
    assert_eq!(
        standalone.defragment().unwrap_err(),
        MemoryError::DefragmentUnsupported
    );
}

#[test]
fn defragment_compacts_two_sparse_arenas() {
    let heap = HeapSource::new().keep_empty_arenas(true);
    let view = heap.clone();
    let mut alloc: ArenaAllocator = ArenaAllocator::with_source(1024, Box::new(heap));

    // Fill two arenas with 256-byte blocks
    let first: Vec<_> = (0..4)
        .map(|i| alloc.allocate(256, 1, 100 + i).unwrap())
        .collect();
    let second: Vec<_> = (0..4)
        .map(|i| alloc.allocate(256, 1, 200 + i).unwrap())
        .collect();
    assert_eq!(alloc.arena_count(), 2);

    // Keep one survivor per arena: tag 100 at offset 0, tag 202 at offset 512
    for allocation in &first[1..] {
        alloc.deallocate(allocation.block);
    }
    for (i, allocation) in second.iter().enumerate() {
        if i != 2 {
            alloc.deallocate(allocation.block);
        }
    }
    let keep_a = first[0];
    let keep_b = second[2];
    assert_eq!(alloc.get_alloc_offset(keep_b.block).1, 512);

    // Ground truth bytes at both survivors
    view.write(keep_a.backing, keep_a.offset, b"front-block-data");
    view.write(keep_b.backing, keep_b.offset, b"back-block-bytes");

    alloc.defragment().unwrap();
    assert!(alloc.validate_integrity());

    // Both survivors packed into one arena starting at offset 0
    assert_eq!(alloc.arena_count(), 1);
    let rebinds = view.take_rebinds();
    assert_eq!(rebinds.len(), 2);

    let rebind_a = rebinds.iter().find(|r| r.tag == 100).unwrap();
    let rebind_b = rebinds.iter().find(|r| r.tag == 202).unwrap();
    assert_eq!(rebind_a.offset, 0);
    assert_eq!(rebind_b.offset, 256);
    assert_eq!(rebind_a.backing, rebind_b.backing);

    // One source arena was eliminated, and its bytes moved intact
    assert_eq!(view.buffer_count(), 1);
    assert_eq!(view.read(rebind_a.backing, rebind_a.offset, 16), b"front-block-data");
    assert_eq!(view.read(rebind_b.backing, rebind_b.offset, 16), b"back-block-bytes");

    // Rebound handles answer queries against the new bank
    assert_eq!(alloc.get_alloc_offset(rebind_a.block).1, 0);
    assert_eq!(alloc.get_alloc_offset(rebind_b.block).1, 256);
    assert_eq!(alloc.free_bytes(), 1024 - 512);
}

#[test]
fn defragment_is_stable_when_already_packed() {
    let heap = HeapSource::new();
    let view = heap.clone();
    let mut alloc: ArenaAllocator = ArenaAllocator::with_source(1024, Box::new(heap));

    let a = alloc.allocate(128, 1, 1).unwrap();
    let b = alloc.allocate(128, 1, 2).unwrap();
    view.write(a.backing, a.offset, b"aaaa");
    view.write(b.backing, b.offset, b"bbbb");

    let moves_before = view.move_count();
    alloc.defragment().unwrap();

    // Already contiguous from 0: nothing to move, everything rebound
    assert_eq!(view.move_count(), moves_before);
    assert_eq!(view.take_rebinds().len(), 2);
    assert_eq!(view.read(a.backing, 0, 4), b"aaaa");
    assert_eq!(view.read(b.backing, 128, 4), b"bbbb");
    assert!(alloc.validate_integrity());
}

#[test]
fn defragment_slides_blocks_within_one_arena() {
    let heap = HeapSource::new();
    let view = heap.clone();
    let mut alloc: ArenaAllocator = ArenaAllocator::with_source(1024, Box::new(heap));

    let blocks: Vec<_> = (0..4)
        .map(|i| alloc.allocate(128, 1, i).unwrap())
        .collect();
    view.write(blocks[1].backing, blocks[1].offset, b"keep-one");
    view.write(blocks[3].backing, blocks[3].offset, b"keep-two");

    alloc.deallocate(blocks[0].block);
    alloc.deallocate(blocks[2].block);

    alloc.defragment().unwrap();
    assert!(alloc.validate_integrity());

    let rebinds = view.take_rebinds();
    assert_eq!(rebinds.len(), 2);
    // In-place slide: same backing, compacted offsets in arena order
    let one = rebinds.iter().find(|r| r.tag == 1).unwrap();
    let two = rebinds.iter().find(|r| r.tag == 3).unwrap();
    assert_eq!(one.offset, 0);
    assert_eq!(two.offset, 128);
    assert_eq!(view.read(one.backing, one.offset, 8), b"keep-one");
    assert_eq!(view.read(two.backing, two.offset, 8), b"keep-two");
    assert_eq!(alloc.free_bytes(), 1024 - 256);
}

#[test]
fn defragment_preserves_alignment_metadata() {
    let heap = HeapSource::new();
    let view = heap.clone();
    let mut alloc: ArenaAllocator = ArenaAllocator::with_source(1024, Box::new(heap));

    let plain = alloc.allocate(100, 1, 7).unwrap();
    let aligned = alloc.allocate(64, 64, 8).unwrap();
    assert_eq!(aligned.offset % 64, 0);

    alloc.deallocate(plain.block);
    alloc.defragment().unwrap();

    let rebinds = view.take_rebinds();
    assert_eq!(rebinds.len(), 1);
    // The rebound offset honors the original alignment request
    assert_eq!(rebinds[0].offset % 64, 0);
    assert!(alloc.validate_integrity());
}
