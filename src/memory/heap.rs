/*!
 * Heap-Backed Memory Source
 *
 * Ready-made `MemorySource` that backs every arena with an owned byte buffer
 * and implements the full defragment protocol: `move_memory` really copies
 * bytes (overlap-safe within a region) and rebinds are journaled for the
 * caller to apply to its own references.
 *
 * The source is a shared handle: keep a clone next to the allocator to reach
 * the buffers and the rebind journal. Single-threaded, like the allocator
 * it feeds.
 */

use super::bank::{ArenaId, BlockId};
use super::traits::MemorySource;
use crate::core::types::{AllocTag, BackingId, Offset, Size};
use ahash::AHashMap;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// One journaled `rebind_alloc` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebindRecord {
    pub tag: AllocTag,
    pub backing: BackingId,
    pub block: BlockId,
    pub offset: Offset,
}

struct HeapInner {
    buffers: AHashMap<BackingId, Box<[u8]>>,
    next_id: BackingId,
    keep_empty: bool,
    rebinds: Vec<RebindRecord>,
    moves: u64,
}

#[derive(Clone)]
pub struct HeapSource {
    inner: Rc<RefCell<HeapInner>>,
}

impl HeapSource {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(HeapInner {
                buffers: AHashMap::new(),
                next_id: 1,
                keep_empty: false,
                rebinds: Vec::new(),
                moves: 0,
            })),
        }
    }

    /// Decline `drop_arena` so empty arenas stay warm for reuse.
    pub fn keep_empty_arenas(self, keep: bool) -> Self {
        self.inner.borrow_mut().keep_empty = keep;
        self
    }

    pub fn buffer_count(&self) -> usize {
        self.inner.borrow().buffers.len()
    }

    pub fn move_count(&self) -> u64 {
        self.inner.borrow().moves
    }

    pub fn write(&self, backing: BackingId, offset: Offset, bytes: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        let buffer = inner.buffers.get_mut(&backing).expect("unknown backing region");
        buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read(&self, backing: BackingId, offset: Offset, len: usize) -> Vec<u8> {
        let inner = self.inner.borrow();
        let buffer = inner.buffers.get(&backing).expect("unknown backing region");
        buffer[offset..offset + len].to_vec()
    }

    /// Drain the journal of rebinds issued by the last defragmentation.
    pub fn take_rebinds(&self) -> Vec<RebindRecord> {
        std::mem::take(&mut self.inner.borrow_mut().rebinds)
    }
}

impl Default for HeapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for HeapSource {
    fn add_arena(&mut self, arena: ArenaId, size: Size) -> BackingId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.buffers.insert(id, vec![0u8; size].into_boxed_slice());
        debug!("heap source: arena {:?} backed by region {} ({} bytes)", arena, id, size);
        id
    }

    fn drop_arena(&mut self, backing: BackingId) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.keep_empty {
            false
        } else {
            inner.buffers.remove(&backing);
            true
        }
    }

    fn remove_arena(&mut self, backing: BackingId) {
        self.inner.borrow_mut().buffers.remove(&backing);
    }

    fn supports_defragment(&self) -> bool {
        true
    }

    fn move_memory(
        &mut self,
        src: BackingId,
        dst: BackingId,
        from: Offset,
        to: Offset,
        size: Size,
    ) {
        let mut inner = self.inner.borrow_mut();
        inner.moves += 1;
        if src == dst {
            let buffer = inner.buffers.get_mut(&src).expect("unknown backing region");
            buffer.copy_within(from..from + size, to);
        } else {
            // Take the source out so both regions can be touched at once
            let src_buf = inner.buffers.remove(&src).expect("unknown backing region");
            let dst_buf = inner.buffers.get_mut(&dst).expect("unknown backing region");
            dst_buf[to..to + size].copy_from_slice(&src_buf[from..from + size]);
            inner.buffers.insert(src, src_buf);
        }
    }

    fn rebind_alloc(
        &mut self,
        tag: AllocTag,
        backing: BackingId,
        block: BlockId,
        offset: Offset,
    ) {
        self.inner.borrow_mut().rebinds.push(RebindRecord {
            tag,
            backing,
            block,
            offset,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_round_trip() {
        let mut source = HeapSource::new();
        let backing = source.add_arena(ArenaId::NULL, 64);
        source.write(backing, 8, b"hello");
        assert_eq!(source.read(backing, 8, 5), b"hello");
    }

    #[test]
    fn test_cross_region_move() {
        let mut source = HeapSource::new();
        let a = source.add_arena(ArenaId::NULL, 32);
        let b = source.add_arena(ArenaId::NULL, 32);
        source.write(a, 0, b"abcd");
        source.move_memory(a, b, 0, 16, 4);
        assert_eq!(source.read(b, 16, 4), b"abcd");
    }

    #[test]
    fn test_overlapping_move_within_region() {
        let mut source = HeapSource::new();
        let a = source.add_arena(ArenaId::NULL, 32);
        source.write(a, 4, b"abcdefgh");
        source.move_memory(a, a, 4, 0, 8);
        assert_eq!(source.read(a, 0, 8), b"abcdefgh");
    }

    #[test]
    fn test_drop_policy() {
        let mut keep = HeapSource::new().keep_empty_arenas(true);
        let backing = keep.add_arena(ArenaId::NULL, 16);
        assert!(!keep.drop_arena(backing));
        assert_eq!(keep.buffer_count(), 1);

        let mut release = HeapSource::new();
        let backing = release.add_arena(ArenaId::NULL, 16);
        assert!(release.drop_arena(backing));
        assert_eq!(release.buffer_count(), 0);
    }
}
