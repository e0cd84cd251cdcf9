/*!
 * Arena Allocator
 *
 * Sub-allocator carving variable-sized, aligned allocations out of fixed-size
 * arenas. Free neighbors coalesce on release so no two adjacent blocks are
 * ever both free. Arenas come either from a caller-supplied `MemorySource`
 * (added on demand, dropped when empty) or, standalone, from a single arena
 * created up front.
 *
 * Not internally synchronized: one allocator per subsystem, external locking
 * otherwise.
 */

use super::bank::{ArenaId, BlockId};
use super::layout::{Arena, BankData, Block, LinkPair};
use super::strategy::BestFit;
use super::traits::{MemorySource, Strategy};
use super::types::{Allocation, DefragStats, MemoryError, MemoryResult, MemoryStats};
use crate::core::types::{AllocTag, BackingId, Offset, Size};
use log::{debug, info};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub allocations: u64,
    pub deallocations: u64,
    pub arenas_created: u64,
    pub defrag: DefragStats,
}

pub struct ArenaAllocator<S: Strategy = BestFit> {
    pub(crate) bank: BankData,
    pub(crate) strategy: S,
    pub(crate) source: Option<Box<dyn MemorySource>>,
    pub(crate) arena_size: Size,
    pub(crate) counters: Counters,
}

impl<S: Strategy> ArenaAllocator<S> {
    /// Standalone allocator over a single arena of `arena_size` bytes.
    pub fn new(arena_size: Size) -> Self {
        let mut allocator = Self {
            bank: BankData::new(),
            strategy: S::default(),
            source: None,
            arena_size,
            counters: Counters::default(),
        };
        allocator.strategy.init();
        allocator.add_arena(0, arena_size, true);
        allocator
    }

    /// Allocator drawing arenas from `source` on demand.
    pub fn with_source(arena_size: Size, source: Box<dyn MemorySource>) -> Self {
        let mut allocator = Self {
            bank: BankData::new(),
            strategy: S::default(),
            source: Some(source),
            arena_size,
            counters: Counters::default(),
        };
        allocator.strategy.init();
        allocator
    }

    /// Change the default arena size for subsequent arena additions.
    pub fn set_arena_size(&mut self, size: Size) {
        self.arena_size = size;
    }

    /// Allocate `size` bytes at the given power-of-two alignment.
    pub fn allocate(
        &mut self,
        size: Size,
        alignment: Size,
        tag: AllocTag,
    ) -> MemoryResult<Allocation> {
        self.allocate_impl(size, alignment, tag, false)
    }

    /// Allocate into a fresh arena of exactly the requested (effective) size.
    /// The arena is fully consumed and never a candidate for other requests.
    pub fn allocate_dedicated(
        &mut self,
        size: Size,
        alignment: Size,
        tag: AllocTag,
    ) -> MemoryResult<Allocation> {
        self.allocate_impl(size, alignment, tag, true)
    }

    fn allocate_impl(
        &mut self,
        size: Size,
        alignment: Size,
        tag: AllocTag,
        dedicated: bool,
    ) -> MemoryResult<Allocation> {
        debug_assert!(size > 0, "zero-sized allocation");
        debug_assert!(
            alignment.is_power_of_two(),
            "alignment must be a power of two"
        );

        // Padding so any placement can be adjusted up to the alignment
        let mask = alignment - 1;
        let effective = size + mask;

        if dedicated || effective >= self.arena_size {
            let (arena_id, block_id) = self.add_arena(tag, effective, false);
            self.counters.allocations += 1;
            debug!(
                "dedicated allocation of {} bytes in arena {:?}",
                effective, arena_id
            );
            return Ok(Allocation {
                backing: self.bank.arenas[arena_id].backing,
                block: block_id,
                offset: 0,
            });
        }

        let mut found = self.strategy.try_allocate(&self.bank, effective);
        if found.is_none() && self.source.is_some() {
            self.add_arena(0, self.arena_size, true);
            found = self.strategy.try_allocate(&self.bank, effective);
        }

        let ticket = match found {
            Some(ticket) => ticket,
            None => {
                return Err(MemoryError::OutOfCapacity {
                    requested: size,
                    free: self.bank.free_bytes,
                    arenas: self.bank.arenas.len(),
                })
            }
        };

        let block_id = self.strategy.commit(&mut self.bank, effective, ticket);
        self.counters.allocations += 1;
        Ok(self.finalize(block_id, tag, mask))
    }

    fn finalize(&mut self, block_id: BlockId, tag: AllocTag, mask: usize) -> Allocation {
        let (arena_id, offset, size) = {
            let block = &mut self.bank.blocks[block_id];
            block.tag = tag;
            block.align_shift = mask.count_ones() as u8;
            (block.arena, block.offset, block.size)
        };
        self.bank.arenas[arena_id].free_bytes -= size;
        self.bank.free_bytes -= size;
        Allocation {
            backing: self.bank.arenas[arena_id].backing,
            block: block_id,
            offset: (offset + mask) & !mask,
        }
    }

    /// Release a previously returned block. The block id must come from this
    /// allocator and must not have been released already.
    pub fn deallocate(&mut self, block: BlockId) {
        debug_assert!(
            self.bank.blocks.is_live(block) && !self.bank.blocks[block].is_free,
            "deallocate of a stale or already-free block"
        );

        let (arena_id, size) = {
            let record = &self.bank.blocks[block];
            (record.arena, record.size)
        };
        self.counters.deallocations += 1;
        self.bank.free_bytes += size;
        self.bank.arenas[arena_id].free_bytes += size;

        let front = self.bank.arenas[arena_id].blocks.head();
        let back = self.bank.arenas[arena_id].blocks.tail();
        let LinkPair { prev, next } = self.bank.blocks[block].order;

        let left = if block != front && self.bank.blocks[prev].is_free {
            prev
        } else {
            BlockId::NULL
        };
        let right = if block != back && self.bank.blocks[next].is_free {
            next
        } else {
            BlockId::NULL
        };

        // A fully-free arena may be handed back before any merging happens.
        // A declined drop keeps the arena and coalescing proceeds normally.
        if let Some(source) = self.source.as_mut() {
            let arena = &self.bank.arenas[arena_id];
            if arena.free_bytes == arena.size && source.drop_arena(arena.backing) {
                if !left.is_null() {
                    self.strategy.erase(&mut self.bank, left);
                }
                if !right.is_null() {
                    self.strategy.erase(&mut self.bank, right);
                }
                let arena_size = self.bank.arenas[arena_id].size;
                let backing = self.bank.arenas[arena_id].backing;
                self.bank.free_bytes -= arena_size;
                let mut list = self.bank.arenas[arena_id].blocks;
                list.clear(&mut self.bank.blocks);
                self.bank.arenas[arena_id].blocks = list;
                self.bank.arena_order.remove(&mut self.bank.arenas, arena_id);
                info!(
                    "dropped empty arena {:?} ({} bytes, backing {})",
                    arena_id, arena_size, backing
                );
                return;
            }
        }

        match (left.is_null(), right.is_null()) {
            // No free neighbor: the block itself joins the free set
            (true, true) => {
                self.strategy.add_free(&mut self.bank, block);
                self.bank.blocks[block].is_free = true;
            }
            // Left neighbor free: it absorbs this block
            (false, true) => {
                let left_size = self.bank.blocks[left].size;
                self.strategy
                    .grow_free_node(&mut self.bank, left, left_size + size);
                let mut list = self.bank.arenas[arena_id].blocks;
                list.remove(&mut self.bank.blocks, block);
                self.bank.arenas[arena_id].blocks = list;
            }
            // Right neighbor free: this block takes its place, extended
            (true, false) => {
                let right_size = self.bank.blocks[right].size;
                self.strategy
                    .replace_and_grow(&mut self.bank, right, block, right_size + size);
                let mut list = self.bank.arenas[arena_id].blocks;
                list.remove(&mut self.bank.blocks, right);
                self.bank.arenas[arena_id].blocks = list;
                self.bank.blocks[block].is_free = true;
            }
            // Both free: the left neighbor absorbs this block and the right
            (false, false) => {
                let left_size = self.bank.blocks[left].size;
                let right_size = self.bank.blocks[right].size;
                self.strategy.erase(&mut self.bank, right);
                self.strategy
                    .grow_free_node(&mut self.bank, left, left_size + right_size + size);
                let mut list = self.bank.arenas[arena_id].blocks;
                list.remove_pair(&mut self.bank.blocks, block);
                self.bank.arenas[arena_id].blocks = list;
            }
        }
    }

    /// Arena backing and raw offset for a live allocation.
    pub fn get_alloc_offset(&self, block: BlockId) -> (BackingId, Offset) {
        let record = &self.bank.blocks[block];
        (self.bank.arenas[record.arena].backing, record.offset)
    }

    pub fn free_bytes(&self) -> Size {
        self.bank.free_bytes
    }

    pub fn arena_count(&self) -> usize {
        self.bank.arenas.len()
    }

    /// Detailed statistics snapshot.
    pub fn stats(&self) -> MemoryStats {
        let mut total_bytes = 0;
        let mut arenas = 0;
        let mut cursor = self.bank.arena_order.head();
        while !cursor.is_null() {
            let arena = &self.bank.arenas[cursor];
            total_bytes += arena.size;
            arenas += 1;
            cursor = arena.order.next;
        }
        MemoryStats {
            total_bytes,
            free_bytes: self.bank.free_bytes,
            arenas,
            allocations: self.counters.allocations,
            deallocations: self.counters.deallocations,
            arenas_created: self.counters.arenas_created,
            defrag: self.counters.defrag,
        }
    }

    /// Walk every arena and verify the bookkeeping agrees with itself: block
    /// ranges tile each arena contiguously from 0, no two adjacent blocks are
    /// both free, and the free totals match between the walk, the strategy,
    /// and the global counter. Never mutates.
    pub fn validate_integrity(&self) -> bool {
        let mut ok = true;
        let mut free_nodes = 0usize;
        let mut free_total: Size = 0;

        let mut arena_it = self.bank.arena_order.head();
        while !arena_it.is_null() {
            let arena = &self.bank.arenas[arena_it];
            let mut expected_offset: Offset = 0;
            let mut arena_free: Size = 0;
            let mut prev_free = false;

            let mut cursor = arena.blocks.head();
            while !cursor.is_null() {
                let block = &self.bank.blocks[cursor];
                ok &= block.arena == arena_it;
                ok &= block.offset == expected_offset;
                if block.is_free {
                    ok &= !prev_free;
                    free_nodes += 1;
                    free_total += block.size;
                    arena_free += block.size;
                }
                prev_free = block.is_free;
                expected_offset += block.size;
                cursor = block.order.next;
            }

            ok &= expected_offset == arena.size;
            ok &= arena_free == arena.free_bytes;
            arena_it = arena.order.next;
        }

        ok &= free_nodes == self.strategy.total_free_nodes(&self.bank);
        ok &= free_total == self.strategy.total_free_size(&self.bank);
        ok &= free_total == self.bank.free_bytes;
        ok &= self.strategy.validate(&self.bank);
        ok
    }

    fn add_arena(&mut self, tag: AllocTag, size: Size, empty: bool) -> (ArenaId, BlockId) {
        let ids = add_arena_to(&mut self.bank, &mut self.strategy, tag, size, empty);
        if let Some(source) = self.source.as_mut() {
            self.bank.arenas[ids.0].backing = source.add_arena(ids.0, size);
        }
        self.counters.arenas_created += 1;
        info!(
            "added arena {:?}: {} bytes, {}",
            ids.0,
            size,
            if empty { "empty" } else { "fully allocated" }
        );
        ids
    }
}

/// Append an arena (and its spanning block) to a bank. Empty arenas enter the
/// strategy's free set; non-empty ones are born fully allocated, which is how
/// dedicated allocations consume a whole arena.
pub(crate) fn add_arena_to<S: Strategy>(
    bank: &mut BankData,
    strategy: &mut S,
    tag: AllocTag,
    size: Size,
    empty: bool,
) -> (ArenaId, BlockId) {
    let arena_id = bank.arenas.emplace(Arena::new(size));
    let block_id = bank.blocks.emplace(Block {
        tag,
        is_free: empty,
        ..Block::new(arena_id, 0, size)
    });

    if empty {
        bank.arenas[arena_id].free_bytes = size;
        bank.free_bytes += size;
    }

    let mut list = bank.arenas[arena_id].blocks;
    list.push_back(&mut bank.blocks, block_id);
    bank.arenas[arena_id].blocks = list;
    bank.arena_order.push_back(&mut bank.arenas, arena_id);

    if empty {
        strategy.add_free_arena(bank, block_id);
    }
    (arena_id, block_id)
}
