/*!
 * Memory Traits
 * Interfaces between the allocator core, its free-list strategy, and the
 * caller-supplied memory source
 */

use super::bank::{ArenaId, BlockId};
use super::layout::BankData;
use crate::core::types::{AllocTag, BackingId, Offset, Size};

/// Free-list discipline plugged into the arena allocator.
///
/// The strategy owns the representation of the free set and the block
/// splitting performed by `commit`; the allocator owns the free/allocated
/// flag and all byte accounting. `try_allocate` must not mutate - the ticket
/// it returns is consumed by `commit`.
pub trait Strategy: Default {
    /// Opaque placement found by `try_allocate`
    type Ticket;

    /// One-time setup hook.
    fn init(&mut self) {}

    /// Locate a free block able to hold `size` bytes.
    fn try_allocate(&self, bank: &BankData, size: Size) -> Option<Self::Ticket>;

    /// Consume a ticket: carve a block of exactly `size` bytes out of the
    /// found block, splitting from the front; any remainder re-enters the
    /// free set. Returns the allocated block.
    fn commit(&mut self, bank: &mut BankData, size: Size, ticket: Self::Ticket) -> BlockId;

    /// Insert a block into the free set.
    fn add_free(&mut self, bank: &mut BankData, block: BlockId);

    /// Insert the spanning block of a brand-new empty arena.
    fn add_free_arena(&mut self, bank: &mut BankData, block: BlockId) {
        self.add_free(bank, block);
    }

    /// A free block absorbed its right neighbors: update its size in place.
    fn grow_free_node(&mut self, bank: &mut BankData, block: BlockId, new_size: Size);

    /// `new` takes over for free block `old` with a larger size (left-extend
    /// of a free block by the block being released).
    fn replace_and_grow(
        &mut self,
        bank: &mut BankData,
        old: BlockId,
        new: BlockId,
        new_size: Size,
    );

    /// Remove a block from the free set.
    fn erase(&mut self, bank: &mut BankData, block: BlockId);

    fn total_free_nodes(&self, bank: &BankData) -> usize;

    fn total_free_size(&self, bank: &BankData) -> Size;

    /// Strategy-internal consistency check.
    fn validate(&self, bank: &BankData) -> bool;
}

/// Supplier of backing regions for arenas, with optional defragment support.
///
/// The allocator itself never touches bytes; every copy during
/// defragmentation goes through `move_memory`, and every surviving
/// allocation is reported once through `rebind_alloc` so external references
/// can be updated.
pub trait MemorySource {
    /// Provide a backing region for a new arena; the returned id is opaque
    /// to the allocator and flows back through every later callback.
    fn add_arena(&mut self, arena: ArenaId, size: Size) -> BackingId;

    /// An arena became entirely free. Returning false keeps it alive and
    /// coalescing proceeds normally.
    fn drop_arena(&mut self, backing: BackingId) -> bool;

    /// Final teardown of a region, after `drop_arena` accepted or after the
    /// arena was eliminated by defragmentation.
    fn remove_arena(&mut self, backing: BackingId);

    /// Defragment capability gate; the remaining methods are only invoked
    /// when this returns true.
    fn supports_defragment(&self) -> bool {
        false
    }

    /// Safepoint bracket opening a defragmentation pass.
    fn begin_defragment(&mut self) {}

    /// Safepoint bracket closing a defragmentation pass.
    fn end_defragment(&mut self) {}

    /// Copy `size` bytes from `from` in `src` to `to` in `dst`. Call order
    /// is meaningful: ranges may overlap within a region.
    fn move_memory(
        &mut self,
        _src: BackingId,
        _dst: BackingId,
        _from: Offset,
        _to: Offset,
        _size: Size,
    ) {
    }

    /// Update external references for one surviving allocation.
    fn rebind_alloc(
        &mut self,
        _tag: AllocTag,
        _backing: BackingId,
        _block: BlockId,
        _offset: Offset,
    ) {
    }
}
