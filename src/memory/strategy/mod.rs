/*!
 * Allocation Strategies
 *
 * Two free-list disciplines behind the `Strategy` trait: best-fit over a
 * size-ordered set, and first-fit over an intrusive free list threaded
 * through the blocks' free links. Both split found blocks from the front so
 * allocations pack toward offset 0.
 */

pub mod best_fit;
pub mod first_fit;

pub use best_fit::BestFit;
pub use first_fit::FirstFit;

use super::bank::BlockId;
use super::layout::BankData;
use crate::core::types::Size;

/// Shared split step: carve `size` bytes off the front of free block `id`,
/// linking any remainder after it in arena order. Returns the remainder.
pub(crate) fn split_front(bank: &mut BankData, id: BlockId, size: Size) -> Option<BlockId> {
    let (arena, offset, old_size) = {
        let block = &bank.blocks[id];
        (block.arena, block.offset, block.size)
    };
    debug_assert!(old_size >= size);
    if old_size == size {
        return None;
    }

    let remainder = bank.blocks.emplace(super::layout::Block {
        is_free: true,
        ..super::layout::Block::new(arena, offset + size, old_size - size)
    });
    bank.blocks[id].size = size;

    let mut list = bank.arenas[arena].blocks;
    list.insert_after(&mut bank.blocks, id, remainder);
    bank.arenas[arena].blocks = list;

    Some(remainder)
}
