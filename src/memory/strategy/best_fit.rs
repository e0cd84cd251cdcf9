/*!
 * Best-Fit Strategy
 *
 * Free blocks are kept in a set ordered by (size, block id). A lookup takes
 * the smallest block that fits, so large blocks survive for large requests;
 * ties break toward the oldest id.
 */

use super::split_front;
use crate::memory::bank::BlockId;
use crate::memory::layout::BankData;
use crate::memory::traits::Strategy;
use crate::core::types::Size;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct BestFit {
    free: BTreeSet<(Size, BlockId)>,
}

impl Strategy for BestFit {
    type Ticket = (Size, BlockId);

    fn try_allocate(&self, _bank: &BankData, size: Size) -> Option<Self::Ticket> {
        self.free.range((size, BlockId::NULL)..).next().copied()
    }

    fn commit(&mut self, bank: &mut BankData, size: Size, ticket: Self::Ticket) -> BlockId {
        let (found_size, id) = ticket;
        let removed = self.free.remove(&(found_size, id));
        debug_assert!(removed, "commit of a ticket not in the free set");

        if let Some(remainder) = split_front(bank, id, size) {
            self.free.insert((bank.blocks[remainder].size, remainder));
        }
        bank.blocks[id].is_free = false;
        id
    }

    fn add_free(&mut self, bank: &mut BankData, block: BlockId) {
        self.free.insert((bank.blocks[block].size, block));
    }

    fn grow_free_node(&mut self, bank: &mut BankData, block: BlockId, new_size: Size) {
        let old_size = bank.blocks[block].size;
        let removed = self.free.remove(&(old_size, block));
        debug_assert!(removed, "grow of a block not in the free set");
        bank.blocks[block].size = new_size;
        self.free.insert((new_size, block));
    }

    fn replace_and_grow(
        &mut self,
        bank: &mut BankData,
        old: BlockId,
        new: BlockId,
        new_size: Size,
    ) {
        let old_size = bank.blocks[old].size;
        let removed = self.free.remove(&(old_size, old));
        debug_assert!(removed, "replace of a block not in the free set");
        bank.blocks[new].size = new_size;
        self.free.insert((new_size, new));
    }

    fn erase(&mut self, bank: &mut BankData, block: BlockId) {
        let size = bank.blocks[block].size;
        let removed = self.free.remove(&(size, block));
        debug_assert!(removed, "erase of a block not in the free set");
    }

    fn total_free_nodes(&self, _bank: &BankData) -> usize {
        self.free.len()
    }

    fn total_free_size(&self, _bank: &BankData) -> Size {
        self.free.iter().map(|(size, _)| size).sum()
    }

    fn validate(&self, bank: &BankData) -> bool {
        self.free.iter().all(|&(size, id)| {
            bank.blocks.is_live(id) && bank.blocks[id].is_free && bank.blocks[id].size == size
        })
    }
}
