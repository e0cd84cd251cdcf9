/*!
 * First-Fit Strategy
 *
 * Free blocks form an intrusive doubly-linked list through their free links,
 * newest first. A lookup walks from the head and takes the first block that
 * fits. Cheaper bookkeeping than best-fit at the cost of more fragmentation
 * under mixed sizes.
 */

use super::split_front;
use crate::memory::bank::BlockId;
use crate::memory::layout::{BankData, LinkPair};
use crate::memory::traits::Strategy;
use crate::core::types::Size;

#[derive(Debug, Default)]
pub struct FirstFit {
    head: BlockId,
    count: usize,
}

impl FirstFit {
    fn push_front(&mut self, bank: &mut BankData, block: BlockId) {
        bank.blocks[block].free_link = LinkPair {
            prev: BlockId::NULL,
            next: self.head,
        };
        if !self.head.is_null() {
            bank.blocks[self.head].free_link.prev = block;
        }
        self.head = block;
        self.count += 1;
    }

    fn unlink(&mut self, bank: &mut BankData, block: BlockId) {
        let LinkPair { prev, next } = bank.blocks[block].free_link;
        if prev.is_null() {
            debug_assert_eq!(self.head, block, "unlink of a block not in the free list");
            self.head = next;
        } else {
            bank.blocks[prev].free_link.next = next;
        }
        if !next.is_null() {
            bank.blocks[next].free_link.prev = prev;
        }
        self.count -= 1;
    }
}

impl Strategy for FirstFit {
    type Ticket = BlockId;

    fn try_allocate(&self, bank: &BankData, size: Size) -> Option<Self::Ticket> {
        let mut cursor = self.head;
        while !cursor.is_null() {
            if bank.blocks[cursor].size >= size {
                return Some(cursor);
            }
            cursor = bank.blocks[cursor].free_link.next;
        }
        None
    }

    fn commit(&mut self, bank: &mut BankData, size: Size, ticket: Self::Ticket) -> BlockId {
        self.unlink(bank, ticket);
        if let Some(remainder) = split_front(bank, ticket, size) {
            self.push_front(bank, remainder);
        }
        bank.blocks[ticket].is_free = false;
        ticket
    }

    fn add_free(&mut self, bank: &mut BankData, block: BlockId) {
        self.push_front(bank, block);
    }

    fn grow_free_node(&mut self, bank: &mut BankData, block: BlockId, new_size: Size) {
        // Stays in place; only the size changes
        bank.blocks[block].size = new_size;
    }

    fn replace_and_grow(
        &mut self,
        bank: &mut BankData,
        old: BlockId,
        new: BlockId,
        new_size: Size,
    ) {
        self.unlink(bank, old);
        bank.blocks[new].size = new_size;
        self.push_front(bank, new);
    }

    fn erase(&mut self, bank: &mut BankData, block: BlockId) {
        self.unlink(bank, block);
    }

    fn total_free_nodes(&self, _bank: &BankData) -> usize {
        self.count
    }

    fn total_free_size(&self, bank: &BankData) -> Size {
        let mut total = 0;
        let mut cursor = self.head;
        while !cursor.is_null() {
            total += bank.blocks[cursor].size;
            cursor = bank.blocks[cursor].free_link.next;
        }
        total
    }

    fn validate(&self, bank: &BankData) -> bool {
        let mut seen = 0;
        let mut prev = BlockId::NULL;
        let mut cursor = self.head;
        while !cursor.is_null() {
            if seen > self.count {
                return false; // cycle
            }
            let block = &bank.blocks[cursor];
            if !block.is_free || block.free_link.prev != prev {
                return false;
            }
            seen += 1;
            prev = cursor;
            cursor = block.free_link.next;
        }
        seen == self.count
    }
}
