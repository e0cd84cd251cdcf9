/*!
 * Defragmentation
 *
 * Repacks live allocations into the minimum number of arenas. The pass builds
 * a fresh bank with a fresh strategy, replays every live block into it in
 * arena order, and records the byte moves that repacking implies. The source
 * then executes the moves in recorded order (overlap-safe), receives exactly
 * one rebind per surviving allocation, and tears down arenas that no longer
 * host anything. Runs on the caller's thread at a safepoint.
 */

use super::arena::{add_arena_to, ArenaAllocator};
use super::bank::{ArenaId, BlockId};
use super::layout::BankData;
use super::traits::Strategy;
use super::types::{MemoryError, MemoryMove, MemoryResult};
use log::{debug, info};

impl<S: Strategy> ArenaAllocator<S> {
    /// Compact live allocations across arenas. Requires a memory source with
    /// defragment support.
    pub fn defragment(&mut self) -> MemoryResult<()> {
        match self.source.as_ref() {
            Some(source) if source.supports_defragment() => {}
            _ => return Err(MemoryError::DefragmentUnsupported),
        }
        let mut source = self.source.take().expect("source checked above");
        source.begin_defragment();

        let mut fresh = BankData::new();
        let mut strategy = S::default();
        strategy.init();

        let mut rebinds: Vec<BlockId> = Vec::with_capacity(self.bank.blocks.len());
        let mut moves: Vec<MemoryMove> = Vec::new();
        let mut deleted: Vec<ArenaId> = Vec::new();

        let mut arena_it = self.bank.arena_order.head();
        while !arena_it.is_null() {
            let next_arena = self.bank.arenas[arena_it].order.next;
            let mut arena_contributed = false;

            let mut block_it = self.bank.arenas[arena_it].blocks.head();
            while !block_it.is_null() {
                let next_block = self.bank.blocks[block_it].order.next;
                let (is_free, size, tag, align_shift, src_from, src_size) = {
                    let block = &self.bank.blocks[block_it];
                    (
                        block.is_free,
                        block.size,
                        block.tag,
                        block.align_shift,
                        block.aligned_offset(),
                        block.aligned_size(),
                    )
                };

                if !is_free {
                    let mut ticket = strategy.try_allocate(&fresh, size);
                    if ticket.is_none() && !arena_contributed {
                        // First placement failure for this source arena:
                        // carry its backing region over into the fresh bank
                        let src_arena_size = self.bank.arenas[arena_it].size;
                        let (new_arena, _) = add_arena_to(
                            &mut fresh,
                            &mut strategy,
                            0,
                            src_arena_size.max(size),
                            true,
                        );
                        fresh.arenas[new_arena].backing = self.bank.arenas[arena_it].backing;
                        ticket = strategy.try_allocate(&fresh, size);
                        arena_contributed = true;
                    }
                    let ticket = ticket.unwrap_or_else(|| {
                        panic!(
                            "defragment: live block of {} bytes could not be placed \
                             after adding a fresh arena",
                            size
                        )
                    });

                    let new_id = strategy.commit(&mut fresh, size, ticket);
                    let new_arena = fresh.blocks[new_id].arena;
                    fresh.arenas[new_arena].free_bytes -= size;
                    fresh.free_bytes -= size;
                    fresh.blocks[new_id].tag = tag;
                    fresh.blocks[new_id].align_shift = align_shift;
                    rebinds.push(new_id);

                    let record = MemoryMove {
                        from: src_from,
                        to: fresh.blocks[new_id].aligned_offset(),
                        size: src_size,
                        src_arena: arena_it,
                        dst_arena: new_arena,
                    };
                    push_move(&mut moves, record, &mut self.counters.defrag.moves_merged);
                }

                block_it = next_block;
            }

            if !arena_contributed {
                deleted.push(arena_it);
            }
            arena_it = next_arena;
        }

        debug!(
            "defragment: {} rebinds, {} moves, {} arenas to delete",
            rebinds.len(),
            moves.len(),
            deleted.len()
        );

        // Copy sequence follows recording order so in-place compaction within
        // a region never overwrites bytes it still has to read
        for record in &moves {
            source.move_memory(
                self.bank.arenas[record.src_arena].backing,
                fresh.arenas[record.dst_arena].backing,
                record.from,
                record.to,
                record.size,
            );
        }

        for new_id in rebinds {
            let block = &fresh.blocks[new_id];
            source.rebind_alloc(
                block.tag,
                fresh.arenas[block.arena].backing,
                new_id,
                block.aligned_offset(),
            );
        }

        for arena_id in deleted {
            source.remove_arena(self.bank.arenas[arena_id].backing);
            self.counters.defrag.arenas_removed += 1;
        }

        self.bank = fresh;
        self.strategy = strategy;
        self.counters.defrag.runs += 1;
        source.end_defragment();
        self.source = Some(source);

        info!("defragment complete: {} arenas remain", self.bank.arenas.len());
        Ok(())
    }
}

/// Append a move record, merging with the previous record when both arenas
/// match and both ranges are exactly adjacent.
fn push_move(moves: &mut Vec<MemoryMove>, record: MemoryMove, merged: &mut u64) {
    if !record.is_moved() {
        return;
    }
    if let Some(last) = moves.last_mut() {
        if last.src_arena == record.src_arena
            && last.dst_arena == record.dst_arena
            && last.from + last.size == record.from
            && last.to + last.size == record.to
        {
            last.size += record.size;
            *merged += 1;
            return;
        }
    }
    moves.push(record);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: usize, to: usize, size: usize) -> MemoryMove {
        MemoryMove {
            from,
            to,
            size,
            src_arena: ArenaId::NULL,
            dst_arena: ArenaId::NULL,
        }
    }

    #[test]
    fn test_adjacent_moves_merge() {
        let mut moves = Vec::new();
        let mut merged = 0;
        push_move(&mut moves, record(0, 100, 32), &mut merged);
        push_move(&mut moves, record(32, 132, 16), &mut merged);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].size, 48);
        assert_eq!(merged, 1);
    }

    #[test]
    fn test_gap_prevents_merge() {
        let mut moves = Vec::new();
        let mut merged = 0;
        push_move(&mut moves, record(0, 100, 32), &mut merged);
        push_move(&mut moves, record(64, 164, 16), &mut merged);
        assert_eq!(moves.len(), 2);
        assert_eq!(merged, 0);
    }

    #[test]
    fn test_unmoved_records_are_skipped() {
        let mut moves = Vec::new();
        let mut merged = 0;
        push_move(&mut moves, record(64, 64, 32), &mut merged);
        assert!(moves.is_empty());
    }
}
