/*!
 * Pool Allocator
 *
 * Fixed-size atom pool. Capacity grows one slab of `atoms_per_slab` atoms at
 * a time; released atoms go onto a LIFO free chain so the hottest atom is
 * reused first. Atoms are addressed by index, with the byte offset derived
 * from the atom size. Single-threaded by contract, like the arena allocator.
 */

use crate::core::types::{Offset, Size};
use log::debug;
use serde::{Deserialize, Serialize};

const NIL: u32 = u32::MAX;

/// A leased atom: stable index plus derived byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSlot {
    pub index: u32,
    pub offset: Offset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolStats {
    pub atom_size: Size,
    pub capacity: u32,
    pub in_use: u32,
    pub slabs: u32,
}

pub struct PoolAllocator {
    atom_size: Size,
    atoms_per_slab: u32,
    /// Per-atom next pointer for the free chain
    next: Vec<u32>,
    free_head: u32,
    in_use: u32,
    slabs: u32,
    #[cfg(debug_assertions)]
    live: Vec<bool>,
}

impl PoolAllocator {
    pub fn new(atom_size: Size, atoms_per_slab: u32) -> Self {
        debug_assert!(atom_size > 0 && atoms_per_slab > 0);
        Self {
            atom_size,
            atoms_per_slab,
            next: Vec::new(),
            free_head: NIL,
            in_use: 0,
            slabs: 0,
            #[cfg(debug_assertions)]
            live: Vec::new(),
        }
    }

    /// Lease an atom, growing by one slab when the chain is empty.
    pub fn allocate(&mut self) -> PoolSlot {
        if self.free_head == NIL {
            self.grow();
        }
        let index = self.free_head;
        self.free_head = self.next[index as usize];
        self.in_use += 1;
        #[cfg(debug_assertions)]
        {
            self.live[index as usize] = true;
        }
        PoolSlot {
            index,
            offset: index as Offset * self.atom_size,
        }
    }

    /// Return an atom to the pool.
    pub fn deallocate(&mut self, index: u32) {
        debug_assert!((index as usize) < self.next.len(), "atom index out of range");
        #[cfg(debug_assertions)]
        {
            assert!(self.live[index as usize], "double free of pool atom");
            self.live[index as usize] = false;
        }
        self.next[index as usize] = self.free_head;
        self.free_head = index;
        self.in_use -= 1;
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            atom_size: self.atom_size,
            capacity: self.next.len() as u32,
            in_use: self.in_use,
            slabs: self.slabs,
        }
    }

    /// Free-chain consistency: every capacity atom is either leased or on the
    /// chain exactly once.
    pub fn validate_integrity(&self) -> bool {
        let capacity = self.next.len() as u32;
        let mut chained = 0u32;
        let mut cursor = self.free_head;
        while cursor != NIL {
            if chained > capacity {
                return false; // cycle
            }
            chained += 1;
            cursor = self.next[cursor as usize];
        }
        chained + self.in_use == capacity
    }

    fn grow(&mut self) {
        let base = self.next.len() as u32;
        let end = base + self.atoms_per_slab;
        // Chain the new slab in ascending order: base allocates first
        for index in base..end {
            self.next.push(if index + 1 < end { index + 1 } else { NIL });
        }
        #[cfg(debug_assertions)]
        self.live.resize(end as usize, false);
        self.free_head = base;
        self.slabs += 1;
        debug!(
            "pool grew to slab {}: atoms {}..{} of {} bytes",
            self.slabs, base, end, self.atom_size
        );
    }
}
