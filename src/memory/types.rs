/*!
 * Memory Types
 * Common types for the allocator core
 */

use super::bank::{ArenaId, BlockId};
use crate::core::types::{BackingId, Offset, Size};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryError {
    #[error("out of capacity: requested {requested} bytes, {free} bytes free across {arenas} arenas")]
    OutOfCapacity {
        requested: Size,
        free: Size,
        arenas: usize,
    },

    #[error("defragmentation requires a memory source with defragment support")]
    DefragmentUnsupported,
}

/// Handle returned by `allocate`. The block id is the durable key for
/// `deallocate`; the backing id is meaningful only when the allocator was
/// built with a memory source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Allocation {
    pub backing: BackingId,
    pub block: BlockId,
    pub offset: Offset,
}

impl Allocation {
    pub fn is_null(&self) -> bool {
        self.block.is_null()
    }
}

/// One pending copy emitted by defragmentation. Moves are executed strictly
/// in emission order so overlapping source and destination ranges within an
/// arena cannot corrupt data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMove {
    pub from: Offset,
    pub to: Offset,
    pub size: Size,
    pub src_arena: ArenaId,
    pub dst_arena: ArenaId,
}

impl MemoryMove {
    /// False when the range ends up exactly where it started.
    pub fn is_moved(&self) -> bool {
        self.from != self.to || self.src_arena != self.dst_arena
    }
}

/// Allocator statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemoryStats {
    pub total_bytes: Size,
    pub free_bytes: Size,
    pub arenas: usize,
    pub allocations: u64,
    pub deallocations: u64,
    pub arenas_created: u64,
    #[serde(default)]
    pub defrag: DefragStats,
}

impl MemoryStats {
    /// Fraction of arena capacity currently allocated (0.0 when empty).
    pub fn utilization(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            1.0 - (self.free_bytes as f64 / self.total_bytes as f64)
        }
    }

    /// Coarse pressure level derived from utilization.
    pub fn pressure(&self) -> MemoryPressure {
        let used = self.utilization();
        if used >= 0.95 {
            MemoryPressure::Critical
        } else if used >= 0.80 {
            MemoryPressure::High
        } else if used >= 0.60 {
            MemoryPressure::Medium
        } else {
            MemoryPressure::Low
        }
    }
}

/// Memory pressure levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryPressure::Low => write!(f, "LOW"),
            MemoryPressure::Medium => write!(f, "MEDIUM"),
            MemoryPressure::High => write!(f, "HIGH"),
            MemoryPressure::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Defragmentation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DefragStats {
    pub runs: u64,
    pub arenas_removed: u64,
    pub moves_merged: u64,
}
