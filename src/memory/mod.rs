/*!
 * Memory Module
 * Arena allocation with coalescing and defragmentation, plus a fixed-size
 * atom pool
 */

pub mod arena;
pub mod bank;
pub mod defrag;
pub mod heap;
pub mod layout;
pub mod pool;
pub mod strategy;
pub mod traits;
pub mod types;

// Re-export public API
pub use arena::ArenaAllocator;
pub use bank::{ArenaId, BlockId};
pub use heap::{HeapSource, RebindRecord};
pub use pool::{PoolAllocator, PoolSlot, PoolStats};
pub use strategy::{BestFit, FirstFit};
pub use traits::{MemorySource, Strategy};
pub use types::{
    Allocation, DefragStats, MemoryError, MemoryMove, MemoryPressure, MemoryResult, MemoryStats,
};
