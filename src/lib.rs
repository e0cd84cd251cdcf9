/*!
 * Groundwork
 * Infrastructure primitives: arena allocation and work-stealing scheduling
 */

pub mod core;
pub mod memory;
pub mod scheduler;

// Re-exports
pub use crate::core::sync::BackoffConfig;
pub use memory::{
    Allocation, ArenaAllocator, BestFit, BlockId, FirstFit, HeapSource, MemoryError, MemoryMove,
    MemorySource, MemoryStats, PoolAllocator, Strategy,
};
pub use scheduler::{
    current_worker, parallel_for, parallel_for_each, BlockingEvent, BusyEvent, SchedError,
    Scheduler, Task, WorkItem, WorkerContext, WorkerDesc, WorkerId, WorkgroupId,
};
