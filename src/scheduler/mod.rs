/*!
 * Scheduler Module
 * Work-stealing task engine: workgroups, per-worker queues, tasks, and
 * fork/join helpers
 */

pub mod engine;
pub mod event;
pub mod parallel;
pub mod queue;
pub mod task;
pub mod types;
pub mod work;
pub mod worker;
pub mod workgroup;

// Re-export public API
pub use engine::Scheduler;
pub use event::{BlockingEvent, BusyEvent};
pub use parallel::{parallel_for, parallel_for_each};
pub use task::Task;
pub use types::{SchedError, SchedResult, WorkerId, WorkgroupId, MAX_GROUPS, WORK_SCALE};
pub use work::{WorkItem, WORK_ITEM_PAYLOAD};
pub use worker::{current_worker, UserContext, WorkerContext, WorkerDesc};
