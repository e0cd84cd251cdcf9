/*!
 * Scheduler Types
 * Worker and workgroup identifiers, limits, and scheduler errors
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on workgroups; membership masks are 32 bits wide
pub const MAX_GROUPS: usize = 32;

/// Global budget on steal probes per `get_work` call
pub const MAX_STEAL_ATTEMPTS: u32 = 8;

/// Chunk multiplier for `parallel_for`'s logical divisor
pub const WORK_SCALE: u32 = 4;

/// Scheduler operation result
pub type SchedResult<T> = Result<T, SchedError>;

/// Scheduler errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedError {
    #[error("no workgroups configured; call create_group before begin_execution")]
    NotConfigured,

    #[error("scheduler already ran; restart after end_execution is not supported")]
    AlreadyRan,
}

/// A worker is one thread; worker 0 is the thread that called
/// `begin_execution`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    pub const MAIN: WorkerId = WorkerId(0);

    pub const fn new(index: u32) -> Self {
        WorkerId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A workgroup is a set of workers sharing a priority, each with its own
/// FIFO queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkgroupId(u32);

impl WorkgroupId {
    pub const DEFAULT: WorkgroupId = WorkgroupId(0);

    pub const fn new(index: u32) -> Self {
        WorkgroupId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn mask_bit(self) -> u32 {
        1 << self.0
    }
}

impl std::fmt::Display for WorkgroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group-{}", self.0)
    }
}
