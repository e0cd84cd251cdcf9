/*!
 * Work Queues
 *
 * Every queue in the scheduler is the same shape: a spin lock guarding a FIFO
 * deque. Workers and submitters try-lock pervasively and go elsewhere on
 * contention; the blocking `push` exists only for the forced-submission
 * fallback that guarantees work is never dropped.
 */

use super::work::WorkItem;
use crate::core::sync::SpinLock;
use std::collections::VecDeque;

pub(crate) struct WorkQueue {
    items: SpinLock<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            items: SpinLock::new(VecDeque::new()),
        }
    }

    /// Push without blocking. Hands the item back on contention.
    pub fn try_push(&self, item: WorkItem) -> Result<(), WorkItem> {
        match self.items.try_lock() {
            Some(mut queue) => {
                queue.push_back(item);
                Ok(())
            }
            None => Err(item),
        }
    }

    /// Forced push; spins for the lock.
    pub fn push(&self, item: WorkItem) {
        self.items.lock().push_back(item);
    }

    /// Pop the front item without blocking. Contention reads as empty.
    pub fn try_pop(&self) -> Option<WorkItem> {
        self.items.try_lock()?.pop_front()
    }

    /// Non-blocking emptiness probe; a held lock conservatively counts as
    /// pending work.
    pub fn appears_occupied(&self) -> bool {
        match self.items.try_lock() {
            Some(queue) => !queue.is_empty(),
            None => true,
        }
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::WorkgroupId;

    #[test]
    fn test_fifo_order_is_preserved() {
        let queue = WorkQueue::new();
        for group in 0..3 {
            queue
                .try_push(WorkItem::new(|_| {}, WorkgroupId::new(group)))
                .unwrap();
        }
        for group in 0..3 {
            assert_eq!(queue.try_pop().unwrap().group(), WorkgroupId::new(group));
        }
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_occupancy_probe() {
        let queue = WorkQueue::new();
        assert!(!queue.appears_occupied());
        queue.push(WorkItem::empty());
        assert!(queue.appears_occupied());
    }
}
