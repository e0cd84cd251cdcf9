/*!
 * Workgroup
 *
 * A contiguous span of workers sharing a static priority. Each member worker
 * owns one FIFO queue inside the group; round-robin submission rotates over
 * them through the atomic push offset. Worker counts are not required to be
 * powers of two - all rotation and victim selection is modulo the count.
 */

use super::queue::WorkQueue;
use std::sync::atomic::AtomicU32;

#[derive(Default)]
pub(crate) struct Workgroup {
    pub start: u32,
    pub count: u32,
    pub priority: u32,
    pub push_offset: AtomicU32,
    pub queues: Box<[WorkQueue]>,
}

impl Workgroup {
    /// (Re)configure the group; returns one past its highest worker index.
    pub fn configure(&mut self, start: u32, count: u32, priority: u32) -> u32 {
        self.start = start;
        self.count = count;
        self.priority = priority;
        *self.push_offset.get_mut() = 0;
        self.queues = (0..count).map(|_| WorkQueue::new()).collect();
        start + count
    }

    /// Reset to an empty, unscheduled group.
    pub fn clear(&mut self) {
        self.configure(0, 0, 0);
    }

    #[inline]
    pub fn contains(&self, worker_index: usize) -> bool {
        let index = worker_index as u32;
        index >= self.start && index < self.start + self.count
    }

    /// This worker's queue slot within the group.
    #[inline]
    pub fn queue_index_of(&self, worker_index: usize) -> usize {
        debug_assert!(self.contains(worker_index));
        worker_index - self.start as usize
    }
}
