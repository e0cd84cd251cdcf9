/*!
 * Synchronization Primitives
 *
 * The scheduler's locking discipline lives here:
 * - `SpinLock`: TTAS spin lock with a try-lock fast path, guarding work queues
 * - `WakeEvent`: binary-semaphore event used to park and unpark workers
 * - `Latch`: countdown latch used for startup rendezvous and fork/join waits
 * - adaptive steal backoff with tunable thresholds
 */

pub mod backoff;
pub mod event;
pub mod spinlock;

pub use backoff::BackoffConfig;
pub use event::{Latch, WakeEvent};
pub use spinlock::{SpinGuard, SpinLock};
