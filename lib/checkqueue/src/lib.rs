//! A parallel check queue: a fixed worker pool that evaluates short,
//! independent predicates in parallel and reduces a round's outcomes to a
//! single boolean.
//!
//! This is the kind of primitive a bulk validation phase reaches for when it
//! has a batch of cheap, independent predicates (e.g. signature checks) and
//! wants to spread them across a pool without paying for a new task per
//! item. A single coordinating ("master") caller submits batches through a
//! scoped [`RoundController`] and then blocks until everything submitted in
//! that round has been evaluated:
//!
//! ```
//! use checkqueue::{CheckQueue, RoundController};
//!
//! let queue = CheckQueue::<bool>::new(16);
//! queue.start(4, "checker");
//!
//! {
//!     let mut round = RoundController::new(&queue);
//!     round.add(vec![true, true, true]);
//!     round.add(vec![true, true]);
//!     assert!(round.wait());
//! }
//!
//! {
//!     let mut round = RoundController::new(&queue);
//!     round.add(vec![true, false, true]);
//!     assert!(!round.wait());
//! }
//!
//! queue.interrupt();
//! queue.stop();
//! ```
//!
//! The queue is parametric over the item type via the [`Checkable`] trait,
//! so dispatch is a static call, not a virtual one. Only one round may be
//! in progress on a given queue at a time; constructing a second
//! [`RoundController`] while one is already alive blocks until the first is
//! dropped.
//!
//! Unsafe code is not used anywhere in this crate: items are claimed by
//! swapping them out of the shared vector for a fresh [`Default`] value
//! under a short-lived lock, rather than by indexing into shared memory
//! without synchronization.

mod queue;
mod round;
mod sync;

pub use queue::{CheckQueue, Checkable};
pub use round::RoundController;
