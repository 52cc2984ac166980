use crate::queue::{Checkable, CheckQueue};
use crate::sync::MutexGuard;

/// A scoped handle for exactly one round on a [`CheckQueue`].
///
/// Construction blocks until any prior round on the same queue has been
/// released. While a `RoundController` is alive, the caller may append
/// batches with [`add`](Self::add); [`wait`](Self::wait) ends the round and
/// returns its aggregate verdict. If `wait` is never called explicitly, it
/// runs implicitly on drop (discarding the verdict) so the queue is always
/// left drained before the next round can start.
///
/// A controller constructed with [`RoundController::disabled`] is bound to
/// no queue: every operation on it is a no-op that reports success. This
/// null binding lets a caller with parallel checking turned off skip
/// special-casing its call sites.
///
/// `RoundController` is neither `Clone` nor `Copy`; moving it is ordinary
/// Rust ownership transfer (unlike the C++ original this is adapted from,
/// Rust moves never leave behind a stale handle that could double-release
/// the control mutex, so no extra bookkeeping is needed for that).
pub struct RoundController<'q, C: Checkable + 'static> {
    queue: Option<&'q CheckQueue<C>>,
    // Held for the controller's entire lifetime; released on drop, after
    // our own `Drop::drop` below has finished the implicit wait.
    _guard: Option<MutexGuard<'q, ()>>,
    waited: bool,
}

impl<'q, C: Checkable + 'static> RoundController<'q, C> {
    /// Bind to `queue` for one round, blocking until any prior round has
    /// released the queue's control mutex.
    pub fn new(queue: &'q CheckQueue<C>) -> Self {
        let guard = queue.control_mutex().lock().unwrap();
        Self {
            queue: Some(queue),
            _guard: Some(guard),
            waited: false,
        }
    }

    /// A controller bound to nothing: every method is a no-op returning
    /// success, for callers that have parallel checking disabled.
    pub fn disabled() -> Self {
        Self {
            queue: None,
            _guard: None,
            waited: false,
        }
    }

    /// Append `batch` to the round. No-op on a disabled controller.
    pub fn add(&mut self, batch: Vec<C>) {
        if let Some(queue) = self.queue {
            queue.add_items(batch);
        }
    }

    /// End the round and return its aggregate verdict. Must not be called
    /// more than once.
    pub fn wait(&mut self) -> bool {
        assert!(
            !self.waited,
            "RoundController::wait called more than once for one round"
        );
        self.waited = true;

        match self.queue {
            Some(queue) => queue.wait_round(),
            None => true,
        }
    }

    /// Whether [`wait`](Self::wait) has already run for this round (either
    /// explicitly or implicitly on drop).
    pub fn is_waited(&self) -> bool {
        self.waited
    }
}

impl<C: Checkable + 'static> Drop for RoundController<'_, C> {
    fn drop(&mut self) {
        if !self.waited {
            self.wait();
        }
    }
}
