use crate::sync::{atomic, spawn_named, Arc, Condvar, Mutex};
use atomic::{AtomicBool, AtomicUsize, Ordering};

/// A value that can be submitted to a [`CheckQueue`] and evaluated exactly
/// once to a boolean.
///
/// `Default` doubles as the "destructive move" requirement: a worker claims
/// an item by swapping it for a fresh default value under the queue's
/// mutex, then evaluates the owned value after releasing the lock. This is
/// what lets the queue honor "the mutex is never held across item
/// evaluation" without `unsafe`.
pub trait Checkable: Default + Send {
    /// Evaluate the item, consuming it.
    fn check(self) -> bool;
}

/// The simplest possible [`Checkable`]: a precomputed boolean outcome.
impl Checkable for bool {
    fn check(self) -> bool {
        self
    }
}

struct State<C> {
    /// Pending items for the current round. Evaluated items are replaced
    /// in place by `C::default()` rather than removed, so that `cursor`
    /// indices stay valid for the lifetime of a round.
    items: Vec<C>,
    /// Conjunction of every outcome evaluated so far this round.
    verdict: bool,
}

struct Shared<C> {
    state: Mutex<State<C>>,
    /// Workers sleep here while `cursor >= total` and no interrupt.
    worker_wait: Condvar,
    /// The master sleeps here while `outstanding > 0`.
    master_wait: Condvar,
    /// Next index to claim. Only ever moves forward within a round; reset
    /// to 0 once a round fully drains.
    cursor: AtomicUsize,
    /// Size of `items` as of the most recent `Add`. Kept atomic (alongside
    /// the mutex-protected `items`) so the dispatch hot path in
    /// `run_loop` never needs to take the lock just to check for more
    /// work.
    total: AtomicUsize,
    /// Items submitted but not yet retired. The sole ground truth for
    /// drain detection. A claimed item is retired (subtracted from this
    /// count) only together with folding its thread's verdict under
    /// `state`'s lock, never lock-free right after evaluation, so
    /// `outstanding == 0` always implies every outcome has already been
    /// folded into `verdict`.
    outstanding: AtomicUsize,
    interrupt: AtomicBool,
}

/// A worker-pool primitive that evaluates a round's worth of [`Checkable`]
/// items in parallel and reduces the outcomes to a single boolean.
///
/// Workers are started once with [`CheckQueue::start`] and live across many
/// rounds. Within a round, callers append batches of items (via a
/// [`RoundController`](crate::RoundController)) and then block until every
/// submitted item has been evaluated.
pub struct CheckQueue<C: Checkable + 'static> {
    shared: Arc<Shared<C>>,
    workers: Mutex<Vec<crate::sync::thread::JoinHandle<()>>>,
    /// Serializes rounds: held by a `RoundController` for its entire
    /// scope, guaranteeing at most one active round (and hence one
    /// master) per queue.
    control_mutex: Mutex<()>,
    batch_size: usize,
}

impl<C: Checkable + 'static> CheckQueue<C> {
    /// Construct an idle queue with no workers.
    ///
    /// `batch_size` is an advisory cap on how many items a worker may
    /// claim before contending on shared state again; this implementation
    /// claims one item per atomic fetch-add (see `DESIGN.md`), so the
    /// value is only exposed via [`CheckQueue::batch_size`] and otherwise
    /// unused.
    pub fn new(batch_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: Vec::new(),
                    verdict: true,
                }),
                worker_wait: Condvar::new(),
                master_wait: Condvar::new(),
                cursor: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
                interrupt: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::new()),
            control_mutex: Mutex::new(()),
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of worker threads currently running.
    pub fn num_workers(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    /// Spawn `num_threads` worker threads named `thread_name`.
    ///
    /// Precondition: no workers currently exist and no round is in
    /// progress. If `num_threads == 0`, no threads are spawned and every
    /// round runs entirely on the master.
    pub fn start(&self, num_threads: usize, thread_name: &str) {
        let mut workers = self.workers.lock().unwrap();
        assert!(
            workers.is_empty(),
            "CheckQueue::start called while worker threads already exist"
        );

        self.shared.interrupt.store(false, Ordering::Release);

        log::debug!("starting {num_threads} '{thread_name}' worker thread(s)");

        for _ in 0..num_threads {
            let shared = Arc::clone(&self.shared);
            workers.push(spawn_named(thread_name, move || worker_loop(shared.as_ref())));
        }
    }

    /// Set the interrupt flag and wake every idle worker. Safe to call at
    /// any time. Does not unblock a master currently inside
    /// [`CheckQueue::wait_round`], and does not cancel in-flight item
    /// evaluation.
    pub fn interrupt(&self) {
        self.shared.interrupt.store(true, Ordering::Release);
        // Hold the state lock while notifying so a worker that is
        // mid-evaluation of its wait predicate cannot observe the old
        // value and go back to sleep after we've already notified.
        let _state = self.shared.state.lock().unwrap();
        self.shared.worker_wait.notify_all();
        log::debug!("checkqueue interrupted");
    }

    /// Join every worker thread and forget them. Only safe to call once
    /// [`CheckQueue::interrupt`] has been observed by every idle worker.
    pub fn stop(&self) {
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            handle.join().expect("a checkqueue worker thread panicked");
        }
        log::debug!("all checkqueue worker threads joined");
    }

    pub(crate) fn control_mutex(&self) -> &Mutex<()> {
        &self.control_mutex
    }

    /// Move `batch` into the pending sequence and wake workers. A no-op
    /// (and does not notify) if `batch` is empty.
    pub(crate) fn add_items(&self, batch: Vec<C>) {
        if batch.is_empty() {
            return;
        }
        let n = batch.len();

        {
            let mut state = self.shared.state.lock().unwrap();
            state.items.extend(batch);
            self.shared
                .total
                .store(state.items.len(), Ordering::Release);
        }

        self.shared.outstanding.fetch_add(n, Ordering::AcqRel);

        if n == 1 {
            self.shared.worker_wait.notify_one();
        } else {
            self.shared.worker_wait.notify_all();
        }
    }

    /// Join the round as the master, blocking until `outstanding` reaches
    /// zero, then return the round's aggregate verdict and reset the queue
    /// for the next round.
    pub(crate) fn wait_round(&self) -> bool {
        master_loop(&self.shared)
    }
}

impl<C: Checkable + 'static> Drop for CheckQueue<C> {
    fn drop(&mut self) {
        let workers = self.workers.get_mut().unwrap();
        assert!(
            workers.is_empty(),
            "CheckQueue dropped with live worker threads; call interrupt() then stop() first"
        );
    }
}

/// Evaluate `item`, catching a panic and treating it as a failed check.
/// Workers must never terminate because of an item's own behavior, since a
/// dead worker would strand `outstanding` and hang the master forever.
fn evaluate<C: Checkable>(item: C) -> bool {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| item.check())) {
        Ok(result) => result,
        Err(_) => {
            log::error!("a checkqueue item panicked during evaluation; treating it as failed");
            false
        }
    }
}

/// Claim the next item, if any. Returns `None` once `cursor` has outrun
/// `total`, i.e. there is nothing left to claim for this round.
fn claim_next<C: Checkable>(shared: &Shared<C>) -> Option<C> {
    let i = shared.cursor.fetch_add(1, Ordering::AcqRel);
    if i >= shared.total.load(Ordering::Acquire) {
        return None;
    }

    let mut state = shared.state.lock().unwrap();
    Some(std::mem::take(&mut state.items[i]))
}

/// The worker half of the shared dispatch loop: run until interrupted.
fn worker_loop<C: Checkable>(shared: &Shared<C>) {
    let mut ok = true;
    let mut claimed = 0usize;

    loop {
        if let Some(item) = claim_next(shared) {
            ok &= evaluate(item);
            claimed += 1;
            continue;
        }

        let mut state = shared.state.lock().unwrap();
        // Fold this thread's verdict and retire its claimed items in the
        // same critical section: `outstanding` must never reach zero
        // lock-free while a thread's own `ok` is still unfolded, or the
        // master could observe a drained round before every outcome has
        // been accounted for.
        state.verdict &= ok;
        ok = true;
        if claimed > 0 {
            shared.outstanding.fetch_sub(claimed, Ordering::AcqRel);
            claimed = 0;
        }

        if shared.outstanding.load(Ordering::Acquire) == 0 {
            shared.master_wait.notify_one();
        }

        if shared.interrupt.load(Ordering::Acquire) {
            return;
        }

        let _state = shared
            .worker_wait
            .wait_while(state, |_| {
                !shared.interrupt.load(Ordering::Acquire)
                    && shared.cursor.load(Ordering::Acquire)
                        >= shared.total.load(Ordering::Acquire)
            })
            .unwrap();
    }
}

/// The master half of the shared dispatch loop: evaluate claimable items
/// like a worker, then block for the rest of the round to drain.
fn master_loop<C: Checkable>(shared: &Shared<C>) -> bool {
    let mut ok = true;
    let mut claimed = 0usize;

    loop {
        if let Some(item) = claim_next(shared) {
            ok &= evaluate(item);
            claimed += 1;
            continue;
        }

        let mut state = shared.state.lock().unwrap();
        // Same retire-under-lock discipline as the worker branch above.
        state.verdict &= ok;
        if claimed > 0 {
            shared.outstanding.fetch_sub(claimed, Ordering::AcqRel);
            claimed = 0;
        }

        state = shared
            .master_wait
            .wait_while(state, |_| shared.outstanding.load(Ordering::Acquire) != 0)
            .unwrap();

        let verdict = state.verdict;
        state.verdict = true;
        state.items.clear();
        // Rearm for the next round while still holding the lock, and
        // reset `total` before `cursor`: a worker waking from a spurious
        // wakeup re-checks `cursor >= total` outside the lock, and must
        // never observe `cursor < total` while `items` is empty, or it
        // will index an empty vector in `claim_next`.
        shared.total.store(0, Ordering::Release);
        shared.cursor.store(0, Ordering::Release);
        drop(state);

        return verdict;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as StdOrdering};

    #[derive(Default)]
    struct CountingCheck {
        outcome: bool,
        counter: Option<std::sync::Arc<AtomicU32>>,
    }

    impl Checkable for CountingCheck {
        fn check(self) -> bool {
            if let Some(counter) = &self.counter {
                counter.fetch_add(1, StdOrdering::SeqCst);
            }
            self.outcome
        }
    }

    fn counted(outcome: bool, counter: &std::sync::Arc<AtomicU32>) -> CountingCheck {
        CountingCheck {
            outcome,
            counter: Some(std::sync::Arc::clone(counter)),
        }
    }

    #[test]
    fn empty_round_returns_true() {
        let queue = CheckQueue::<bool>::new(1);
        queue.start(4, "checkqueue-test");
        assert!(queue.wait_round());
        queue.interrupt();
        queue.stop();
    }

    #[test]
    fn all_true_round_is_true() {
        let queue = CheckQueue::<bool>::new(1);
        queue.start(4, "checkqueue-test");
        queue.add_items(vec![true, true, true, true, true]);
        assert!(queue.wait_round());
        queue.interrupt();
        queue.stop();
    }

    #[test]
    fn one_false_taints_the_round() {
        let queue = CheckQueue::<bool>::new(1);
        queue.start(4, "checkqueue-test");
        let counter = std::sync::Arc::new(AtomicU32::new(0));
        let mut batch = Vec::new();
        for _ in 0..9 {
            batch.push(counted(true, &counter));
        }
        batch.push(counted(false, &counter));
        for _ in 0..10 {
            batch.push(counted(true, &counter));
        }
        queue.add_items(batch);
        assert!(!queue.wait_round());
        assert_eq!(counter.load(StdOrdering::SeqCst), 20);
        queue.interrupt();
        queue.stop();
    }

    #[test]
    fn no_worker_mode_runs_entirely_on_master() {
        let queue = CheckQueue::<CountingCheck>::new(1);
        queue.start(0, "checkqueue-test");
        let counter = std::sync::Arc::new(AtomicU32::new(0));
        let batch: Vec<_> = (0..100).map(|_| counted(true, &counter)).collect();
        queue.add_items(batch);
        assert!(queue.wait_round());
        assert_eq!(counter.load(StdOrdering::SeqCst), 100);
        queue.interrupt();
        queue.stop();
    }

    #[test]
    fn verdict_resets_between_rounds() {
        let queue = CheckQueue::<bool>::new(1);
        queue.start(2, "checkqueue-test");

        queue.add_items(vec![false]);
        assert!(!queue.wait_round());

        queue.add_items(vec![true, true]);
        assert!(queue.wait_round());

        queue.interrupt();
        queue.stop();
    }

    #[test]
    fn interleaved_adds_are_all_evaluated_before_wait_returns() {
        let queue = CheckQueue::<CountingCheck>::new(1);
        queue.start(2, "checkqueue-test");
        let counter = std::sync::Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            queue.add_items(vec![counted(true, &counter)]);
        }
        for _ in 0..5 {
            queue.add_items(vec![counted(true, &counter)]);
        }
        queue.add_items(vec![counted(false, &counter)]);

        assert!(!queue.wait_round());
        assert_eq!(counter.load(StdOrdering::SeqCst), 11);

        queue.interrupt();
        queue.stop();
    }

    #[test]
    fn panicking_item_is_treated_as_false_and_worker_survives() {
        struct Poison;

        impl Default for Poison {
            fn default() -> Self {
                Poison
            }
        }

        impl Checkable for Poison {
            fn check(self) -> bool {
                panic!("boom");
            }
        }

        let queue = CheckQueue::<Poison>::new(1);
        queue.start(1, "checkqueue-test");
        queue.add_items(vec![Poison]);
        assert!(!queue.wait_round());

        // the worker must still be alive to serve another round
        queue.add_items(vec![Poison, Poison]);
        assert!(!queue.wait_round());

        queue.interrupt();
        queue.stop();
    }
}
