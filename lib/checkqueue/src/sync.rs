//! Thin aliases over `std::sync` / `std::thread` that switch to their `loom`
//! equivalents under `cfg(loom)`.
//!
//! This lets `tests/loom_tests.rs` exhaustively model-check the exact
//! production code in [`crate::queue`] instead of testing a parallel
//! reimplementation of it. The trick is the same one the sibling
//! `vasi-sync` crate uses in its own `sync` module, scoped down here to the
//! handful of primitives this crate actually needs (a mutex, two condvars,
//! a few atomics, and thread spawn/join).

#[cfg(not(loom))]
pub use std::sync::{atomic, Arc, Condvar, Mutex, MutexGuard};
#[cfg(not(loom))]
pub use std::thread;

#[cfg(loom)]
pub use loom::sync::{atomic, Arc, Condvar, Mutex, MutexGuard};
#[cfg(loom)]
pub use loom::thread;

/// Spawn a named worker thread, falling back to an unnamed spawn under loom
/// (loom's thread model does not carry a `Builder::name` API).
#[cfg(not(loom))]
pub fn spawn_named<F>(name: &str, f: F) -> thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .expect("failed to spawn checkqueue worker thread")
}

#[cfg(loom)]
pub fn spawn_named<F>(_name: &str, f: F) -> thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(f)
}
