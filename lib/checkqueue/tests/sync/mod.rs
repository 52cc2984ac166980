//! Shared helper for the loom-gated tests. Lives in a subdirectory of
//! `tests/` so cargo doesn't treat it as its own integration test binary.
//! See <https://doc.rust-lang.org/book/ch11-03-test-organization.html#submodules-in-integration-tests>.

#![allow(unused)]

#[cfg(loom)]
pub fn model<F>(f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    loom::model(f);
}

#[cfg(not(loom))]
pub fn model<F>(f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    f()
}
