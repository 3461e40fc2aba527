//! Internal error plumbing.
//!
//! The source's `err.rs` exists "around the idea that kernel code spends too
//! much time handling and recording errors, and we ought to be able to
//! separate that concern using `Result`." We keep that idea: every public
//! entry point still returns a bare [`Status`] by value (the historical,
//! binary-compatible contract), but the *implementation* of each one is
//! free to use `?` against [`KernelError`], a thin `Result`-shaped wrapper
//! around the same status codes, and unwrap it back to a plain `Status` at
//! the boundary.

use rkernel_abi::Status;

/// A non-success [`Status`], usable with `?` inside the engine. Never
/// constructed from `Status::Ok` — see [`KernelError::new`].
#[derive(Copy, Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct KernelError(pub Status);

impl KernelError {
    pub(crate) fn new(status: Status) -> Self {
        debug_assert!(!status.is_ok(), "KernelError must wrap a failure status");
        KernelError(status)
    }
}

impl From<KernelError> for Status {
    fn from(e: KernelError) -> Status {
        e.0
    }
}

/// Runs `body`, returning its status directly; `body` may use `?` against
/// [`KernelError`] to short-circuit. This is the seam every public entry
/// point funnels through so the public signature can stay "just a
/// `Status`" while the body reads like ordinary `Result`-based Rust.
pub(crate) fn run(body: impl FnOnce() -> Result<Status, KernelError>) -> Status {
    match body() {
        Ok(status) => status,
        Err(e) => e.0,
    }
}

pub(crate) type KResult<T> = Result<T, KernelError>;

macro_rules! bail {
    ($status:expr) => {
        return Err($crate::err::KernelError::new($status))
    };
}
pub(crate) use bail;
