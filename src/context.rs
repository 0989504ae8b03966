use std::cell::RefCell;
use std::task::Waker;

use crate::error::{IllegalStateError, TokamakError, TokamakResult};
use crate::trace::Trace;

tokio::task_local! {
    static CONTEXT: RefCell<ContextInner>;
}

/// Per-invocation state combining a [`Trace`] with the indices of records the
/// current attempt is blocked on.
///
/// Bound to exactly one Tokio task at a time via [`tokio::task_local!`]: one
/// slot per execution strand, where "strand" maps to a task rather than an
/// OS thread in a cooperative async runtime (task-local storage survives the
/// task migrating across worker threads, which a plain OS thread-local would
/// not).
pub(crate) struct ContextInner {
    pub(crate) trace: Trace,
    pub(crate) pending: Vec<usize>,
    pub(crate) waker: Option<Waker>,
}

impl ContextInner {
    pub(crate) fn new() -> Self {
        Self { trace: Trace::new(), pending: Vec::new(), waker: None }
    }
}

/// Runs `scope` with a fresh [`ContextInner`] bound to the current task.
pub(crate) async fn enter<F, Fut, T>(scope: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    CONTEXT.scope(RefCell::new(ContextInner::new()), scope()).await
}

/// Grants synchronous access to the ambient [`ContextInner`], failing with
/// [`IllegalStateError::NoActiveRun`] when called outside of [`enter`]'s
/// scope (i.e. outside of an active `tokamak::run`).
pub(crate) fn with_context<R>(f: impl FnOnce(&mut ContextInner) -> TokamakResult<R>) -> TokamakResult<R> {
    match CONTEXT.try_with(|cell| f(&mut cell.borrow_mut())) {
        Ok(result) => result,
        Err(_access_error) => Err(TokamakError::from(IllegalStateError::NoActiveRun)),
    }
}

/// Synchronously touches the ambient context without the fallible plumbing,
/// for call sites (the driver) that are only ever reached from inside
/// [`enter`]'s scope by construction.
pub(crate) fn with_context_infallible<R>(f: impl FnOnce(&mut ContextInner) -> R) -> R {
    CONTEXT.with(|cell| f(&mut cell.borrow_mut()))
}
