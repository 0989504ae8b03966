use std::task::Poll;

use crate::context::{enter, with_context_infallible};
use crate::error::{RunFailure, TokamakError, TokamakErrorKind, TokamakResult};
use crate::trace::Memo;

/// Runs `closure` to completion via deterministic replay, returning the
/// closure's eventual result.
///
/// `closure` is an ordinary *synchronous* Rust closure — it never itself
/// performs `.await`. Each call to [`crate::await_value`]/[`crate::perform_once`]
/// inside it is a plain function call; asynchrony is entirely the driver's
/// concern, which keeps replay attempts from interacting with Rust's own
/// suspend/resume machinery.
///
/// `closure` may be invoked many times (once per attempt) before this
/// future resolves — it must be idempotent with respect to anything not
/// funnelled through `await_value`/`perform_once`.
#[tracing::instrument(skip_all)]
pub async fn run<F, T>(closure: F) -> Result<T, RunFailure>
where
    F: Fn() -> TokamakResult<T> + Send + 'static,
    T: Send + 'static,
{
    enter(|| async move {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            if let Err(err) = with_context_infallible(|ctx| ctx.trace.rollback()) {
                return Err(RunFailure::from(err));
            }

            tracing::trace!(attempt, "starting replay attempt");

            let result = std::future::poll_fn(|cx| {
                with_context_infallible(|ctx| ctx.waker = Some(cx.waker().clone()));
                Poll::Ready(closure())
            })
            .await;

            match result {
                Ok(value) => {
                    return with_context_infallible(|ctx| ctx.trace.commit())
                        .map(|()| value)
                        .map_err(RunFailure::from);
                }
                Err(err) if err.is_retry() => {
                    tracing::debug!(attempt, "retry-eligible error observed, re-entering immediately");
                    with_context_infallible(|ctx| std::mem::take(&mut ctx.pending));
                }
                Err(err) if err.is_break() => {
                    let pending = with_context_infallible(|ctx| std::mem::take(&mut ctx.pending));
                    if pending.is_empty() {
                        return Err(RunFailure::from(crate::error::IllegalStateError::BreakWithoutPending));
                    }
                    tracing::debug!(attempt, pending = pending.len(), "attempt blocked, waiting for any pending await");
                    wait_any(&pending).await;
                }
                Err(err) => {
                    return Err(into_run_failure(err));
                }
            }
        }
    })
    .await
}

/// Suspends until at least one of `pending`'s records' awaited futures
/// reports readiness. This is the engine's only genuine suspension point:
/// everywhere else, "pending" is communicated by unwinding an attempt via
/// `TokamakError::Break`, not by returning `Poll::Pending` from a real
/// `.await`.
///
/// Races every entry rather than waiting for all of them: the next attempt
/// will simply re-observe any future still pending and re-register it, so
/// there's no benefit to waiting for the rest — whichever resolves first
/// ends the wait; the rest are left untouched until the next break cycle
/// reaches them again, which is this port's advisory, best-effort stand-in
/// for cancelling the losers.
async fn wait_any(pending: &[usize]) {
    std::future::poll_fn(|cx| {
        with_context_infallible(|ctx| {
            for &idx in pending {
                if let Memo::Future(cell) = &mut ctx.trace.records_mut()[idx].memo {
                    if cell.poll_erased(cx).is_ready() {
                        return Poll::Ready(());
                    }
                }
            }
            Poll::Pending
        })
    })
    .await
}

fn into_run_failure(err: TokamakError) -> RunFailure {
    match err.0 {
        TokamakErrorKind::Break { .. } => unreachable!("break is handled by the caller before this point"),
        TokamakErrorKind::Determinism(e) => RunFailure::Determinism(e),
        TokamakErrorKind::IllegalState(e) => RunFailure::IllegalState(e),
        TokamakErrorKind::Failed(e) => RunFailure::Failed(e),
    }
}
