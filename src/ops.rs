use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::task::Context as StdContext;

use crate::callsite::CallSite;
use crate::context::with_context;
use crate::error::{IllegalStateError, TokamakError, TokamakResult};
use crate::trace::{self, Memo};

/// A configured operation facade: the retry-on-error predicate shared by a
/// particular `await_value`/`perform_once` call.
///
/// The unconfigured forms used by the [`crate::await_value`] and
/// [`crate::perform_once`] macros build an `Operation::default()`, whose
/// predicate is absent — so their retry-on set is always empty; only the
/// `_with` macro variants accept an explicitly configured `Operation`.
#[derive(Clone, Default)]
pub struct Operation {
    retry_on: Option<Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>>,
}

impl Operation {
    pub fn builder() -> OperationBuilder {
        OperationBuilder::default()
    }

    fn should_retry(&self, err: &anyhow::Error) -> bool {
        self.retry_on.as_ref().is_some_and(|predicate| predicate(err))
    }
}

/// Builds a configured [`Operation`]. The Rust realization of
/// `operation_builder().retry_on(error_kind).build()`.
#[derive(Default)]
pub struct OperationBuilder {
    retry_on: Option<Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>>,
}

impl OperationBuilder {
    /// Registers a predicate over the error a `perform_once` closure raised
    /// or an awaited future resolved to. Classification itself ("is this
    /// error kind E") is left to the caller — typically an `err.downcast_ref`
    /// check — rather than something this crate implements for you.
    pub fn retry_on(mut self, predicate: impl Fn(&anyhow::Error) -> bool + Send + Sync + 'static) -> Self {
        self.retry_on = Some(Arc::new(predicate));
        self
    }

    pub fn build(self) -> Operation {
        Operation { retry_on: self.retry_on }
    }
}

/// `#[doc(hidden)]` entry point expanded by [`crate::await_value`]; not
/// meant to be called directly (the call-site argument must come from the
/// macro to be meaningful).
#[doc(hidden)]
pub fn await_value_at<F, Fut, V, E>(call_site: CallSite, op: &Operation, make_future: F) -> TokamakResult<V>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    V: Clone + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    with_context(|ctx| {
        let idx = ctx.trace.record(call_site)?;

        if let Memo::Value(value) = &ctx.trace.records_mut()[idx].memo {
            let value = value
                .downcast_ref::<V>()
                .ok_or(IllegalStateError::TypeMismatch { call_site })?
                .clone();
            return Ok(value);
        }

        if matches!(ctx.trace.records_mut()[idx].memo, Memo::Unset) {
            tracing::trace!(%call_site, "evaluating await_value for the first time");
            ctx.trace.records_mut()[idx].memo = Memo::Future(trace::erase(make_future()));
        }

        let waker = ctx.waker.clone().ok_or(IllegalStateError::NoAmbientWaker)?;
        let is_pending = {
            let mut std_cx = StdContext::from_waker(&waker);
            let Memo::Future(cell) = &mut ctx.trace.records_mut()[idx].memo else {
                unreachable!("await_value record must be Unset, Future, or Value");
            };
            cell.poll_erased(&mut std_cx).is_pending()
        };

        if is_pending {
            tracing::trace!(%call_site, "await_value still pending, raising break");
            ctx.pending.push(idx);
            return Err(TokamakError::break_signal());
        }

        let boxed: Box<dyn Any + Send> = {
            let Memo::Future(cell) = &mut ctx.trace.records_mut()[idx].memo else {
                unreachable!("await_value record must still be Future after a ready poll");
            };
            cell.take_output()
        };
        let result = *boxed
            .downcast::<Result<V, E>>()
            .map_err(|_| IllegalStateError::TypeMismatch { call_site })?;

        match result {
            Ok(value) => {
                tracing::trace!(%call_site, "await_value resolved, memoising");
                ctx.trace.records_mut()[idx].memo = Memo::Value(Box::new(value.clone()));
                Ok(value)
            }
            Err(err) => {
                let err = err.into();
                if op.should_retry(&err) {
                    tracing::debug!(%call_site, error = %err, "retry-eligible await_value failure, re-raising break");
                    ctx.trace.records_mut()[idx].memo = Memo::Unset;
                    Err(TokamakError::retry_signal())
                } else {
                    Err(TokamakError::failed(err))
                }
            }
        }
    })
}

#[doc(hidden)]
pub fn perform_once_at<F, V, E>(call_site: CallSite, op: &Operation, closure: F) -> TokamakResult<V>
where
    F: FnOnce() -> Result<V, E>,
    V: Clone + Send + 'static,
    E: Into<anyhow::Error>,
{
    with_context(|ctx| {
        let idx = ctx.trace.record(call_site)?;
        let record = &ctx.trace.records_mut()[idx];

        if let Memo::Value(value) = &record.memo {
            let value = value
                .downcast_ref::<V>()
                .ok_or_else(|| IllegalStateError::TypeMismatch { call_site })?
                .clone();
            return Ok(value);
        }

        tracing::trace!(%call_site, "invoking perform_once closure");
        match closure() {
            Ok(value) => {
                ctx.trace.records_mut()[idx].memo = Memo::Value(Box::new(value.clone()));
                Ok(value)
            }
            Err(err) => {
                let err = err.into();
                if op.should_retry(&err) {
                    tracing::debug!(%call_site, error = %err, "retry-eligible perform_once failure, raising break");
                    Err(TokamakError::retry_signal())
                } else {
                    Err(TokamakError::failed(err))
                }
            }
        }
    })
}

#[doc(hidden)]
pub fn perform_once_void_at<F, E>(call_site: CallSite, op: &Operation, closure: F) -> TokamakResult<()>
where
    F: FnOnce() -> Result<(), E>,
    E: Into<anyhow::Error>,
{
    with_context(|ctx| {
        let idx = ctx.trace.record(call_site)?;
        let record = &ctx.trace.records_mut()[idx];

        if matches!(record.memo, Memo::Sentinel) {
            return Ok(());
        }

        tracing::trace!(%call_site, "invoking perform_once_void closure");
        match closure() {
            Ok(()) => {
                ctx.trace.records_mut()[idx].memo = Memo::Sentinel;
                Ok(())
            }
            Err(err) => {
                let err = err.into();
                if op.should_retry(&err) {
                    tracing::debug!(%call_site, error = %err, "retry-eligible perform_once_void failure, raising break");
                    Err(TokamakError::retry_signal())
                } else {
                    Err(TokamakError::failed(err))
                }
            }
        }
    })
}
