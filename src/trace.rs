use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as StdContext, Poll};

use crate::callsite::CallSite;
use crate::error::{DeterminismError, IllegalStateError, TraceError};

/// Polls an arbitrary boxed future without the caller knowing its concrete
/// type, stashing the resolved output (itself type-erased) once ready.
///
/// Grounded in `tokamak-network-ethrex`'s `JitResumeState(Box<dyn Any +
/// Send>)` suspend/resume cell: both exist to let a driver hold on to
/// "whatever was in flight" across a suspend point without parameterizing
/// the driver itself over every possible payload type.
pub(crate) trait ErasedAwait: Send {
    fn poll_erased(&mut self, cx: &mut StdContext<'_>) -> Poll<()>;
    fn take_output(&mut self) -> Box<dyn Any + Send>;
}

struct AwaitCell<Fut: Future> {
    fut: Pin<Box<Fut>>,
    output: Option<Fut::Output>,
}

impl<Fut: Future> AwaitCell<Fut> {
    fn new(fut: Fut) -> Self {
        Self { fut: Box::pin(fut), output: None }
    }
}

impl<Fut> ErasedAwait for AwaitCell<Fut>
where
    Fut: Future + Send,
    Fut::Output: Send + 'static,
{
    fn poll_erased(&mut self, cx: &mut StdContext<'_>) -> Poll<()> {
        if self.output.is_some() {
            return Poll::Ready(());
        }
        match self.fut.as_mut().poll(cx) {
            Poll::Ready(value) => {
                self.output = Some(value);
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn take_output(&mut self) -> Box<dyn Any + Send> {
        Box::new(self.output.take().expect("AwaitCell polled to ready before take_output"))
    }
}

/// The memoised state of one [`Record`].
///
/// `Unset -> Future -> Value` for `await_value`; `Unset -> Value` for
/// `perform_once`; `Unset -> Sentinel` for `perform_once_void`. Once set to
/// `Value` or `Sentinel` a record never regresses, except that a retry-
/// eligible failure of an awaited future resets `Future` back to `Unset` so
/// the next attempt lazily constructs a fresh future (the old one, having
/// already resolved to `Ready(Err(..))`, cannot be polled again).
pub(crate) enum Memo {
    Unset,
    Future(Box<dyn ErasedAwait>),
    Value(Box<dyn Any + Send>),
    Sentinel,
}

/// One slot in the Trace: a fixed [`CallSite`] plus its memoised state.
pub(crate) struct Record {
    call_site: CallSite,
    pub(crate) memo: Memo,
}

impl Record {
    pub(crate) fn call_site(&self) -> CallSite {
        self.call_site
    }
}

/// The ordered operation log for one invocation.
///
/// Call-site equality, checked *positionally* against the cursor, is what
/// detects non-determinism — the Trace is a `Vec` with a read head, not a
/// call-site-keyed map, so two distinct calls to the same source line within
/// one attempt (e.g. a loop body) are tracked as distinct consecutive
/// records in the order visited.
pub(crate) struct Trace {
    records: Vec<Record>,
    cursor: usize,
    committed: bool,
}

impl Trace {
    pub(crate) fn new() -> Self {
        Self { records: Vec::new(), cursor: 0, committed: false }
    }

    /// Advances the cursor past the record at `call_site`, creating it if
    /// this is the longest any attempt has traversed so far. Returns its
    /// index for the caller to address directly (`memo` mutation happens
    /// through `records_mut`, not through this method, so the borrow ends
    /// before the caller needs mutable access).
    pub(crate) fn record(&mut self, call_site: CallSite) -> Result<usize, TraceError> {
        if self.committed {
            return Err(IllegalStateError::TraceCommitted.into());
        }

        if self.cursor < self.records.len() {
            let existing = &self.records[self.cursor];
            if existing.call_site != call_site {
                return Err(DeterminismError::diverged(call_site, &self.records[self.cursor..]).into());
            }
        } else {
            self.records.push(Record { call_site, memo: Memo::Unset });
        }

        let idx = self.cursor;
        self.cursor += 1;
        Ok(idx)
    }

    pub(crate) fn rollback(&mut self) -> Result<(), IllegalStateError> {
        if self.committed {
            return Err(IllegalStateError::TraceCommitted);
        }
        self.cursor = 0;
        Ok(())
    }

    pub(crate) fn commit(&mut self) -> Result<(), DeterminismError> {
        if self.cursor != self.records.len() {
            return Err(DeterminismError::early_return(&self.records[self.cursor..]));
        }
        self.committed = true;
        Ok(())
    }

    pub(crate) fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }
}

pub(crate) fn erase<Fut>(fut: Fut) -> Box<dyn ErasedAwait>
where
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    Box::new(AwaitCell::new(fut))
}
