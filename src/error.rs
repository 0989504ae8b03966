use std::fmt;

use crate::trace::Record;

/// Raised when a replayed attempt diverges from the previous one: either a
/// different [`crate::callsite::CallSite`] shows up at a position the prior
/// attempt already recorded, or the closure returns before exhausting the
/// prior attempt's recorded operations.
///
/// Surfaced to the user as the invocation's failure — never retried.
#[derive(Debug, thiserror::Error)]
pub enum DeterminismError {
    #[error(
        "replay diverged: this attempt just executed {actual} but last time it executed:\n\n{remaining}\n\nYou need to remove the source of non-determinism; consider moving impure or branch-sensitive code into `perform_once`."
    )]
    Diverged { actual: String, remaining: String },

    #[error(
        "replay diverged: this attempt returned early but last time the following operations were executed:\n\n{remaining}"
    )]
    EarlyReturn { remaining: String },
}

impl DeterminismError {
    pub(crate) fn diverged(actual: crate::callsite::CallSite, remaining: &[Record]) -> Self {
        Self::Diverged {
            actual: actual.to_string(),
            remaining: render_records(remaining),
        }
    }

    pub(crate) fn early_return(remaining: &[Record]) -> Self {
        Self::EarlyReturn {
            remaining: render_records(remaining),
        }
    }
}

fn render_records(records: &[Record]) -> String {
    records
        .iter()
        .map(|r| format!("  - {}", r.call_site()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A purely-programmer-error class: using the operation facade outside of an
/// active [`crate::run`] invocation, or an internal invariant the driver
/// would otherwise have to assume silently.
#[derive(Debug, thiserror::Error)]
pub enum IllegalStateError {
    #[error(
        "`await_value`/`perform_once` used outside of an active `tokamak::run` invocation on this task"
    )]
    NoActiveRun,

    #[error("replay driver raised a break signal with an empty pending set (internal logic bug)")]
    BreakWithoutPending,

    #[error("internal: no ambient waker bound for the current attempt (internal logic bug)")]
    NoAmbientWaker,

    #[error("call site type mismatch: {call_site} resolved to a different type than it did on a previous attempt")]
    TypeMismatch { call_site: crate::callsite::CallSite },

    #[error("trace is committed; `record`/`rollback` can no longer mutate it")]
    TraceCommitted,
}

/// Either half of what `Trace::record`/`Trace::rollback` can fail with:
/// a replay divergence, or an attempt to mutate an already-committed trace.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TraceError {
    #[error(transparent)]
    Determinism(#[from] DeterminismError),
    #[error(transparent)]
    IllegalState(#[from] IllegalStateError),
}

/// The internal error sum threaded through the operation facade via `?`.
///
/// Rather than an unwind, this is an explicit, non-local-jump *variant* of an
/// opaque error type: no native coroutine primitive backs the suspension
/// point, so the break has to travel through `?` like any other error.
/// [`TokamakErrorKind::Break`] can only be constructed inside this crate (the
/// enum itself is private), so it is impossible for external code to
/// counterfeit the sentinel — callers can't even name the variant to check
/// against, let alone construct one.
pub struct TokamakError(pub(crate) TokamakErrorKind);

pub(crate) enum TokamakErrorKind {
    /// Abort the current attempt. `retry: false` means an awaited value was
    /// not yet resolved — the driver must wait for something in the
    /// `PendingSet` before re-entering. `retry: true` means a retry-eligible
    /// error was observed and its record was reset to `Unset` — there is
    /// nothing to wait on, the driver re-enters immediately. Caught only by
    /// the replay driver.
    Break { retry: bool },
    Determinism(DeterminismError),
    IllegalState(IllegalStateError),
    Failed(anyhow::Error),
}

impl TokamakError {
    pub(crate) fn break_signal() -> Self {
        TokamakError(TokamakErrorKind::Break { retry: false })
    }

    pub(crate) fn retry_signal() -> Self {
        TokamakError(TokamakErrorKind::Break { retry: true })
    }

    pub(crate) fn is_break(&self) -> bool {
        matches!(self.0, TokamakErrorKind::Break { .. })
    }

    pub(crate) fn is_retry(&self) -> bool {
        matches!(self.0, TokamakErrorKind::Break { retry: true })
    }

    pub(crate) fn failed(err: anyhow::Error) -> Self {
        TokamakError(TokamakErrorKind::Failed(err))
    }
}

impl From<DeterminismError> for TokamakError {
    fn from(err: DeterminismError) -> Self {
        TokamakError(TokamakErrorKind::Determinism(err))
    }
}

impl From<IllegalStateError> for TokamakError {
    fn from(err: IllegalStateError) -> Self {
        TokamakError(TokamakErrorKind::IllegalState(err))
    }
}

impl From<TraceError> for TokamakError {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::Determinism(e) => TokamakError(TokamakErrorKind::Determinism(e)),
            TraceError::IllegalState(e) => TokamakError(TokamakErrorKind::IllegalState(e)),
        }
    }
}

impl fmt::Debug for TokamakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TokamakErrorKind::Break { retry } => write!(f, "TokamakError::Break {{ retry: {retry} }}"),
            TokamakErrorKind::Determinism(e) => f.debug_tuple("TokamakError::Determinism").field(e).finish(),
            TokamakErrorKind::IllegalState(e) => f.debug_tuple("TokamakError::IllegalState").field(e).finish(),
            TokamakErrorKind::Failed(e) => f.debug_tuple("TokamakError::Failed").field(e).finish(),
        }
    }
}

impl fmt::Display for TokamakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TokamakErrorKind::Break { .. } => write!(f, "internal replay break signal (this should never be visible)"),
            TokamakErrorKind::Determinism(e) => write!(f, "{e}"),
            TokamakErrorKind::IllegalState(e) => write!(f, "{e}"),
            TokamakErrorKind::Failed(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TokamakError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.0 {
            TokamakErrorKind::Break { .. } => None,
            TokamakErrorKind::Determinism(e) => Some(e),
            TokamakErrorKind::IllegalState(e) => Some(e),
            TokamakErrorKind::Failed(e) => e.source(),
        }
    }
}

pub type TokamakResult<T> = Result<T, TokamakError>;

/// The public error type of [`crate::run`]. Unlike [`TokamakError`] this has
/// no `Break` variant — a break can never escape the driver, by
/// construction, so there is nothing to hide from callers here.
#[derive(Debug, thiserror::Error)]
pub enum RunFailure {
    #[error(transparent)]
    Determinism(#[from] DeterminismError),
    #[error(transparent)]
    IllegalState(#[from] IllegalStateError),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}
