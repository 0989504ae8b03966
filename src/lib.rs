//! `tokamak`: an embedded deterministic-replay async runtime.
//!
//! Application code is written as a plain synchronous closure passed to
//! [`run`]. Inside the closure, [`await_value!`] and [`perform_once!`] stand
//! in for the asynchronous operations the closure needs — the closure itself
//! never `.await`s anything. The driver runs the closure over and over,
//! short-circuiting at the first `await_value!` that is not yet resolved,
//! re-entering from the top once it resolves, until the closure runs to
//! completion. Every operation the closure already passed is served from a
//! memoised record instead of re-executed, so a replayed attempt always
//! reaches strictly further than the one before it.
//!
//! This trades CPU cycles (re-running pure, already-completed synchronous
//! code on every attempt) for not needing a native coroutine primitive to
//! express "synchronous-looking code that awaits asynchronous values" on
//! platforms whose host language lacks one.
//!
//! ```ignore
//! let result = tokamak::run(|| {
//!     let a: i32 = tokamak::await_value!(|| async { Ok::<_, anyhow::Error>(3) })?;
//!     let b: i32 = tokamak::perform_once!(|| Ok::<_, anyhow::Error>(4))?;
//!     Ok(a + b)
//! })
//! .await?;
//! assert_eq!(result, 7);
//! ```

pub mod callsite;
mod context;
pub mod driver;
pub mod error;
mod macros;
pub mod ops;
mod trace;

pub use callsite::CallSite;
pub use driver::run;
pub use error::{DeterminismError, IllegalStateError, RunFailure, TokamakError, TokamakResult};
pub use ops::{Operation, OperationBuilder};
