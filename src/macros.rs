/// Awaits an asynchronous value inside a [`crate::run`] closure.
///
/// `$make` must be an expression evaluating to a `FnOnce() -> impl Future`;
/// it is invoked at most once per invocation, the first time this call site
/// is reached, deferring construction of the future so a replayed attempt
/// never pays for (or risks re-triggering) building a handle it would
/// immediately discard.
///
/// ```ignore
/// let a: i32 = tokamak::await_value!(|| async { Ok::<_, anyhow::Error>(3) })?;
/// ```
#[macro_export]
macro_rules! await_value {
    ($make:expr) => {
        $crate::ops::await_value_at(
            $crate::callsite::CallSite::new(file!(), line!(), module_path!(), "await_value"),
            &$crate::ops::Operation::default(),
            $make,
        )
    };
}

/// Like [`await_value!`] but against an explicitly configured
/// [`crate::ops::Operation`], e.g. one built with `.retry_on(...)`.
#[macro_export]
macro_rules! await_value_with {
    ($op:expr, $make:expr) => {
        $crate::ops::await_value_at(
            $crate::callsite::CallSite::new(file!(), line!(), module_path!(), "await_value"),
            $op,
            $make,
        )
    };
}

/// Runs a synchronous closure at most once across every replay attempt,
/// memoising its return value.
///
/// ```ignore
/// let n: i32 = tokamak::perform_once!(|| Ok::<_, anyhow::Error>(42))?;
/// ```
#[macro_export]
macro_rules! perform_once {
    ($closure:expr) => {
        $crate::ops::perform_once_at(
            $crate::callsite::CallSite::new(file!(), line!(), module_path!(), "perform_once"),
            &$crate::ops::Operation::default(),
            $closure,
        )
    };
}

/// Like [`perform_once!`] but against an explicitly configured
/// [`crate::ops::Operation`].
#[macro_export]
macro_rules! perform_once_with {
    ($op:expr, $closure:expr) => {
        $crate::ops::perform_once_at(
            $crate::callsite::CallSite::new(file!(), line!(), module_path!(), "perform_once"),
            $op,
            $closure,
        )
    };
}

/// Like [`perform_once!`] but for a closure with no meaningful return value;
/// memoises a sentinel rather than a payload.
#[macro_export]
macro_rules! perform_once_void {
    ($closure:expr) => {
        $crate::ops::perform_once_void_at(
            $crate::callsite::CallSite::new(file!(), line!(), module_path!(), "perform_once_void"),
            &$crate::ops::Operation::default(),
            $closure,
        )
    };
}

/// Like [`perform_once_void!`] but against an explicitly configured
/// [`crate::ops::Operation`].
#[macro_export]
macro_rules! perform_once_void_with {
    ($op:expr, $closure:expr) => {
        $crate::ops::perform_once_void_at(
            $crate::callsite::CallSite::new(file!(), line!(), module_path!(), "perform_once_void"),
            $op,
            $closure,
        )
    };
}
