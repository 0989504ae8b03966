use std::fmt;

/// A value-equal identifier of a source position: file, line, enclosing
/// module, and the kind of operation performed there (`await_value`,
/// `perform_once`, `perform_once_void`).
///
/// Correlates a replayed operation to its prior [`crate::trace::Record`].
/// Captured at compile time via [`crate::await_value`]/[`crate::perform_once`]
/// and friends, which expand `file!()`/`line!()`/`module_path!()` at the
/// caller's own invocation site — not walked off a runtime call stack, since
/// Rust has no portable equivalent and `#[track_caller]` does not survive
/// `.await` boundaries reliably.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub unit: &'static str,
    pub operation: &'static str,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32, unit: &'static str, operation: &'static str) -> Self {
        Self { file, line, unit, operation }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({}:{})", self.unit, self.operation, self.file, self.line)
    }
}
