//! Hook seam invoked around every intercepted call.

use callscope_common::CallTrace;
use std::any::Any;

/// How the wrapped target finished, borrowing what it produced.
///
/// The caller still receives the value (or the panic) unchanged once the
/// hook returns.
#[derive(Debug, Clone, Copy)]
pub enum CallOutcome<'a> {
    Returned(&'a dyn Any),
    Panicked(&'a (dyn Any + Send)),
}

impl<'a> CallOutcome<'a> {
    #[must_use]
    pub fn is_returned(&self) -> bool {
        matches!(self, Self::Returned(_))
    }

    /// The return value, when the target returned a `T`
    #[must_use]
    pub fn returned<T: Any>(&self) -> Option<&'a T> {
        match *self {
            Self::Returned(value) => value.downcast_ref(),
            Self::Panicked(_) => None,
        }
    }

    /// Message of a `panic!` with a string payload
    #[must_use]
    pub fn panic_message(&self) -> Option<&'a str> {
        let Self::Panicked(payload) = *self else {
            return None;
        };
        payload
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
    }
}

/// Callbacks run before and after each intercepted call.
///
/// Errors and panics raised here are logged and swallowed by the wrapper;
/// they never reach the traced call. Intercepted calls made from inside a
/// hook run their target directly.
pub trait TraceHooks: Send + Sync {
    /// Runs after the trace is created and before the target is invoked
    fn before(&self, _trace: &mut CallTrace) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once duration, heap delta and child time are recorded
    fn after(&self, trace: &CallTrace, outcome: CallOutcome<'_>) -> anyhow::Result<()>;
}
