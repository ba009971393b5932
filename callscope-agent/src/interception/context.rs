//! Per-thread call context.
//!
//! Each thread keeps the stack of intercepted calls currently executing on
//! it. The stack answers three questions for a new call: how deep it is,
//! who called it, and which call a freshly wrapped callback was created in.
//! Completed children add their exec time to the parent's `child_duration`.

use callscope_common::TraceOrigin;
use std::cell::{Cell, RefCell};

struct ActiveCall {
    origin: TraceOrigin,
    child_duration: u64,
}

thread_local! {
    static ACTIVE: RefCell<Vec<ActiveCall>> = const { RefCell::new(Vec::new()) };
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

pub(crate) struct Entered {
    /// Depth with this call pushed (outermost call = 1)
    pub nest_level: u32,
    pub caller: Option<TraceOrigin>,
}

/// Push a call onto this thread's stack
pub(crate) fn enter(origin: TraceOrigin) -> Entered {
    ACTIVE.with_borrow_mut(|stack| {
        let caller = stack.last().map(|call| call.origin.clone());
        stack.push(ActiveCall {
            origin,
            child_duration: 0,
        });
        Entered {
            nest_level: u32::try_from(stack.len()).unwrap_or(u32::MAX),
            caller,
        }
    })
}

/// Pop the current call, charge its duration to the parent, and return the
/// time its own children took.
pub(crate) fn exit(exec_duration: u64) -> u64 {
    ACTIVE.with_borrow_mut(|stack| {
        let own = stack.pop().map_or(0, |call| call.child_duration);
        if let Some(parent) = stack.last_mut() {
            parent.child_duration += exec_duration;
        }
        own
    })
}

/// The intercepted call currently executing on this thread, if any
#[must_use]
pub fn current_origin() -> Option<TraceOrigin> {
    ACTIVE.with_borrow(|stack| stack.last().map(|call| call.origin.clone()))
}

/// Number of intercepted calls active on this thread
#[must_use]
pub fn depth() -> usize {
    ACTIVE.with_borrow(Vec::len)
}

/// True while a before/after hook runs on this thread
#[must_use]
pub fn in_hook() -> bool {
    IN_HOOK.get()
}

/// Marks the current thread as running a hook until dropped
pub(crate) struct HookGuard {
    previous: bool,
}

impl HookGuard {
    pub(crate) fn enter() -> Self {
        Self {
            previous: IN_HOOK.replace(true),
        }
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        IN_HOOK.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callscope_common::SiteId;

    fn origin(site: &str, start: u64) -> TraceOrigin {
        TraceOrigin {
            process_id: 1,
            site: SiteId::from(site),
            start_time: start,
        }
    }

    #[test]
    fn test_nesting_and_child_duration() {
        let outer = enter(origin("a:1", 10));
        assert_eq!(outer.nest_level, 1);
        assert!(outer.caller.is_none());

        let inner = enter(origin("b:1", 20));
        assert_eq!(inner.nest_level, 2);
        assert_eq!(inner.caller.unwrap().site.as_str(), "a:1");
        assert_eq!(exit(30), 0);

        assert_eq!(exit(100), 30);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_hook_guard_restores() {
        assert!(!in_hook());
        {
            let _outer = HookGuard::enter();
            {
                let _inner = HookGuard::enter();
                assert!(in_hook());
            }
            assert!(in_hook());
        }
        assert!(!in_hook());
    }
}
