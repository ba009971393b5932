//! The intercepted callable.
//!
//! ```text
//!  caller ──▶ Intercepted::call(args)
//!               │ push thread frame, build CallTrace
//!               │ before hook        (errors/panics logged, swallowed)
//!               │ target(args)       (panic captured)
//!               │ duration, heap delta, child time; pop frame
//!               │ after hook         (errors/panics logged, swallowed)
//!  caller ◀──  return value, or resume the original panic
//! ```

use super::context::{self, HookGuard};
use super::heap::heap_in_use;
use super::hooks::{CallOutcome, TraceHooks};
use super::CallSite;
use callscope_common::{CallTrace, SiteId, TraceOrigin};
use log::warn;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A callable taking its arguments as one value (use a tuple for several)
pub type Target<A, R> = Arc<dyn Fn(A) -> R + Send + Sync>;

/// Wall-clock microseconds since the Unix epoch
pub(crate) fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}

struct WrapperInner<A, R> {
    target: Target<A, R>,
    site: CallSite,
    site_id: SiteId,
    process_id: u32,
    /// `None` means the site was classified out: calls go straight through
    hooks: Option<Arc<dyn TraceHooks>>,
    callback_of: Option<TraceOrigin>,
    /// This wrapper in `Target` form; holds only a weak reference back
    as_target: Target<A, R>,
}

/// Type-erased weak handle used by the interceptor's lookup table
pub(crate) type WeakEntry = Weak<dyn Any + Send + Sync>;

/// Decorator around one target. Cloning shares the same wrapper.
pub struct Intercepted<A, R> {
    inner: Arc<WrapperInner<A, R>>,
}

impl<A, R> Clone for Intercepted<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: 'static, R: 'static> Intercepted<A, R> {
    pub(crate) fn new(
        target: Target<A, R>,
        site: CallSite,
        process_id: u32,
        hooks: Option<Arc<dyn TraceHooks>>,
        callback_of: Option<TraceOrigin>,
    ) -> Self {
        let site_id = site.site_id();
        let inner = Arc::new_cyclic(|weak: &Weak<WrapperInner<A, R>>| {
            let weak = weak.clone();
            let fallback = Arc::clone(&target);
            let as_target: Target<A, R> = Arc::new(move |args: A| match weak.upgrade() {
                Some(inner) => Intercepted { inner }.call(args),
                None => fallback(args),
            });
            WrapperInner {
                target,
                site,
                site_id,
                process_id,
                hooks,
                callback_of,
                as_target,
            }
        });
        Self { inner }
    }

    /// Invoke the target, recording one trace around it.
    ///
    /// The return value and any panic payload reach the caller unchanged.
    pub fn call(&self, args: A) -> R {
        let inner = &*self.inner;
        let Some(hooks) = inner.hooks.as_deref() else {
            return (inner.target)(args);
        };
        if context::in_hook() {
            return (inner.target)(args);
        }

        let start_time = now_micros();
        let entered = context::enter(TraceOrigin {
            process_id: inner.process_id,
            site: inner.site_id.clone(),
            start_time,
        });
        let mut trace = CallTrace {
            process_id: inner.process_id,
            site: inner.site_id.clone(),
            function_name: inner.site.name().to_string(),
            line: inner.site.line,
            start_time,
            exec_duration: 0,
            heap_delta: 0,
            nest_level: entered.nest_level,
            child_duration: 0,
            called_by: entered.caller,
            callback_of: inner.callback_of.clone(),
        };

        run_hook("before", &inner.site_id, || hooks.before(&mut trace));

        let heap_before = heap_in_use();
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| (inner.target)(args)));
        trace.exec_duration = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        trace.heap_delta = heap_in_use() - heap_before;
        trace.child_duration = context::exit(trace.exec_duration);

        let outcome = match &result {
            Ok(value) => CallOutcome::Returned(value),
            Err(payload) => CallOutcome::Panicked(&**payload),
        };
        run_hook("after", &inner.site_id, || hooks.after(&trace, outcome));

        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// This wrapper as a plain callable. Always the same `Arc`.
    #[must_use]
    pub fn as_target(&self) -> Target<A, R> {
        Arc::clone(&self.inner.as_target)
    }

    /// The wrapped target
    #[must_use]
    pub fn target(&self) -> Target<A, R> {
        Arc::clone(&self.inner.target)
    }

    #[must_use]
    pub fn site_id(&self) -> &SiteId {
        &self.inner.site_id
    }

    /// True when calls are recorded (site classified as user code)
    #[must_use]
    pub fn is_traced(&self) -> bool {
        self.inner.hooks.is_some()
    }

    #[must_use]
    pub fn callback_of(&self) -> Option<&TraceOrigin> {
        self.inner.callback_of.as_ref()
    }

    /// Both handles refer to the same wrapper
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Weak table entry; does not keep the wrapper or its target alive
    pub(crate) fn downgrade(&self) -> WeakEntry {
        let weak: Weak<WrapperInner<A, R>> = Arc::downgrade(&self.inner);
        weak
    }

    /// The wrapper behind `entry`, if it is still alive and of this type
    pub(crate) fn upgrade(entry: &WeakEntry) -> Option<Self> {
        let inner = entry.upgrade()?.downcast::<WrapperInner<A, R>>().ok()?;
        Some(Self { inner })
    }
}

fn run_hook(stage: &str, site: &SiteId, hook: impl FnOnce() -> anyhow::Result<()>) {
    let _guard = HookGuard::enter();
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{stage} hook failed at {site}: {e:#}"),
        Err(_) => warn!("{stage} hook panicked at {site}"),
    }
}
