//! Wrapper table keyed by target identity.
//!
//! ```text
//!   intercept(f)         ──▶ table[id(f)]            ──▶ W
//!   intercept(f)         ──▶ table[id(f)]   (hit)    ──▶ W
//!   intercept(W.as_target()) ──▶ table[id(W')] (hit) ──▶ W
//! ```
//!
//! Every wrapper's own callable form is registered next to its target, so
//! re-wrapping a wrapper yields the original wrapper rather than a second
//! layer of instrumentation.
//!
//! Entries are weak: the table never keeps a wrapper (or the target it
//! owns) alive. A live wrapper holds both keyed allocations, so a key can
//! only be reused after its entry has died. Dead entries are misses and are
//! swept as the table grows.

use super::classification::{classify_site, ClassificationDiagnostics, ModuleFilter};
use super::context;
use super::hooks::TraceHooks;
use super::wrapper::{Intercepted, Target, WeakEntry};
use super::CallSite;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Tables smaller than this are never swept
const MIN_SWEEP_LEN: usize = 64;

struct Table {
    entries: HashMap<usize, WeakEntry>,
    /// Sweep dead entries once `entries` reaches this size
    sweep_at: usize,
}

impl Table {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: MIN_SWEEP_LEN,
        }
    }

    fn sweep(&mut self) {
        self.entries.retain(|_, entry| entry.strong_count() > 0);
        self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP_LEN);
    }

    fn insert(&mut self, key: usize, entry: WeakEntry) {
        if self.entries.len() >= self.sweep_at {
            self.sweep();
        }
        self.entries.insert(key, entry);
    }
}

/// Builds and caches [`Intercepted`] wrappers for one process.
pub struct Interceptor {
    /// `None` disables tracing: every wrapper passes straight through
    hooks: Option<Arc<dyn TraceHooks>>,
    filter: ModuleFilter,
    process_id: u32,
    table: Mutex<Table>,
    diagnostics: ClassificationDiagnostics,
}

fn identity<A, R>(target: &Target<A, R>) -> usize {
    Arc::as_ptr(target).cast::<()>() as usize
}

impl Interceptor {
    #[must_use]
    pub fn new(hooks: Arc<dyn TraceHooks>, filter: ModuleFilter) -> Self {
        Self::build(Some(hooks), filter)
    }

    /// An interceptor whose wrappers never record anything
    #[must_use]
    pub fn disabled() -> Self {
        Self::build(None, ModuleFilter::default())
    }

    fn build(hooks: Option<Arc<dyn TraceHooks>>, filter: ModuleFilter) -> Self {
        Self {
            hooks,
            filter,
            process_id: std::process::id(),
            table: Mutex::new(Table::new()),
            diagnostics: ClassificationDiagnostics::new(),
        }
    }

    /// Wrap `target`, or return the wrapper already built for it.
    ///
    /// Passing a wrapper's [`Intercepted::as_target`] returns that wrapper.
    pub fn intercept<A: 'static, R: 'static>(
        &self,
        target: Target<A, R>,
        site: CallSite,
    ) -> Intercepted<A, R> {
        self.intercept_with_origin(target, site, None)
    }

    /// Wrap a callable that will be invoked later as a callback.
    ///
    /// The intercepted call running on this thread right now (if any) is
    /// recorded as the callback's origin, producing `callback` links.
    pub fn intercept_callback<A: 'static, R: 'static>(
        &self,
        target: Target<A, R>,
        site: CallSite,
    ) -> Intercepted<A, R> {
        self.intercept_with_origin(target, site, context::current_origin())
    }

    /// Convenience: box a closure and wrap it
    pub fn wrap<A, R, F>(&self, f: F, site: CallSite) -> Intercepted<A, R>
    where
        A: 'static,
        R: 'static,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.intercept(Arc::new(f), site)
    }

    fn intercept_with_origin<A: 'static, R: 'static>(
        &self,
        target: Target<A, R>,
        site: CallSite,
        callback_of: Option<callscope_common::TraceOrigin>,
    ) -> Intercepted<A, R> {
        let key = identity(&target);
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = table.entries.get(&key).and_then(Intercepted::upgrade) {
            return existing;
        }

        let origin = classify_site(&site.module, &self.filter);
        self.diagnostics.record(&site.module, origin);
        let hooks = if origin.is_user_code() {
            self.hooks.clone()
        } else {
            None
        };

        let wrapper = Intercepted::new(target, site, self.process_id, hooks, callback_of);
        table.insert(identity(&wrapper.as_target()), wrapper.downgrade());
        table.insert(key, wrapper.downgrade());
        wrapper
    }

    /// Number of live callables known (targets plus wrapper forms)
    #[must_use]
    pub fn len(&self) -> usize {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.sweep();
        table.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn diagnostics(&self) -> &ClassificationDiagnostics {
        &self.diagnostics
    }
}
