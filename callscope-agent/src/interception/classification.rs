//! Call-site classification: which sites get wrapped and which pass through.
//!
//! Only user-level call sites are instrumented. Sites inside the tracer's own
//! crates must never be wrapped (wrapping the hand-off path would recurse),
//! and library code is excluded by default so the graph shows the
//! application rather than its dependencies.
//!
//! # Classification Strategy
//!
//! 1. **Tracer crates** - `callscope*` → always passed through
//! 2. **Whitelist** - when configured, only listed modules are wrapped
//! 3. **Blacklist** - listed modules are passed through
//!    - `std`, `core`, `alloc` → Standard library
//!    - `tokio`, `futures`, `mio`, `hyper`, ... → Async runtime
//!    - `serde`, `log`, `crossbeam`, ... → Common third-party crates
//!
//! Modules are matched on `module_path!()` segments: an entry `app::db`
//! covers `app::db` and `app::db::pool`, never `app::dbx`.

use log::debug;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Where a call site lives, deciding whether it is wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteOrigin {
    /// Application code: wrapped and traced
    UserCode,
    /// The tracer's own crates
    Tracer,
    /// Matched a blacklist entry
    Blacklisted,
    /// A whitelist is configured and the module is not on it
    NotWhitelisted,
}

impl SiteOrigin {
    #[must_use]
    pub fn is_user_code(&self) -> bool {
        matches!(self, SiteOrigin::UserCode)
    }
}

// =============================================================================
// CLASSIFICATION TABLES
// =============================================================================

/// Crate name prefix shared by every tracer crate
const TRACER_PREFIX: &str = "callscope";

/// Standard library crates
const STD_MODULES: &[&str] = &["std", "core", "alloc"];

/// Async runtime crates
const RUNTIME_MODULES: &[&str] = &[
    "tokio",
    "async_std",
    "futures",
    "futures_util",
    "futures_core",
    "mio",
    "hyper",
    "hyper_util",
    "tower",
    "tower_service",
];

/// Common third-party crates
const THIRD_PARTY_MODULES: &[&str] = &[
    "serde",
    "serde_json",
    "tracing",
    "log",
    "env_logger",
    "crossbeam_channel",
    "rayon",
    "parking_lot",
];

/// Module filter applied before wrapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFilter {
    pub whitelist: Option<Vec<String>>,
    pub blacklist: Vec<String>,
}

impl ModuleFilter {
    /// Default blacklist: standard library, async runtimes, common crates
    #[must_use]
    pub fn default_blacklist() -> Vec<String> {
        [STD_MODULES, RUNTIME_MODULES, THIRD_PARTY_MODULES]
            .concat()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

impl Default for ModuleFilter {
    fn default() -> Self {
        Self {
            whitelist: None,
            blacklist: Self::default_blacklist(),
        }
    }
}

/// Classify a call site by its `module_path!()`
#[must_use]
pub fn classify_site(module: &str, filter: &ModuleFilter) -> SiteOrigin {
    let crate_name = module.split("::").next().unwrap_or_default();
    if crate_name.starts_with(TRACER_PREFIX) {
        return SiteOrigin::Tracer;
    }

    if let Some(whitelist) = &filter.whitelist {
        if !whitelist.iter().any(|entry| module_matches(module, entry)) {
            return SiteOrigin::NotWhitelisted;
        }
    }

    if filter.blacklist.iter().any(|entry| module_matches(module, entry)) {
        return SiteOrigin::Blacklisted;
    }

    SiteOrigin::UserCode
}

fn module_matches(module: &str, entry: &str) -> bool {
    module
        .strip_prefix(entry)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// =============================================================================
// CLASSIFICATION DIAGNOSTICS
// =============================================================================

/// Counts wrapped vs passed-through sites, logging each excluded module once
pub struct ClassificationDiagnostics {
    reported_modules: Mutex<HashSet<String>>,
    wrapped: AtomicU64,
    passed_through: AtomicU64,
}

impl ClassificationDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            reported_modules: Mutex::new(HashSet::new()),
            wrapped: AtomicU64::new(0),
            passed_through: AtomicU64::new(0),
        }
    }

    pub fn record(&self, module: &str, origin: SiteOrigin) {
        if origin.is_user_code() {
            self.wrapped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.passed_through.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut reported) = self.reported_modules.lock() {
            if reported.insert(module.to_owned()) {
                debug!("Not instrumenting '{module}' ({origin:?})");
            }
        }
    }

    #[must_use]
    pub fn wrapped(&self) -> u64 {
        self.wrapped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn passed_through(&self) -> u64 {
        self.passed_through.load(Ordering::Relaxed)
    }

    /// Percentage of classified sites that were instrumented.
    ///
    /// Returns 100.0 if nothing has been classified yet.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn coverage(&self) -> f64 {
        let wrapped = self.wrapped();
        let total = wrapped + self.passed_through();
        if total > 0 {
            (wrapped as f64 / total as f64) * 100.0
        } else {
            100.0
        }
    }
}

impl Default for ClassificationDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}
