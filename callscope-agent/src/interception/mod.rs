//! # Function Interception
//!
//! Wraps callables so every invocation produces a [`CallTrace`].
//!
//! Wrappers are explicit decorator values ([`Intercepted`]), built once per
//! target identity by an [`Interceptor`] and kept in its lookup table.
//! The target itself is never modified.
//!
//! [`CallTrace`]: callscope_common::CallTrace

pub mod classification;
pub mod context;
pub mod heap;
pub mod hooks;
pub mod registry;
pub mod wrapper;

pub use classification::{classify_site, ModuleFilter, SiteOrigin};
pub use hooks::{CallOutcome, TraceHooks};
pub use registry::Interceptor;
pub use wrapper::{Intercepted, Target};

use callscope_common::{SiteId, ANONYMOUS};

/// Static metadata of one wrapped callable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// `module_path!()` of the definition, used for classification
    pub module: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub function_name: Option<String>,
}

impl CallSite {
    #[must_use]
    pub fn new(module: &str, file: &str, line: u32, column: u32) -> Self {
        Self {
            module: module.to_string(),
            file: file.to_string(),
            line,
            column,
            function_name: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.function_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn site_id(&self) -> SiteId {
        SiteId::new(&self.file, self.line, self.column)
    }

    /// Function name, or `"anonymous"`
    #[must_use]
    pub fn name(&self) -> &str {
        self.function_name.as_deref().unwrap_or(ANONYMOUS)
    }
}

/// Capture the [`CallSite`] of the expression it is written at.
///
/// ```ignore
/// let handler = interceptor.wrap(|req: Request| respond(req), call_site!("respond"));
/// let callback = interceptor.wrap(|n: u64| n + 1, call_site!());
/// ```
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::interception::CallSite::new(module_path!(), file!(), line!(), column!())
    };
    ($name:expr) => {
        $crate::interception::CallSite::new(module_path!(), file!(), line!(), column!())
            .named($name)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unnamed_site_is_anonymous() {
        let site = CallSite::new("app", "src/app.rs", 4, 9);
        assert_eq!(site.name(), "anonymous");
        assert_eq!(site.site_id().as_str(), "src/app.rs:4:9");
    }

    #[test]
    fn test_macro_captures_location() {
        let site = call_site!("load");
        assert_eq!(site.module, "callscope_agent::interception::tests");
        assert!(site.file.ends_with("mod.rs"));
        assert_eq!(site.name(), "load");
    }
}
