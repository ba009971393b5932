//! Human-readable labels for anonymous call sites.
//!
//! Nodes named `anonymous` (closures wrapped without an explicit name) are
//! renamed from the surrounding source: `variable parse`, `callback for
//! items.map`, `default for config.port` and so on. Files are scanned on a
//! background thread the first time a site in them is merged, so a label
//! may show up a few windows after the node itself.
//!
//! A line resolves to a label only when exactly one function starts there.

pub mod scanner;

use crate::domain::LabelError;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use scanner::{scan_file, scan_source};

/// `resolve(file, line) -> label` lookup used by the aggregator
pub trait LabelSource: Send {
    /// Start resolving labels for `file` if it has not been seen yet
    fn prepare(&mut self, file: &str);

    fn resolve(&self, file: &str, line: u32) -> Option<String>;
}

/// Label source that never resolves anything
#[derive(Debug, Default)]
pub struct NoLabels;

impl LabelSource for NoLabels {
    fn prepare(&mut self, _file: &str) {}

    fn resolve(&self, _file: &str, _line: u32) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// `fn name(..)` item or method
    Declaration,
    /// Closure, or a function path handed to a wrapper
    Expression,
}

/// Where a function expression appears
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionContext {
    Assignment { target: String },
    Variable { name: String },
    Property { key: String },
    ReturnValue,
    DefaultFor { subject: String },
    Call(CallContext),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub callee: String,
    pub immediately_called: bool,
    /// Callee registers an event listener (`on`, `once`, `add_listener`, ...)
    pub handler: bool,
    /// First string literal argument of a listener registration
    pub event: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescription {
    pub kind: FunctionKind,
    pub name: Option<String>,
    /// Body is `{}` or `()`
    pub empty: bool,
    pub context: Option<FunctionContext>,
}

impl FunctionDescription {
    /// Short label, or `None` when nothing useful can be said
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        match self.kind {
            FunctionKind::Declaration => self.name.clone(),
            FunctionKind::Expression => {
                if let Some(name) = &self.name {
                    return Some(name.clone());
                }
                if self.empty {
                    return Some("empty function".to_string());
                }
                self.context.as_ref().map(FunctionContext::summary)
            }
        }
    }
}

impl FunctionContext {
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Assignment { target } => format!("assigned to {target}"),
            Self::Variable { name } => format!("variable {name}"),
            Self::Property { key } => format!("property {key}"),
            Self::ReturnValue => "return value".to_string(),
            Self::DefaultFor { subject } => format!("default for {subject}"),
            Self::Call(call) => {
                if call.immediately_called {
                    "immediately called".to_string()
                } else if call.handler {
                    match &call.event {
                        Some(event) => format!("{event} handler"),
                        None => "handler".to_string(),
                    }
                } else {
                    format!("callback for {}", call.callee)
                }
            }
        }
    }
}

/// Function descriptions of one file, keyed by start line
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    by_line: HashMap<u32, Vec<FunctionDescription>>,
}

impl FunctionTable {
    pub fn insert(&mut self, line: u32, description: FunctionDescription) {
        self.by_line.entry(line).or_default().push(description);
    }

    #[must_use]
    pub fn descriptions(&self, line: u32) -> &[FunctionDescription] {
        self.by_line.get(&line).map_or(&[], Vec::as_slice)
    }

    /// Label for `line` when exactly one function starts there
    #[must_use]
    pub fn label(&self, line: u32) -> Option<String> {
        match self.descriptions(line) {
            [only] => only.summary(),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_line.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_line.is_empty()
    }
}

enum FileState {
    Scanning,
    Ready(FunctionTable),
    Failed,
}

/// Scans source files on demand, one background thread per new file
#[derive(Clone, Default)]
pub struct SourceLabels {
    root: Option<PathBuf>,
    files: Arc<Mutex<HashMap<String, FileState>>>,
}

impl SourceLabels {
    /// Relative site paths are resolved against `root` when given
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            files: Arc::default(),
        }
    }

    fn path_for(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Whether `file` has been scanned (successfully or not)
    #[must_use]
    pub fn is_settled(&self, file: &str) -> bool {
        matches!(
            lock(&self.files).get(file),
            Some(FileState::Ready(_) | FileState::Failed)
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LabelSource for SourceLabels {
    fn prepare(&mut self, file: &str) {
        {
            let mut files = lock(&self.files);
            if files.contains_key(file) {
                return;
            }
            files.insert(file.to_string(), FileState::Scanning);
        }

        let path = self.path_for(file);
        let files = Arc::clone(&self.files);
        let key = file.to_string();
        let spawned = std::thread::Builder::new()
            .name("callscope-labels".to_string())
            .spawn(move || {
                let state = match scan_file(&path) {
                    Ok(table) => {
                        debug!("Scanned {} ({} functions)", path.display(), table.len());
                        FileState::Ready(table)
                    }
                    Err(e) => {
                        debug!("{e}");
                        FileState::Failed
                    }
                };
                lock(&files).insert(key, state);
            });

        if let Err(e) = spawned {
            warn!("Failed to start label scan for {file}: {e}");
            lock(&self.files).insert(file.to_string(), FileState::Failed);
        }
    }

    fn resolve(&self, file: &str, line: u32) -> Option<String> {
        match lock(&self.files).get(file) {
            Some(FileState::Ready(table)) => table.label(line),
            _ => None,
        }
    }
}

/// Read and scan one file synchronously
pub(crate) fn read_source(path: &Path) -> Result<String, LabelError> {
    std::fs::read_to_string(path).map_err(|source| LabelError::Read {
        path: path.to_path_buf(),
        source,
    })
}
