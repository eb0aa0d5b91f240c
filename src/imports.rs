//! Host-side import resolution.
//!
//! The engine calls [`import_trampoline`] synchronously, on the evaluating
//! thread, for every `import`/`importstr` it cannot serve from its own cache.
//! The trampoline reaches the resolver through an [`ImportSlot`] pinned on the
//! heap by the owning `Context`.

use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

use tracing::{trace, warn};

use crate::ffi::memory::{alloc_str, borrow_str};
use crate::ffi::JsonnetVm;

/// A successfully resolved import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    pub content: String,
    /// Canonical identity of the file. Nested relative imports resolve against
    /// its directory and the engine deduplicates imports by it.
    pub resolved_path: String,
}

impl ResolvedImport {
    pub fn new(content: impl Into<String>, resolved_path: impl Into<String>) -> Self {
        Self { content: content.into(), resolved_path: resolved_path.into() }
    }
}

/// Answers "what is at this import path".
///
/// `base` is the directory of the importing file as the engine sees it (empty
/// or ending in `/`), `rel` the literal import string. Failures are reported
/// as a human-readable message.
pub trait ImportResolver: Send {
    fn resolve(&self, base: &str, rel: &str) -> Result<ResolvedImport, String>;
}

impl<F> ImportResolver for F
where
    F: Fn(&str, &str) -> Result<ResolvedImport, String> + Send,
{
    fn resolve(&self, base: &str, rel: &str) -> Result<ResolvedImport, String> {
        self(base, rel)
    }
}

/// Heap-pinned state handed to the engine as the callback context.
pub(crate) struct ImportSlot {
    pub(crate) vm: *mut JsonnetVm,
    pub(crate) resolver: Box<dyn ImportResolver>,
}

pub(crate) extern "C" fn import_trampoline(
    ctx: *mut c_void,
    base: *const c_char,
    rel: *const c_char,
    found_here: *mut *mut c_char,
    success: *mut c_int,
) -> *mut c_char {
    let slot = unsafe { &*(ctx as *const ImportSlot) };
    let (base, rel) = unsafe { (borrow_str(base), borrow_str(rel)) };
    trace!(base = %base, rel = %rel, "import requested");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| slot.resolver.resolve(&base, &rel)))
        .unwrap_or_else(|_| {
            warn!(rel = %rel, "import resolver panicked");
            Err(format!("import resolver panicked while resolving {rel:?}"))
        });

    unsafe {
        match outcome {
            Ok(found) => {
                trace!(resolved = %found.resolved_path, bytes = found.content.len(), "import resolved");
                *found_here = alloc_str(slot.vm, &found.resolved_path);
                *success = 1;
                alloc_str(slot.vm, &found.content)
            }
            Err(message) => {
                trace!(rel = %rel, error = %message, "import failed");
                *success = 0;
                alloc_str(slot.vm, &message)
            }
        }
    }
}

/// A resolver serving a fixed set of in-memory files keyed by import path.
#[derive(Debug, Clone, Default)]
pub struct MemoryImports {
    files: std::collections::HashMap<String, String>,
}

impl MemoryImports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl ImportResolver for MemoryImports {
    fn resolve(&self, _base: &str, rel: &str) -> Result<ResolvedImport, String> {
        self.files
            .get(rel)
            .map(|content| ResolvedImport::new(content.clone(), rel))
            .ok_or_else(|| format!("Cannot import {rel:?}"))
    }
}
