//! Safe embedding of the libjsonnet evaluator.
//!
//! A [`Context`] owns one engine instance together with everything the engine
//! may call back into: an import resolver and a table of native functions.
//! Results cross back as owned Rust strings; engine buffers never escape.
//!
//! ```no_run
//! use jsonnet_bridge::Context;
//!
//! let mut ctx = Context::new()?;
//! ctx.bind_external_var_literal("color", "purple");
//! let out = ctx.evaluate_snippet("demo", r#""dark " + std.extVar("color")"#)?;
//! assert_eq!(out, "\"dark purple\"\n");
//! # Ok::<(), jsonnet_bridge::JsonnetError>(())
//! ```

pub mod bindings;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod functions; // native function bridge
pub mod imports;
mod ffi;

use std::ffi::CStr;

pub use bindings::{Binding, BindingKind, Bindings};
pub use config::{CommentStyle, Config, StringStyle};
pub use context::Context;
pub use engine::parse_json;
pub use errors::{JsonnetError, Result};
pub use functions::{NativeFunction, Registry};
pub use imports::{ImportResolver, MemoryImports, ResolvedImport};

/// Version string of the linked engine, e.g. `v0.17.0`. Safe to call before
/// any context exists.
pub fn engine_version() -> String {
    unsafe { CStr::from_ptr(ffi::jsonnet_version()) }.to_string_lossy().into_owned()
}
