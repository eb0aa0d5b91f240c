//! Evaluation and formatting entry points.
//!
//! Every entry point follows the same pipeline: push bindings (evaluation
//! only), call the engine, wrap whatever buffer comes back in an
//! [`EngineBuf`], copy it out and release it. Results are all-or-nothing: the
//! engine either produced text or an error message, never both.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::path::Path;

use itertools::Itertools;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::debug;

use crate::context::Context;
use crate::errors::{JsonnetError, Result};
use crate::ffi::memory::{c_string, EngineBuf};
use crate::ffi::{self, JsonnetVm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Evaluate,
    Format,
}

/// Shape of the engine's output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Single,
    Multi,
    Stream,
}

impl Shape {
    /// Strings per entry in a multi or stream listing.
    fn width(self) -> usize {
        match self {
            Shape::Multi => 2,
            Shape::Single | Shape::Stream => 1,
        }
    }
}

enum Source {
    Snippet { name: CString, code: CString },
    File(CString),
}

impl Source {
    fn snippet(name: &str, code: &str) -> Result<Self> {
        Ok(Source::Snippet {
            name: c_string("snippet name", name)?,
            code: c_string(&format!("source of `{name}`"), code)?,
        })
    }

    fn file(path: &Path) -> Result<Self> {
        Ok(Source::File(c_string("file path", &path.to_string_lossy())?))
    }

    fn label(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Source::Snippet { name, .. } => name.to_string_lossy(),
            Source::File(path) => path.to_string_lossy(),
        }
    }
}

type SnippetFn = unsafe extern "C" fn(*mut JsonnetVm, *const c_char, *const c_char, *mut c_int) -> *mut c_char;
type FileFn = unsafe extern "C" fn(*mut JsonnetVm, *const c_char, *mut c_int) -> *mut c_char;

fn entry_points(stage: Stage, shape: Shape) -> (SnippetFn, FileFn) {
    match (stage, shape) {
        (Stage::Format, _) => (ffi::jsonnet_fmt_snippet as SnippetFn, ffi::jsonnet_fmt_file as FileFn),
        (Stage::Evaluate, Shape::Single) => {
            (ffi::jsonnet_evaluate_snippet as SnippetFn, ffi::jsonnet_evaluate_file as FileFn)
        }
        (Stage::Evaluate, Shape::Multi) => {
            (ffi::jsonnet_evaluate_snippet_multi as SnippetFn, ffi::jsonnet_evaluate_file_multi as FileFn)
        }
        (Stage::Evaluate, Shape::Stream) => {
            (ffi::jsonnet_evaluate_snippet_stream as SnippetFn, ffi::jsonnet_evaluate_file_stream as FileFn)
        }
    }
}

impl Context {
    /// Evaluates inline source. `name` labels the snippet in error traces and
    /// is the base for its relative imports.
    ///
    /// Returns JSON text ending in a newline, or the raw string plus newline
    /// when string output is enabled.
    pub fn evaluate_snippet(&mut self, name: &str, source: &str) -> Result<String> {
        let buf = self.run(Stage::Evaluate, Shape::Single, &Source::snippet(name, source)?)?;
        Ok(buf.to_string_lossy())
    }

    /// Evaluates the file at `path`, read by the engine itself.
    pub fn evaluate_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let buf = self.run(Stage::Evaluate, Shape::Single, &Source::file(path.as_ref())?)?;
        Ok(buf.to_string_lossy())
    }

    /// Evaluates a program whose value is an object mapping file names to
    /// documents; returns each document's JSON text by file name.
    pub fn evaluate_snippet_multi(&mut self, name: &str, source: &str) -> Result<BTreeMap<String, String>> {
        self.run_multi(&Source::snippet(name, source)?)
    }

    pub fn evaluate_file_multi(&mut self, path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
        self.run_multi(&Source::file(path.as_ref())?)
    }

    /// Evaluates a program whose value is an array; returns one JSON document
    /// per element.
    pub fn evaluate_snippet_stream(&mut self, name: &str, source: &str) -> Result<Vec<String>> {
        let buf = self.run(Stage::Evaluate, Shape::Stream, &Source::snippet(name, source)?)?;
        Ok(buf.to_string_list(Shape::Stream.width(), false))
    }

    pub fn evaluate_file_stream(&mut self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let buf = self.run(Stage::Evaluate, Shape::Stream, &Source::file(path.as_ref())?)?;
        Ok(buf.to_string_list(Shape::Stream.width(), false))
    }

    /// Re-serializes inline source in canonical style. Bindings and bridges
    /// play no part in formatting.
    pub fn format_snippet(&mut self, name: &str, source: &str) -> Result<String> {
        let buf = self.run(Stage::Format, Shape::Single, &Source::snippet(name, source)?)?;
        Ok(buf.to_string_lossy())
    }

    pub fn format_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let buf = self.run(Stage::Format, Shape::Single, &Source::file(path.as_ref())?)?;
        Ok(buf.to_string_lossy())
    }

    /// Multi listings are sorted by name, so an empty file name can only open
    /// the listing, where it reads the same as the end of an empty one. Only
    /// in that case is the program evaluated a second time, as a whole, to
    /// tell the two apart.
    fn run_multi(&mut self, source: &Source) -> Result<BTreeMap<String, String>> {
        let buf = self.run(Stage::Evaluate, Shape::Multi, source)?;
        let empty_first = buf.starts_empty() && self.has_empty_field(source)?;
        Ok(pair_up(buf.to_string_list(Shape::Multi.width(), empty_first)))
    }

    fn has_empty_field(&mut self, source: &Source) -> Result<bool> {
        let vm = self.raw();
        let string_output = self.config.string_output.unwrap_or(false);
        if string_output {
            unsafe { ffi::jsonnet_string_output(vm, 0) };
        }
        let whole = self.run(Stage::Evaluate, Shape::Single, source);
        if string_output {
            unsafe { ffi::jsonnet_string_output(vm, 1) };
        }
        let fields: BTreeMap<String, IgnoredAny> = parse_json(&whole?.to_string_lossy())?;
        Ok(fields.contains_key(""))
    }

    fn run(&mut self, stage: Stage, shape: Shape, source: &Source) -> Result<EngineBuf> {
        let vm = self.raw();
        if stage == Stage::Evaluate {
            unsafe { self.bindings.apply(vm)? };
        }
        debug!(?stage, ?shape, source = %source.label(), "engine call");

        let (snippet_fn, file_fn) = entry_points(stage, shape);
        let mut error: c_int = 0;
        let buf = unsafe {
            let raw = match source {
                Source::Snippet { name, code } => snippet_fn(vm, name.as_ptr(), code.as_ptr(), &mut error),
                Source::File(path) => file_fn(vm, path.as_ptr(), &mut error),
            };
            EngineBuf::from_raw(vm, raw)
        };

        if error == 0 {
            return Ok(buf);
        }
        let mut message = buf.to_string_lossy();
        if message.is_empty() {
            message = "engine reported an error without a message".into();
        }
        debug!(?stage, source = %source.label(), "engine call failed");
        Err(match stage {
            Stage::Evaluate => JsonnetError::Evaluation(message),
            Stage::Format => JsonnetError::Format(message),
        })
    }
}

fn pair_up(parts: Vec<String>) -> BTreeMap<String, String> {
    parts.into_iter().tuples().collect()
}

/// Decodes evaluation output into a typed value.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}
