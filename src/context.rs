use std::os::raw::{c_int, c_uint};
use std::path::Path;
use std::ptr::NonNull;

use tracing::debug;

use crate::bindings::{Binding, BindingKind, Bindings};
use crate::config::{CommentStyle, Config, StringStyle};
use crate::errors::{JsonnetError, Result};
use crate::ffi::memory::{c_string, Pinned};
use crate::ffi::{self, JsonnetVm};
use crate::functions::{NativeFunction, Registry};
use crate::imports::{import_trampoline, ImportResolver, ImportSlot};

/// One evaluation session bound to one native engine instance.
///
/// Bindings, bridges and configuration recorded here persist across
/// evaluations until changed. The engine is released when the context is
/// destroyed or dropped, before the bridges it may call back into.
///
/// A `Context` can move between threads but is driven by one at a time:
/// every evaluation takes `&mut self`.
pub struct Context {
    pub(crate) vm: NonNull<JsonnetVm>,
    pub(crate) bindings: Bindings,
    pub(crate) config: Config,
    import: Option<Pinned<ImportSlot>>,
    natives: Registry,
}

// The engine state is only reachable through `&mut Context`, and every host
// callback stored on it is `Send`.
unsafe impl Send for Context {}

impl Context {
    pub fn new() -> Result<Self> {
        let vm = NonNull::new(unsafe { ffi::jsonnet_make() }).ok_or(JsonnetError::OutOfMemory)?;
        debug!("engine context created");
        Ok(Context {
            vm,
            bindings: Bindings::new(),
            config: Config::default(),
            import: None,
            natives: Registry::new(),
        })
    }

    /// Creates a context and applies `config` to it.
    pub fn with_config(config: &Config) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.configure(config)?;
        Ok(ctx)
    }

    /// Releases the engine, then every registered bridge.
    pub fn destroy(self) {
        drop(self);
    }

    pub(crate) fn raw(&self) -> *mut JsonnetVm {
        self.vm.as_ptr()
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn native_functions(&self) -> &Registry {
        &self.natives
    }

    pub fn has_import_resolver(&self) -> bool {
        self.import.is_some()
    }

    pub fn bind_top_level_arg_literal(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.bindings.bind(BindingKind::TopLevelArg, name, Binding::Literal(value.into()));
        self
    }

    pub fn bind_top_level_arg_code(&mut self, name: impl Into<String>, code: impl Into<String>) -> &mut Self {
        self.bindings.bind(BindingKind::TopLevelArg, name, Binding::Code(code.into()));
        self
    }

    pub fn bind_external_var_literal(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.bindings.bind(BindingKind::ExternalVar, name, Binding::Literal(value.into()));
        self
    }

    pub fn bind_external_var_code(&mut self, name: impl Into<String>, code: impl Into<String>) -> &mut Self {
        self.bindings.bind(BindingKind::ExternalVar, name, Binding::Code(code.into()));
        self
    }

    /// Installs the import resolver, replacing any earlier one. While a
    /// resolver is set the engine's own file importer is not consulted.
    pub fn set_import_resolver<R: ImportResolver + 'static>(&mut self, resolver: R) -> &mut Self {
        let vm = self.raw();
        let slot = Pinned::new(ImportSlot { vm, resolver: Box::new(resolver) });
        let callback = import_trampoline as ffi::JsonnetImportCallback;
        unsafe { ffi::jsonnet_import_callback(vm, callback as *const ffi::JsonnetImportCallback, slot.as_ctx()) };
        debug!("import resolver installed");
        // The previous slot, if any, is released only now that the engine no
        // longer points at it.
        self.import = Some(slot);
        self
    }

    /// Makes `handler` callable as `std.native(name)` with exactly
    /// `params.len()` arguments. Re-registering a name replaces it.
    pub fn register_native_function<I, S, F>(&mut self, name: &str, params: I, handler: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[String]) -> std::result::Result<String, String> + Send + 'static,
    {
        self.register_native_handler(name, params, handler)
    }

    /// Like [`register_native_function`](Self::register_native_function) for
    /// handler types other than closures.
    pub fn register_native_handler<I, S, H>(&mut self, name: &str, params: I, handler: H) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        H: NativeFunction + 'static,
    {
        let params = params.into_iter().map(Into::into).collect();
        let vm = self.raw();
        unsafe { self.natives.register(vm, name, params, Box::new(handler)) }
    }

    /// Applies every field set in `config`; unset fields keep their current value.
    pub fn configure(&mut self, config: &Config) -> Result<()> {
        config.validate()?;
        if let Some(v) = config.max_stack {
            self.set_max_stack(v)?;
        }
        if let Some(v) = config.max_trace {
            self.set_max_trace(v);
        }
        if let Some(v) = config.gc_min_objects {
            self.set_gc_min_objects(v);
        }
        if let Some(v) = config.gc_growth_trigger {
            self.set_gc_growth_trigger(v)?;
        }
        if let Some(v) = config.string_output {
            self.set_string_output(v);
        }
        if let Some(v) = config.format_indent {
            self.set_format_indent(v);
        }
        if let Some(v) = config.format_max_blank_lines {
            self.set_format_max_blank_lines(v);
        }
        if let Some(v) = config.format_string_style {
            self.set_format_string_style(v);
        }
        if let Some(v) = config.format_comment_style {
            self.set_format_comment_style(v);
        }
        if let Some(v) = config.format_pad_arrays {
            self.set_format_pad_arrays(v);
        }
        if let Some(v) = config.format_pad_objects {
            self.set_format_pad_objects(v);
        }
        if let Some(v) = config.format_pretty_field_names {
            self.set_format_pretty_field_names(v);
        }
        if let Some(v) = config.format_sort_imports {
            self.set_format_sort_imports(v);
        }
        Ok(())
    }

    pub fn set_max_stack(&mut self, depth: u32) -> Result<()> {
        if depth == 0 {
            return Err(JsonnetError::Config("max_stack must be at least 1".into()));
        }
        unsafe { ffi::jsonnet_max_stack(self.raw(), depth as c_uint) };
        self.config.max_stack = Some(depth);
        Ok(())
    }

    pub fn set_max_trace(&mut self, frames: u32) {
        unsafe { ffi::jsonnet_max_trace(self.raw(), frames as c_uint) };
        self.config.max_trace = Some(frames);
    }

    pub fn set_gc_min_objects(&mut self, objects: u32) {
        unsafe { ffi::jsonnet_gc_min_objects(self.raw(), objects as c_uint) };
        self.config.gc_min_objects = Some(objects);
    }

    pub fn set_gc_growth_trigger(&mut self, factor: f64) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(JsonnetError::Config(format!(
                "gc_growth_trigger must be a positive finite number, got {factor}"
            )));
        }
        unsafe { ffi::jsonnet_gc_growth_trigger(self.raw(), factor) };
        self.config.gc_growth_trigger = Some(factor);
        Ok(())
    }

    /// With string output on, a program evaluating to a string yields its raw
    /// content plus a newline instead of JSON.
    pub fn set_string_output(&mut self, enabled: bool) {
        unsafe { ffi::jsonnet_string_output(self.raw(), enabled as c_int) };
        self.config.string_output = Some(enabled);
    }

    pub fn set_format_indent(&mut self, spaces: u32) {
        unsafe { ffi::jsonnet_fmt_indent(self.raw(), clamp(spaces)) };
        self.config.format_indent = Some(spaces);
    }

    pub fn set_format_max_blank_lines(&mut self, lines: u32) {
        unsafe { ffi::jsonnet_fmt_max_blank_lines(self.raw(), clamp(lines)) };
        self.config.format_max_blank_lines = Some(lines);
    }

    pub fn set_format_string_style(&mut self, style: StringStyle) {
        unsafe { ffi::jsonnet_fmt_string(self.raw(), style.as_c()) };
        self.config.format_string_style = Some(style);
    }

    pub fn set_format_comment_style(&mut self, style: CommentStyle) {
        unsafe { ffi::jsonnet_fmt_comment(self.raw(), style.as_c()) };
        self.config.format_comment_style = Some(style);
    }

    pub fn set_format_pad_arrays(&mut self, pad: bool) {
        unsafe { ffi::jsonnet_fmt_pad_arrays(self.raw(), pad as c_int) };
        self.config.format_pad_arrays = Some(pad);
    }

    pub fn set_format_pad_objects(&mut self, pad: bool) {
        unsafe { ffi::jsonnet_fmt_pad_objects(self.raw(), pad as c_int) };
        self.config.format_pad_objects = Some(pad);
    }

    pub fn set_format_pretty_field_names(&mut self, pretty: bool) {
        unsafe { ffi::jsonnet_fmt_pretty_field_names(self.raw(), pretty as c_int) };
        self.config.format_pretty_field_names = Some(pretty);
    }

    pub fn set_format_sort_imports(&mut self, sort: bool) {
        unsafe { ffi::jsonnet_fmt_sort_imports(self.raw(), sort as c_int) };
        self.config.format_sort_imports = Some(sort);
    }

    /// Adds a directory searched by the engine's own file importer.
    pub fn add_library_path(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref().to_string_lossy();
        let c_dir = c_string("library path", &dir)?;
        unsafe { ffi::jsonnet_jpath_add(self.raw(), c_dir.as_ptr()) };
        Ok(())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { ffi::jsonnet_destroy(self.vm.as_ptr()) };
        debug!(natives = self.natives.len(), "engine context destroyed");
        // `import` and `natives` drop after this body, once nothing can call them.
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bindings", &self.bindings)
            .field("config", &self.config)
            .field("import_resolver", &self.import.is_some())
            .field("native_functions", &self.natives)
            .finish()
    }
}

fn clamp(n: u32) -> c_int {
    c_int::try_from(n).unwrap_or(c_int::MAX)
}
