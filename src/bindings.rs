//! Top-level arguments and external variables recorded on a [`Context`].
//!
//! Nothing here touches the engine: bindings are inert until an evaluation
//! pushes them, which is also when a malformed `Code` binding gets reported.
//!
//! [`Context`]: crate::Context

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::ffi::{self, memory::c_string, JsonnetVm};

/// How a bound value reaches the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// A ready string constant.
    Literal(String),
    /// Templating source, evaluated lazily by the engine on first reference.
    Code(String),
}

/// Which lookup a binding answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingKind {
    /// Argument to a function-shaped top-level program.
    TopLevelArg,
    /// Value of `std.extVar(name)`.
    ExternalVar,
}

impl BindingKind {
    fn describe(self) -> &'static str {
        match self {
            BindingKind::TopLevelArg => "top-level argument",
            BindingKind::ExternalVar => "external variable",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bindings {
    top_level: BTreeMap<String, Binding>,
    external: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a binding, returning the one it replaced.
    pub fn bind(&mut self, kind: BindingKind, name: impl Into<String>, binding: Binding) -> Option<Binding> {
        self.map_mut(kind).insert(name.into(), binding)
    }

    pub fn get(&self, kind: BindingKind, name: &str) -> Option<&Binding> {
        self.map(kind).get(name)
    }

    pub fn iter(&self, kind: BindingKind) -> impl Iterator<Item = (&str, &Binding)> {
        self.map(kind).iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.top_level.len() + self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self, kind: BindingKind) -> &BTreeMap<String, Binding> {
        match kind {
            BindingKind::TopLevelArg => &self.top_level,
            BindingKind::ExternalVar => &self.external,
        }
    }

    fn map_mut(&mut self, kind: BindingKind) -> &mut BTreeMap<String, Binding> {
        match kind {
            BindingKind::TopLevelArg => &mut self.top_level,
            BindingKind::ExternalVar => &mut self.external,
        }
    }

    /// Pushes every binding into the engine. The engine overwrites by name, so
    /// repeating this before each evaluation is harmless.
    ///
    /// # Safety
    /// `vm` must be a live engine context.
    pub(crate) unsafe fn apply(&self, vm: *mut JsonnetVm) -> Result<()> {
        for kind in [BindingKind::TopLevelArg, BindingKind::ExternalVar] {
            for (name, binding) in self.iter(kind) {
                let key = c_string(&format!("{} name `{}`", kind.describe(), name), name)?;
                let (text, is_code) = match binding {
                    Binding::Literal(v) => (v, false),
                    Binding::Code(c) => (c, true),
                };
                let val = c_string(&format!("{} `{}`", kind.describe(), name), text)?;
                let push = match (kind, is_code) {
                    (BindingKind::TopLevelArg, false) => ffi::jsonnet_tla_var,
                    (BindingKind::TopLevelArg, true) => ffi::jsonnet_tla_code,
                    (BindingKind::ExternalVar, false) => ffi::jsonnet_ext_var,
                    (BindingKind::ExternalVar, true) => ffi::jsonnet_ext_code,
                };
                push(vm, key.as_ptr(), val.as_ptr());
            }
        }
        Ok(())
    }
}
