use std::collections::{BTreeMap, HashSet};
use std::ffi::CString;
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use tracing::{trace, warn};

use crate::errors::{JsonnetError, Result};
use crate::ffi::memory::{borrow_str, c_string, Pinned};
use crate::ffi::{self, JsonnetJsonValue, JsonnetVm};

/// A host function callable from templates as `std.native(name)(args...)`.
///
/// Arguments arrive in declared parameter order, already reduced to strings.
/// Failure is reported as a message; the engine aborts the enclosing
/// expression with it.
pub trait NativeFunction: Send {
    fn call(&self, args: &[String]) -> std::result::Result<String, String>;
}

impl<F> NativeFunction for F
where
    F: Fn(&[String]) -> std::result::Result<String, String> + Send,
{
    fn call(&self, args: &[String]) -> std::result::Result<String, String> {
        self(args)
    }
}

/// Heap-pinned registration handed to the engine as the callback context.
pub(crate) struct NativeSlot {
    vm: *mut JsonnetVm,
    name: String,
    params: Vec<String>,
    handler: Box<dyn NativeFunction>,
}

/// Native functions registered on one `Context`, keyed by name.
///
/// The engine holds each slot's address until the context is destroyed.
#[derive(Default)]
pub struct Registry {
    slots: BTreeMap<String, Pinned<NativeSlot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter names of a registered function.
    pub fn params(&self, name: &str) -> Option<&[String]> {
        self.slots.get(name).map(|s| s.get().params.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Registers `handler` with the engine under `name`, replacing any earlier
    /// registration. The replaced slot is dropped only after the engine has
    /// been pointed at the new one.
    ///
    /// # Safety
    /// `vm` must be a live engine context that outlives this registry's slots.
    pub(crate) unsafe fn register(
        &mut self,
        vm: *mut JsonnetVm,
        name: &str,
        params: Vec<String>,
        handler: Box<dyn NativeFunction>,
    ) -> Result<()> {
        validate(name, &params)?;
        let c_name = c_string("native function name", name)?;
        let c_params = params
            .iter()
            .map(|p| c_string(&format!("parameter name of native function `{name}`"), p))
            .collect::<Result<Vec<_>>>()?;
        let mut param_ptrs: Vec<*const c_char> = c_params.iter().map(|p| p.as_ptr()).collect();
        param_ptrs.push(ptr::null());

        let slot = Pinned::new(NativeSlot { vm, name: name.to_string(), params, handler });
        let callback = native_trampoline as ffi::JsonnetNativeCallback;
        ffi::jsonnet_native_callback(
            vm,
            c_name.as_ptr(),
            callback as *const ffi::JsonnetNativeCallback,
            slot.as_ctx(),
            param_ptrs.as_ptr(),
        );
        trace!(function = name, arity = slot.get().params.len(), "native function registered");
        self.slots.insert(name.to_string(), slot);
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.slots.iter().map(|(k, v)| (k, &v.get().params))).finish()
    }
}

/// Builtins the engine looks up before its native table; a native function
/// under one of these names would never be called.
const ENGINE_BUILTINS: &[&str] = &[
    "makeArray", "pow", "floor", "ceil", "sqrt", "sin", "cos", "tan", "asin", "acos", "atan", "type",
    "filter", "objectHasEx", "length", "objectFieldsEx", "codepoint", "char", "log", "exp", "mantissa",
    "exponent", "modulo", "extVar", "primitiveEquals", "native", "md5", "trace", "splitLimit", "substr",
    "range", "strReplace", "asciiLower", "asciiUpper", "join", "parseJson", "encodeUTF8", "decodeUTF8",
];

fn validate(name: &str, params: &[String]) -> Result<()> {
    if name.is_empty() {
        return Err(JsonnetError::Registration("function name must not be empty".into()));
    }
    if ENGINE_BUILTINS.contains(&name) {
        return Err(JsonnetError::Registration(format!(
            "`{name}` is an engine builtin and would shadow the native function"
        )));
    }
    let mut seen = HashSet::new();
    for p in params {
        if p.is_empty() {
            return Err(JsonnetError::Registration(format!(
                "native function `{name}` has an empty parameter name"
            )));
        }
        if !seen.insert(p.as_str()) {
            return Err(JsonnetError::Registration(format!(
                "native function `{name}` declares parameter `{p}` twice"
            )));
        }
    }
    Ok(())
}

extern "C" fn native_trampoline(
    ctx: *mut c_void,
    argv: *const *const JsonnetJsonValue,
    success: *mut c_int,
) -> *mut JsonnetJsonValue {
    let slot = unsafe { &*(ctx as *const NativeSlot) };
    trace!(function = %slot.name, "native function called");

    let outcome = unsafe { collect_args(slot, argv) }.and_then(|args| {
        panic::catch_unwind(AssertUnwindSafe(|| slot.handler.call(&args))).unwrap_or_else(|_| {
            warn!(function = %slot.name, "native function panicked");
            Err(format!("native function `{}` panicked", slot.name))
        })
    });

    let (text, ok) = match outcome {
        Ok(text) => (text, 1),
        Err(message) => {
            trace!(function = %slot.name, error = %message, "native function failed");
            (message, 0)
        }
    };
    let (c_text, ok) = match c_string(&format!("result of native function `{}`", slot.name), &text) {
        Ok(c_text) => (c_text, ok),
        Err(err) => {
            warn!(function = %slot.name, error = %err, "native function result rejected");
            (CString::new(err.to_string()).unwrap_or_default(), 0)
        }
    };
    unsafe {
        *success = ok;
        ffi::jsonnet_json_make_string(slot.vm, c_text.as_ptr())
    }
}

/// # Safety
/// `argv` must hold `slot.params.len()` engine values, as the engine
/// guarantees for a call it dispatched to `slot`.
unsafe fn collect_args(
    slot: &NativeSlot,
    argv: *const *const JsonnetJsonValue,
) -> std::result::Result<Vec<String>, String> {
    if slot.params.is_empty() {
        return Ok(Vec::new());
    }
    if argv.is_null() {
        return Err(format!("native function `{}` received no arguments", slot.name));
    }
    Ok((0..slot.params.len()).map(|i| arg_to_string(slot.vm, *argv.add(i))).collect())
}

/// Reduces one engine value to the string the handler sees. The engine only
/// passes strings, numbers, booleans and null; composite values are rejected
/// before the callback runs.
unsafe fn arg_to_string(vm: *mut JsonnetVm, v: *const JsonnetJsonValue) -> String {
    let s = ffi::jsonnet_json_extract_string(vm, v);
    if !s.is_null() {
        return borrow_str(s).into_owned();
    }
    let mut n: c_double = 0.0;
    if ffi::jsonnet_json_extract_number(vm, v, &mut n) != 0 {
        return format_number(n);
    }
    match ffi::jsonnet_json_extract_bool(vm, v) {
        0 => "false".into(),
        1 => "true".into(),
        _ => "null".into(),
    }
}

/// Renders a number the way the templating language's `std.toString` does:
/// integral values in full with no fraction, everything else with 17
/// significant digits in C's `%g` style.
pub(crate) fn format_number(n: f64) -> String {
    if n == n.floor() {
        return format!("{n:.0}");
    }
    const DIGITS: i32 = 17;
    let sci = format!("{:.*e}", (DIGITS - 1) as usize, n);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return n.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return n.to_string();
    };
    if exp < -4 || exp >= DIGITS {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        trim_fraction(&format!("{:.*}", (DIGITS - 1 - exp) as usize, n)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
