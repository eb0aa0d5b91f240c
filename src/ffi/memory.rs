//! Ownership transfer across the engine boundary.
//!
//! Buffers returned by the engine are wrapped in [`EngineBuf`] the moment they
//! arrive, copied into Rust strings, and handed back to the engine's own
//! allocator exactly once on drop. Buffers travelling the other way (import
//! content, callback results) are allocated with [`alloc_str`], after which the
//! engine owns them.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr::{self, NonNull};

use super::{jsonnet_realloc, JsonnetVm};
use crate::errors::{JsonnetError, Result};

/// An engine-allocated, NUL-terminated buffer released on drop.
pub(crate) struct EngineBuf {
    vm: *mut JsonnetVm,
    ptr: *mut c_char,
}

impl EngineBuf {
    /// # Safety
    /// `ptr` must be null or a buffer allocated by `vm` that nobody else frees.
    pub(crate) unsafe fn from_raw(vm: *mut JsonnetVm, ptr: *mut c_char) -> Self {
        EngineBuf { vm, ptr }
    }

    /// First NUL-terminated string in the buffer, copied and lossily decoded.
    pub(crate) fn to_string_lossy(&self) -> String {
        if self.ptr.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(self.ptr) }.to_string_lossy().into_owned()
    }

    /// Splits the NUL-separated listing produced by the multi and stream
    /// entry points. Each entry has `width` fields and the listing ends at an
    /// empty string in an entry's first field. `empty_first` marks the one
    /// exception: a first entry whose first field really is empty.
    pub(crate) fn to_string_list(&self, width: usize, empty_first: bool) -> Vec<String> {
        unsafe { split_list(self.ptr, width, empty_first) }
    }

    /// Whether the buffer opens with an empty string.
    pub(crate) fn starts_empty(&self) -> bool {
        !self.ptr.is_null() && unsafe { *self.ptr } == 0
    }
}

/// # Safety
/// `ptr` must be null or point to a listing as described on
/// [`EngineBuf::to_string_list`], closed by an extra NUL.
unsafe fn split_list(ptr: *const c_char, width: usize, empty_first: bool) -> Vec<String> {
    let mut out = Vec::new();
    if ptr.is_null() {
        return out;
    }
    let width = width.max(1);
    let mut cursor = ptr;
    loop {
        let part = CStr::from_ptr(cursor);
        let len = part.to_bytes().len();
        let entry_start = out.len() % width == 0;
        if len == 0 && entry_start && !(empty_first && out.is_empty()) {
            break;
        }
        out.push(part.to_string_lossy().into_owned());
        cursor = cursor.add(len + 1);
    }
    out
}

impl Drop for EngineBuf {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { jsonnet_realloc(self.vm, self.ptr, 0) };
            self.ptr = ptr::null_mut();
        }
    }
}

/// A heap value whose address is lent to the engine as a callback context.
///
/// The address never changes while the `Pinned` is alive, no matter how the
/// owner moves it around, and the value is freed when it drops.
pub(crate) struct Pinned<T> {
    ptr: NonNull<T>,
}

impl<T> Pinned<T> {
    pub(crate) fn new(value: T) -> Self {
        Pinned { ptr: NonNull::from(Box::leak(Box::new(value))) }
    }

    pub(crate) fn as_ctx(&self) -> *mut c_void {
        self.ptr.as_ptr() as *mut c_void
    }

    pub(crate) fn get(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for Pinned<T> {
    fn drop(&mut self) {
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

/// Copies `s` into a fresh engine-owned, NUL-terminated buffer. Interior NUL
/// bytes truncate the string as the engine would read it anyway.
///
/// # Safety
/// `vm` must be a live engine context.
pub(crate) unsafe fn alloc_str(vm: *mut JsonnetVm, s: &str) -> *mut c_char {
    let bytes = s.as_bytes();
    let buf = jsonnet_realloc(vm, ptr::null_mut(), bytes.len() + 1);
    ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, bytes.len());
    *buf.add(bytes.len()) = 0;
    buf
}

/// Converts a host string for the engine, naming it in the error.
pub(crate) fn c_string(what: &str, s: &str) -> Result<CString> {
    CString::new(s).map_err(|e| JsonnetError::nul(what, &e))
}

/// Borrows an engine-provided string for the duration of a callback.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for `'a`.
pub(crate) unsafe fn borrow_str<'a>(ptr: *const c_char) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        return std::borrow::Cow::Borrowed("");
    }
    CStr::from_ptr(ptr).to_string_lossy()
}
