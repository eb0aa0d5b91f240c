//! Raw C ABI of the libjsonnet engine, as bound and linked by `jsonnet-sys`.
//!
//! Nothing in here is safe to call without upholding the ownership rules
//! documented in [`memory`].

pub(crate) mod memory;

pub(crate) use jsonnet_sys::{
    jsonnet_destroy, jsonnet_evaluate_file, jsonnet_evaluate_file_multi, jsonnet_evaluate_file_stream,
    jsonnet_evaluate_snippet, jsonnet_evaluate_snippet_multi, jsonnet_evaluate_snippet_stream, jsonnet_ext_code,
    jsonnet_ext_var, jsonnet_fmt_comment, jsonnet_fmt_file, jsonnet_fmt_indent, jsonnet_fmt_max_blank_lines,
    jsonnet_fmt_pad_arrays, jsonnet_fmt_pad_objects, jsonnet_fmt_pretty_field_names, jsonnet_fmt_snippet,
    jsonnet_fmt_sort_imports, jsonnet_fmt_string, jsonnet_gc_growth_trigger, jsonnet_gc_min_objects,
    jsonnet_import_callback, jsonnet_jpath_add, jsonnet_json_extract_bool,
    jsonnet_json_extract_number, jsonnet_json_extract_string, jsonnet_json_make_string, jsonnet_make,
    jsonnet_max_stack, jsonnet_max_trace, jsonnet_native_callback, jsonnet_realloc, jsonnet_string_output,
    jsonnet_tla_code, jsonnet_tla_var, jsonnet_version, JsonnetImportCallback, JsonnetJsonValue,
    JsonnetNativeCallback, JsonnetVm,
};
