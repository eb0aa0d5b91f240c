use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use jsonnet_bridge::{self as jb, Context, JsonnetError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn alien_and_human(_base: &str, rel: &str) -> Result<jb::ResolvedImport, String> {
    match rel {
        "alien.conf" => Ok(jb::ResolvedImport::new(r#"{ type: "alien", origin: "Ork", name: "Mork" }"#, rel)),
        "human.conf" => Ok(jb::ResolvedImport::new(r#"{ type: "human", origin: "Earth", name: "Mendy" }"#, rel)),
        _ => Err(format!("Cannot import {rel:?}")),
    }
}

#[test]
fn engine_version_is_available_without_a_context() {
    assert!(jb::engine_version().starts_with('v'));
}

#[test]
fn demo() {
    let mut ctx = Context::new().unwrap();
    ctx.bind_external_var_literal("color", "purple");
    let out = ctx.evaluate_snippet("demo", r#""dark " + std.extVar("color")"#).unwrap();
    assert_eq!(out, "\"dark purple\"\n");
    ctx.destroy();
}

#[test]
fn arithmetic_round_trip() {
    let mut ctx = Context::new().unwrap();
    assert_eq!(ctx.evaluate_snippet("test1", "20 + 22").unwrap(), "42\n");
}

#[test]
fn bindings_reach_the_program() {
    let mut ctx = Context::new().unwrap();
    ctx.bind_top_level_arg_literal("color", "purple")
        .bind_top_level_arg_literal("size", "XXL")
        .bind_top_level_arg_code("gooselevel", "1234 * 10 + 5")
        .bind_external_var_literal("color", "purple")
        .bind_external_var_literal("size", "XXL")
        .bind_external_var_code("gooselevel", "1234 * 10 + 5");

    let out = ctx.evaluate_snippet("test2", "function(color, size, gooselevel) color").unwrap();
    assert_eq!(out, "\"purple\"\n");
    let out = ctx.evaluate_snippet("test2", "function(color, size, gooselevel) gooselevel").unwrap();
    assert_eq!(out, "12345\n");
    let out = ctx.evaluate_snippet("test2", r#"std.extVar("color")"#).unwrap();
    assert_eq!(out, "\"purple\"\n");
    let out = ctx.evaluate_snippet("test2", r#"std.extVar("gooselevel")"#).unwrap();
    assert_eq!(out, "12345\n");
}

#[test]
fn rebinding_overwrites() {
    let mut ctx = Context::new().unwrap();
    ctx.bind_external_var_literal("color", "purple");
    ctx.bind_external_var_literal("color", "green");
    assert_eq!(ctx.evaluate_snippet("rebind", r#"std.extVar("color")"#).unwrap(), "\"green\"\n");
    ctx.bind_external_var_code("color", "{ shade: 'dark' }");
    let out = ctx.evaluate_snippet("rebind", r#"std.extVar("color").shade"#).unwrap();
    assert_eq!(out, "\"dark\"\n");
}

#[test]
fn malformed_code_binding_fails_only_when_evaluated() {
    let mut ctx = Context::new().unwrap();
    ctx.bind_external_var_code("broken", "1 +");
    assert_eq!(ctx.evaluate_snippet("unused", "1").unwrap(), "1\n");
    let err = ctx.evaluate_snippet("used", r#"std.extVar("broken")"#).unwrap_err();
    assert!(matches!(err, JsonnetError::Evaluation(_)), "{err:?}");
}

#[test]
fn nul_in_binding_is_reported_at_evaluation() {
    let mut ctx = Context::new().unwrap();
    ctx.bind_external_var_literal("x", "a\0b");
    let err = ctx.evaluate_snippet("nul", "1").unwrap_err();
    assert!(matches!(err, JsonnetError::Nul { offset: 1, .. }), "{err:?}");
}

#[test]
fn string_output_toggles() {
    let mut ctx = Context::new().unwrap();
    ctx.set_string_output(true);
    assert_eq!(ctx.evaluate_snippet("s", r#""whee""#).unwrap(), "whee\n");
    ctx.set_string_output(false);
    assert_eq!(ctx.evaluate_snippet("s", r#""whee""#).unwrap(), "\"whee\"\n");
    assert_eq!(ctx.config().string_output, Some(false));
}

#[test]
fn string_output_rejects_non_strings() {
    let mut ctx = Context::new().unwrap();
    ctx.set_string_output(true);
    assert!(ctx.evaluate_snippet("s", "{ a: 1 }").is_err());
}

#[test]
fn imports_go_through_the_resolver() {
    let mut ctx = Context::new().unwrap();
    ctx.set_import_resolver(alien_and_human);

    let out = ctx
        .evaluate_snippet(
            "test3",
            r#"
            local a = import "alien.conf";
            local b = import "human.conf";
            a.name + b.name
            "#,
        )
        .unwrap();
    assert_eq!(out, "\"MorkMendy\"\n");

    let out = ctx
        .evaluate_snippet(
            "test4",
            r#"
            local a = import "alien.conf";
            local b = a { type: "fictitious" };
            b.type + b.name
            "#,
        )
        .unwrap();
    assert_eq!(out, "\"fictitiousMork\"\n");
}

#[test]
fn unknown_import_is_an_error_naming_the_path() {
    let mut ctx = Context::new().unwrap();
    ctx.set_import_resolver(alien_and_human);
    let err = ctx.evaluate_snippet("missing", r#"(import "martian.conf").name"#).unwrap_err();
    match err {
        JsonnetError::Evaluation(msg) => assert!(msg.contains("martian.conf"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn resolved_path_is_the_base_for_nested_imports() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);

    let mut ctx = Context::new().unwrap();
    ctx.set_import_resolver(move |base: &str, rel: &str| -> Result<jb::ResolvedImport, String> {
        seen.lock().unwrap().push((base.to_string(), rel.to_string()));
        match format!("{base}{rel}").as_str() {
            "a/b.libsonnet" => Ok(jb::ResolvedImport::new(r#"import "c.libsonnet""#, "lib/a/b.libsonnet")),
            "lib/a/c.libsonnet" => Ok(jb::ResolvedImport::new("{ c: 'nested' }", "lib/a/c.libsonnet")),
            other => Err(format!("Cannot import {other:?}")),
        }
    });

    let out = ctx.evaluate_snippet("main", r#"(import "a/b.libsonnet").c"#).unwrap();
    assert_eq!(out, "\"nested\"\n");
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            (String::new(), "a/b.libsonnet".to_string()),
            ("lib/a/".to_string(), "c.libsonnet".to_string()),
        ]
    );
}

#[test]
fn self_import_is_an_error_naming_the_file() {
    let mut ctx = Context::new().unwrap();
    ctx.set_max_stack(50).unwrap();
    ctx.set_import_resolver(|_: &str, rel: &str| -> Result<jb::ResolvedImport, String> {
        match rel {
            "x.libsonnet" => Ok(jb::ResolvedImport::new(r#"import "x.libsonnet""#, "lib/x.libsonnet")),
            _ => Err(format!("Cannot import {rel:?}")),
        }
    });
    let err = ctx.evaluate_snippet("cycle", r#"import "x.libsonnet""#).unwrap_err();
    match err {
        JsonnetError::Evaluation(msg) => assert!(msg.contains("x.libsonnet"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn memory_imports_serve_importstr() {
    let mut ctx = Context::new().unwrap();
    ctx.set_import_resolver(jb::MemoryImports::new().with_file("motd.txt", "hello"));
    ctx.set_string_output(true);
    assert_eq!(ctx.evaluate_snippet("motd", r#"importstr "motd.txt""#).unwrap(), "hello\n");
}

#[test]
fn evaluate_file_reads_from_disk() {
    let mut ctx = Context::new().unwrap();
    let out = ctx.evaluate_file(fixture("test2.jsonnet")).unwrap();
    assert_eq!(out, "{\n   \"awk\": \"/usr/bin/awk\",\n   \"shell\": \"/bin/csh\"\n}\n");
    let value: Value = jb::parse_json(&out).unwrap();
    assert_eq!(value, json!({"awk": "/usr/bin/awk", "shell": "/bin/csh"}));
}

#[test]
fn evaluate_missing_file_is_an_error() {
    let mut ctx = Context::new().unwrap();
    let err = ctx.evaluate_file(fixture("does-not-exist.jsonnet")).unwrap_err();
    assert!(matches!(err, JsonnetError::Evaluation(_)));
}

#[test]
fn tuned_context_resolves_relative_file_imports() {
    let mut ctx = Context::new().unwrap();
    ctx.set_max_stack(10).unwrap();
    ctx.set_max_trace(10);
    ctx.set_gc_min_objects(10);
    ctx.set_gc_growth_trigger(2.0).unwrap();

    let snippet_name = fixture("misc.jsonnet");
    let out = ctx
        .evaluate_snippet(&snippet_name.to_string_lossy(), "local a = import \"test2.jsonnet\";\na.awk + a.shell")
        .unwrap();
    assert_eq!(out, "\"/usr/bin/awk/bin/csh\"\n");
}

#[test]
fn library_paths_feed_the_builtin_importer() {
    let mut ctx = Context::new().unwrap();
    ctx.add_library_path(fixture("")).unwrap();
    let out = ctx.evaluate_snippet("jpath", r#"(import "test2.jsonnet").shell"#).unwrap();
    assert_eq!(out, "\"/bin/csh\"\n");
}

#[test]
fn stack_limit_is_a_reported_error() {
    let mut ctx = Context::new().unwrap();
    ctx.set_max_stack(10).unwrap();
    let err = ctx
        .evaluate_snippet("deep", "local f(n) = if n == 0 then 0 else 1 + f(n - 1); f(100)")
        .unwrap_err();
    match err {
        JsonnetError::Evaluation(msg) => assert!(msg.to_lowercase().contains("stack"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ctx.set_max_stack(0).is_err());
}

#[test]
fn errors_never_carry_partial_output() {
    let mut ctx = Context::new().unwrap();
    let err = ctx.evaluate_snippet("partial", "{ ok: 1, bad: { a: 1 }.b }").unwrap_err();
    assert!(!err.message().is_empty());
    assert!(ctx.evaluate_snippet("syntax", "{ a: ").is_err());
}

#[test]
fn multi_output_splits_files() {
    let mut ctx = Context::new().unwrap();
    let files = ctx.evaluate_file_multi(fixture("multi.jsonnet")).unwrap();
    assert_eq!(files.keys().map(String::as_str).collect::<Vec<_>>(), vec!["a.json", "b.json"]);
    let a: Value = jb::parse_json(&files["a.json"]).unwrap();
    assert_eq!(a, json!({"name": "a"}));

    let files = ctx.evaluate_snippet_multi("multi", r#"{ "x.json": 1 }"#).unwrap();
    assert_eq!(files["x.json"].trim(), "1");
    assert!(ctx.evaluate_snippet_multi("multi", "[1]").is_err());
}

#[test]
fn multi_output_keeps_an_empty_file_name() {
    let mut ctx = Context::new().unwrap();
    let files = ctx.evaluate_snippet_multi("m", r#"{ "": 1, "b.json": 2 }"#).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[""], "1\n");
    assert_eq!(files["b.json"], "2\n");

    assert!(ctx.evaluate_snippet_multi("m", "{}").unwrap().is_empty());

    ctx.set_string_output(true);
    let files = ctx.evaluate_snippet_multi("m", r#"{ "": "x" }"#).unwrap();
    assert_eq!(files[""], "x\n");
    assert_eq!(ctx.evaluate_snippet("after", "'raw'").unwrap(), "raw\n");
}

#[test]
fn stream_output_splits_documents() {
    let mut ctx = Context::new().unwrap();
    let docs = ctx.evaluate_snippet_stream("stream", r#"[1, "two", { three: 3 }]"#).unwrap();
    assert_eq!(docs.len(), 3);
    assert_eq!(docs[0].trim(), "1");
    assert_eq!(docs[1].trim(), "\"two\"");
    assert!(ctx.evaluate_snippet_stream("stream", "{}").is_err());
}

#[test]
fn configure_applies_json_settings() {
    let cfg = jb::Config::from_json_str(r#"{"string_output": true, "max_stack": 50}"#).unwrap();
    let mut ctx = Context::with_config(&cfg).unwrap();
    assert_eq!(ctx.evaluate_snippet("cfg", "'raw'").unwrap(), "raw\n");
    assert_eq!(ctx.config().max_stack, Some(50));
}

#[test]
fn contexts_are_independent_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let mut ctx = Context::new().unwrap();
                ctx.bind_external_var_code("n", i.to_string());
                ctx.evaluate_snippet("thread", r#"std.extVar("n") * 2"#).unwrap()
            })
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap(), format!("{}\n", i * 2));
    }
}

#[test]
fn a_context_can_be_moved_to_another_thread() {
    let mut ctx = Context::new().unwrap();
    ctx.bind_external_var_literal("who", "worker");
    let out = std::thread::spawn(move || ctx.evaluate_snippet("moved", r#"std.extVar("who")"#).unwrap())
        .join()
        .unwrap();
    assert_eq!(out, "\"worker\"\n");
}
