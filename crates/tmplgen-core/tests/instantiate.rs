use std::path::PathBuf;

use tmplgen_core::{instantiate, instantiate_to_string, Config, Diagnostic, DiagnosticCode};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn run(config: &Config) -> String {
    instantiate_to_string(config).unwrap_or_else(|err| panic!("instantiate: {err:#}"))
}

fn code_of(err: &anyhow::Error) -> DiagnosticCode {
    err.downcast_ref::<Diagnostic>()
        .unwrap_or_else(|| panic!("not a diagnostic: {err:#}"))
        .code
}

fn copy_config() -> Config {
    Config::new(fixture("copy.rs"))
        .param("T", "i32")
        .rename("Ts", "Ints")
}

#[test]
fn copy_substitutes_placeholder_and_renames_type() {
    let out = run(&copy_config());
    assert!(!out.contains("type T"), "{out}");
    assert!(!out.contains("Ts"), "{out}");
    assert!(out.contains("pub struct Ints(pub Vec<i32>);"), "{out}");
    assert!(out.contains("impl Ints {"), "{out}");
    assert!(out.contains("pub fn push(&mut self, value: i32)"), "{out}");
    assert!(out.contains("pub fn first(&self) -> Option<&i32>"), "{out}");
    assert!(out.contains("impl std::fmt::Debug for Ints {"), "{out}");
    assert!(out.contains("pub fn foo(values: &[i32]) -> Ints {"), "{out}");
    assert!(out.contains("let mut out = Ints::new();"), "{out}");
    assert!(out.contains("/// Collects `values` into a new sequence."), "{out}");
    syn::parse_file(&out).expect("output parses");
}

#[test]
fn declarations_are_separated_by_blank_lines() {
    let out = run(&Config::new(fixture("deps.rs")));
    assert!(out.contains("}\n\nfn b() -> u32 {"), "{out}");
    assert!(out.contains("}\n\nconst C: u32 = 21;\n\npub fn d()"), "{out}");
}

#[test]
fn values_are_substituted_as_literals() {
    let out = run(&Config::new(fixture("var.rs")).param("N", "8").param("NAME", "ints"));
    assert!(!out.contains("const N"), "{out}");
    assert!(!out.contains("NAME"), "{out}");
    assert!(out.contains("\"ints\""), "{out}");
    assert!(out.contains("pub fn buffer() -> [u8; 8]"), "{out}");
    assert!(out.contains("[0; 8]"), "{out}");
}

#[test]
fn closure_keeps_transitive_dependencies_only() {
    let out = run(&Config::new(fixture("deps.rs")).keep("a"));
    assert!(out.contains("pub fn a() -> u32"), "{out}");
    assert!(out.contains("fn b() -> u32"), "{out}");
    assert!(out.contains("const C: u32 = 21;"), "{out}");
    assert!(!out.contains("fn d()"), "{out}");
}

#[test]
fn uses_resolve_through_renames() {
    let out = run(
        &Config::new(fixture("uses.rs"))
            .param("T", "String")
            .rename("Ts", "Strings")
            .rename("Foo", "FOO")
            .keep("Strings.Foo")
            .keep("FOO"),
    );
    assert!(out.contains("pub struct Strings(Vec<String>);"), "{out}");
    assert!(out.contains("pub fn Foo(&self) -> usize"), "{out}");
    assert!(out.contains("pub fn FOO() -> Strings"), "{out}");
    assert!(out.contains("fn baz(n: usize) -> usize"), "{out}");
    assert!(!out.contains("fn Bar"), "{out}");
    assert!(!out.contains("fn unused"), "{out}");
}

#[test]
fn regeneration_narrows_to_keep_list() {
    let full = run(&Config::new(fixture("deps.rs")));
    assert!(full.contains("pub fn d()"), "{full}");
    let existing = format!("{full}\npub fn user_helper() -> u32 {{\n    a()\n}}\n");

    let narrowed = run(
        &Config::new(fixture("deps.rs"))
            .keep("a")
            .existing("out.rs", existing),
    );
    assert!(!narrowed.contains("fn d()"), "{narrowed}");
    assert!(narrowed.contains("pub fn a() -> u32"), "{narrowed}");
    assert!(narrowed.contains("fn b() -> u32"), "{narrowed}");
    assert!(narrowed.contains("const C: u32 = 21;"), "{narrowed}");
    assert!(narrowed.contains("pub fn user_helper() -> u32"), "{narrowed}");
}

#[test]
fn regeneration_with_keep_list_is_idempotent() {
    let config = copy_config().module("ints").keep("Ints.push");
    let first = run(&config);
    assert!(first.contains("pub fn push(&mut self, value: i32)"), "{first}");
    assert!(first.contains("impl std::fmt::Debug for Ints"), "{first}");
    assert!(!first.contains("pub fn new()"), "{first}");
    assert!(!first.contains("pub fn foo("), "{first}");

    let second = run(&config.clone().existing("ints.rs", first.clone()));
    assert_eq!(first, second);
}

#[test]
fn format_captures_are_bound_and_renamed() {
    let out = run(
        &Config::new(fixture("captures.rs"))
            .param("N", "8")
            .rename("LIMIT", "MAX")
            .keep("describe"),
    );
    assert!(out.contains(r#""{x} of {0}, limit {MAX:?}", 8)"#), "{out}");
    assert!(out.contains("pub const MAX: u8 = 3;"), "{out}");
    assert!(!out.contains("LIMIT"), "{out}");
    assert!(!out.contains("{N}"), "{out}");
    assert!(!out.contains("const N"), "{out}");
    assert!(!out.contains("unrelated"), "{out}");
    syn::parse_file(&out).expect("output parses");
}

#[test]
fn grouped_placeholder_keeps_remaining_entries() {
    let out = run(&Config::new(fixture("group.rs")).param("X", "5"));
    assert!(out.contains("thread_local!"), "{out}");
    assert!(out.contains("static Y"), "{out}");
    assert!(!out.contains("static X"), "{out}");
    assert!(out.starts_with("use std::cell::Cell;\n\n"), "{out}");
}

#[test]
fn unnamed_initializers_are_deduplicated_by_text() {
    let template = fixture("init.rs");
    let first = run(&Config::new(&template));
    assert_eq!(first.matches("let _ = 42;").count(), 1, "{first}");

    let same = run(&Config::new(&template).existing("out.rs", first.clone()));
    assert_eq!(same.matches("let _ = 42;").count(), 1, "{same}");

    let distinct = run(
        &Config::new(&template).existing("out.rs", "const _: () = {\n    let _ = 43;\n};\n"),
    );
    assert_eq!(distinct.matches("let _ = 42;").count(), 1, "{distinct}");
    assert_eq!(distinct.matches("let _ = 43;").count(), 1, "{distinct}");
}

#[test]
fn regeneration_is_idempotent() {
    let config = copy_config().module("ints");
    let first = run(&config);
    assert!(first.starts_with("// Code generated by tmplgen from `"), "{first}");
    assert!(first.contains("for module `ints`."), "{first}");

    let second = run(&config.clone().existing("ints.rs", first.clone()));
    assert_eq!(first, second);
}

#[test]
fn merge_keeps_user_code_and_existing_docs() {
    let existing = "/// Hand-written docs.\npub fn foo(values: &[i32]) -> Ints {\n    todo!()\n}\n\npub fn user_helper() {}\n";
    let out = run(&copy_config().existing("ints.rs", existing));
    assert_eq!(out.matches("pub fn foo(").count(), 1, "{out}");
    assert!(out.contains("/// Hand-written docs."), "{out}");
    assert!(!out.contains("Collects `values`"), "{out}");
    assert!(!out.contains("todo!"), "{out}");
    assert!(out.contains("pub fn user_helper() {}"), "{out}");

    let foo = out.find("pub fn foo(").expect("foo");
    let helper = out.find("pub fn user_helper").expect("helper");
    let ints = out.find("pub struct Ints").expect("Ints");
    assert!(foo < helper && helper < ints, "{out}");
}

#[test]
fn directory_units_are_one_scope() {
    let out = run(
        &Config::new(fixture("slice"))
            .param("T", "u16")
            .rename("Ts", "Shorts"),
    );
    assert!(out.contains("pub struct Shorts(pub Vec<u16>);"), "{out}");
    assert!(out.contains("impl Shorts {"), "{out}");
    assert!(out.contains("-> Option<u16>"), "{out}");
}

#[test]
fn module_is_inferred_from_output_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = run(&copy_config().output_path(dir.path().join("int_seq.rs")));
    assert!(out.contains("for module `int_seq`."), "{out}");

    let bare = run(&copy_config().module("").output_path(dir.path().join("int_seq.rs")));
    assert!(!bare.starts_with("//"), "{bare}");

    let err = instantiate_to_string(&copy_config().output_path(dir.path().join("missing/x.rs")))
        .expect_err("missing directory");
    assert_eq!(code_of(&err), DiagnosticCode::TG0302DetectModule);
}

#[test]
fn invalid_requests_fail_with_codes() {
    let err = instantiate_to_string(&Config::new(fixture("uses.rs")).keep("foo.bar.baz"))
        .expect_err("spec");
    assert_eq!(code_of(&err), DiagnosticCode::TG0201InvalidKeepSpec);
    assert!(format!("{err:#}").contains("invalid use spec: foo.bar.baz"));

    let err = instantiate_to_string(&Config::new(fixture("uses.rs")).keep("QWERTY.Foo"))
        .expect_err("type");
    assert_eq!(code_of(&err), DiagnosticCode::TG0202NotAType);
    assert!(format!("{err:#}").contains("QWERTY is not a type"));

    let err = instantiate_to_string(&Config::new(fixture("uses.rs")).rename("Nope", "X"))
        .expect_err("rename");
    assert_eq!(code_of(&err), DiagnosticCode::TG0101SymbolNotFound);
    assert!(format!("{err:#}").contains("name not found: Nope"));

    let err = instantiate_to_string(&Config::new(fixture("missing.rs"))).expect_err("missing");
    assert_eq!(code_of(&err), DiagnosticCode::TG0001UnitNotFound);
}

#[test]
fn instantiate_writes_to_sink() {
    let mut buf = Vec::new();
    instantiate(&Config::new(fixture("deps.rs")), &mut buf).expect("instantiate");
    let text = String::from_utf8(buf).expect("utf8");
    assert_eq!(text, run(&Config::new(fixture("deps.rs"))));
}
