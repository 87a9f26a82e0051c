mod common;

use common::{go_module, load, shapes_module};
use gocallgraph::core::ModuleResolver;
use gocallgraph::ir::{FunctionKind, Synthetic};
use gocallgraph::{AnalysisError, Diagnostic};
use std::fs;

fn diagnostics_of(err: AnalysisError) -> Vec<Diagnostic> {
    match err {
        AnalysisError::PackageLoad { diagnostics } => diagnostics,
        other => panic!("expected a package load error, got {other}"),
    }
}

#[test]
fn module_is_found_from_a_nested_directory() {
    let dir = shapes_module();
    let module = ModuleResolver::resolve(&dir.path().join("shapes")).unwrap();
    assert_eq!(module.path, "example.com/m");
    assert_eq!(module.root, dir.path().canonicalize().unwrap());
}

#[test]
fn missing_go_mod_is_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("orphan")).unwrap();
    // The temp dir may itself live under a module; only check when it does not.
    if let Err(err) = ModuleResolver::resolve(&dir.path().join("orphan")) {
        assert!(matches!(err, AnalysisError::ModuleNotFound { .. }));
    }
    let err = ModuleResolver::resolve(&dir.path().join("does-not-exist")).unwrap_err();
    assert!(matches!(err, AnalysisError::ModuleNotFound { .. }));
}

#[test]
fn function_keys_follow_go_naming() {
    let dir = shapes_module();
    let program = load(dir.path()).unwrap();

    assert_eq!(program.module, "example.com/m");
    let main = program.function_by_key("example.com/m.main").unwrap();
    assert_eq!(main.package.as_deref(), Some("example.com/m"));
    assert_eq!(main.kind, FunctionKind::Function);

    let area = program
        .function_by_key("(*example.com/m/shapes.Circle).Area")
        .unwrap();
    assert_eq!(area.kind, FunctionKind::Method);
    assert_eq!(area.name, "(*Circle).Area");
    assert!(program
        .function_by_key("(example.com/m/shapes.Square).Area")
        .is_some());

    let init = program.function_by_key("example.com/m/shapes.init").unwrap();
    assert_eq!(
        init.kind,
        FunctionKind::Synthetic(Synthetic::PackageInitializer)
    );
    assert_eq!(init.package.as_deref(), Some("example.com/m/shapes"));
}

#[test]
fn closures_and_inits_are_numbered() {
    let dir = go_module(&[(
        "main.go",
        r#"package main

import "fmt"

var handler = func() {
	fmt.Println("handled")
}

func init() {}

func init() {}

func main() {
	f := func() {
		helper()
	}
	f()
	g := func() {}
	g()
	handler()
}

func helper() {}
"#,
    )]);
    let program = load(dir.path()).unwrap();

    for key in [
        "example.com/m.main$1",
        "example.com/m.main$2",
        "example.com/m.init#1",
        "example.com/m.init#2",
        "example.com/m.init$1",
    ] {
        assert!(program.function_by_key(key).is_some(), "missing {key}");
    }

    let closure = program.function_by_key("example.com/m.main$1").unwrap();
    assert_eq!(closure.kind, FunctionKind::Closure);
    let main = program.function_by_key("example.com/m.main").unwrap();
    assert_eq!(closure.parent, Some(main.id));

    let println = program.function_by_key("fmt.Println").unwrap();
    assert_eq!(println.kind, FunctionKind::External);
    assert_eq!(println.package.as_deref(), Some("fmt"));
    assert!(println.body.is_none());
}

#[test]
fn test_files_and_testdata_are_skipped() {
    let dir = go_module(&[
        ("main.go", "package main\n\nfunc main() {}\n"),
        ("main_test.go", "package main\n\nfunc helperForTests() {}\n"),
        ("testdata/fixture.go", "package fixture\n\nfunc Broken( {\n"),
    ]);
    let program = load(dir.path()).unwrap();
    assert_eq!(program.packages.len(), 1);
    assert!(program
        .function_by_key("example.com/m.helperForTests")
        .is_none());
}

#[test]
fn unresolvable_internal_import_is_a_load_error() {
    let dir = go_module(&[(
        "main.go",
        "package main\n\nimport \"example.com/m/missing\"\n\nfunc main() {\n\tmissing.Run()\n}\n",
    )]);
    let diagnostics = diagnostics_of(load(dir.path()).unwrap_err());
    assert!(diagnostics
        .iter()
        .any(|d| d.message.contains("could not import example.com/m/missing")));
}

#[test]
fn undefined_package_member_is_a_load_error() {
    let dir = shapes_module();
    fs::write(
        dir.path().join("main.go"),
        "package main\n\nimport \"example.com/m/shapes\"\n\nfunc main() {\n\tshapes.Nope()\n}\n",
    )
    .unwrap();
    let diagnostics = diagnostics_of(load(dir.path()).unwrap_err());
    assert!(diagnostics
        .iter()
        .any(|d| d.message == "undefined: shapes.Nope"));
}

#[test]
fn syntax_errors_are_collected() {
    let dir = go_module(&[("main.go", "package main\n\nfunc main( {\n")]);
    let diagnostics = diagnostics_of(load(dir.path()).unwrap_err());
    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().any(|d| d.message == "syntax error"));
}

#[test]
fn mixed_package_clauses_are_rejected() {
    let dir = go_module(&[
        ("util/a.go", "package util\n\nfunc A() {}\n"),
        ("util/b.go", "package other\n\nfunc B() {}\n"),
    ]);
    let err = load(dir.path()).unwrap_err();
    assert!(err.to_string().contains("package loading failed"));
    let diagnostics = diagnostics_of(err);
    assert!(diagnostics
        .iter()
        .any(|d| d.message.starts_with("found packages util (a.go) and other (b.go)")));
}

fn load_main(source: &str) -> Vec<Diagnostic> {
    let dir = go_module(&[("main.go", source)]);
    diagnostics_of(load(dir.path()).unwrap_err())
}

#[test]
fn undefined_function_is_a_load_error() {
    let diagnostics = load_main("package main\n\nfunc main() {\n\tundefinedFn()\n}\n");
    assert!(diagnostics.iter().any(|d| d.message == "undefined: undefinedFn"));
    assert_eq!(diagnostics[0].line, 4);
}

#[test]
fn undefined_variable_is_a_load_error() {
    let diagnostics = load_main("package main\n\nfunc main() {\n\tx := y + 1\n\tprintln(x)\n}\n");
    assert!(diagnostics.iter().any(|d| d.message == "undefined: y"));
}

#[test]
fn undefined_type_is_a_load_error() {
    let diagnostics = load_main("package main\n\nfunc main() {\n\tvar t NoSuchType\n\t_ = t\n}\n");
    assert!(diagnostics.iter().any(|d| d.message == "undefined: NoSuchType"));
}

#[test]
fn missing_method_is_a_load_error() {
    let diagnostics = load_main(
        "package main\n\ntype T struct{}\n\nfunc main() {\n\tvar t T\n\tt.Missing()\n}\n",
    );
    assert!(diagnostics
        .iter()
        .any(|d| d.message.contains("has no field or method Missing")));
}

#[test]
fn unused_import_is_a_load_error() {
    let diagnostics = load_main("package main\n\nimport \"fmt\"\n\nfunc main() {}\n");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "\"fmt\" imported and not used");
    assert_eq!(diagnostics[0].line, 3);
}

#[test]
fn local_declarations_are_not_undefined() {
    let dir = go_module(&[(
        "main.go",
        r#"package main

import "fmt"

type box[T any] struct {
	value T
}

func first[T any](xs []T) T {
	var zero T
	if len(xs) == 0 {
		return zero
	}
	return xs[0]
}

func main() {
	const limit, label = 3, "n"
	type point struct{ x, y int }
	p := point{x: 1, y: limit}
	q := box[string]{value: label}
	fmt.Println(first([]int{p.x, p.y}), q.value)
}
"#,
    )]);
    let program = load(dir.path()).unwrap();
    assert!(program.function_by_key("example.com/m.first").is_some());
}
