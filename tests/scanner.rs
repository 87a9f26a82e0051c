use gocallgraph::core::{ModuleResolver, PackageScanner};
use gocallgraph::parsers::BuildContext;
use std::fs;
use std::path::Path;

fn write<P: AsRef<Path>>(p: P, source: &str) {
    let p = p.as_ref();
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(p, source).unwrap();
}

#[test]
fn scanner_groups_files_into_packages() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("go.mod"), "module example.com/m\n");
    write(root.join("main.go"), "package main\n");
    write(root.join("svc/a.go"), "package svc\n");
    write(root.join("svc/b.go"), "package svc\n");
    write(root.join("svc/a_test.go"), "package svc\n");
    write(root.join("svc/testdata/x.go"), "package x\n");
    write(root.join(".hidden/h.go"), "package hidden\n");
    write(root.join("_build/b.go"), "package build\n");
    write(root.join("nested/go.mod"), "module example.com/nested\n");
    write(root.join("nested/n.go"), "package nested\n");
    write(root.join("vendor/github.com/acme/lib/lib.go"), "package lib\n");

    let module = ModuleResolver::resolve(root).unwrap();
    let packages = PackageScanner::new(&module)
        .scan(&module.root)
        .unwrap();

    let paths: Vec<&str> = packages.iter().map(|p| p.import_path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["example.com/m", "example.com/m/svc", "github.com/acme/lib"]
    );
    let svc = &packages[1];
    assert_eq!(svc.name, "svc");
    assert_eq!(svc.files.len(), 2);
    assert!(packages[2].vendored);
}

#[test]
fn build_constraints_select_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root.join("go.mod"), "module example.com/m\n");
    write(root.join("p/common.go"), "package p\n");
    write(root.join("p/impl_linux.go"), "package p\n");
    write(root.join("p/impl_windows.go"), "package p\n");
    write(root.join("p/tagged.go"), "//go:build ignore\n\npackage p\n");
    write(root.join("p/unix.go"), "//go:build linux || darwin\n\npackage p\n");

    let module = ModuleResolver::resolve(root).unwrap();
    let packages = PackageScanner::new(&module)
        .with_build_context(BuildContext::new("linux", "amd64"))
        .scan(&module.root)
        .unwrap();

    assert_eq!(packages.len(), 1);
    let names: Vec<String> = packages[0]
        .files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["common.go", "impl_linux.go", "unix.go"]);
}
