#![allow(dead_code)]

use gocallgraph::core::{ModuleResolver, RawCallGraph};
use gocallgraph::error::Result;
use gocallgraph::ir::{Function, FunctionKind, Program, ProgramLoader, Signature};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const MODULE: &str = "example.com/m";

/// Writes a go.mod for `example.com/m` plus the given files into a fresh temp dir.
pub fn go_module(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("go.mod"),
        format!("module {MODULE}\n\ngo 1.21\n"),
    )
    .unwrap();
    for (path, source) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, source).unwrap();
    }
    dir
}

pub fn load(root: &Path) -> Result<Program> {
    let module = ModuleResolver::resolve(root)?;
    ProgramLoader::new(module).load(root)
}

pub const SHAPES_MAIN: &str = r#"package main

import "example.com/m/shapes"

func main() {
	var s shapes.Shape = shapes.NewCircle(2)
	describe(s)
}

func describe(s shapes.Shape) {
	s.Area()
}
"#;

pub const SHAPES_LIB: &str = r#"package shapes

type Shape interface {
	Area() float64
}

type Circle struct {
	r float64
}

func NewCircle(r float64) *Circle {
	return &Circle{r: r}
}

func (c *Circle) Area() float64 {
	return 3.14 * c.r * c.r
}

type Square struct {
	side float64
}

func (s Square) Area() float64 {
	return s.side * s.side
}
"#;

pub fn shapes_module() -> TempDir {
    go_module(&[("main.go", SHAPES_MAIN), ("shapes/shapes.go", SHAPES_LIB)])
}

/// Keys of the callees of `caller` in the raw graph, sorted and deduplicated.
pub fn callee_keys(program: &Program, graph: &RawCallGraph, caller: &str) -> Vec<String> {
    let Some(function) = program.function_by_key(caller) else {
        return Vec::new();
    };
    let mut keys: Vec<String> = graph
        .callees(function.id)
        .into_iter()
        .map(|id| program.function(id).key.clone())
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// A bodiless function for hand-built programs.
pub fn function(id: usize, key: &str, package: Option<&str>, kind: FunctionKind) -> Function {
    let name = key.rsplit('.').next().unwrap_or(key).to_string();
    Function {
        id,
        key: key.to_string(),
        name,
        package: package.map(str::to_string),
        kind,
        signature: Signature::default(),
        receiver: None,
        recv_type: None,
        type_params: Vec::new(),
        parent: None,
        closures: Vec::new(),
        body: None,
        imports: Arc::new(HashMap::new()),
        file: None,
        line: 0,
    }
}

pub fn program_of(functions: Vec<Function>) -> Program {
    let mut program = Program::default();
    program.module = MODULE.to_string();
    program.functions = functions;
    program
}
