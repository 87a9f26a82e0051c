use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gocallgraph::callgraph::CallGraphBuilder;
use gocallgraph::core::{CallGraphAnalyzer, ModuleResolver};
use gocallgraph::ir::ProgramLoader;
use gocallgraph::storage::{CallGraphStore, SqliteStore};
use gocallgraph::{Algorithm, AnalysisConfig};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A module with `packages` packages, each with a small interface hierarchy.
fn generate_module(packages: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::write(root.join("go.mod"), "module example.com/bench\n\ngo 1.21\n").unwrap();

    let mut imports = String::new();
    let mut calls = String::new();
    for i in 0..packages {
        let pkg_dir = root.join(format!("pkg{i}"));
        std::fs::create_dir_all(&pkg_dir).unwrap();
        let content = format!(
            r#"package pkg{i}

type Worker interface {{
	Work(n int) int
}}

type fast struct {{
	scale int
}}

func (f *fast) Work(n int) int {{
	return helper(n) * f.scale
}}

type slow struct{{}}

func (s slow) Work(n int) int {{
	total := 0
	for j := 0; j < n; j++ {{
		total += helper(j)
	}}
	return total
}}

func helper(n int) int {{
	return n + {i}
}}

func New(quick bool) Worker {{
	if quick {{
		return &fast{{scale: 2}}
	}}
	return slow{{}}
}}

func Run(n int) int {{
	w := New(n%2 == 0)
	apply := func(x int) int {{
		return w.Work(x)
	}}
	return apply(n)
}}
"#
        );
        std::fs::write(pkg_dir.join("worker.go"), content).unwrap();
        imports.push_str(&format!("\t\"example.com/bench/pkg{i}\"\n"));
        calls.push_str(&format!("\tpkg{i}.Run({i})\n"));
    }

    let main = format!("package main\n\nimport (\n{imports})\n\nfunc main() {{\n{calls}}}\n");
    std::fs::write(root.join("main.go"), main).unwrap();
    dir
}

fn benchmark_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("call_graph_algorithms");

    let module_dir = generate_module(40);
    let module = ModuleResolver::resolve(module_dir.path()).unwrap();
    let program = ProgramLoader::new(module).load(module_dir.path()).unwrap();

    for algorithm in [Algorithm::Static, Algorithm::Cha, Algorithm::Rta, Algorithm::Vta] {
        group.bench_function(algorithm.as_str(), |b| {
            b.iter(|| {
                let graph = CallGraphBuilder::new(algorithm).build(black_box(&program));
                black_box(graph)
            });
        });
    }

    group.finish();
}

fn benchmark_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    let module_dir = generate_module(40);
    let root: &Path = module_dir.path();

    group.bench_function("load_and_materialize", |b| {
        b.iter(|| {
            let analyzer = CallGraphAnalyzer::new(AnalysisConfig::new(root, Algorithm::Vta));
            black_box(analyzer.build())
        });
    });

    group.bench_function("persist_sqlite_in_memory", |b| {
        b.iter(|| {
            let store: Arc<dyn CallGraphStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
            let analyzer = CallGraphAnalyzer::new(AnalysisConfig::new(root, Algorithm::Cha));
            black_box(analyzer.build_and_persist(store))
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_algorithms, benchmark_pipeline);
criterion_main!(benches);
