mod common;

use common::{go_module, shapes_module};
use gocallgraph::core::{CallGraphAnalyzer, CancellationToken, ProgressReporter};
use gocallgraph::storage::{CallGraphStore, MemoryStore, SqliteStore};
use gocallgraph::{Algorithm, AnalysisConfig, AnalysisError};
use std::collections::BTreeSet;
use std::sync::Arc;

fn edge_set(store: &dyn CallGraphStore) -> BTreeSet<String> {
    store
        .get_all_func_edges()
        .unwrap()
        .iter()
        .map(|e| e.to_string())
        .collect()
}

#[test]
fn analyzer_end_to_end_into_memory_store() {
    let dir = shapes_module();
    let (tx, rx) = crossbeam_channel::unbounded();
    let analyzer = CallGraphAnalyzer::new(AnalysisConfig::new(dir.path(), Algorithm::Vta))
        .with_reporter(ProgressReporter::new(tx));

    let store = Arc::new(MemoryStore::new());
    let summary = analyzer
        .build_and_persist(Arc::clone(&store) as Arc<dyn CallGraphStore>)
        .unwrap();

    let expected: BTreeSet<String> = [
        "example.com/m.main -> example.com/m/shapes.NewCircle",
        "example.com/m.main -> example.com/m.describe",
        "example.com/m.describe -> (*example.com/m/shapes.Circle).Area",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    assert_eq!(edge_set(store.as_ref()), expected);
    assert_eq!(summary.persisted.edges_saved, 3);
    assert_eq!(summary.persisted.nodes_saved, 4);
    assert_eq!(summary.graph.node_count(), 4);
    assert_eq!(store.node_count(), 4);

    let progress = analyzer.progress().progress();
    assert!(progress > 0.0 && progress <= 1.0);

    let messages: Vec<String> = rx
        .try_iter()
        .map(|m| String::from_utf8(m).unwrap())
        .collect();
    assert!(messages
        .iter()
        .any(|m| m == "Starting to build call graph, using algorithm: vta"));
    assert_eq!(messages.last().map(String::as_str), Some("Data saving completed"));
}

#[test]
fn analyzer_persists_into_sqlite() {
    let dir = shapes_module();
    let db = dir.path().join("callgraph.db");
    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let analyzer = CallGraphAnalyzer::new(AnalysisConfig::new(dir.path(), Algorithm::Cha));
    analyzer
        .build_and_persist(Arc::clone(&store) as Arc<dyn CallGraphStore>)
        .unwrap();

    let describe = store
        .get_func_node_by_key("example.com/m.describe")
        .unwrap()
        .unwrap();
    let mut children = describe.children.clone();
    children.sort();
    assert_eq!(
        children,
        vec![
            "(*example.com/m/shapes.Circle).Area",
            "(example.com/m/shapes.Square).Area"
        ]
    );
    assert_eq!(describe.parents, vec!["example.com/m.main"]);
}

#[test]
fn ignore_prefixes_drop_matching_edges() {
    let dir = shapes_module();
    let config = AnalysisConfig::new(dir.path(), Algorithm::Vta)
        .with_ignore_paths(vec!["example.com/m/shapes".to_string()]);
    let graph = CallGraphAnalyzer::new(config).build().unwrap();

    let edges: BTreeSet<String> = graph.edges().iter().map(|e| e.to_string()).collect();
    // Method keys start with "(" and are not matched by a package prefix.
    assert!(!edges.contains("example.com/m.main -> example.com/m/shapes.NewCircle"));
    assert!(edges.contains("example.com/m.describe -> (*example.com/m/shapes.Circle).Area"));
    assert_eq!(edges.len(), 2);
}

#[test]
fn load_errors_abort_before_touching_the_store() {
    let dir = go_module(&[("main.go", "package main\n\nfunc main() {\n\tundefinedCall(\n}\n")]);
    let store = Arc::new(MemoryStore::new());
    let err = CallGraphAnalyzer::new(AnalysisConfig::new(dir.path(), Algorithm::Static))
        .build_and_persist(Arc::clone(&store) as Arc<dyn CallGraphStore>)
        .unwrap_err();

    assert!(matches!(err, AnalysisError::PackageLoad { .. }));
    assert_eq!(store.node_count(), 0);
}

#[test]
fn cancelled_analysis_returns_cancelled() {
    let dir = shapes_module();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let analyzer = CallGraphAnalyzer::new(AnalysisConfig::new(dir.path(), Algorithm::Static))
        .with_cancellation(cancel);

    let err = analyzer
        .build_and_persist(Arc::new(MemoryStore::new()))
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled));
}

#[test]
fn config_from_selectors_validates_algorithm() {
    let config = AnalysisConfig::from_selectors(".", "rta", " a, ,b ").unwrap();
    assert_eq!(config.algorithm, Algorithm::Rta);
    assert_eq!(config.ignore_paths, vec!["a", "b"]);
    assert!(AnalysisConfig::from_selectors(".", "andersen", "").is_err());
}
