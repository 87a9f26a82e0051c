mod common;

use common::{function, program_of};
use gocallgraph::core::{
    graph_channel, CancellationToken, EdgeFilter, GraphEmitter, GraphMaterializer,
    PersistenceWriters, ProgressReporter, ProgressTracker, RawCallGraph,
};
use gocallgraph::ir::{FunctionKind, Program, Synthetic};
use gocallgraph::storage::{CallGraphStore, MemoryStore};
use gocallgraph::AnalysisError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MAIN: usize = 0;
const A: usize = 1;
const B: usize = 2;
const PRINTLN: usize = 3;
const INIT: usize = 4;
const BOUND: usize = 5;

fn small_program() -> Program {
    program_of(vec![
        function(MAIN, "example.com/m.main", Some("example.com/m"), FunctionKind::Function),
        function(A, "example.com/m.a", Some("example.com/m"), FunctionKind::Function),
        function(B, "example.com/m.b", Some("example.com/m"), FunctionKind::Function),
        function(PRINTLN, "fmt.Println", Some("fmt"), FunctionKind::External),
        function(
            INIT,
            "example.com/m.init",
            Some("example.com/m"),
            FunctionKind::Synthetic(Synthetic::PackageInitializer),
        ),
        function(
            BOUND,
            "(example.com/m.T).M$bound",
            None,
            FunctionKind::Synthetic(Synthetic::BoundMethod),
        ),
    ])
}

fn small_graph() -> RawCallGraph {
    let mut graph = RawCallGraph::new();
    graph.add_edge(MAIN, A, 3);
    graph.add_edge(MAIN, A, 4);
    graph.add_edge(MAIN, BOUND, 5);
    graph.add_edge(A, B, 8);
    graph.add_edge(B, PRINTLN, 12);
    graph.add_edge(BOUND, B, 0);
    graph.add_node(INIT);
    graph
}

fn fan_out(count: usize) -> (Program, RawCallGraph) {
    let mut functions = vec![function(
        0,
        "example.com/m.main",
        Some("example.com/m"),
        FunctionKind::Function,
    )];
    let mut graph = RawCallGraph::new();
    for i in 1..=count {
        functions.push(function(
            i,
            &format!("example.com/m.f{i}"),
            Some("example.com/m"),
            FunctionKind::Function,
        ));
        graph.add_edge(0, i, i);
    }
    (program_of(functions), graph)
}

fn filter() -> EdgeFilter {
    EdgeFilter::new("example.com/m", Vec::new())
}

#[test]
fn edges_are_filtered_and_kept_with_multiplicity() {
    let program = small_program();
    let filter = filter();
    let graph = GraphMaterializer::new(&program, &filter, "static")
        .run(&small_graph(), GraphEmitter::discard())
        .unwrap();

    let edges: Vec<String> = graph.edges().iter().map(|e| e.to_string()).collect();
    assert_eq!(
        edges,
        vec![
            "example.com/m.a -> example.com/m.b",
            "example.com/m.main -> example.com/m.a",
            "example.com/m.main -> example.com/m.a",
        ]
    );

    let keys: Vec<&str> = graph.nodes().iter().map(|n| n.key.as_str()).collect();
    assert_eq!(keys, vec!["example.com/m.a", "example.com/m.b", "example.com/m.main"]);

    let main = graph.node("example.com/m.main").unwrap();
    assert_eq!(main.children, vec!["example.com/m.a", "example.com/m.a"]);
    let a = graph.node("example.com/m.a").unwrap();
    assert_eq!(a.parents, vec!["example.com/m.main", "example.com/m.main"]);
    assert_eq!(a.children, vec!["example.com/m.b"]);
    assert_eq!(a.package, "example.com/m");
    assert!(graph.node("fmt.Println").is_none());
}

#[test]
fn nodes_are_streamed_once_before_their_edges() {
    let program = small_program();
    let filter = filter();
    let (emitter, streams) = graph_channel(None);
    GraphMaterializer::new(&program, &filter, "static")
        .run(&small_graph(), emitter)
        .unwrap();

    let nodes: Vec<_> = streams.nodes.iter().collect();
    let edges: Vec<_> = streams.edges.iter().collect();
    assert_eq!(nodes.len(), 3);
    assert_eq!(edges.len(), 3);
    // Streamed nodes carry no adjacency; stores rebuild it from edges.
    assert!(nodes.iter().all(|n| n.parents.is_empty() && n.children.is_empty()));
}

#[test]
fn progress_counts_distinct_callers() {
    let program = small_program();
    let filter = filter();
    let tracker = Arc::new(ProgressTracker::new());
    GraphMaterializer::new(&program, &filter, "static")
        .with_progress(Arc::clone(&tracker))
        .run(&small_graph(), GraphEmitter::discard())
        .unwrap();

    assert_eq!(tracker.total(), 6);
    // b, a, main and the bound wrapper have outgoing edges.
    assert_eq!(tracker.visited(), 4);
    let progress = tracker.progress();
    assert!((0.0..=1.0).contains(&progress));
    assert!((progress - 4.0 / 6.0).abs() < 1e-9);
}

#[test]
fn reporter_sees_start_and_completion() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let (program, graph) = fan_out(25);
    let filter = filter();
    GraphMaterializer::new(&program, &filter, "cha")
        .with_reporter(ProgressReporter::new(tx))
        .run(&graph, GraphEmitter::discard())
        .unwrap();

    let messages: Vec<String> = rx
        .try_iter()
        .map(|m| String::from_utf8(m).unwrap())
        .collect();
    assert_eq!(
        messages.first().map(String::as_str),
        Some("Starting to build call graph, using algorithm: cha")
    );
    assert_eq!(
        messages.last().map(String::as_str),
        Some("Call graph build completed, processed 26 nodes, 25 edges")
    );
    assert!(messages.iter().any(|m| m.starts_with("Processed 10 nodes")));
    assert!(messages.iter().any(|m| m.ends_with(", 20 edges")));
}

#[test]
fn buffered_results_are_drained_by_late_writers() {
    let (program, graph) = fan_out(150);
    let filter = filter();
    let (emitter, streams) = graph_channel(None);
    let materialized = GraphMaterializer::new(&program, &filter, "static")
        .run(&graph, emitter)
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let writers = PersistenceWriters::spawn(
        Arc::clone(&store) as Arc<dyn CallGraphStore>,
        streams,
        ProgressReporter::disabled(),
        CancellationToken::new(),
    )
    .unwrap();
    let stats = writers.join().unwrap();

    assert_eq!(materialized.edge_count(), 150);
    assert_eq!(stats.edges_saved, 150);
    assert_eq!(stats.nodes_saved, 151);
    assert!(!stats.cancelled);
    assert_eq!(store.edge_count(), 150);
    assert_eq!(store.node_count(), 151);
}

#[test]
fn zero_capacity_buffers_everything_for_late_writers() {
    let (program, graph) = fan_out(40);
    let filter = filter();
    let (emitter, streams) = graph_channel(Some(0));
    GraphMaterializer::new(&program, &filter, "static")
        .run(&graph, emitter)
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let stats = PersistenceWriters::spawn(
        Arc::clone(&store) as Arc<dyn CallGraphStore>,
        streams,
        ProgressReporter::disabled(),
        CancellationToken::new(),
    )
    .unwrap()
    .join()
    .unwrap();

    assert_eq!(stats.edges_saved, 40);
    assert_eq!(stats.nodes_saved, 41);
    assert_eq!(store.edge_count(), 40);
}

#[test]
fn bounded_channels_apply_backpressure_without_deadlock() {
    let (program, graph) = fan_out(150);
    let filter = filter();
    let (emitter, streams) = graph_channel(Some(1));

    let store = Arc::new(MemoryStore::new());
    let writers = PersistenceWriters::spawn(
        Arc::clone(&store) as Arc<dyn CallGraphStore>,
        streams,
        ProgressReporter::disabled(),
        CancellationToken::new(),
    )
    .unwrap();
    GraphMaterializer::new(&program, &filter, "static")
        .run(&graph, emitter)
        .unwrap();
    let stats = writers.join().unwrap();

    assert_eq!(stats.edges_saved, 150);
    assert_eq!(stats.nodes_saved, 151);
    let main = store.get_func_node_by_key("example.com/m.main").unwrap().unwrap();
    assert_eq!(main.children.len(), 150);
}

#[test]
fn cancellation_unblocks_a_full_channel() {
    let (program, graph) = fan_out(50);
    let filter = filter();
    // Nobody reads these channels, so the second send blocks.
    let (emitter, streams) = graph_channel(Some(1));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        trigger.cancel();
    });

    let err = GraphMaterializer::new(&program, &filter, "static")
        .with_cancellation(cancel.clone())
        .run(&graph, emitter)
        .unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, AnalysisError::Cancelled));
    assert!(cancel.is_cancelled());
    // Both channels are closed once the buffered items are read.
    assert!(streams.nodes.iter().count() <= 1);
    assert!(streams.edges.iter().count() <= 1);
}

#[test]
fn cancelled_before_start_sends_nothing() {
    let program = small_program();
    let filter = filter();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (emitter, streams) = graph_channel(Some(4));
    let err = GraphMaterializer::new(&program, &filter, "static")
        .with_cancellation(cancel)
        .run(&small_graph(), emitter)
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Cancelled));
    assert_eq!(streams.nodes.iter().count(), 0);
    assert_eq!(streams.edges.iter().count(), 0);
}
