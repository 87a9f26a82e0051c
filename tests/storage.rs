use gocallgraph::core::{FunctionEdge, FunctionNode};
use gocallgraph::storage::{CallGraphStore, MemoryStore, SqliteStore};

fn node(key: &str, package: &str, name: &str) -> FunctionNode {
    FunctionNode::new(key, package, name)
}

fn keys(nodes: &[FunctionNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.key.as_str()).collect()
}

fn seed(store: &dyn CallGraphStore) {
    store.init_table().unwrap();
    store
        .save_func_node(&node("example.com/m.main", "example.com/m", "main"))
        .unwrap();
    store
        .save_func_node(&node(
            "example.com/m/http.Handler",
            "example.com/m/http",
            "Handler",
        ))
        .unwrap();
    store
        .save_func_node(&node("example.com/m/db.Open", "example.com/m/db", "Open"))
        .unwrap();
    store
        .save_func_edge(&FunctionEdge::new("example.com/m.main", "example.com/m/http.Handler"))
        .unwrap();
    store
        .save_func_edge(&FunctionEdge::new("example.com/m.main", "example.com/m/http.Handler"))
        .unwrap();
    store
        .save_func_edge(&FunctionEdge::new("example.com/m/http.Handler", "example.com/m/db.Open"))
        .unwrap();
}

fn exercise(store: &dyn CallGraphStore) {
    seed(store);

    // Upsert: same key, new name, still one row.
    store.init_table().unwrap();
    store
        .save_func_node(&node("example.com/m/db.Open", "example.com/m/db", "OpenDB"))
        .unwrap();
    let all = store.get_all_func_nodes().unwrap();
    assert_eq!(
        keys(&all),
        vec![
            "example.com/m.main",
            "example.com/m/db.Open",
            "example.com/m/http.Handler"
        ]
    );
    let open = all.iter().find(|n| n.key == "example.com/m/db.Open").unwrap();
    assert_eq!(open.name, "OpenDB");

    // Edges are append-only, duplicates included.
    let edges = store.get_all_func_edges().unwrap();
    assert_eq!(edges.len(), 3);
    assert_eq!(edges[0], edges[1]);

    let handler = store
        .get_func_node_by_key("example.com/m/http.Handler")
        .unwrap()
        .unwrap();
    assert_eq!(handler.package, "example.com/m/http");
    assert_eq!(
        handler.parents,
        vec!["example.com/m.main", "example.com/m.main"]
    );
    assert_eq!(handler.children, vec!["example.com/m/db.Open"]);
    assert!(store.get_func_node_by_key("example.com/m.nope").unwrap().is_none());

    let callees = store.get_callee_edges("example.com/m.main").unwrap();
    assert_eq!(
        keys(&callees),
        vec!["example.com/m/http.Handler", "example.com/m/http.Handler"]
    );
    let callers = store.get_caller_edges("example.com/m/db.Open").unwrap();
    assert_eq!(keys(&callers), vec!["example.com/m/http.Handler"]);
    assert!(store.get_caller_edges("example.com/m.main").unwrap().is_empty());

    // Case-insensitive over name and package, ordered by key, limited.
    let hits = store.search_func_nodes("HANDLER", 10).unwrap();
    assert_eq!(keys(&hits), vec!["example.com/m/http.Handler"]);
    let hits = store.search_func_nodes("example.com/m", 2).unwrap();
    assert_eq!(
        keys(&hits),
        vec!["example.com/m.main", "example.com/m/db.Open"]
    );
    assert!(store.search_func_nodes("zzz", 10).unwrap().is_empty());
}

#[test]
fn memory_store_round_trip() {
    let store = MemoryStore::new();
    exercise(&store);
    assert_eq!(store.node_count(), 3);
    assert_eq!(store.edge_count(), 3);
}

#[test]
fn sqlite_store_round_trip() {
    let store = SqliteStore::open_in_memory().unwrap();
    exercise(&store);
}

#[test]
fn sqlite_store_persists_across_connections() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("callgraph.db");
    {
        let store = SqliteStore::open(&path).unwrap();
        seed(&store);
    }
    let store = SqliteStore::open(&path).unwrap();
    store.init_table().unwrap();
    assert_eq!(store.get_all_func_nodes().unwrap().len(), 3);
    assert_eq!(store.get_all_func_edges().unwrap().len(), 3);
}

#[test]
fn like_wildcards_in_queries_are_literal() {
    let store = SqliteStore::open_in_memory().unwrap();
    seed(&store);
    assert!(store.search_func_nodes("%", 10).unwrap().is_empty());
    assert!(store.search_func_nodes("_", 10).unwrap().is_empty());
}

#[test]
fn edges_to_unknown_nodes_are_skipped_on_lookup() {
    for store in [
        Box::new(MemoryStore::new()) as Box<dyn CallGraphStore>,
        Box::new(SqliteStore::open_in_memory().unwrap()),
    ] {
        seed(store.as_ref());
        store
            .save_func_edge(&FunctionEdge::new("example.com/m.main", "example.com/m.ghost"))
            .unwrap();
        let callees = store.get_callee_edges("example.com/m.main").unwrap();
        assert_eq!(callees.len(), 2);
        // The raw edge is still there.
        assert_eq!(store.get_all_func_edges().unwrap().len(), 4);
    }
}
