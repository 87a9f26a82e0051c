mod common;

use common::shapes_module;
use gocallgraph::core::CallGraphAnalyzer;
use gocallgraph::formatters::JsonCompactFormatter;
use gocallgraph::{Algorithm, AnalysisConfig};
use serde_json::Value;

#[test]
fn json_compact_formatter_outputs_valid_json() {
    let dir = shapes_module();
    let graph = CallGraphAnalyzer::new(AnalysisConfig::new(dir.path(), Algorithm::Rta))
        .build()
        .unwrap();

    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path().with_extension("json");
    JsonCompactFormatter::new()
        .format_to_file(&graph, &path)
        .unwrap();

    let data = std::fs::read_to_string(&path).unwrap();
    let v: Value = serde_json::from_str(&data).unwrap();

    assert_eq!(v["meta"]["nodes"].as_u64().unwrap() as usize, 4);
    assert_eq!(v["meta"]["edges"].as_u64().unwrap() as usize, 3);
    assert_eq!(v["meta"]["format"], "compact");
    assert_eq!(v["packages"].as_array().unwrap().len(), 2);
    assert!(v["nodes"].is_array());

    // Edges are [caller_index, callee_index] into the node list.
    let nodes = v["nodes"].as_array().unwrap();
    for edge in v["edges"].as_array().unwrap() {
        let caller = edge[0].as_u64().unwrap() as usize;
        let callee = edge[1].as_u64().unwrap() as usize;
        assert!(caller < nodes.len() && callee < nodes.len());
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn full_format_includes_adjacency() {
    let dir = shapes_module();
    let graph = CallGraphAnalyzer::new(AnalysisConfig::new(dir.path(), Algorithm::Rta))
        .build()
        .unwrap();

    let json = JsonCompactFormatter::full().format_graph(&graph).unwrap();
    let v: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v["meta"]["format"], "full");

    let describe = v["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["key"] == "example.com/m.describe")
        .unwrap();
    assert_eq!(describe["children"][0], "(*example.com/m/shapes.Circle).Area");
    assert_eq!(describe["parents"][0], "example.com/m.main");
}
