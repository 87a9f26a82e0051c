use anyhow::{Context, Result};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::core::MaterializedGraph;

/// JSON export of a materialized call graph with compact integer node ids.
pub struct JsonCompactFormatter {
    /// Omit per-node adjacency; edges already carry it.
    minimal: bool,
}

impl JsonCompactFormatter {
    pub fn new() -> Self {
        Self { minimal: true }
    }

    pub fn full() -> Self {
        Self { minimal: false }
    }

    pub fn format_to_file(&self, graph: &MaterializedGraph, output_path: &Path) -> Result<()> {
        let json_content = self.format_graph(graph)?;
        fs::write(output_path, json_content)
            .with_context(|| format!("writing {}", output_path.display()))?;
        Ok(())
    }

    pub fn format_graph(&self, graph: &MaterializedGraph) -> Result<String> {
        // Packages are interned, nodes refer to them by position.
        let mut package_ids: HashMap<&str, usize> = HashMap::new();
        let mut packages: Vec<&str> = Vec::new();
        let mut node_ids: HashMap<&str, usize> = HashMap::new();

        let mut nodes = Vec::with_capacity(graph.node_count());
        for (id, node) in graph.nodes().iter().enumerate() {
            node_ids.insert(node.key.as_str(), id);
            let pkg = *package_ids.entry(node.package.as_str()).or_insert_with(|| {
                packages.push(node.package.as_str());
                packages.len() - 1
            });

            let node_json = if self.minimal {
                json!({ "k": node.key, "n": node.name, "p": pkg })
            } else {
                json!({
                    "key": node.key,
                    "name": node.name,
                    "pkg": pkg,
                    "parents": node.parents,
                    "children": node.children,
                })
            };
            nodes.push(node_json);
        }

        let edges: Vec<_> = graph
            .edges()
            .iter()
            .filter_map(|edge| {
                let caller = node_ids.get(edge.caller_key.as_str())?;
                let callee = node_ids.get(edge.callee_key.as_str())?;
                Some(json!([caller, callee]))
            })
            .collect();

        let output = json!({
            "meta": {
                "nodes": graph.node_count(),
                "edges": graph.edge_count(),
                "format": if self.minimal { "compact" } else { "full" }
            },
            "packages": packages,
            "nodes": nodes,
            "edges": edges
        });

        Ok(serde_json::to_string(&output)?)
    }
}

impl Default for JsonCompactFormatter {
    fn default() -> Self {
        Self::new()
    }
}
