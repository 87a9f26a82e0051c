use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Graph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::ir::FuncId;

/// A function in the persisted call graph, keyed by its qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub key: String,
    #[serde(rename = "pkg")]
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

impl FunctionNode {
    pub fn new(key: impl Into<String>, package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            package: package.into(),
            name: name.into(),
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = children;
        self
    }
}

impl fmt::Display for FunctionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionEdge {
    pub caller_key: String,
    pub callee_key: String,
}

impl FunctionEdge {
    pub fn new(caller_key: impl Into<String>, callee_key: impl Into<String>) -> Self {
        Self {
            caller_key: caller_key.into(),
            callee_key: callee_key.into(),
        }
    }
}

impl fmt::Display for FunctionEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.caller_key, self.callee_key)
    }
}

/// Edge weight: source line of the call site, 0 for synthetic calls.
pub type RawGraph = Graph<FuncId, usize, Directed>;

/// Call graph as produced by an algorithm, before filtering.
#[derive(Debug, Default)]
pub struct RawCallGraph {
    graph: RawGraph,
    node_map: HashMap<FuncId, NodeIndex>,
}

impl RawCallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, func: FuncId) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&func) {
            return index;
        }
        let index = self.graph.add_node(func);
        self.node_map.insert(func, index);
        index
    }

    /// Adds one edge per call; parallel edges are kept.
    pub fn add_edge(&mut self, caller: FuncId, callee: FuncId, line: usize) -> EdgeIndex {
        let from = self.add_node(caller);
        let to = self.add_node(callee);
        self.graph.add_edge(from, to, line)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, func: FuncId) -> bool {
        self.node_map.contains_key(&func)
    }

    pub fn functions(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.graph.node_weights().copied()
    }

    pub fn graph(&self) -> &RawGraph {
        &self.graph
    }

    /// Callees of `func` in edge insertion order, duplicates included.
    pub fn callees(&self, func: FuncId) -> Vec<FuncId> {
        let Some(&index) = self.node_map.get(&func) else {
            return Vec::new();
        };
        self.sorted_out_edges(index)
            .into_iter()
            .map(|(_, target)| self.graph[target])
            .collect()
    }

    fn sorted_out_edges(&self, index: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut edges: Vec<(EdgeIndex, NodeIndex)> =
            self.graph.edges(index).map(|e| (e.id(), e.target())).collect();
        edges.sort_by_key(|(id, _)| *id);
        edges
    }

    /// Depth-first post-order edge visit: nodes in insertion order, out-edges in
    /// insertion order, each callee's subtree before the edge that reaches it.
    /// The first visitor error stops the walk and is returned.
    pub fn visit_edges<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(NodeIndex, NodeIndex, FuncId, FuncId) -> Result<(), E>,
    {
        let mut seen = vec![false; self.graph.node_count()];
        // (node, out-edges, next position)
        let mut stack: Vec<(NodeIndex, Vec<(EdgeIndex, NodeIndex)>, usize)> = Vec::new();

        for root in self.graph.node_indices() {
            if seen[root.index()] {
                continue;
            }
            seen[root.index()] = true;
            stack.push((root, self.sorted_out_edges(root), 0));

            while let Some((node, edges, pos)) = stack.last_mut() {
                let Some(&(_, target)) = edges.get(*pos) else {
                    stack.pop();
                    continue;
                };
                let caller = *node;
                if seen[target.index()] {
                    *pos += 1;
                    visit(caller, target, self.graph[caller], self.graph[target])?;
                    continue;
                }
                // Descend first; the edge is visited when we come back to this frame.
                seen[target.index()] = true;
                let child_edges = self.sorted_out_edges(target);
                stack.push((target, child_edges, 0));
            }
        }
        Ok(())
    }
}
