use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::warn;

use super::CallGraphStore;
use crate::core::graph::{FunctionEdge, FunctionNode};
use crate::error::StoreResult;

/// In-process store, mainly for tests and one-shot exports.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: DashMap<String, FunctionNode>,
    edges: Mutex<Vec<FunctionEdge>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.lock().len()
    }

    fn lookup(&self, key: &str) -> Option<FunctionNode> {
        self.nodes.get(key).map(|entry| entry.value().clone())
    }

    fn resolve_all<'k>(&self, keys: impl Iterator<Item = &'k String>) -> Vec<FunctionNode> {
        keys.filter_map(|key| {
            let node = self.lookup(key);
            if node.is_none() {
                warn!(%key, "edge refers to a node that was never stored");
            }
            node
        })
        .collect()
    }
}

impl CallGraphStore for MemoryStore {
    fn init_table(&self) -> StoreResult<()> {
        Ok(())
    }

    fn save_func_node(&self, node: &FunctionNode) -> StoreResult<()> {
        self.nodes.insert(node.key.clone(), node.clone());
        Ok(())
    }

    fn save_func_edge(&self, edge: &FunctionEdge) -> StoreResult<()> {
        self.edges.lock().push(edge.clone());
        Ok(())
    }

    fn get_func_node_by_key(&self, key: &str) -> StoreResult<Option<FunctionNode>> {
        let Some(node) = self.lookup(key) else {
            return Ok(None);
        };
        let edges = self.edges.lock();
        let parents = edges
            .iter()
            .filter(|e| e.callee_key == key)
            .map(|e| e.caller_key.clone())
            .collect();
        let children = edges
            .iter()
            .filter(|e| e.caller_key == key)
            .map(|e| e.callee_key.clone())
            .collect();
        Ok(Some(node.with_parents(parents).with_children(children)))
    }

    fn get_caller_edges(&self, callee_key: &str) -> StoreResult<Vec<FunctionNode>> {
        let callers: Vec<String> = self
            .edges
            .lock()
            .iter()
            .filter(|e| e.callee_key == callee_key)
            .map(|e| e.caller_key.clone())
            .collect();
        Ok(self.resolve_all(callers.iter()))
    }

    fn get_callee_edges(&self, caller_key: &str) -> StoreResult<Vec<FunctionNode>> {
        let callees: Vec<String> = self
            .edges
            .lock()
            .iter()
            .filter(|e| e.caller_key == caller_key)
            .map(|e| e.callee_key.clone())
            .collect();
        Ok(self.resolve_all(callees.iter()))
    }

    fn get_all_func_nodes(&self) -> StoreResult<Vec<FunctionNode>> {
        let mut nodes: Vec<FunctionNode> =
            self.nodes.iter().map(|entry| entry.value().clone()).collect();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(nodes)
    }

    fn get_all_func_edges(&self) -> StoreResult<Vec<FunctionEdge>> {
        Ok(self.edges.lock().clone())
    }

    fn search_func_nodes(&self, query: &str, limit: usize) -> StoreResult<Vec<FunctionNode>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<FunctionNode> = self
            .nodes
            .iter()
            .filter(|entry| {
                let node = entry.value();
                node.name.to_lowercase().contains(&needle)
                    || node.package.to_lowercase().contains(&needle)
            })
            .map(|entry| entry.value().clone())
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        hits.truncate(limit);
        Ok(hits)
    }
}
