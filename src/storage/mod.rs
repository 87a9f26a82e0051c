//! Persistence of materialized call graphs.

pub mod memory;
pub mod sqlite;

use crate::core::graph::{FunctionEdge, FunctionNode};
use crate::error::StoreResult;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A store shared by the two writer threads; every method takes `&self`.
pub trait CallGraphStore: Send + Sync {
    fn init_table(&self) -> StoreResult<()>;

    /// Inserts the node or overwrites the stored one with the same key.
    fn save_func_node(&self, node: &FunctionNode) -> StoreResult<()>;

    /// Appends the edge; duplicates are kept.
    fn save_func_edge(&self, edge: &FunctionEdge) -> StoreResult<()>;

    /// The node with its parents and children filled in from stored edges.
    fn get_func_node_by_key(&self, key: &str) -> StoreResult<Option<FunctionNode>>;

    /// Nodes that call `callee_key`, one per stored edge.
    fn get_caller_edges(&self, callee_key: &str) -> StoreResult<Vec<FunctionNode>>;

    /// Nodes called by `caller_key`, one per stored edge.
    fn get_callee_edges(&self, caller_key: &str) -> StoreResult<Vec<FunctionNode>>;

    /// Every node, ordered by key.
    fn get_all_func_nodes(&self) -> StoreResult<Vec<FunctionNode>>;

    fn get_all_func_edges(&self) -> StoreResult<Vec<FunctionEdge>>;

    /// Case-insensitive substring search over name and package, ordered by key.
    fn search_func_nodes(&self, query: &str, limit: usize) -> StoreResult<Vec<FunctionNode>>;
}
