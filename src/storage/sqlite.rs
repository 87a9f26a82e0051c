//! SQLite-backed call graph store.
//!
//! One connection guarded by a mutex; both writer threads go through it.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{info, warn};

use super::CallGraphStore;
use crate::core::graph::{FunctionEdge, FunctionNode};
use crate::error::StoreResult;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS func_nodes (
        key         TEXT PRIMARY KEY,
        pkg         TEXT NOT NULL,
        name        TEXT NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE TABLE IF NOT EXISTS func_edges (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        caller_key  TEXT NOT NULL,
        callee_key  TEXT NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_func_nodes_pkg ON func_nodes(pkg);
    CREATE INDEX IF NOT EXISTS idx_func_edges_caller ON func_edges(caller_key);
    CREATE INDEX IF NOT EXISTS idx_func_edges_callee ON func_edges(callee_key);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        info!(path = %path.display(), "opened call graph database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn nodes_for_keys(conn: &Connection, keys: Vec<String>) -> StoreResult<Vec<FunctionNode>> {
        let mut stmt = conn.prepare_cached("SELECT key, pkg, name FROM func_nodes WHERE key = ?1")?;
        let mut nodes = Vec::with_capacity(keys.len());
        for key in keys {
            match stmt.query_row(params![key], row_to_node).optional()? {
                Some(node) => nodes.push(node),
                None => warn!(%key, "edge refers to a node that was never stored"),
            }
        }
        Ok(nodes)
    }

    fn edge_column(
        conn: &Connection,
        select: &str,
        filter: &str,
        key: &str,
    ) -> StoreResult<Vec<String>> {
        let sql = format!("SELECT {select} FROM func_edges WHERE {filter} = ?1 ORDER BY id");
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<FunctionNode> {
    Ok(FunctionNode::new(
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
    ))
}

impl CallGraphStore for SqliteStore {
    fn init_table(&self) -> StoreResult<()> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn save_func_node(&self, node: &FunctionNode) -> StoreResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO func_nodes (key, pkg, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                pkg = excluded.pkg,
                name = excluded.name,
                updated_at = datetime('now')",
        )?;
        stmt.execute(params![node.key, node.package, node.name])?;
        Ok(())
    }

    fn save_func_edge(&self, edge: &FunctionEdge) -> StoreResult<()> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("INSERT INTO func_edges (caller_key, callee_key) VALUES (?1, ?2)")?;
        stmt.execute(params![edge.caller_key, edge.callee_key])?;
        Ok(())
    }

    fn get_func_node_by_key(&self, key: &str) -> StoreResult<Option<FunctionNode>> {
        let conn = self.conn.lock();
        let node = conn
            .prepare_cached("SELECT key, pkg, name FROM func_nodes WHERE key = ?1")?
            .query_row(params![key], row_to_node)
            .optional()?;
        let Some(node) = node else {
            return Ok(None);
        };
        let parents = Self::edge_column(&conn, "caller_key", "callee_key", key)?;
        let children = Self::edge_column(&conn, "callee_key", "caller_key", key)?;
        Ok(Some(node.with_parents(parents).with_children(children)))
    }

    fn get_caller_edges(&self, callee_key: &str) -> StoreResult<Vec<FunctionNode>> {
        let conn = self.conn.lock();
        let callers = Self::edge_column(&conn, "caller_key", "callee_key", callee_key)?;
        Self::nodes_for_keys(&conn, callers)
    }

    fn get_callee_edges(&self, caller_key: &str) -> StoreResult<Vec<FunctionNode>> {
        let conn = self.conn.lock();
        let callees = Self::edge_column(&conn, "callee_key", "caller_key", caller_key)?;
        Self::nodes_for_keys(&conn, callees)
    }

    fn get_all_func_nodes(&self) -> StoreResult<Vec<FunctionNode>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT key, pkg, name FROM func_nodes ORDER BY key")?;
        let rows = stmt.query_map([], row_to_node)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_all_func_edges(&self) -> StoreResult<Vec<FunctionEdge>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT caller_key, callee_key FROM func_edges ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(FunctionEdge::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn search_func_nodes(&self, query: &str, limit: usize) -> StoreResult<Vec<FunctionNode>> {
        let conn = self.conn.lock();
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let mut stmt = conn.prepare_cached(
            "SELECT key, pkg, name FROM func_nodes
             WHERE lower(name) LIKE ?1 ESCAPE '\\' OR lower(pkg) LIKE ?1 ESCAPE '\\'
             ORDER BY key
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![pattern, limit], row_to_node)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
