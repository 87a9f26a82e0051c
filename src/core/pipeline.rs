//! Channels between the graph producer and the persistence writers.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::fmt::Display;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use super::cancel::CancellationToken;
use super::graph::{FunctionEdge, FunctionNode};
use super::progress::ProgressReporter;
use crate::error::{AnalysisError, Result, StoreResult};
use crate::storage::CallGraphStore;

const NODE_REPORT_INTERVAL: usize = 10;
const EDGE_REPORT_INTERVAL: usize = 20;

/// Builds the node and edge channels. `None` or a zero capacity makes both
/// unbounded; a rendezvous channel would block the producer until the writers start.
pub fn graph_channel(capacity: Option<usize>) -> (GraphEmitter, GraphStreams) {
    let capacity = capacity.filter(|&cap| cap > 0);
    let (node_tx, node_rx) = match capacity {
        Some(cap) => bounded(cap),
        None => unbounded(),
    };
    let (edge_tx, edge_rx) = match capacity {
        Some(cap) => bounded(cap),
        None => unbounded(),
    };
    (
        GraphEmitter {
            nodes: Some(node_tx),
            edges: Some(edge_tx),
        },
        GraphStreams {
            nodes: node_rx,
            edges: edge_rx,
        },
    )
}

/// Producer side. Dropping it closes both channels.
pub struct GraphEmitter {
    nodes: Option<Sender<FunctionNode>>,
    edges: Option<Sender<FunctionEdge>>,
}

impl GraphEmitter {
    /// An emitter that keeps nothing, for in-memory runs.
    pub fn discard() -> Self {
        Self {
            nodes: None,
            edges: None,
        }
    }

    pub fn send_node(&self, node: FunctionNode, cancel: &CancellationToken) -> Result<()> {
        match &self.nodes {
            Some(tx) => send_or_cancel(tx, node, cancel, "node"),
            None => Ok(()),
        }
    }

    pub fn send_edge(&self, edge: FunctionEdge, cancel: &CancellationToken) -> Result<()> {
        match &self.edges {
            Some(tx) => send_or_cancel(tx, edge, cancel, "edge"),
            None => Ok(()),
        }
    }
}

/// Blocks while the channel is full, but wakes up on cancellation.
fn send_or_cancel<T>(
    tx: &Sender<T>,
    item: T,
    cancel: &CancellationToken,
    what: &str,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }
    select! {
        send(tx, item) -> res => res.map_err(|_| {
            AnalysisError::Traversal(format!("{what} channel closed by its consumer"))
        }),
        recv(cancel.signal()) -> _ => Err(AnalysisError::Cancelled),
    }
}

/// Consumer side of [`graph_channel`].
pub struct GraphStreams {
    pub nodes: Receiver<FunctionNode>,
    pub edges: Receiver<FunctionEdge>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub nodes_saved: usize,
    pub edges_saved: usize,
    pub node_errors: usize,
    pub edge_errors: usize,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct WriterStats {
    saved: usize,
    failed: usize,
    cancelled: bool,
}

/// The node writer and edge writer threads.
pub struct PersistenceWriters {
    nodes: JoinHandle<WriterStats>,
    edges: JoinHandle<WriterStats>,
}

impl PersistenceWriters {
    /// Starts both writers. They drain until their channel is closed and empty,
    /// or until cancellation.
    pub fn spawn(
        store: Arc<dyn CallGraphStore>,
        streams: GraphStreams,
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<Self> {
        reporter.report("Starting to save data to database...");
        let GraphStreams { nodes, edges } = streams;

        let node_store = Arc::clone(&store);
        let node_reporter = reporter.clone();
        let node_cancel = cancel.clone();
        let nodes = thread::Builder::new()
            .name("node-writer".into())
            .spawn(move || {
                drain(nodes, &node_cancel, &node_reporter, "nodes", NODE_REPORT_INTERVAL, |node| {
                    node_store.save_func_node(node)
                })
            })?;

        let edges = thread::Builder::new()
            .name("edge-writer".into())
            .spawn(move || {
                drain(edges, &cancel, &reporter, "edges", EDGE_REPORT_INTERVAL, |edge| {
                    store.save_func_edge(edge)
                })
            })?;

        Ok(Self { nodes, edges })
    }

    pub fn join(self) -> Result<PersistStats> {
        let nodes = self
            .nodes
            .join()
            .map_err(|_| AnalysisError::WriterPanicked("node"))?;
        let edges = self
            .edges
            .join()
            .map_err(|_| AnalysisError::WriterPanicked("edge"))?;
        Ok(PersistStats {
            nodes_saved: nodes.saved,
            edges_saved: edges.saved,
            node_errors: nodes.failed,
            edge_errors: edges.failed,
            cancelled: nodes.cancelled || edges.cancelled,
        })
    }
}

fn drain<T, F>(
    rx: Receiver<T>,
    cancel: &CancellationToken,
    reporter: &ProgressReporter,
    what: &str,
    interval: usize,
    mut save: F,
) -> WriterStats
where
    T: Display,
    F: FnMut(&T) -> StoreResult<()>,
{
    let mut stats = WriterStats::default();
    loop {
        select! {
            recv(rx) -> msg => {
                let Ok(item) = msg else { break };
                match save(&item) {
                    Ok(()) => {
                        stats.saved += 1;
                        debug!(item = %item, "saved");
                        if stats.saved % interval == 0 {
                            reporter.report(format!("Saved {} {what}", stats.saved));
                        }
                    }
                    Err(err) => {
                        stats.failed += 1;
                        warn!(item = %item, error = %err, "failed to save {what}");
                    }
                }
            }
            recv(cancel.signal()) -> _ => {
                stats.cancelled = true;
                break;
            }
        }
    }
    stats
}
