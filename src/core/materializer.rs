use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::cancel::CancellationToken;
use super::filter::EdgeFilter;
use super::graph::{FunctionEdge, FunctionNode, RawCallGraph};
use super::pipeline::GraphEmitter;
use super::progress::{ProgressReporter, ProgressTracker};
use crate::error::{AnalysisError, Result};
use crate::ir::{Function, Program};

const NODE_REPORT_INTERVAL: usize = 10;
const EDGE_REPORT_INTERVAL: usize = 20;

/// The filtered call graph held in memory after a traversal.
#[derive(Debug, Clone, Default)]
pub struct MaterializedGraph {
    nodes: Vec<FunctionNode>,
    index: HashMap<String, usize>,
    edges: Vec<FunctionEdge>,
}

impl MaterializedGraph {
    /// Nodes in discovery order.
    pub fn nodes(&self) -> &[FunctionNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[FunctionEdge] {
        &self.edges
    }

    pub fn node(&self, key: &str) -> Option<&FunctionNode> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Index of the node for `function`, creating it on first sight.
    fn ensure_node(&mut self, function: &Function) -> (usize, bool) {
        if let Some(&i) = self.index.get(&function.key) {
            return (i, false);
        }
        let node = FunctionNode::new(
            function.key.clone(),
            function.package.clone().unwrap_or_default(),
            function.name.clone(),
        );
        let i = self.nodes.len();
        self.index.insert(node.key.clone(), i);
        self.nodes.push(node);
        (i, true)
    }
}

/// Walks a raw call graph, keeps the edges the filter accepts, and streams
/// new nodes and accepted edges to the persistence channels.
pub struct GraphMaterializer<'a> {
    program: &'a Program,
    filter: &'a EdgeFilter,
    algorithm: String,
    reporter: ProgressReporter,
    cancel: CancellationToken,
    progress: Arc<ProgressTracker>,
}

impl<'a> GraphMaterializer<'a> {
    pub fn new(program: &'a Program, filter: &'a EdgeFilter, algorithm: impl Into<String>) -> Self {
        Self {
            program,
            filter,
            algorithm: algorithm.into(),
            reporter: ProgressReporter::disabled(),
            cancel: CancellationToken::new(),
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    /// Consumes the emitter so both channels close however the walk ends.
    pub fn run(&self, graph: &RawCallGraph, emitter: GraphEmitter) -> Result<MaterializedGraph> {
        self.reporter.report(format!(
            "Starting to build call graph, using algorithm: {}",
            self.algorithm
        ));
        self.progress.reset(graph.node_count());

        let mut out = MaterializedGraph::default();
        let mut visited_callers: HashSet<NodeIndex> = HashSet::new();

        let walk = graph.visit_edges(|caller_index, _, caller, callee| -> Result<()> {
            if self.cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            if visited_callers.insert(caller_index) {
                self.progress.record_caller();
            }

            let caller = self.program.function(caller);
            let callee = self.program.function(callee);
            if !self.filter.accepts(caller, callee) {
                return Ok(());
            }

            for function in [caller, callee] {
                let (i, created) = out.ensure_node(function);
                if created {
                    emitter.send_node(out.nodes[i].clone(), &self.cancel)?;
                    if out.nodes.len() % NODE_REPORT_INTERVAL == 0 {
                        self.report_counts(&out);
                    }
                }
            }

            let (caller_at, _) = out.ensure_node(caller);
            let (callee_at, _) = out.ensure_node(callee);
            out.nodes[caller_at].children.push(callee.key.clone());
            out.nodes[callee_at].parents.push(caller.key.clone());

            let edge = FunctionEdge::new(caller.key.clone(), callee.key.clone());
            debug!(%edge, "accepted call edge");
            out.edges.push(edge.clone());
            emitter.send_edge(edge, &self.cancel)?;
            if out.edges.len() % EDGE_REPORT_INTERVAL == 0 {
                self.report_counts(&out);
            }
            Ok(())
        });
        drop(emitter);

        match walk {
            Ok(()) => {
                self.reporter.report(format!(
                    "Call graph build completed, processed {} nodes, {} edges",
                    out.node_count(),
                    out.edge_count()
                ));
                info!(
                    nodes = out.node_count(),
                    edges = out.edge_count(),
                    progress = self.progress.progress(),
                    "call graph materialized"
                );
                Ok(out)
            }
            Err(err) => {
                self.reporter.report(format!("Call graph build error: {err}"));
                Err(err)
            }
        }
    }

    fn report_counts(&self, graph: &MaterializedGraph) {
        self.reporter.report(format!(
            "Processed {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        ));
    }
}
