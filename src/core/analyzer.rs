use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::cancel::CancellationToken;
use super::filter::EdgeFilter;
use super::graph::RawCallGraph;
use super::materializer::{GraphMaterializer, MaterializedGraph};
use super::module::{ModuleInfo, ModuleResolver};
use super::pipeline::{graph_channel, GraphEmitter, PersistStats, PersistenceWriters};
use super::progress::{ProgressReporter, ProgressTracker};
use crate::callgraph::CallGraphBuilder;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::ir::{Program, ProgramLoader};
use crate::storage::CallGraphStore;

/// Outcome of [`CallGraphAnalyzer::build_and_persist`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub graph: MaterializedGraph,
    pub persisted: PersistStats,
}

/// Everything one analysis needs after loading: config, module, program and raw graph.
pub struct AnalysisRun {
    config: AnalysisConfig,
    module: ModuleInfo,
    program: Program,
    raw: RawCallGraph,
    filter: EdgeFilter,
    reporter: ProgressReporter,
    cancel: CancellationToken,
    progress: Arc<ProgressTracker>,
}

impl AnalysisRun {
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn raw_graph(&self) -> &RawCallGraph {
        &self.raw
    }

    pub fn filter(&self) -> &EdgeFilter {
        &self.filter
    }

    /// Filters and streams the graph into `emitter`. The emitter is dropped on
    /// return, which closes both channels.
    pub fn materialize(&self, emitter: GraphEmitter) -> Result<MaterializedGraph> {
        GraphMaterializer::new(&self.program, &self.filter, self.config.algorithm.as_str())
            .with_reporter(self.reporter.clone())
            .with_cancellation(self.cancel.clone())
            .with_progress(Arc::clone(&self.progress))
            .run(&self.raw, emitter)
    }
}

pub struct CallGraphAnalyzer {
    config: AnalysisConfig,
    reporter: ProgressReporter,
    cancel: CancellationToken,
    progress: Arc<ProgressTracker>,
}

impl CallGraphAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
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

    /// Shared tracker; readable from other threads while a run is in progress.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Resolves the module, loads the program and builds the raw call graph.
    pub fn prepare(&self) -> Result<AnalysisRun> {
        let started = Instant::now();
        let module = ModuleResolver::resolve(&self.config.root)?;
        info!(module = %module.path, root = %module.root.display(), "module resolved");

        let program = ProgramLoader::new(module.clone()).load(&self.config.root)?;
        if self.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let raw = CallGraphBuilder::new(self.config.algorithm).build(&program)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis prepared"
        );

        Ok(AnalysisRun {
            filter: EdgeFilter::new(module.path.clone(), self.config.ignore_paths.clone()),
            config: self.config.clone(),
            module,
            program,
            raw,
            reporter: self.reporter.clone(),
            cancel: self.cancel.clone(),
            progress: Arc::clone(&self.progress),
        })
    }

    /// Builds the graph and streams it into `store` while it is produced.
    pub fn build_and_persist(&self, store: Arc<dyn CallGraphStore>) -> Result<RunSummary> {
        let run = self.prepare()?;
        store.init_table()?;

        let (emitter, streams) = graph_channel(self.config.channel_capacity);
        let writers = PersistenceWriters::spawn(
            Arc::clone(&store),
            streams,
            self.reporter.clone(),
            self.cancel.clone(),
        )?;

        let produced = run.materialize(emitter);
        let persisted = writers.join()?;
        let graph = produced?;
        if persisted.cancelled || self.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        self.reporter.report("Data saving completed");
        info!(
            nodes = persisted.nodes_saved,
            edges = persisted.edges_saved,
            node_errors = persisted.node_errors,
            edge_errors = persisted.edge_errors,
            "call graph persisted"
        );
        Ok(RunSummary { graph, persisted })
    }

    /// Builds the filtered graph without persisting it.
    pub fn build(&self) -> Result<MaterializedGraph> {
        self.prepare()?.materialize(GraphEmitter::discard())
    }
}
