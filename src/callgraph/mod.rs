//! Call graph construction over a resolved [`Program`].

pub mod cha;
pub mod rta;
pub mod static_calls;
pub mod vta;

use tracing::info;

use crate::config::Algorithm;
use crate::core::graph::RawCallGraph;
use crate::error::{AnalysisError, Result};
use crate::ir::Program;

pub use cha::ChaAlgorithm;
pub use rta::RtaAlgorithm;
pub use static_calls::StaticAlgorithm;
pub use vta::VtaAlgorithm;

pub trait CallGraphAlgorithm {
    fn build(&self, program: &Program) -> Result<RawCallGraph>;
    fn name(&self) -> &str;
}

pub struct CallGraphBuilder {
    algorithm: Algorithm,
}

impl CallGraphBuilder {
    pub fn new(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm_impl(&self) -> Box<dyn CallGraphAlgorithm + Send + Sync> {
        match self.algorithm {
            Algorithm::Static => Box::new(StaticAlgorithm),
            Algorithm::Cha => Box::new(ChaAlgorithm),
            Algorithm::Rta => Box::new(RtaAlgorithm),
            Algorithm::Vta => Box::new(VtaAlgorithm),
        }
    }

    pub fn build(&self, program: &Program) -> Result<RawCallGraph> {
        let algorithm = self.algorithm_impl();
        let graph = algorithm.build(program)?;
        if graph.node_count() == 0 {
            return Err(AnalysisError::EmptyCallGraph {
                algorithm: algorithm.name().to_string(),
            });
        }
        info!(
            algorithm = algorithm.name(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "call graph constructed"
        );
        Ok(graph)
    }
}

/// Adds every function of the program as a node, in id order.
pub(crate) fn add_all_functions(program: &Program, graph: &mut RawCallGraph) {
    for function in &program.functions {
        graph.add_node(function.id);
    }
}
