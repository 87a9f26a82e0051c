use super::{add_all_functions, CallGraphAlgorithm};
use crate::core::graph::RawCallGraph;
use crate::error::Result;
use crate::ir::{CallTarget, Program};

/// Statically dispatched calls only.
pub struct StaticAlgorithm;

impl CallGraphAlgorithm for StaticAlgorithm {
    fn build(&self, program: &Program) -> Result<RawCallGraph> {
        let mut graph = RawCallGraph::new();
        add_all_functions(program, &mut graph);
        for (caller, facts) in program.facts.iter().enumerate() {
            for site in &facts.sites {
                if let CallTarget::Static(callee) = site.target {
                    graph.add_edge(caller, callee, site.line);
                }
            }
        }
        Ok(graph)
    }

    fn name(&self) -> &str {
        "static"
    }
}
