use std::collections::{BTreeSet, HashMap};

use super::{add_all_functions, CallGraphAlgorithm};
use crate::core::graph::RawCallGraph;
use crate::error::Result;
use crate::ir::{CallSite, CallTarget, FuncId, Program, TypeId};

/// Class hierarchy analysis: an interface call reaches the method of every
/// concrete type that implements the interface; a call through a function
/// value reaches every address-taken function of matching arity.
pub struct ChaAlgorithm;

impl CallGraphAlgorithm for ChaAlgorithm {
    fn build(&self, program: &Program) -> Result<RawCallGraph> {
        let mut graph = RawCallGraph::new();
        add_all_functions(program, &mut graph);
        let mut hierarchy = Hierarchy::new(program);
        for (caller, facts) in program.facts.iter().enumerate() {
            for site in &facts.sites {
                for callee in hierarchy.site_targets(site) {
                    graph.add_edge(caller, callee, site.line);
                }
            }
        }
        Ok(graph)
    }

    fn name(&self) -> &str {
        "cha"
    }
}

/// Memoized CHA target lookup, shared with VTA's fallback path.
pub(crate) struct Hierarchy<'p> {
    program: &'p Program,
    address_taken: BTreeSet<FuncId>,
    invoke_cache: HashMap<(TypeId, String), Vec<FuncId>>,
}

impl<'p> Hierarchy<'p> {
    pub(crate) fn new(program: &'p Program) -> Self {
        Self {
            program,
            address_taken: program.address_taken(),
            invoke_cache: HashMap::new(),
        }
    }

    pub(crate) fn invoke_targets(&mut self, iface: TypeId, method: &str) -> Vec<FuncId> {
        let program = self.program;
        self.invoke_cache
            .entry((iface, method.to_string()))
            .or_insert_with(|| program.implementations(iface, method))
            .clone()
    }

    pub(crate) fn dynamic_targets(&self, arity: usize) -> Vec<FuncId> {
        self.address_taken
            .iter()
            .copied()
            .filter(|&f| self.program.functions[f].signature.arity_matches(arity))
            .collect()
    }

    pub(crate) fn site_targets(&mut self, site: &CallSite) -> Vec<FuncId> {
        match &site.target {
            CallTarget::Static(callee) => vec![*callee],
            CallTarget::Invoke { iface, method } => self.invoke_targets(*iface, method),
            CallTarget::Dynamic(_) => self.dynamic_targets(site.args.len()),
        }
    }
}
