use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

use super::CallGraphAlgorithm;
use crate::core::graph::RawCallGraph;
use crate::error::{AnalysisError, Result};
use crate::ir::{CallTarget, FuncId, Program, TypeId};

/// Rapid type analysis rooted at every `main` function. Only functions that
/// become reachable appear in the graph; interface calls dispatch to types
/// allocated by reachable code.
pub struct RtaAlgorithm;

impl CallGraphAlgorithm for RtaAlgorithm {
    fn build(&self, program: &Program) -> Result<RawCallGraph> {
        let roots = program.main_functions();
        if roots.is_empty() {
            return Err(AnalysisError::NoMainPackage);
        }
        let mut state = Rta::new(program);
        for root in roots {
            state.reach(root);
        }
        state.run();
        debug!(
            reachable = state.graph.node_count(),
            types = state.allocated.len(),
            "rapid type analysis finished"
        );
        Ok(state.graph)
    }

    fn name(&self) -> &str {
        "rta"
    }
}

struct PendingInvoke {
    caller: FuncId,
    line: usize,
    iface: TypeId,
    method: String,
    /// Methods already linked from this site; embedding can share one method across types.
    linked: BTreeSet<FuncId>,
}

struct PendingDynamic {
    caller: FuncId,
    line: usize,
    arity: usize,
}

struct Rta<'p> {
    program: &'p Program,
    graph: RawCallGraph,
    reachable: Vec<bool>,
    queue: VecDeque<FuncId>,
    allocated: Vec<TypeId>,
    allocated_set: BTreeSet<TypeId>,
    address_taken: Vec<FuncId>,
    address_taken_set: BTreeSet<FuncId>,
    invokes: Vec<PendingInvoke>,
    dynamics: Vec<PendingDynamic>,
}

impl<'p> Rta<'p> {
    fn new(program: &'p Program) -> Self {
        Self {
            program,
            graph: RawCallGraph::new(),
            reachable: vec![false; program.functions.len()],
            queue: VecDeque::new(),
            allocated: Vec::new(),
            allocated_set: BTreeSet::new(),
            address_taken: Vec::new(),
            address_taken_set: BTreeSet::new(),
            invokes: Vec::new(),
            dynamics: Vec::new(),
        }
    }

    fn reach(&mut self, func: FuncId) {
        if !self.reachable[func] {
            self.reachable[func] = true;
            self.graph.add_node(func);
            self.queue.push_back(func);
        }
    }

    fn call(&mut self, caller: FuncId, callee: FuncId, line: usize) {
        self.graph.add_edge(caller, callee, line);
        self.reach(callee);
    }

    fn run(&mut self) {
        while let Some(func) = self.queue.pop_front() {
            self.visit(func);
        }
    }

    fn visit(&mut self, func: FuncId) {
        let program = self.program;
        let facts = program.facts(func);

        for &ty in &facts.allocations {
            if self.allocated_set.insert(ty) {
                self.allocated.push(ty);
                let matches: Vec<(FuncId, usize, FuncId)> = self
                    .invokes
                    .iter_mut()
                    .filter(|p| program.implements(ty, p.iface))
                    .filter_map(|p| {
                        program
                            .method_of(ty, &p.method)
                            .filter(|&m| p.linked.insert(m))
                            .map(|m| (p.caller, p.line, m))
                    })
                    .collect();
                for (caller, line, callee) in matches {
                    self.call(caller, callee, line);
                }
            }
        }

        for &taken in &facts.address_taken {
            if self.address_taken_set.insert(taken) {
                self.address_taken.push(taken);
                let signature = &self.program.functions[taken].signature;
                let matches: Vec<(FuncId, usize)> = self
                    .dynamics
                    .iter()
                    .filter(|p| signature.arity_matches(p.arity))
                    .map(|p| (p.caller, p.line))
                    .collect();
                for (caller, line) in matches {
                    self.call(caller, taken, line);
                }
            }
        }

        for site in &facts.sites {
            match &site.target {
                CallTarget::Static(callee) => self.call(func, *callee, site.line),
                CallTarget::Invoke { iface, method } => {
                    let mut linked = BTreeSet::new();
                    let targets: Vec<FuncId> = self
                        .allocated
                        .iter()
                        .filter(|&&ty| program.implements(ty, *iface))
                        .filter_map(|&ty| program.method_of(ty, method))
                        .filter(|&m| linked.insert(m))
                        .collect();
                    for callee in targets {
                        self.call(func, callee, site.line);
                    }
                    self.invokes.push(PendingInvoke {
                        caller: func,
                        line: site.line,
                        iface: *iface,
                        method: method.clone(),
                        linked,
                    });
                }
                CallTarget::Dynamic(_) => {
                    let arity = site.args.len();
                    let targets: Vec<FuncId> = self
                        .address_taken
                        .iter()
                        .copied()
                        .filter(|&f| self.program.functions[f].signature.arity_matches(arity))
                        .collect();
                    for callee in targets {
                        self.call(func, callee, site.line);
                    }
                    self.dynamics.push(PendingDynamic {
                        caller: func,
                        line: site.line,
                        arity,
                    });
                }
            }
        }
    }
}
