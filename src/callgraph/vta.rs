use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

use super::cha::Hierarchy;
use super::{add_all_functions, CallGraphAlgorithm};
use crate::core::graph::RawCallGraph;
use crate::error::Result;
use crate::ir::{AbstractValue, CallSite, CallTarget, FlowNode, FuncId, Program, ValueFlow};

/// Variable type analysis. Types and function values are propagated along
/// assignments, parameter passing and returns; interface and dynamic calls are
/// then resolved from the values that reach their receiver or callee. Sites
/// whose values include an opaque origin use the CHA answer instead.
pub struct VtaAlgorithm;

impl CallGraphAlgorithm for VtaAlgorithm {
    fn build(&self, program: &Program) -> Result<RawCallGraph> {
        let mut hierarchy = Hierarchy::new(program);
        let mut propagation = TypePropagation::default();

        for (func, facts) in program.facts.iter().enumerate() {
            for flow in &facts.flows {
                propagation.connect(&flow.from, flow.to.clone());
            }
            for (index, site) in facts.sites.iter().enumerate() {
                for callee in hierarchy.site_targets(site) {
                    propagation.call_flows(program, func, index, site, callee);
                }
            }
        }
        propagation.solve();
        debug!(
            nodes = propagation.graph.node_count(),
            edges = propagation.graph.edge_count(),
            "type propagation reached a fixpoint"
        );

        let mut graph = RawCallGraph::new();
        add_all_functions(program, &mut graph);
        for (caller, facts) in program.facts.iter().enumerate() {
            for site in &facts.sites {
                for callee in propagation.site_targets(program, &mut hierarchy, site) {
                    graph.add_edge(caller, callee, site.line);
                }
            }
        }
        Ok(graph)
    }

    fn name(&self) -> &str {
        "vta"
    }
}

#[derive(Default)]
struct TypePropagation {
    graph: DiGraph<FlowNode, ()>,
    index: HashMap<FlowNode, NodeIndex>,
    values: Vec<BTreeSet<AbstractValue>>,
}

impl TypePropagation {
    fn node(&mut self, node: FlowNode) -> NodeIndex {
        if let Some(&index) = self.index.get(&node) {
            return index;
        }
        let index = self.graph.add_node(node.clone());
        self.index.insert(node, index);
        self.values.push(BTreeSet::new());
        index
    }

    fn connect(&mut self, from: &ValueFlow, to: FlowNode) {
        let target = self.node(to);
        for source in &from.nodes {
            let source = self.node(source.clone());
            if source != target {
                self.graph.update_edge(source, target, ());
            }
        }
        self.values[target.index()].extend(from.values.iter().copied());
    }

    /// Interprocedural flows for one resolved call: arguments into parameters,
    /// the receiver into the receiver variable, results back to the call site.
    fn call_flows(&mut self, program: &Program, caller: FuncId, site_index: usize, site: &CallSite, callee: FuncId) {
        let function = program.function(callee);
        for (i, arg) in site.args.iter().enumerate().take(function.signature.params.len()) {
            self.connect(arg, FlowNode::Local(callee, function.param_key(i)));
        }
        if let Some(recv) = &site.recv {
            if function.receiver.is_some() {
                self.connect(recv, FlowNode::Local(callee, function.receiver_key()));
            }
        }
        for i in 0..function.signature.results.len() {
            self.connect(
                &ValueFlow::node(FlowNode::Result(callee, i)),
                FlowNode::CallResult(caller, site_index, i),
            );
        }
    }

    fn solve(&mut self) {
        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| !self.values[n.index()].is_empty())
            .collect();
        let mut queued = vec![false; self.graph.node_count()];
        for n in &queue {
            queued[n.index()] = true;
        }

        while let Some(node) = queue.pop_front() {
            queued[node.index()] = false;
            let current = self.values[node.index()].clone();
            let successors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
            for succ in successors {
                let before = self.values[succ.index()].len();
                self.values[succ.index()].extend(current.iter().copied());
                if self.values[succ.index()].len() != before && !queued[succ.index()] {
                    queued[succ.index()] = true;
                    queue.push_back(succ);
                }
            }
        }
    }

    fn values_of(&self, flow: &ValueFlow) -> BTreeSet<AbstractValue> {
        let mut out: BTreeSet<AbstractValue> = flow.values.iter().copied().collect();
        for node in &flow.nodes {
            if let Some(index) = self.index.get(node) {
                out.extend(self.values[index.index()].iter().copied());
            }
        }
        out
    }

    fn site_targets(&self, program: &Program, hierarchy: &mut Hierarchy<'_>, site: &CallSite) -> Vec<FuncId> {
        match &site.target {
            CallTarget::Static(callee) => vec![*callee],
            CallTarget::Invoke { iface, method } => {
                let recv = site.recv.as_ref().map(|r| self.values_of(r)).unwrap_or_default();
                if recv.contains(&AbstractValue::Opaque) {
                    return hierarchy.invoke_targets(*iface, method);
                }
                let targets: BTreeSet<FuncId> = recv
                    .iter()
                    .filter_map(|value| match value {
                        AbstractValue::Type(ty) if program.implements(*ty, *iface) => {
                            program.method_of(*ty, method)
                        }
                        _ => None,
                    })
                    .collect();
                targets.into_iter().collect()
            }
            CallTarget::Dynamic(callee) => {
                let values = self.values_of(callee);
                if values.contains(&AbstractValue::Opaque) {
                    return hierarchy.dynamic_targets(site.args.len());
                }
                values
                    .iter()
                    .filter_map(|value| match value {
                        AbstractValue::Func(f) => Some(*f),
                        _ => None,
                    })
                    .collect()
            }
        }
    }
}
