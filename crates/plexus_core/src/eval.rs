//! Evaluation ordering for a network of processors.
//!
//! An [`EvalPlan`] is what an evaluation driver consumes. Its order respects
//! every non-loop connection and may be grouped into stages for concurrent
//! execution.

use crate::{
    EdgeMask,
    graph::{GraphError, NetworkGraph, NodeId},
    processor::Processor,
};
use std::collections::BTreeSet;

/// The evaluation order of a network.
#[derive(Clone, Debug)]
pub struct EvalPlan<'a, P>
where
    P: ?Sized + Processor,
{
    graph: NetworkGraph<'a, P>,
    order: Vec<NodeId>,
    ends: Vec<NodeId>,
}

impl<'a, P> EvalPlan<'a, P>
where
    P: ?Sized + Processor,
{
    /// Plan evaluation of the whole network, driven by every processor whose
    /// output nothing else consumes.
    ///
    /// Loop connections are excluded. Processors without any connections
    /// are still evaluated.
    pub fn new<I>(processors: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = &'a P>,
    {
        let graph = NetworkGraph::with_mask(processors, EdgeMask::NON_LOOP, true);
        let ends = graph.leaf_ids();
        Self::from_graph(graph, ends)
    }

    /// Plan evaluation of only those processors required by the given end
    /// processors.
    pub fn for_ends<I>(processors: I, ends: &[&str]) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = &'a P>,
    {
        let graph = NetworkGraph::with_mask(processors, EdgeMask::NON_LOOP, true);
        let ends = ends
            .iter()
            .map(|&p| {
                graph
                    .node_id(p)
                    .ok_or_else(|| GraphError::UnknownProcessor(p.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_graph(graph, ends)
    }

    fn from_graph(graph: NetworkGraph<'a, P>, ends: Vec<NodeId>) -> Result<Self, GraphError> {
        if graph.node_count() > 0 && !graph.has_leaves() {
            return Err(GraphError::NoLeaves);
        }
        let sorted = graph.sort_topological_ids()?;
        let required = graph.reaching(ends.iter().copied());
        let order: Vec<NodeId> = sorted
            .into_iter()
            .filter(|n| required.contains(n))
            .collect();
        log::debug!(
            "planned evaluation of {} of {} processors for {} end processor(s)",
            order.len(),
            graph.node_count(),
            ends.len()
        );
        Ok(EvalPlan { graph, order, ends })
    }

    /// The graph the plan was derived from, excluding loop edges.
    pub fn graph(&self) -> &NetworkGraph<'a, P> {
        &self.graph
    }

    /// Processors in evaluation order.
    pub fn order(&self) -> Vec<&'a P> {
        self.processors(&self.order)
    }

    /// The processors driving evaluation.
    pub fn ends(&self) -> Vec<&'a P> {
        self.processors(&self.ends)
    }

    /// The evaluation order filtered to processors that are ready.
    pub fn ready_order(&self) -> Vec<&'a P> {
        self.order().into_iter().filter(|p| p.is_ready()).collect()
    }

    /// The evaluation order grouped into stages.
    ///
    /// Every processor's predecessors lie in strictly earlier stages, so the
    /// processors within a stage may be executed concurrently once all prior
    /// stages have completed. Within a stage, processors keep their relative
    /// evaluation order.
    pub fn stages(&self) -> Vec<Vec<&'a P>> {
        let bound = self.graph.node_ids().map(|n| n.index() + 1).max();
        let mut depth = vec![0usize; bound.unwrap_or(0)];
        let planned: BTreeSet<NodeId> = self.order.iter().copied().collect();
        for &n in &self.order {
            for s in self.graph.successor_ids(n) {
                if planned.contains(&s) {
                    depth[s.index()] = depth[s.index()].max(depth[n.index()] + 1);
                }
            }
        }
        let mut stages: Vec<Vec<&'a P>> = vec![];
        for &n in &self.order {
            let d = depth[n.index()];
            if stages.len() <= d {
                stages.resize_with(d + 1, Vec::new);
            }
            if let Some(p) = self.graph.processor(n) {
                stages[d].push(p);
            }
        }
        stages
    }

    /// Invalidate the given processor and everything downstream of it, in
    /// evaluation order.
    ///
    /// Returns the number of processors invalidated.
    pub fn invalidate(&self, processor: &str) -> Result<usize, GraphError> {
        let n = self
            .graph
            .node_id(processor)
            .ok_or_else(|| GraphError::UnknownProcessor(processor.to_string()))?;
        let stale = self.graph.reachable([n]);
        let mut count = 0;
        for &m in self.order.iter().filter(|m| stale.contains(m)) {
            if let Some(p) = self.graph.processor(m) {
                p.invalidate();
                count += 1;
            }
        }
        log::debug!("invalidated {count} processor(s) downstream of `{processor}`");
        Ok(count)
    }

    fn processors(&self, ids: &[NodeId]) -> Vec<&'a P> {
        ids.iter().filter_map(|&n| self.graph.processor(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::ProcessorDesc;

    fn ids<'a>(order: &[&'a ProcessorDesc]) -> Vec<&'a str> {
        order.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn for_ends_restricts_to_required() {
        // a -> b, a -> c
        let procs = vec![
            ProcessorDesc::new("a")
                .outport("o")
                .connect("o", "b", "i")
                .connect("o", "c", "i"),
            ProcessorDesc::new("b").inport("i"),
            ProcessorDesc::new("c").inport("i"),
        ];
        let plan = EvalPlan::for_ends(&procs, &["c"]).unwrap();
        assert_eq!(ids(&plan.order()), ["a", "c"]);
        assert!(EvalPlan::for_ends(&procs, &["nope"]).is_err());
    }

    #[test]
    fn unready_processors_are_filtered() {
        let procs = vec![
            ProcessorDesc::new("a").outport("o").connect("o", "b", "i"),
            ProcessorDesc::new("b").inport("i").with_ready(false),
        ];
        let plan = EvalPlan::new(&procs).unwrap();
        assert_eq!(ids(&plan.ready_order()), ["a"]);
    }

    #[test]
    fn pure_cycle_has_no_leaves() {
        let procs = vec![
            ProcessorDesc::new("a").inport("i").outport("o").connect("o", "b", "i"),
            ProcessorDesc::new("b").inport("i").outport("o").connect("o", "a", "i"),
        ];
        assert!(matches!(EvalPlan::new(&procs), Err(GraphError::NoLeaves)));
        let empty: Vec<ProcessorDesc> = vec![];
        assert!(EvalPlan::new(&empty).unwrap().order().is_empty());
    }
}
