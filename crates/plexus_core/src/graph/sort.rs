//! Topological sorting.

use super::{CycleError, NetworkGraph, NodeId};
use crate::processor::Processor;
use std::{cmp::Reverse, collections::BTreeSet};

impl<'a, P> NetworkGraph<'a, P>
where
    P: ?Sized + Processor,
{
    /// Node ids ordered by descending finish time of a full depth-first
    /// traversal.
    ///
    /// Fails if the graph contains a cycle. Exclude loop edges beforehand via
    /// [`NetworkGraph::sub_graph`] or by building with
    /// [`EdgeMask::NON_LOOP`](crate::EdgeMask::NON_LOOP).
    pub fn sort_topological_ids(&self) -> Result<Vec<NodeId>, CycleError> {
        let times = self.full_traverse_depth_first(());
        if !times.back_edges().is_empty() {
            return Err(self.cycle_error());
        }
        let mut ids: Vec<NodeId> = self.graph.node_indices().collect();
        ids.sort_by_key(|&n| Reverse(times.finished(n)));
        Ok(ids)
    }

    /// All processors in topological order: for every edge `u -> v`, `u`
    /// precedes `v`.
    pub fn sort_topological(&self) -> Result<Vec<&'a P>, CycleError> {
        let ids = self.sort_topological_ids()?;
        Ok(self.to_processors(ids))
    }

    /// The topological order restricted to the given processors.
    ///
    /// An empty subset yields the full order. The whole graph must be
    /// acyclic, not only the subset.
    pub fn sort_topological_subset(&self, subset: &[&str]) -> Result<Vec<&'a P>, CycleError> {
        let ids = self.sort_topological_ids()?;
        if subset.is_empty() {
            return Ok(self.to_processors(ids));
        }
        let subset: BTreeSet<NodeId> = self.resolve(subset).collect();
        let ids = ids.into_iter().filter(|n| subset.contains(n));
        Ok(self.to_processors(ids))
    }

    /// Describe every cycle in the graph by its strongly connected component.
    fn cycle_error(&self) -> CycleError {
        let mut cycles: Vec<Vec<String>> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| match scc.as_slice() {
                [n] => self.graph.contains_edge(*n, *n),
                _ => true,
            })
            .map(|scc| {
                let mut ids: Vec<String> = scc
                    .into_iter()
                    .map(|n| self.graph[n].processor.id().to_string())
                    .collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        log::warn!("no topological order: {} cycle(s) found", cycles.len());
        CycleError { cycles }
    }
}
