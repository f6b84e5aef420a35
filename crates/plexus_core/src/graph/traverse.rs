//! Depth-first and breadth-first traversal.

use super::{GraphError, NetworkGraph, NodeId};
use crate::{
    processor::Processor,
    visit::{Ctx, Visitor},
};
use petgraph::visit::{NodeIndexable, VisitMap, Visitable};
use std::collections::VecDeque;

/// The discovery and finish timestamps produced by a depth-first traversal.
///
/// Timestamps are drawn from a single counter incremented at every discovery
/// and every finish, so no two timestamps within one traversal are equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DfsTimes {
    discovered: Vec<u32>,
    finished: Vec<u32>,
    back_edges: Vec<(NodeId, NodeId)>,
}

/// The minimum distance from a root to each node reached by a breadth-first
/// traversal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Distances(Vec<Option<u32>>);

impl DfsTimes {
    fn new(bound: usize) -> Self {
        DfsTimes {
            discovered: vec![0; bound],
            finished: vec![0; bound],
            back_edges: vec![],
        }
    }

    /// The time at which the node was discovered, if it was reached.
    pub fn discovered(&self, id: NodeId) -> Option<u32> {
        self.discovered.get(id.index()).copied().filter(|&t| t > 0)
    }

    /// The time at which the node was finished, if it was reached.
    pub fn finished(&self, id: NodeId) -> Option<u32> {
        self.finished.get(id.index()).copied().filter(|&t| t > 0)
    }

    /// Edges leading from a node to one of its unfinished ancestors.
    ///
    /// A traversal yields back edges if and only if it ran into a cycle.
    pub fn back_edges(&self) -> &[(NodeId, NodeId)] {
        &self.back_edges
    }

    fn is_discovered(&self, id: NodeId) -> bool {
        self.discovered[id.index()] > 0
    }
}

impl Distances {
    /// The minimum distance to the node from a root, if it was reached.
    pub fn get(&self, id: NodeId) -> Option<u32> {
        self.0.get(id.index()).copied().flatten()
    }
}

impl<'a, P> NetworkGraph<'a, P>
where
    P: ?Sized + Processor,
{
    /// Depth-first traversal from the given processor only.
    pub fn traverse_depth_first<V>(&self, root: &str, mut visitor: V) -> Result<DfsTimes, GraphError>
    where
        V: Visitor<P>,
    {
        let root = self
            .node_id(root)
            .ok_or_else(|| GraphError::UnknownProcessor(root.to_string()))?;
        let mut times = DfsTimes::new(self.graph.node_bound());
        let mut time = 0;
        self.dfs_from(root, &mut time, &mut times, &mut visitor);
        Ok(times)
    }

    /// Depth-first traversal of the whole graph.
    ///
    /// Starts from every root in ascending id order, then from every node
    /// still undiscovered (disconnected cycles) in ascending id order.
    pub fn full_traverse_depth_first<V>(&self, mut visitor: V) -> DfsTimes
    where
        V: Visitor<P>,
    {
        let mut times = DfsTimes::new(self.graph.node_bound());
        let mut time = 0;
        let starts = self.root_ids().into_iter().chain(self.graph.node_indices());
        for n in starts {
            if !times.is_discovered(n) {
                self.dfs_from(n, &mut time, &mut times, &mut visitor);
            }
        }
        times
    }

    // Uses an explicit stack so that long chains can't overflow.
    fn dfs_from<V>(&self, root: NodeId, time: &mut u32, times: &mut DfsTimes, visitor: &mut V)
    where
        V: Visitor<P>,
    {
        *time += 1;
        times.discovered[root.index()] = *time;
        visitor.visit_pre(Ctx::new(root, self.graph[root].processor, *time));

        let mut stack = vec![(root, self.successor_ids(root), 0)];
        while let Some((n, succs, cursor)) = stack.last_mut() {
            match succs.get(*cursor).copied() {
                Some(s) => {
                    *cursor += 1;
                    if !times.is_discovered(s) {
                        *time += 1;
                        times.discovered[s.index()] = *time;
                        visitor.visit_pre(Ctx::new(s, self.graph[s].processor, *time));
                        stack.push((s, self.successor_ids(s), 0));
                    } else if times.finished[s.index()] == 0 {
                        times.back_edges.push((*n, s));
                    }
                }
                None => {
                    let n = *n;
                    stack.pop();
                    *time += 1;
                    times.finished[n.index()] = *time;
                    visitor.visit_post(Ctx::new(n, self.graph[n].processor, *time));
                }
            }
        }
    }

    /// Breadth-first traversal from the given processor only.
    pub fn traverse_breadth_first<V>(&self, root: &str, mut visitor: V) -> Result<Distances, GraphError>
    where
        V: Visitor<P>,
    {
        let root = self
            .node_id(root)
            .ok_or_else(|| GraphError::UnknownProcessor(root.to_string()))?;
        let mut dist = vec![None; self.graph.node_bound()];
        let mut marks = self.graph.visit_map();
        self.bfs_from(root, &mut dist, &mut marks, &mut visitor);
        Ok(Distances(dist))
    }

    /// Breadth-first traversal of the whole graph.
    ///
    /// Each node's distance is the minimum over all roots. Nodes reachable
    /// from no root are treated as roots of their own in ascending id order.
    pub fn full_traverse_breadth_first<V>(&self, mut visitor: V) -> Distances
    where
        V: Visitor<P>,
    {
        let mut dist = vec![None; self.graph.node_bound()];
        let mut marks = self.graph.visit_map();
        for n in self.root_ids() {
            self.bfs_from(n, &mut dist, &mut marks, &mut visitor);
        }
        let rest: Vec<NodeId> = self.graph.node_indices().collect();
        for n in rest {
            if !marks.is_visited(&n) {
                self.bfs_from(n, &mut dist, &mut marks, &mut visitor);
            }
        }
        Distances(dist)
    }

    // A node is re-queued whenever a strictly shorter path to it is found, so
    // distances settle on the minimum even across multiple roots.
    fn bfs_from<V, M>(&self, root: NodeId, dist: &mut [Option<u32>], marks: &mut M, visitor: &mut V)
    where
        V: Visitor<P>,
        M: VisitMap<NodeId>,
    {
        dist[root.index()] = Some(0);
        let mut queue = VecDeque::from([root]);
        while let Some(n) = queue.pop_front() {
            let Some(d) = dist[n.index()] else {
                continue;
            };
            if marks.visit(n) {
                visitor.visit_pre(Ctx::new(n, self.graph[n].processor, d));
            }
            for s in self.successor_ids(n) {
                let shorter = dist[s.index()].is_none_or(|old| d + 1 < old);
                if shorter {
                    dist[s.index()] = Some(d + 1);
                    queue.push_back(s);
                }
            }
        }
    }
}
