//! The network graph: a directed graph with one node per processor and one
//! edge per distinct connection between processors.
//!
//! Node ids are assigned in the order processors are first seen and remain
//! stable for the lifetime of the graph, including across [`NetworkGraph::retain`]
//! and the derived graphs produced by [`NetworkGraph::sub_graph`] and
//! [`NetworkGraph::transposed`]. All traversals visit nodes in ascending id
//! order so that results are reproducible for the same input.
//!
//! Traversal state (timestamps, marks, distances) is never stored on the
//! graph. Each traversal allocates its own state, so any number of read-only
//! traversals may run over the same graph.

use crate::{EdgeKind, EdgeMask, processor::Processor};
use petgraph::{
    stable_graph::{NodeIndex, StableDiGraph},
    visit::{Dfs, EdgeRef, IntoEdgeReferences, Reversed},
};
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

#[doc(inline)]
pub use error::{CycleError, GraphError};
#[doc(inline)]
pub use traverse::{DfsTimes, Distances};

mod error;
mod sort;
mod traverse;

/// Identifies a node within a [`NetworkGraph`].
pub type NodeId = NodeIndex;

/// Wraps a single borrowed processor with its degree bookkeeping.
pub struct GraphNode<'a, P: ?Sized> {
    processor: &'a P,
    in_degree: usize,
    out_degree: usize,
}

/// A directed graph of borrowed processors connected through their ports.
pub struct NetworkGraph<'a, P: ?Sized> {
    graph: StableDiGraph<GraphNode<'a, P>, EdgeKind>,
    ids: HashMap<&'a str, NodeId>,
}

impl<'a, P: ?Sized> GraphNode<'a, P> {
    fn new(processor: &'a P) -> Self {
        GraphNode {
            processor,
            in_degree: 0,
            out_degree: 0,
        }
    }

    /// The wrapped processor.
    pub fn processor(&self) -> &'a P {
        self.processor
    }

    /// The number of edges pointing at this node.
    pub fn in_degree(&self) -> usize {
        self.in_degree
    }

    /// The number of edges leaving this node.
    pub fn out_degree(&self) -> usize {
        self.out_degree
    }
}

impl<'a, P> NetworkGraph<'a, P>
where
    P: ?Sized + Processor,
{
    /// Build the graph over all edge kinds, dropping processors left without
    /// any edges.
    pub fn new<I>(processors: I) -> Self
    where
        I: IntoIterator<Item = &'a P>,
    {
        Self::with_mask(processors, EdgeMask::all(), false)
    }

    /// Build the graph from the given processors.
    ///
    /// For every connection leaving a processor's outport towards another
    /// processor within the collection, an edge is added if its kind passes
    /// `mask`. Multiple connections between the same ordered pair of
    /// processors with the same kind produce a single edge.
    ///
    /// If `keep_nodes` is `false`, processors without any surviving edges
    /// are dropped from the graph.
    pub fn with_mask<I>(processors: I, mask: EdgeMask, keep_nodes: bool) -> Self
    where
        I: IntoIterator<Item = &'a P>,
    {
        let mut g = Self::empty();
        for p in processors {
            g.add_node(p);
        }
        let nodes: Vec<NodeId> = g.graph.node_indices().collect();
        for n in nodes {
            g.connect(n, mask);
        }
        if !keep_nodes {
            g.remove_isolated();
        }
        log::debug!(
            "built network graph with {} nodes and {} edges",
            g.node_count(),
            g.edge_count()
        );
        g
    }

    /// Ensure a node exists for the processor, returning its id.
    fn add_node(&mut self, processor: &'a P) -> NodeId {
        let key = processor.id();
        if let Some(&id) = self.ids.get(key) {
            log::debug!("processor `{key}` already has a node, skipping");
            return id;
        }
        let id = self.graph.add_node(GraphNode::new(processor));
        self.ids.insert(key, id);
        id
    }

    /// Add an edge for each permitted connection leaving the node's processor.
    fn connect(&mut self, n: NodeId, mask: EdgeMask) {
        let src = self.graph[n].processor;
        for outport in src.outports() {
            for conn in src.connections(&outport.name) {
                let Some(&dst) = self.ids.get(conn.processor.as_str()) else {
                    log::debug!(
                        "connection `{}.{}` -> `{}.{}` leaves the graph, skipping",
                        src.id(),
                        outport.name,
                        conn.processor,
                        conn.inport,
                    );
                    continue;
                };
                let inport_kind = self.graph[dst]
                    .processor
                    .inports()
                    .into_iter()
                    .find(|p| p.name == conn.inport)
                    .map(|p| p.kind)
                    .unwrap_or(EdgeKind::Unspecified);
                let kind = EdgeKind::of_connection(outport.kind, inport_kind);
                if mask.permits(kind) {
                    self.add_edge(n, dst, kind);
                }
            }
        }
    }
}

impl<'a, P> NetworkGraph<'a, P>
where
    P: ?Sized,
{
    fn empty() -> Self {
        NetworkGraph {
            graph: StableDiGraph::default(),
            ids: HashMap::new(),
        }
    }

    /// Add an edge unless one of the same kind already joins `src` to `dst`.
    ///
    /// Returns whether or not the edge was added.
    fn add_edge(&mut self, src: NodeId, dst: NodeId, kind: EdgeKind) -> bool {
        let exists = self
            .graph
            .edges(src)
            .any(|e| e.target() == dst && *e.weight() == kind);
        if exists {
            return false;
        }
        self.graph.add_edge(src, dst, kind);
        self.graph[src].out_degree += 1;
        self.graph[dst].in_degree += 1;
        true
    }

    /// Recount all degrees from scratch. Only used after a structural rebuild.
    fn recount_degrees(&mut self) {
        let nodes: Vec<NodeId> = self.graph.node_indices().collect();
        for n in nodes {
            let out_degree = self.graph.edges_directed(n, petgraph::Outgoing).count();
            let in_degree = self.graph.edges_directed(n, petgraph::Incoming).count();
            let node = &mut self.graph[n];
            node.out_degree = out_degree;
            node.in_degree = in_degree;
        }
    }

    fn remove_isolated(&mut self) {
        self.graph
            .retain_nodes(|g, n| g[n].in_degree > 0 || g[n].out_degree > 0);
        let graph = &self.graph;
        self.ids.retain(|_, n| graph.contains_node(*n));
    }

    /// The number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// The number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices()
    }

    /// The node with the given id.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode<'a, P>> {
        self.graph.node_weight(id)
    }

    /// The processor wrapped by the node with the given id.
    pub fn processor(&self, id: NodeId) -> Option<&'a P> {
        self.node(id).map(|n| n.processor)
    }

    /// All processors in ascending node id order.
    pub fn processors(&self) -> Vec<&'a P> {
        self.graph.node_weights().map(|n| n.processor).collect()
    }

    /// The id of the node wrapping the processor with the given id.
    pub fn node_id(&self, processor: &str) -> Option<NodeId> {
        self.ids.get(processor).copied()
    }

    /// Whether the graph has a node for the processor with the given id.
    pub fn contains(&self, processor: &str) -> bool {
        self.ids.contains_key(processor)
    }

    /// The in-degree of the given processor's node.
    pub fn in_degree(&self, processor: &str) -> Option<usize> {
        self.node_id(processor).map(|n| self.graph[n].in_degree)
    }

    /// The out-degree of the given processor's node.
    pub fn out_degree(&self, processor: &str) -> Option<usize> {
        self.node_id(processor).map(|n| self.graph[n].out_degree)
    }

    /// The successor edges of a node, ordered by target id then kind.
    pub fn successor_edges(&self, id: NodeId) -> Vec<(NodeId, EdgeKind)> {
        let mut edges: Vec<_> = self
            .graph
            .edges(id)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        edges.sort();
        edges
    }

    /// The distinct successors of a node in ascending id order.
    pub fn successor_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.graph.neighbors(id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// All edges as `(source, target, kind)`, sorted.
    pub fn edges(&self) -> Vec<(NodeId, NodeId, EdgeKind)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| (e.source(), e.target(), *e.weight()))
            .collect();
        edges.sort();
        edges
    }

    /// Ids of all nodes with an in-degree of zero, ascending.
    pub fn root_ids(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&n| self.graph[n].in_degree == 0)
            .collect()
    }

    /// All processors whose nodes have an in-degree of zero.
    ///
    /// A non-empty graph without roots consists only of cycles and has no
    /// topological order.
    pub fn identify_roots(&self) -> Vec<&'a P> {
        self.root_ids()
            .into_iter()
            .map(|n| self.graph[n].processor)
            .collect()
    }

    /// Ids of all nodes with an out-degree of zero, ascending.
    pub fn leaf_ids(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&n| self.graph[n].out_degree == 0)
            .collect()
    }

    /// Whether at least one node has an out-degree of zero.
    pub fn has_leaves(&self) -> bool {
        self.graph
            .node_weights()
            .any(|n| n.out_degree == 0)
    }

    /// A copy of the graph keeping only edges permitted by `mask`.
    ///
    /// Nodes left without edges are dropped unless `keep_nodes` is set. Node
    /// ids are preserved.
    pub fn sub_graph(&self, mask: EdgeMask, keep_nodes: bool) -> Self {
        let mut sub = self.clone();
        sub.graph.retain_edges(|g, e| {
            g.edge_weight(e).is_some_and(|&kind| mask.permits(kind))
        });
        sub.recount_degrees();
        if !keep_nodes {
            sub.remove_isolated();
        }
        sub
    }

    /// A copy of the graph with every edge reversed.
    ///
    /// The roots of the transposed graph are the leaves of this one.
    pub fn transposed(&self) -> Self {
        let mut t = self.clone();
        let edges = self.edges();
        t.graph.clear_edges();
        for (src, dst, kind) in edges {
            t.graph.add_edge(dst, src, kind);
        }
        for node in t.graph.node_weights_mut() {
            std::mem::swap(&mut node.in_degree, &mut node.out_degree);
        }
        t
    }

    /// Drop every node whose processor id is not in `keep`, along with all
    /// edges touching it.
    pub fn retain(&mut self, keep: &[&str]) {
        let keep: BTreeSet<NodeId> = self.resolve(keep).collect();
        self.graph.retain_nodes(|_, n| keep.contains(&n));
        let graph = &self.graph;
        self.ids.retain(|_, n| graph.contains_node(*n));
        self.recount_degrees();
    }

    /// Map processor ids to node ids, skipping unknown processors.
    fn resolve<'s>(&'s self, processors: &'s [&str]) -> impl Iterator<Item = NodeId> + 's {
        processors.iter().filter_map(move |&p| {
            let id = self.node_id(p);
            if id.is_none() {
                log::debug!("processor `{p}` is not part of the graph");
            }
            id
        })
    }

    /// All nodes reachable from the given nodes, inclusive.
    pub(crate) fn reachable(&self, starts: impl IntoIterator<Item = NodeId>) -> BTreeSet<NodeId> {
        let mut set = BTreeSet::new();
        let mut dfs = Dfs::empty(&self.graph);
        for n in starts {
            dfs.move_to(n);
            while let Some(n) = dfs.next(&self.graph) {
                set.insert(n);
            }
        }
        set
    }

    /// All nodes from which the given nodes are reachable, inclusive.
    pub(crate) fn reaching(&self, ends: impl IntoIterator<Item = NodeId>) -> BTreeSet<NodeId> {
        let rev = Reversed(&self.graph);
        let mut set = BTreeSet::new();
        let mut dfs = Dfs::empty(rev);
        for n in ends {
            dfs.move_to(n);
            while let Some(n) = dfs.next(rev) {
                set.insert(n);
            }
        }
        set
    }

    fn to_processors(&self, ids: impl IntoIterator<Item = NodeId>) -> Vec<&'a P> {
        ids.into_iter().map(|n| self.graph[n].processor).collect()
    }

    /// All processors reachable from the given processors, including the
    /// given processors themselves, in ascending node id order.
    pub fn successors(&self, processors: &[&str]) -> Vec<&'a P> {
        let set = self.reachable(self.resolve(processors));
        self.to_processors(set)
    }

    /// All processors from which one of the given processors is reachable,
    /// including the given processors themselves, in ascending node id order.
    pub fn predecessors(&self, processors: &[&str]) -> Vec<&'a P> {
        let set = self.reaching(self.resolve(processors));
        self.to_processors(set)
    }

    /// Whether `successor` is reachable from `predecessor`.
    ///
    /// Every processor in the graph is its own successor.
    pub fn is_successor(&self, predecessor: &str, successor: &str) -> bool {
        match (self.node_id(predecessor), self.node_id(successor)) {
            (Some(a), Some(b)) => self.reachable([a]).contains(&b),
            _ => false,
        }
    }

    /// Whether `processor` lies on some path from `from` to `to`.
    pub fn is_path_element(&self, processor: &str, from: &str, to: &str) -> bool {
        self.is_successor(from, processor) && self.is_successor(processor, to)
    }

    /// All processors lying on any path from `from` to `to`, in ascending
    /// node id order. Empty if `to` is not reachable from `from`.
    pub fn path_nodes(&self, from: &str, to: &str) -> Vec<&'a P> {
        let (Some(a), Some(b)) = (self.node_id(from), self.node_id(to)) else {
            return vec![];
        };
        let down = self.reachable([a]);
        let up = self.reaching([b]);
        self.to_processors(down.intersection(&up).copied())
    }
}

impl<'a, P: ?Sized> Clone for GraphNode<'a, P> {
    fn clone(&self) -> Self {
        GraphNode {
            processor: self.processor,
            in_degree: self.in_degree,
            out_degree: self.out_degree,
        }
    }
}

impl<'a, P: ?Sized> Clone for NetworkGraph<'a, P> {
    fn clone(&self) -> Self {
        NetworkGraph {
            graph: self.graph.clone(),
            ids: self.ids.clone(),
        }
    }
}

/// Graphs are equal when they bind the same node ids to the same processor
/// ids and contain the same edges.
impl<'a, 'b, P, Q> PartialEq<NetworkGraph<'b, Q>> for NetworkGraph<'a, P>
where
    P: ?Sized + Processor,
    Q: ?Sized + Processor,
{
    fn eq(&self, other: &NetworkGraph<'b, Q>) -> bool {
        let nodes_eq = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph[n].processor.id()))
            .eq(other
                .graph
                .node_indices()
                .map(|n| (n, other.graph[n].processor.id())));
        nodes_eq && self.edges() == other.edges()
    }
}

impl<'a, P> fmt::Debug for NetworkGraph<'a, P>
where
    P: ?Sized + Processor,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes: Vec<_> = self
            .graph
            .node_indices()
            .map(|n| (n.index(), self.graph[n].processor.id()))
            .collect();
        let edges: Vec<_> = self
            .edges()
            .into_iter()
            .map(|(a, b, kind)| (a.index(), b.index(), kind))
            .collect();
        f.debug_struct("NetworkGraph")
            .field("nodes", &nodes)
            .field("edges", &edges)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::ProcessorDesc;

    fn chain() -> Vec<ProcessorDesc> {
        vec![
            ProcessorDesc::new("a").outport("out").connect("out", "b", "in"),
            ProcessorDesc::new("b")
                .inport("in")
                .outport("out")
                .connect("out", "c", "in"),
            ProcessorDesc::new("c").inport("in"),
        ]
    }

    #[test]
    fn degrees_follow_edges() {
        let procs = chain();
        let g = NetworkGraph::new(&procs);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.in_degree("a"), Some(0));
        assert_eq!(g.out_degree("a"), Some(1));
        assert_eq!(g.in_degree("b"), Some(1));
        assert_eq!(g.out_degree("c"), Some(0));
    }

    #[test]
    fn duplicate_connections_collapse() {
        let procs = vec![
            ProcessorDesc::new("a")
                .outport("x")
                .outport("y")
                .connect("x", "b", "i")
                .connect("y", "b", "j"),
            ProcessorDesc::new("b").inport("i").inport("j"),
        ];
        let g = NetworkGraph::new(&procs);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.in_degree("b"), Some(1));
    }

    #[test]
    fn optional_entries_are_skipped() {
        let procs = chain();
        let items = [Some(&procs[0]), None, Some(&procs[1]), Some(&procs[2])];
        let g = NetworkGraph::new(items.into_iter().flatten());
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn isolated_nodes_dropped_unless_kept() {
        let mut procs = chain();
        procs.push(ProcessorDesc::new("lonely"));
        assert!(!NetworkGraph::new(&procs).contains("lonely"));
        let g = NetworkGraph::with_mask(&procs, EdgeMask::all(), true);
        assert!(g.contains("lonely"));
    }

    #[test]
    fn retain_recounts_degrees() {
        let procs = chain();
        let mut g = NetworkGraph::new(&procs);
        g.retain(&["b", "c"]);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.in_degree("b"), Some(0));
        assert_eq!(g.identify_roots()[0].id(), "b");
    }
}
