//! The graph engine at the heart of plexus.
//!
//! A network of [`Processor`]s is turned into a [`NetworkGraph`] with one node
//! per processor and one edge per distinct connection. The graph supports
//! deterministic depth-first and breadth-first traversal, topological
//! sorting, reachability queries and derived views such as the acyclic
//! sub-graph and the transposed graph. [`EvalPlan`] builds on these to
//! determine the order in which an evaluation driver should run processors.

#[doc(inline)]
pub use edge::{EdgeKind, EdgeMask};
#[doc(inline)]
pub use eval::EvalPlan;
#[doc(inline)]
pub use graph::{CycleError, DfsTimes, Distances, GraphError, NetworkGraph, NodeId};
#[doc(inline)]
pub use processor::{Conn, PortDesc, Processor, PropertyDesc};
#[doc(inline)]
pub use visit::Visitor;

pub mod desc;
pub mod edge;
pub mod eval;
pub mod graph;
pub mod processor;
pub mod visit;
