//! Error types for the graph module.

use thiserror::Error;

/// A structural problem preventing the graph from producing a valid order.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A topological order was requested over a cycle that the edge mask did
    /// not exclude.
    #[error(transparent)]
    Cycle(#[from] CycleError),
    /// The named processor has no node in the graph.
    #[error("processor `{0}` is not part of the graph")]
    UnknownProcessor(String),
    /// No node has an out-degree of zero, so nothing consumes the computed
    /// values.
    #[error("the graph has no leaves")]
    NoLeaves,
}

/// The graph contains cycles and therefore has no topological order.
///
/// Each cycle lists the ids of the processors forming one strongly connected
/// component, sorted.
#[derive(Debug, Error)]
#[error("graph contains {} cycle(s): {}", .cycles.len(), describe(.cycles))]
pub struct CycleError {
    pub cycles: Vec<Vec<String>>,
}

fn describe(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|c| format!("[{}]", c.join(", ")))
        .collect::<Vec<_>>()
        .join(" ")
}
