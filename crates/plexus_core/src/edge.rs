use serde::{Deserialize, Serialize};

/// The classification of a connection between two processors.
///
/// Ordered by precedence: when the two ports of a connection disagree, the
/// greater kind wins so that a single loop port marks the whole connection as
/// feedback.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub enum EdgeKind {
    /// The port did not declare a classification.
    Unspecified,
    /// An ordinary feed-forward connection.
    #[default]
    Standard,
    /// An explicit feedback connection, excluded for topological sorting.
    Loop,
}

bitflags::bitflags! {
    /// Selects which [`EdgeKind`]s are included when building a graph.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EdgeMask: u8 {
        /// Include edges between ports with no declared classification.
        const UNSPECIFIED = 0b0000_0001;
        /// Include ordinary feed-forward edges.
        const STANDARD    = 0b0000_0010;
        /// Include feedback edges.
        const LOOP        = 0b0000_0100;
        /// Everything but feedback edges, i.e. the strictly acyclic view.
        const NON_LOOP    = Self::UNSPECIFIED.bits() | Self::STANDARD.bits();
    }
}

impl EdgeKind {
    /// The kind of a connection given the kinds declared on either end.
    pub fn of_connection(outport: EdgeKind, inport: EdgeKind) -> Self {
        outport.max(inport)
    }

    /// The single-bit mask selecting this kind.
    pub fn mask(self) -> EdgeMask {
        match self {
            EdgeKind::Unspecified => EdgeMask::UNSPECIFIED,
            EdgeKind::Standard => EdgeMask::STANDARD,
            EdgeKind::Loop => EdgeMask::LOOP,
        }
    }
}

impl EdgeMask {
    /// Whether edges of the given kind pass this mask.
    pub fn permits(self, kind: EdgeKind) -> bool {
        self.contains(kind.mask())
    }
}

impl Default for EdgeMask {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_port_dominates() {
        let kind = EdgeKind::of_connection(EdgeKind::Standard, EdgeKind::Loop);
        assert_eq!(kind, EdgeKind::Loop);
        let kind = EdgeKind::of_connection(EdgeKind::Unspecified, EdgeKind::Standard);
        assert_eq!(kind, EdgeKind::Standard);
    }

    #[test]
    fn non_loop_mask() {
        assert!(EdgeMask::NON_LOOP.permits(EdgeKind::Standard));
        assert!(EdgeMask::NON_LOOP.permits(EdgeKind::Unspecified));
        assert!(!EdgeMask::NON_LOOP.permits(EdgeKind::Loop));
        assert!(EdgeMask::default().permits(EdgeKind::Loop));
    }
}
