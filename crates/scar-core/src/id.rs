use serde::{Deserialize, Serialize};

/// A vertex in the routing graph. Every node owns two consecutive vertices:
/// an inbound sink and an outbound source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

impl VertexId {
    /// Position of this vertex in the adjacency tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a node. The value equals the node's inbound vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The vertex orders arrive at.
    #[inline]
    pub fn inbound(self) -> VertexId {
        VertexId(self.0)
    }

    /// The vertex orders leave from. Always `inbound + 1`.
    #[inline]
    pub fn outbound(self) -> VertexId {
        VertexId(self.0 + 1)
    }
}

/// Identifies an arc (transport link). Drawn from a counter independent of
/// the vertex numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArcId(pub u32);

/// Identifies an order. Equal to its position in the order registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u32);

/// Identifies a scheduled event. Doubles as the FIFO tie-break sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_is_inbound_plus_one() {
        let node = NodeId(4);
        assert_eq!(node.inbound(), VertexId(4));
        assert_eq!(node.outbound(), VertexId(5));
    }

    #[test]
    fn event_ids_order_by_sequence() {
        assert!(EventId(1) < EventId(2));
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ArcId(0), "ocean");
        map.insert(ArcId(1), "road");
        assert_eq!(map[&ArcId(1)], "road");
    }
}
