//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::entity::{Arc, FacilityRole, Node, ProcessingParams};
use crate::id::{ArcId, NodeId};
use crate::simulation::SimulationContext;

// ===========================================================================
// Entity constructors
// ===========================================================================

/// A facility with a small time spread around `avg` and a floor at half of
/// it.
pub fn facility(role: FacilityRole, avg: f64, cashflow: f64) -> Node {
    Node::facility(role, ProcessingParams::new(avg * 0.5, avg, avg * 0.1, cashflow))
}

/// An arc with the same shape of parameters as [`facility`].
pub fn transport(from: NodeId, to: NodeId, avg: f64, cashflow: f64) -> Arc {
    Arc::new(from, to, ProcessingParams::new(avg * 0.5, avg, avg * 0.1, cashflow))
}

/// A fixed-duration, zero-cashflow facility.
pub fn instant(role: FacilityRole, time: f64) -> Node {
    Node::facility(role, ProcessingParams::new(time, time, 0.0, 0.0))
}

// ===========================================================================
// Networks
// ===========================================================================

/// Ids of a network built by one of the helpers below.
#[derive(Debug, Clone, Default)]
pub struct NetworkIds {
    pub nodes: Vec<NodeId>,
    pub arcs: Vec<ArcId>,
}

/// Supplier -> Warehouse -> FulfillmentCenter with one arc per hop.
///
/// Nodes carry a `name` metadata entry (`node_0`, `node_1`, ...).
pub fn chain_network(seed: u64) -> (SimulationContext, NetworkIds) {
    let mut ctx = SimulationContext::new(seed);
    let mut ids = NetworkIds::default();
    let roles = [
        (FacilityRole::Supplier, 2.0, -50.0),
        (FacilityRole::Warehouse, 1.0, -20.0),
        (FacilityRole::FulfillmentCenter, 0.5, -5.0),
    ];
    for (i, (role, avg, cashflow)) in roles.into_iter().enumerate() {
        let node = facility(role, avg, cashflow).with_metadata("name", format!("node_{i}"));
        ids.nodes.push(ctx.register_node(node).expect("register node"));
    }
    for hop in ids.nodes.clone().windows(2) {
        let arc = transport(hop[0], hop[1], 0.3, -10.0);
        ids.arcs.push(ctx.register_arc(arc).expect("register arc"));
    }
    (ctx, ids)
}

/// A chain of `len` facilities: a supplier, `len - 2` warehouses and a
/// customer. Used by benchmarks and stress tests.
pub fn long_chain(seed: u64, len: usize) -> (SimulationContext, NetworkIds) {
    assert!(len >= 2, "a chain needs at least two nodes");
    let mut ctx = SimulationContext::new(seed);
    let mut ids = NetworkIds::default();
    for i in 0..len {
        let role = match i {
            0 => FacilityRole::Supplier,
            i if i == len - 1 => FacilityRole::Customer,
            _ => FacilityRole::Warehouse,
        };
        let cashflow = if role == FacilityRole::Customer { 100.0 } else { -1.0 };
        ids.nodes
            .push(ctx.register_node(facility(role, 1.0, cashflow)).expect("register node"));
    }
    for hop in ids.nodes.clone().windows(2) {
        ids.arcs.push(
            ctx.register_arc(transport(hop[0], hop[1], 0.5, -1.0))
                .expect("register arc"),
        );
    }
    (ctx, ids)
}

/// Two routes from node 0 to node 6: a slow cheap one via node 2 and a
/// fast expensive one via node 4.
pub fn diamond_network(seed: u64) -> (SimulationContext, NetworkIds) {
    let mut ctx = SimulationContext::new(seed);
    let mut ids = NetworkIds::default();
    for role in [
        FacilityRole::Supplier,
        FacilityRole::Warehouse,
        FacilityRole::Warehouse,
        FacilityRole::Customer,
    ] {
        ids.nodes
            .push(ctx.register_node(facility(role, 1.0, -1.0)).expect("register node"));
    }
    let [a, cheap, fast, d] = [ids.nodes[0], ids.nodes[1], ids.nodes[2], ids.nodes[3]];
    for (from, to, avg, cashflow) in [
        (a, cheap, 10.0, -1.0),
        (cheap, d, 10.0, -1.0),
        (a, fast, 1.0, -20.0),
        (fast, d, 1.0, -20.0),
    ] {
        ids.arcs.push(
            ctx.register_arc(transport(from, to, avg, cashflow))
                .expect("register arc"),
        );
    }
    (ctx, ids)
}
