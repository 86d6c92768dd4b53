//! Orders and the lifecycle state machine that moves them along their
//! planned path.
//!
//! An order alternates between dwelling at a node and travelling an arc:
//!
//! ```text
//! started -> shipped -> arrived -> shipped -> arrived ... -> completed
//! ```
//!
//! [`plan_transition`] is a pure function of the order's position and the
//! network. It decides what to record, what to charge, which hooks to call
//! and what comes next; the simulation context applies the plan.
//!
//! Accounting posts one effect per stage, at the stage's origin entity:
//! `shipped` charges the node being left and `arrived` charges the arc just
//! travelled. Reaching the destination writes a single `completed` record.

use crate::entity::{Arc, EntityRef, MetaValue, Metadata, Node};
use crate::graph::{Objective, RoutingGraph};
use crate::hooks::HookPoint;
use crate::id::{ArcId, NodeId, OrderId, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the order lifecycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot enter {status}: {reason}")]
    InvalidTransition {
        status: OrderStatus,
        reason: &'static str,
    },
    #[error("unknown order status: {0:?}")]
    UnknownStatus(String),
    #[error("order {0:?} has already been started")]
    AlreadyStarted(OrderId),
    #[error("invalid planned path: {0}")]
    InvalidPlannedPath(&'static str),
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle stage of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Started,
    Shipped,
    Arrived,
    Completed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Started => "started",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Arrived => "arrived",
            OrderStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(OrderStatus::Started),
            "shipped" => Ok(OrderStatus::Shipped),
            "arrived" => Ok(OrderStatus::Arrived),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(LifecycleError::UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One entry of an order's audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Simulation time the stage was entered.
    pub time: f64,
    pub status: OrderStatus,
    /// Signed cashflow posted by this stage.
    pub cashflow: f64,
    /// Time since the previous record, rounded to 3 decimals.
    pub t_delta: f64,
    /// The entity the order was at when the record was written.
    pub entity: EntityRef,
    /// Entity metadata merged with the order's enrichment.
    pub meta: Metadata,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A quantity of units travelling a fixed planned path from an origin
/// facility to a destination facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,
    origin: NodeId,
    destination: NodeId,
    units: u32,
    planned_path: Vec<VertexId>,
    cursor: EntityRef,
    /// Index into `planned_path` of the inbound vertex of the cursor node,
    /// or of the arc's destination while travelling.
    hop: usize,
    started: bool,
    prev_time: f64,
    history: Vec<StageRecord>,
}

impl Order {
    /// Create an order. The planned path is fixed for the order's lifetime
    /// and is validated when the order is registered.
    pub fn new(origin: NodeId, destination: NodeId, units: u32, planned_path: Vec<VertexId>) -> Self {
        Self {
            id: None,
            origin,
            destination,
            units,
            planned_path,
            cursor: EntityRef::Node(origin),
            hop: 0,
            started: false,
            prev_time: 0.0,
            history: Vec::new(),
        }
    }

    /// `None` until registered.
    pub fn id(&self) -> Option<OrderId> {
        self.id
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn units(&self) -> u32 {
        self.units
    }

    pub fn planned_path(&self) -> &[VertexId] {
        &self.planned_path
    }

    /// The node or arc the order is currently at.
    pub fn cursor(&self) -> EntityRef {
        self.cursor
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_completed(&self) -> bool {
        self.history
            .last()
            .is_some_and(|r| r.status == OrderStatus::Completed)
    }

    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    pub fn status(&self) -> Option<OrderStatus> {
        self.history.last().map(|r| r.status)
    }

    /// Sum of all cashflow posted so far.
    pub fn total_cashflow(&self) -> f64 {
        self.history.iter().map(|r| r.cashflow).sum()
    }

    /// Add to the cashflow of the latest record. No-op before the first
    /// record exists.
    pub fn add_cashflow(&mut self, amount: f64) {
        if let Some(record) = self.history.last_mut() {
            record.cashflow += amount;
        }
    }

    /// Overwrite the cashflow of the latest record.
    pub fn set_current_cashflow(&mut self, cashflow: f64) {
        if let Some(record) = self.history.last_mut() {
            record.cashflow = cashflow;
        }
    }

    pub(crate) fn annotate(&mut self, key: String, value: MetaValue) {
        if let Some(record) = self.history.last_mut() {
            record.meta.insert(key, value);
        }
    }

    pub(crate) fn assign_id(&mut self, id: OrderId) {
        self.id = Some(id);
    }

    pub(crate) fn mark_started(&mut self, now: f64) {
        self.started = true;
        self.prev_time = now;
    }

    pub(crate) fn prev_time(&self) -> f64 {
        self.prev_time
    }

    /// Append a record and make its time the reference for the next delta.
    pub(crate) fn push_record(&mut self, record: StageRecord) {
        self.prev_time = record.time;
        self.history.push(record);
    }

    pub(crate) fn move_to(&mut self, cursor: EntityRef, hop: usize) {
        self.cursor = cursor;
        self.hop = hop;
    }
}

// ---------------------------------------------------------------------------
// Network view
// ---------------------------------------------------------------------------

/// Read-only access to everything a transition may consult.
#[derive(Clone, Copy)]
pub struct NetworkView<'a> {
    pub nodes: &'a BTreeMap<NodeId, Node>,
    pub arcs: &'a BTreeMap<ArcId, Arc>,
    pub graph: &'a RoutingGraph,
}

impl<'a> NetworkView<'a> {
    pub fn node(&self, id: NodeId) -> Option<&'a Node> {
        self.nodes.get(&id)
    }

    pub fn arc(&self, id: ArcId) -> Option<&'a Arc> {
        self.arcs.get(&id)
    }
}

/// Check a planned path against the graph: it must start at the origin's
/// inbound vertex, end at the destination's inbound vertex and only use
/// existing edges.
pub fn validate_planned_path(
    path: &[VertexId],
    origin: NodeId,
    destination: NodeId,
    graph: &RoutingGraph,
) -> Result<(), LifecycleError> {
    match (path.first(), path.last()) {
        (None, _) | (_, None) => return Err(LifecycleError::InvalidPlannedPath("path is empty")),
        (Some(&first), _) if first != origin.inbound() => {
            return Err(LifecycleError::InvalidPlannedPath(
                "path does not start at the origin",
            ));
        }
        (_, Some(&last)) if last != destination.inbound() => {
            return Err(LifecycleError::InvalidPlannedPath(
                "path does not end at the destination",
            ));
        }
        _ => {}
    }
    if path
        .windows(2)
        .any(|hop| graph.weight(hop[0], hop[1], Objective::Time).is_none())
    {
        return Err(LifecycleError::InvalidPlannedPath(
            "path uses an edge that is not in the graph",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// How long to wait before the next stage fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Fire at the current time.
    Immediate,
    /// Fire after a processing time sampled from the new cursor.
    Sampled,
}

/// Everything one lifecycle step does, decided before any state changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Status label of the record written by this step.
    pub record_status: OrderStatus,
    /// Entity whose cashflow is posted to the record, if any.
    pub charge: Option<EntityRef>,
    /// Facility hooks to run, in order.
    pub hooks: Vec<(NodeId, HookPoint)>,
    /// Cursor after the step.
    pub cursor: EntityRef,
    pub hop: usize,
    /// Stage to schedule next; `None` ends the lifecycle.
    pub next: Option<(OrderStatus, Delay)>,
}

fn invalid(status: OrderStatus, reason: &'static str) -> LifecycleError {
    LifecycleError::InvalidTransition { status, reason }
}

fn cursor_node<'a>(
    order: &Order,
    status: OrderStatus,
    net: &NetworkView<'a>,
) -> Result<(NodeId, &'a Node), LifecycleError> {
    let EntityRef::Node(id) = order.cursor else {
        return Err(invalid(status, "cursor is not a node"));
    };
    let node = net
        .node(id)
        .ok_or(invalid(status, "cursor node is not registered"))?;
    Ok((id, node))
}

/// Decide the effects of entering `status` from the order's current
/// position.
pub fn plan_transition(
    order: &Order,
    status: OrderStatus,
    net: &NetworkView<'_>,
) -> Result<Transition, LifecycleError> {
    let last_hop = order.planned_path.len().saturating_sub(1);
    if order.is_completed() {
        return Err(invalid(status, "order is already completed"));
    }

    match status {
        OrderStatus::Started => {
            if order.is_started() || !order.history.is_empty() {
                return Err(match order.id {
                    Some(id) => LifecycleError::AlreadyStarted(id),
                    None => invalid(status, "order has already been placed"),
                });
            }
            let (id, node) = cursor_node(order, status, net)?;
            if !node.is_facility() {
                return Err(invalid(status, "orders can only be placed at a facility"));
            }
            let next = if order.hop == last_hop {
                (OrderStatus::Completed, Delay::Immediate)
            } else {
                (OrderStatus::Shipped, Delay::Sampled)
            };
            Ok(Transition {
                record_status: status,
                charge: None,
                hooks: vec![(id, HookPoint::Placed)],
                cursor: order.cursor,
                hop: order.hop,
                next: Some(next),
            })
        }
        OrderStatus::Shipped => {
            let (id, node) = cursor_node(order, status, net)?;
            let path = &order.planned_path;
            if path.get(order.hop) != Some(&id.inbound())
                || path.get(order.hop + 1) != Some(&id.outbound())
            {
                return Err(invalid(status, "cursor node is off the planned path"));
            }
            let &next_vertex = path
                .get(order.hop + 2)
                .ok_or(invalid(status, "planned path has no hop left to ship along"))?;
            let arc = net
                .graph
                .arc_between(id.outbound(), next_vertex)
                .ok_or(invalid(status, "no arc joins the planned hop"))?;

            let hooks = if node.is_facility() {
                vec![(id, HookPoint::Shipped)]
            } else {
                Vec::new()
            };
            Ok(Transition {
                record_status: status,
                charge: Some(EntityRef::Node(id)),
                hooks,
                cursor: EntityRef::Arc(arc),
                hop: order.hop + 2,
                next: Some((OrderStatus::Arrived, Delay::Sampled)),
            })
        }
        OrderStatus::Arrived => {
            let EntityRef::Arc(arc_id) = order.cursor else {
                return Err(invalid(status, "cursor is not an arc"));
            };
            let arc = net
                .arc(arc_id)
                .ok_or(invalid(status, "cursor arc is not registered"))?;
            let dest = arc.destination();
            if order.planned_path.get(order.hop) != Some(&dest.inbound()) {
                return Err(invalid(status, "arc destination is off the planned path"));
            }
            let node = net
                .node(dest)
                .ok_or(invalid(status, "arc destination is not registered"))?;

            let mut hooks = Vec::new();
            if node.is_facility() {
                hooks.push((dest, HookPoint::Arrived));
            }

            let terminal = dest == order.destination && order.hop == last_hop;
            let (record_status, next) = if terminal {
                if !node.is_facility() {
                    return Err(invalid(
                        OrderStatus::Completed,
                        "orders can only complete at a facility",
                    ));
                }
                hooks.push((dest, HookPoint::Completed));
                (OrderStatus::Completed, None)
            } else {
                (status, Some((OrderStatus::Shipped, Delay::Sampled)))
            };
            Ok(Transition {
                record_status,
                charge: Some(EntityRef::Arc(arc_id)),
                hooks,
                cursor: EntityRef::Node(dest),
                hop: order.hop,
                next,
            })
        }
        OrderStatus::Completed => {
            let (id, node) = cursor_node(order, status, net)?;
            if id != order.destination || order.hop != last_hop {
                return Err(invalid(status, "order is not at its destination"));
            }
            if !node.is_facility() {
                return Err(invalid(status, "orders can only complete at a facility"));
            }
            Ok(Transition {
                record_status: status,
                charge: None,
                hooks: vec![(id, HookPoint::Completed)],
                cursor: order.cursor,
                hop: order.hop,
                next: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FacilityRole, ProcessingParams};

    struct Net {
        nodes: BTreeMap<NodeId, Node>,
        arcs: BTreeMap<ArcId, Arc>,
        graph: RoutingGraph,
    }

    impl Net {
        fn view(&self) -> NetworkView<'_> {
            NetworkView {
                nodes: &self.nodes,
                arcs: &self.arcs,
                graph: &self.graph,
            }
        }
    }

    /// Facility 0 -> waypoint 2 -> facility 4.
    fn chain() -> Net {
        let mut graph = RoutingGraph::new();
        let mut nodes = BTreeMap::new();
        let mut arcs = BTreeMap::new();
        let p = ProcessingParams::new(0.0, 1.0, 0.0, -1.0);
        for mut node in [
            Node::facility(FacilityRole::Supplier, p),
            Node::waypoint(p),
            Node::facility(FacilityRole::Customer, p),
        ] {
            let id = graph.register_node(&mut node);
            nodes.insert(id, node);
        }
        for (a, b) in [(0, 2), (2, 4)] {
            let mut arc = Arc::new(NodeId(a), NodeId(b), p);
            let id = graph.register_arc(&mut arc).unwrap();
            arcs.insert(id, arc);
        }
        Net { nodes, arcs, graph }
    }

    fn chain_order(net: &Net) -> Order {
        let path = net
            .graph
            .shortest_path(NodeId(0), NodeId(4), Objective::Time)
            .unwrap();
        Order::new(NodeId(0), NodeId(4), 1, path)
    }

    fn apply(order: &mut Order, t: &Transition) {
        order.move_to(t.cursor, t.hop);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            OrderStatus::Started,
            OrderStatus::Shipped,
            OrderStatus::Arrived,
            OrderStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "teleported".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err, LifecycleError::UnknownStatus("teleported".into()));
    }

    #[test]
    fn full_walk_through_chain() {
        let net = chain();
        let view = net.view();
        let mut order = chain_order(&net);
        let mut status = OrderStatus::Started;
        let mut labels = Vec::new();
        let mut charges = Vec::new();

        loop {
            let t = plan_transition(&order, status, &view).unwrap();
            labels.push(t.record_status);
            charges.push(t.charge);
            apply(&mut order, &t);
            match t.next {
                Some((next, _)) => status = next,
                None => break,
            }
        }

        assert_eq!(
            labels,
            vec![
                OrderStatus::Started,
                OrderStatus::Shipped,
                OrderStatus::Arrived,
                OrderStatus::Shipped,
                OrderStatus::Completed,
            ]
        );
        assert_eq!(
            charges,
            vec![
                None,
                Some(EntityRef::Node(NodeId(0))),
                Some(EntityRef::Arc(ArcId(0))),
                Some(EntityRef::Node(NodeId(2))),
                Some(EntityRef::Arc(ArcId(1))),
            ]
        );
        assert_eq!(order.cursor(), EntityRef::Node(NodeId(4)));
    }

    #[test]
    fn waypoints_get_no_hooks() {
        let net = chain();
        let view = net.view();
        let mut order = chain_order(&net);
        for status in [OrderStatus::Started, OrderStatus::Shipped] {
            let t = plan_transition(&order, status, &view).unwrap();
            apply(&mut order, &t);
        }
        let arrived = plan_transition(&order, OrderStatus::Arrived, &view).unwrap();
        assert!(arrived.hooks.is_empty());
        assert_eq!(arrived.next, Some((OrderStatus::Shipped, Delay::Sampled)));
    }

    #[test]
    fn terminal_arrival_runs_both_hooks() {
        let net = chain();
        let view = net.view();
        let mut order = chain_order(&net);
        for status in [
            OrderStatus::Started,
            OrderStatus::Shipped,
            OrderStatus::Arrived,
            OrderStatus::Shipped,
        ] {
            let t = plan_transition(&order, status, &view).unwrap();
            apply(&mut order, &t);
        }
        let t = plan_transition(&order, OrderStatus::Arrived, &view).unwrap();
        assert_eq!(
            t.hooks,
            vec![
                (NodeId(4), HookPoint::Arrived),
                (NodeId(4), HookPoint::Completed)
            ]
        );
        assert_eq!(t.next, None);
    }

    #[test]
    fn arrived_without_arc_cursor_is_invalid() {
        let net = chain();
        let order = chain_order(&net);
        let err = plan_transition(&order, OrderStatus::Arrived, &net.view()).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                status: OrderStatus::Arrived,
                reason: "cursor is not an arc"
            }
        );
    }

    #[test]
    fn completed_away_from_destination_is_invalid() {
        let net = chain();
        let order = chain_order(&net);
        let err = plan_transition(&order, OrderStatus::Completed, &net.view()).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn started_orders_cannot_start_again() {
        let net = chain();
        let mut order = chain_order(&net);
        order.mark_started(0.0);
        let err = plan_transition(&order, OrderStatus::Started, &net.view()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                status: OrderStatus::Started,
                ..
            }
        ));

        order.assign_id(OrderId(3));
        assert_eq!(
            plan_transition(&order, OrderStatus::Started, &net.view()),
            Err(LifecycleError::AlreadyStarted(OrderId(3)))
        );
    }

    #[test]
    fn start_at_waypoint_is_invalid() {
        let net = chain();
        let path = vec![VertexId(2), VertexId(3), VertexId(4)];
        let order = Order::new(NodeId(2), NodeId(4), 1, path);
        let err = plan_transition(&order, OrderStatus::Started, &net.view()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                status: OrderStatus::Started,
                ..
            }
        ));
    }

    #[test]
    fn same_origin_and_destination_completes_immediately() {
        let net = chain();
        let order = Order::new(NodeId(0), NodeId(0), 1, vec![VertexId(0)]);
        let t = plan_transition(&order, OrderStatus::Started, &net.view()).unwrap();
        assert_eq!(t.next, Some((OrderStatus::Completed, Delay::Immediate)));
        let done = plan_transition(&order, OrderStatus::Completed, &net.view()).unwrap();
        assert_eq!(done.hooks, vec![(NodeId(0), HookPoint::Completed)]);
        assert_eq!(done.next, None);
    }

    #[test]
    fn planned_path_validation() {
        let net = chain();
        let good = net
            .graph
            .shortest_path(NodeId(0), NodeId(4), Objective::Time)
            .unwrap();
        assert!(validate_planned_path(&good, NodeId(0), NodeId(4), &net.graph).is_ok());

        let cases: [(Vec<VertexId>, &str); 4] = [
            (vec![], "path is empty"),
            (good[1..].to_vec(), "path does not start at the origin"),
            (good[..good.len() - 1].to_vec(), "path does not end at the destination"),
            (
                vec![VertexId(0), VertexId(1), VertexId(4)],
                "path uses an edge that is not in the graph",
            ),
        ];
        for (path, reason) in cases {
            assert_eq!(
                validate_planned_path(&path, NodeId(0), NodeId(4), &net.graph),
                Err(LifecycleError::InvalidPlannedPath(reason))
            );
        }
    }

    #[test]
    fn cashflow_helpers_touch_latest_record() {
        let mut order = Order::new(NodeId(0), NodeId(0), 2, vec![VertexId(0)]);
        order.add_cashflow(5.0);
        assert!(order.history().is_empty());

        order.push_record(StageRecord {
            time: 1.0,
            status: OrderStatus::Started,
            cashflow: 0.0,
            t_delta: 0.0,
            entity: EntityRef::Node(NodeId(0)),
            meta: Metadata::new(),
        });
        order.add_cashflow(-3.0);
        order.add_cashflow(-2.0);
        assert_eq!(order.total_cashflow(), -5.0);
        order.set_current_cashflow(7.0);
        assert_eq!(order.history()[0].cashflow, 7.0);
        assert_eq!(order.prev_time(), 1.0);
        assert_eq!(order.status(), Some(OrderStatus::Started));
    }
}
