//! The simulation context: composition root of one simulation run.
//!
//! # Architecture
//!
//! A [`SimulationContext`] owns:
//! - An [`EventQueue`] of [`SimEvent`]s (and with it the clock)
//! - A [`RoutingGraph`] kept in sync with live entity parameters
//! - The node, arc and order registries
//! - A [`SimRng`] seeded from [`SimConfig`]
//! - Per-node [`FacilityHooks`] and per-order [`MetadataEnricher`]s
//!
//! Events are plain data. Executing one dispatches to the order lifecycle
//! or to a parameter change, which may schedule further events. Nothing
//! runs concurrently; every transition completes before the next event is
//! popped.

use crate::config::{ConfigError, SimConfig};
use crate::entity::{Arc, Entity, EntityError, EntityRef, EntityView, Node, ParamChange};
use crate::graph::{GraphError, Objective, RouteOptions, RoutingGraph};
use crate::hooks::{
    DefaultEnricher, FacilityHooks, HookContext, MetadataEnricher, apply_role, invoke,
};
use crate::id::{ArcId, EventId, NodeId, OrderId, VertexId};
use crate::order::{
    Delay, LifecycleError, NetworkView, Order, OrderStatus, StageRecord, plan_transition,
    validate_planned_path,
};
use crate::queue::{EventLabel, EventLogEntry, EventQueue, ScheduleError, round_to};
use crate::rng::SimRng;
use crate::sim::RunSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Decimals `t_delta` is rounded to in history records.
const T_DELTA_PRECISION: u32 = 3;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Everything that can be scheduled on a simulation's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// Place a registered order at its origin.
    StartOrder(OrderId),
    /// Move an order into the given lifecycle stage.
    AdvanceOrder { order: OrderId, status: OrderStatus },
    /// Partially update an entity's live parameters.
    ChangeParameters { entity: EntityRef, change: ParamChange },
    /// Restore an entity's construction-time parameters.
    ResetParameters(EntityRef),
}

impl EventLabel for SimEvent {
    fn label(&self) -> &'static str {
        match self {
            SimEvent::StartOrder(_) => "start_order",
            SimEvent::AdvanceOrder { status, .. } => status.as_str(),
            SimEvent::ChangeParameters { .. } => "change_parameters",
            SimEvent::ResetParameters(_) => "reset_parameters",
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Any error raised by a simulation context operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("object is already registered as {0:?}")]
    AlreadyRegistered(ObjectId),
    #[error("node not found: {0:?}")]
    UnknownNode(NodeId),
    #[error("arc not found: {0:?}")]
    UnknownArc(ArcId),
    #[error("order not found: {0:?}")]
    UnknownOrder(OrderId),
    #[error("no pending event with id {0:?}")]
    UnknownEvent(EventId),
}

// ---------------------------------------------------------------------------
// Registrable objects
// ---------------------------------------------------------------------------

/// Anything that can be registered with a context.
#[derive(Debug, Clone, PartialEq)]
pub enum SimObject {
    Node(Node),
    Arc(Arc),
    Order(Order),
}

impl From<Node> for SimObject {
    fn from(v: Node) -> Self {
        SimObject::Node(v)
    }
}

impl From<Arc> for SimObject {
    fn from(v: Arc) -> Self {
        SimObject::Arc(v)
    }
}

impl From<Order> for SimObject {
    fn from(v: Order) -> Self {
        SimObject::Order(v)
    }
}

/// The identifier a registered object received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectId {
    Node(NodeId),
    Arc(ArcId),
    Order(OrderId),
}

// ---------------------------------------------------------------------------
// SimulationContext
// ---------------------------------------------------------------------------

/// One simulation run: clock, network, orders and randomness.
pub struct SimulationContext {
    pub(crate) config: SimConfig,
    pub(crate) queue: EventQueue<SimEvent>,
    pub(crate) graph: RoutingGraph,
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) arcs: BTreeMap<ArcId, Arc>,
    pub(crate) orders: Vec<Order>,
    pub(crate) rng: SimRng,
    /// Not part of a snapshot.
    pub(crate) hooks: BTreeMap<NodeId, Box<dyn FacilityHooks>>,
    /// Not part of a snapshot.
    pub(crate) enrichers: BTreeMap<OrderId, Box<dyn MetadataEnricher>>,
}

impl fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationContext")
            .field("config", &self.config)
            .field("now", &self.queue.now())
            .field("pending", &self.queue.len())
            .field("nodes", &self.nodes.len())
            .field("arcs", &self.arcs.len())
            .field("orders", &self.orders.len())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self::build(SimConfig::default())
    }
}

/// Resolve an entity reference against the registries.
fn lookup<'a>(
    nodes: &'a BTreeMap<NodeId, Node>,
    arcs: &'a BTreeMap<ArcId, Arc>,
    entity: EntityRef,
) -> Result<&'a dyn Entity, SimError> {
    match entity {
        EntityRef::Node(id) => nodes
            .get(&id)
            .map(|n| n as &dyn Entity)
            .ok_or(SimError::UnknownNode(id)),
        EntityRef::Arc(id) => arcs
            .get(&id)
            .map(|a| a as &dyn Entity)
            .ok_or(SimError::UnknownArc(id)),
    }
}

impl SimulationContext {
    /// Create an empty context with default settings and the given seed.
    pub fn new(seed: u64) -> Self {
        Self::build(SimConfig::with_seed(seed))
    }

    /// Create an empty context from explicit settings.
    pub fn with_config(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        let mut queue = EventQueue::new(config.time_precision);
        if config.log_events {
            queue = queue.with_event_log();
        }
        Self {
            rng: SimRng::new(config.seed),
            config,
            queue,
            graph: RoutingGraph::new(),
            nodes: BTreeMap::new(),
            arcs: BTreeMap::new(),
            orders: Vec::new(),
            hooks: BTreeMap::new(),
            enrichers: BTreeMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current simulation time.
    pub fn current_time(&self) -> f64 {
        self.queue.now()
    }

    /// Number of live events waiting to fire.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Fire time of the next pending event.
    pub fn next_event_time(&self) -> Option<f64> {
        self.queue.peek_time()
    }

    /// Executed-event log, when enabled in the config.
    pub fn event_log(&self) -> Option<&[EventLogEntry]> {
        self.queue.event_log()
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn arc(&self, id: ArcId) -> Option<&Arc> {
        self.arcs.get(&id)
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(id.0 as usize)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(&id, n)| (id, n))
    }

    pub fn arcs(&self) -> impl Iterator<Item = (ArcId, &Arc)> {
        self.arcs.iter().map(|(&id, a)| (id, a))
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Borrow the registries and graph together.
    pub fn network(&self) -> NetworkView<'_> {
        NetworkView {
            nodes: &self.nodes,
            arcs: &self.arcs,
            graph: &self.graph,
        }
    }

    /// The live parameters and metadata of a registered entity.
    pub fn entity(&self, entity: EntityRef) -> Result<&dyn Entity, SimError> {
        lookup(&self.nodes, &self.arcs, entity)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a node, arc or order and return its new identifier.
    pub fn register_object(&mut self, object: impl Into<SimObject>) -> Result<ObjectId, SimError> {
        match object.into() {
            SimObject::Node(node) => self.register_node(node).map(ObjectId::Node),
            SimObject::Arc(arc) => self.register_arc(arc).map(ObjectId::Arc),
            SimObject::Order(order) => self.register_order(order).map(ObjectId::Order),
        }
    }

    /// Register a node. Its parameters are validated first.
    pub fn register_node(&mut self, mut node: Node) -> Result<NodeId, SimError> {
        if let Some(id) = node.id() {
            return Err(SimError::AlreadyRegistered(ObjectId::Node(id)));
        }
        node.params().validate()?;
        let id = self.graph.register_node(&mut node);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Register an arc. Both endpoints must be registered first and its
    /// parameters must be valid.
    pub fn register_arc(&mut self, mut arc: Arc) -> Result<ArcId, SimError> {
        if let Some(id) = arc.id() {
            return Err(SimError::AlreadyRegistered(ObjectId::Arc(id)));
        }
        arc.params().validate()?;
        let id = self.graph.register_arc(&mut arc)?;
        self.arcs.insert(id, arc);
        Ok(id)
    }

    /// Register an order after checking its planned path against the graph.
    pub fn register_order(&mut self, mut order: Order) -> Result<OrderId, SimError> {
        if let Some(id) = order.id() {
            return Err(SimError::AlreadyRegistered(ObjectId::Order(id)));
        }
        for endpoint in [order.origin(), order.destination()] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(SimError::UnknownNode(endpoint));
            }
        }
        validate_planned_path(
            order.planned_path(),
            order.origin(),
            order.destination(),
            &self.graph,
        )?;
        let id = OrderId(self.orders.len() as u32);
        order.assign_id(id);
        debug!(order = id.0, units = order.units(), "registered order");
        self.orders.push(order);
        Ok(id)
    }

    /// Route a new order under `objective` and register it.
    pub fn plan_order(
        &mut self,
        origin: NodeId,
        destination: NodeId,
        units: u32,
        objective: Objective,
    ) -> Result<OrderId, SimError> {
        let path = self.graph.shortest_path(origin, destination, objective)?;
        self.register_order(Order::new(origin, destination, units, path))
    }

    /// Attach collaborator hooks to a node, replacing any previous ones.
    /// Hooks only run at facilities.
    pub fn set_facility_hooks(
        &mut self,
        node: NodeId,
        hooks: impl FacilityHooks + 'static,
    ) -> Result<(), SimError> {
        if !self.nodes.contains_key(&node) {
            return Err(SimError::UnknownNode(node));
        }
        self.hooks.insert(node, Box::new(hooks));
        Ok(())
    }

    /// Replace the default `{"time": floor(now)}` enrichment of an order's
    /// history records.
    pub fn set_metadata_enricher(
        &mut self,
        order: OrderId,
        enricher: impl MetadataEnricher + 'static,
    ) -> Result<(), SimError> {
        if self.order(order).is_none() {
            return Err(SimError::UnknownOrder(order));
        }
        self.enrichers.insert(order, Box::new(enricher));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Schedule `event` to fire `delay` time units from now.
    ///
    /// Ids referenced by the event must already be registered.
    pub fn schedule(&mut self, delay: f64, event: SimEvent) -> Result<EventId, SimError> {
        match &event {
            SimEvent::StartOrder(order) | SimEvent::AdvanceOrder { order, .. } => {
                if self.order(*order).is_none() {
                    return Err(SimError::UnknownOrder(*order));
                }
            }
            SimEvent::ChangeParameters { entity, .. } | SimEvent::ResetParameters(entity) => {
                self.entity(*entity)?;
            }
        }
        Ok(self.queue.schedule(delay, event)?)
    }

    /// Remove a pending event so it never fires.
    pub fn cancel_event(&mut self, id: EventId) -> Result<(), SimError> {
        if self.queue.cancel(id) {
            debug!(event = id.0, "cancelled event");
            Ok(())
        } else {
            Err(SimError::UnknownEvent(id))
        }
    }

    /// Schedule an order to be placed at its origin after `delay`.
    pub fn start_order(&mut self, order: OrderId, delay: f64) -> Result<EventId, SimError> {
        let o = self.order(order).ok_or(SimError::UnknownOrder(order))?;
        if o.is_started() {
            return Err(LifecycleError::AlreadyStarted(order).into());
        }
        self.schedule(delay, SimEvent::StartOrder(order))
    }

    pub fn schedule_parameter_change(
        &mut self,
        delay: f64,
        entity: EntityRef,
        change: ParamChange,
    ) -> Result<EventId, SimError> {
        self.schedule(delay, SimEvent::ChangeParameters { entity, change })
    }

    pub fn schedule_parameter_reset(
        &mut self,
        delay: f64,
        entity: EntityRef,
    ) -> Result<EventId, SimError> {
        self.schedule(delay, SimEvent::ResetParameters(entity))
    }

    // -----------------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------------

    /// Partially update an entity's live parameters and refresh its graph
    /// edge.
    pub fn change_parameters(
        &mut self,
        entity: EntityRef,
        change: &ParamChange,
    ) -> Result<(), SimError> {
        self.mutate_entity(entity, |e| e.change_parameters(change))?;
        debug!(?entity, ?change, now = self.queue.now(), "changed parameters");
        Ok(())
    }

    /// Restore an entity's construction-time parameters and refresh its
    /// graph edge.
    pub fn reset_parameters(&mut self, entity: EntityRef) -> Result<(), SimError> {
        self.mutate_entity(entity, |e| e.reset_parameters())?;
        debug!(?entity, now = self.queue.now(), "reset parameters");
        Ok(())
    }

    fn mutate_entity(
        &mut self,
        entity: EntityRef,
        apply: impl FnOnce(&mut dyn Entity) -> Result<(), EntityError>,
    ) -> Result<(), SimError> {
        match entity {
            EntityRef::Node(id) => {
                let node = self.nodes.get_mut(&id).ok_or(SimError::UnknownNode(id))?;
                apply(&mut *node)?;
                self.graph.apply_parameter_change(EntityView::Node(node));
            }
            EntityRef::Arc(id) => {
                let arc = self.arcs.get_mut(&id).ok_or(SimError::UnknownArc(id))?;
                apply(&mut *arc)?;
                self.graph.apply_parameter_change(EntityView::Arc(arc));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    pub fn shortest_path(
        &self,
        origin: NodeId,
        destination: NodeId,
        objective: Objective,
    ) -> Result<Vec<VertexId>, SimError> {
        Ok(self.graph.shortest_path(origin, destination, objective)?)
    }

    pub fn path_weight(&self, path: &[VertexId], objective: Objective) -> Result<f64, SimError> {
        Ok(self.graph.path_weight(path, objective)?)
    }

    pub fn route_options(
        &self,
        origin: NodeId,
        destination: NodeId,
    ) -> Result<RouteOptions, SimError> {
        Ok(self.graph.route_options(origin, destination)?)
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    /// Execute the next pending event regardless of its fire time.
    ///
    /// Returns the executed event's id, or `None` if the queue is empty.
    pub fn step(&mut self) -> Result<Option<EventId>, SimError> {
        let Some(event) = self.queue.pop() else {
            return Ok(None);
        };
        self.dispatch(event.action)?;
        Ok(Some(event.id))
    }

    /// Execute every event firing at or before `max_time`. Later events stay
    /// queued, so a subsequent call with a larger bound resumes the run.
    ///
    /// The first error aborts the run; the failing event has been consumed.
    pub fn run(&mut self, max_time: f64) -> Result<RunSummary, SimError> {
        info!(
            max_time,
            now = self.queue.now(),
            pending = self.queue.len(),
            "simulation run started"
        );
        let mut events_executed = 0;
        while let Some(event) = self.queue.pop_due(max_time) {
            self.dispatch(event.action)?;
            events_executed += 1;
        }
        let summary = RunSummary {
            events_executed,
            final_time: self.queue.now(),
            pending: self.queue.len(),
        };
        info!(
            events = summary.events_executed,
            now = summary.final_time,
            pending = summary.pending,
            "simulation run finished"
        );
        Ok(summary)
    }

    fn dispatch(&mut self, event: SimEvent) -> Result<(), SimError> {
        match event {
            SimEvent::StartOrder(order) => self.place_order(order),
            SimEvent::AdvanceOrder { order, status } => self.advance_order(order, status),
            SimEvent::ChangeParameters { entity, change } => {
                self.change_parameters(entity, &change)
            }
            SimEvent::ResetParameters(entity) => self.reset_parameters(entity),
        }
    }

    fn place_order(&mut self, id: OrderId) -> Result<(), SimError> {
        let order = self
            .orders
            .get(id.0 as usize)
            .ok_or(SimError::UnknownOrder(id))?;
        if order.is_started() {
            return Err(LifecycleError::AlreadyStarted(id).into());
        }
        self.advance_order(id, OrderStatus::Started)
    }

    /// Run one lifecycle transition of an order at the current time.
    ///
    /// The follow-up event is scheduled before the order is touched, so a
    /// failed transition leaves the order as it was.
    fn advance_order(&mut self, id: OrderId, status: OrderStatus) -> Result<(), SimError> {
        let now = self.queue.now();
        let index = id.0 as usize;
        let order = self.orders.get(index).ok_or(SimError::UnknownOrder(id))?;
        let net = NetworkView {
            nodes: &self.nodes,
            arcs: &self.arcs,
            graph: &self.graph,
        };
        let transition = plan_transition(order, status, &net)?;

        // The record describes the entity the order is at before moving.
        let subject = order.cursor();
        let mut meta = lookup(&self.nodes, &self.arcs, subject)?.metadata().clone();
        let extra = match self.enrichers.get(&id) {
            Some(enricher) => enricher.enrich(order, now),
            None => DefaultEnricher.enrich(order, now),
        };
        meta.extend(extra);
        let cashflow = match transition.charge {
            Some(entity) => lookup(&self.nodes, &self.arcs, entity)?.cashflow(order.units()),
            None => 0.0,
        };
        let placed = transition.record_status == OrderStatus::Started;
        let since = if placed { now } else { order.prev_time() };
        let record = StageRecord {
            time: now,
            status: transition.record_status,
            cashflow,
            t_delta: round_to(now - since, T_DELTA_PRECISION),
            entity: subject,
            meta,
        };

        if let Some((next, delay)) = transition.next {
            let delay = match delay {
                Delay::Immediate => 0.0,
                Delay::Sampled => lookup(&self.nodes, &self.arcs, transition.cursor)?
                    .sample_processing_time(&mut self.rng),
            };
            self.queue
                .schedule(delay, SimEvent::AdvanceOrder { order: id, status: next })?;
        }

        let order = self
            .orders
            .get_mut(index)
            .ok_or(SimError::UnknownOrder(id))?;
        if placed {
            order.mark_started(now);
        }
        order.push_record(record);
        order.move_to(transition.cursor, transition.hop);
        debug!(
            order = id.0,
            status = %transition.record_status,
            now,
            cashflow,
            cursor = ?transition.cursor,
            "order transition"
        );

        for &(node_id, point) in &transition.hooks {
            let node = self.nodes.get(&node_id).ok_or(SimError::UnknownNode(node_id))?;
            let mut ctx = HookContext::new(node, order, now);
            if let Some(role) = node.role() {
                apply_role(role, point, &mut ctx);
            }
            if let Some(hooks) = self.hooks.get_mut(&node_id) {
                invoke(hooks.as_mut(), point, &mut ctx);
            }
        }
        Ok(())
    }
}
