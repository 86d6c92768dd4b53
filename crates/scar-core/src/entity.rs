//! Processable network elements: nodes (facilities, waypoints) and arcs.
//!
//! Every entity carries two copies of its [`ProcessingParams`]: the defaults
//! it was constructed with and the live values used for sampling, accounting
//! and graph weights. Live values change only through [`ParamChange`]; once an
//! entity is owned by a [`SimulationContext`](crate::simulation::SimulationContext)
//! the context is the only caller, so the routing graph is refreshed on every
//! change.

use crate::id::{ArcId, NodeId, VertexId};
use crate::rng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised when processing parameters are rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntityError {
    #[error("invalid {field}: {value} (times must be finite and non-negative)")]
    InvalidParameter { field: &'static str, value: f64 },
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// A descriptive value attached to an entity or a history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

/// Reporting-only key/value pairs. Never consulted for routing or economics.
pub type Metadata = BTreeMap<String, MetaValue>;

// ---------------------------------------------------------------------------
// Processing parameters
// ---------------------------------------------------------------------------

/// Processing-time distribution and per-unit cashflow of one entity.
///
/// `cashflow_per_unit` is signed: negative values are costs, positive values
/// are revenue.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessingParams {
    /// Floor applied to every sampled processing time.
    pub min_time: f64,
    /// Mean of the processing-time distribution. Also the time-graph weight.
    pub avg_time: f64,
    /// Standard deviation of the processing-time distribution.
    pub sd_time: f64,
    /// Cashflow generated per unit moved through the entity.
    pub cashflow_per_unit: f64,
}

impl ProcessingParams {
    pub fn new(min_time: f64, avg_time: f64, sd_time: f64, cashflow_per_unit: f64) -> Self {
        Self {
            min_time,
            avg_time,
            sd_time,
            cashflow_per_unit,
        }
    }

    /// Reject negative or non-finite times and a non-finite cashflow.
    pub fn validate(&self) -> Result<(), EntityError> {
        for (field, value) in [
            ("min_time", self.min_time),
            ("avg_time", self.avg_time),
            ("sd_time", self.sd_time),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EntityError::InvalidParameter { field, value });
            }
        }
        if !self.cashflow_per_unit.is_finite() {
            return Err(EntityError::InvalidParameter {
                field: "cashflow_per_unit",
                value: self.cashflow_per_unit,
            });
        }
        Ok(())
    }
}

/// A partial update of [`ProcessingParams`]. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamChange {
    pub min_time: Option<f64>,
    pub avg_time: Option<f64>,
    pub sd_time: Option<f64>,
    pub cashflow_per_unit: Option<f64>,
}

impl ParamChange {
    pub fn min_time(mut self, v: f64) -> Self {
        self.min_time = Some(v);
        self
    }

    pub fn avg_time(mut self, v: f64) -> Self {
        self.avg_time = Some(v);
        self
    }

    pub fn sd_time(mut self, v: f64) -> Self {
        self.sd_time = Some(v);
        self
    }

    pub fn cashflow_per_unit(mut self, v: f64) -> Self {
        self.cashflow_per_unit = Some(v);
        self
    }

    /// Whether the change touches no field at all.
    pub fn is_empty(&self) -> bool {
        self.min_time.is_none()
            && self.avg_time.is_none()
            && self.sd_time.is_none()
            && self.cashflow_per_unit.is_none()
    }

    /// The parameters that result from applying this change to `base`.
    pub fn apply_to(&self, base: &ProcessingParams) -> ProcessingParams {
        ProcessingParams {
            min_time: self.min_time.unwrap_or(base.min_time),
            avg_time: self.avg_time.unwrap_or(base.avg_time),
            sd_time: self.sd_time.unwrap_or(base.sd_time),
            cashflow_per_unit: self.cashflow_per_unit.unwrap_or(base.cashflow_per_unit),
        }
    }
}

impl From<ProcessingParams> for ParamChange {
    /// A change that sets every field.
    fn from(p: ProcessingParams) -> Self {
        Self {
            min_time: Some(p.min_time),
            avg_time: Some(p.avg_time),
            sd_time: Some(p.sd_time),
            cashflow_per_unit: Some(p.cashflow_per_unit),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared entity state
// ---------------------------------------------------------------------------

/// Parameter bookkeeping shared by nodes and arcs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCore {
    defaults: ProcessingParams,
    live: ProcessingParams,
    metadata: Metadata,
}

impl EntityCore {
    pub fn new(params: ProcessingParams) -> Self {
        Self {
            defaults: params,
            live: params,
            metadata: Metadata::new(),
        }
    }

    pub fn defaults(&self) -> &ProcessingParams {
        &self.defaults
    }

    pub fn live(&self) -> &ProcessingParams {
        &self.live
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn apply(&mut self, change: &ParamChange) -> Result<(), EntityError> {
        let next = change.apply_to(&self.live);
        next.validate()?;
        self.live = next;
        Ok(())
    }
}

/// Accounting label for the economic effect of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostCategory {
    /// Cost of goods, charged by suppliers.
    Cogs,
    /// Freight charged by arcs.
    Transportation,
    /// Generic handling at any other node.
    Processing,
}

/// Labelled cost of moving some units through an entity. Positive = cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    pub category: CostCategory,
    pub amount: f64,
}

/// Behaviour common to every processable element.
pub trait Entity {
    fn core(&self) -> &EntityCore;
    fn core_mut(&mut self) -> &mut EntityCore;
    fn cost_category(&self) -> CostCategory;

    /// Live parameters.
    fn params(&self) -> &ProcessingParams {
        self.core().live()
    }

    fn metadata(&self) -> &Metadata {
        self.core().metadata()
    }

    /// Normal draw around the live mean, clipped below by the live minimum.
    fn sample_processing_time(&self, rng: &mut SimRng) -> f64 {
        let p = self.params();
        rng.gauss(p.avg_time, p.sd_time).max(p.min_time)
    }

    /// Signed cashflow of moving `units` through this entity.
    fn cashflow(&self, units: u32) -> f64 {
        self.params().cashflow_per_unit * f64::from(units)
    }

    /// The same linear effect expressed as a labelled cost.
    fn costs(&self, units: u32) -> CostBreakdown {
        CostBreakdown {
            category: self.cost_category(),
            amount: -self.cashflow(units),
        }
    }

    /// Partially update the live parameters.
    ///
    /// Registered entities are owned by their context; use
    /// `SimulationContext::change_parameters` so the routing graph follows.
    fn change_parameters(&mut self, change: &ParamChange) -> Result<(), EntityError> {
        self.core_mut().apply(change)
    }

    /// Restore the construction-time parameters.
    fn reset_parameters(&mut self) -> Result<(), EntityError> {
        let change = ParamChange::from(*self.core().defaults());
        self.core_mut().apply(&change)
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Built-in facility specializations. The lifecycle hooks of every role are
/// no-ops except where noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacilityRole {
    Generic,
    /// Charges its cashflow as cost of goods.
    Supplier,
    Factory,
    Warehouse,
    FulfillmentCenter,
    /// Realizes its own cashflow (revenue) when an order completes there.
    Customer,
}

/// What a node can do with an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A pass-through vertex with no lifecycle hooks.
    Waypoint,
    /// A facility that can place, ship, receive and complete orders.
    Facility(FacilityRole),
}

/// A network vertex pair with internal dwell time and cashflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: Option<NodeId>,
    kind: NodeKind,
    core: EntityCore,
}

impl Node {
    pub fn new(kind: NodeKind, params: ProcessingParams) -> Self {
        Self {
            id: None,
            kind,
            core: EntityCore::new(params),
        }
    }

    pub fn facility(role: FacilityRole, params: ProcessingParams) -> Self {
        Self::new(NodeKind::Facility(role), params)
    }

    pub fn waypoint(params: ProcessingParams) -> Self {
        Self::new(NodeKind::Waypoint, params)
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.core.metadata.insert(key.into(), value.into());
        self
    }

    /// `None` until registered.
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn outbound_id(&self) -> Option<VertexId> {
        self.id.map(NodeId::outbound)
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn role(&self) -> Option<FacilityRole> {
        match self.kind {
            NodeKind::Facility(role) => Some(role),
            NodeKind::Waypoint => None,
        }
    }

    pub fn is_facility(&self) -> bool {
        matches!(self.kind, NodeKind::Facility(_))
    }

    pub(crate) fn assign_id(&mut self, id: NodeId) {
        self.id = Some(id);
    }
}

impl Entity for Node {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn cost_category(&self) -> CostCategory {
        match self.kind {
            NodeKind::Facility(FacilityRole::Supplier) => CostCategory::Cogs,
            _ => CostCategory::Processing,
        }
    }
}

// ---------------------------------------------------------------------------
// Arcs
// ---------------------------------------------------------------------------

/// A directed transport link from one node's outbound vertex to another
/// node's inbound vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    id: Option<ArcId>,
    origin: NodeId,
    destination: NodeId,
    core: EntityCore,
}

impl Arc {
    pub fn new(origin: NodeId, destination: NodeId, params: ProcessingParams) -> Self {
        Self {
            id: None,
            origin,
            destination,
            core: EntityCore::new(params),
        }
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.core.metadata.insert(key.into(), value.into());
        self
    }

    /// `None` until registered.
    pub fn id(&self) -> Option<ArcId> {
        self.id
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub(crate) fn assign_id(&mut self, id: ArcId) {
        self.id = Some(id);
    }
}

impl Entity for Arc {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn cost_category(&self) -> CostCategory {
        CostCategory::Transportation
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// A registered node or arc, by id. Used as the order cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Node(NodeId),
    Arc(ArcId),
}

/// A borrowed node or arc, used where either may appear.
#[derive(Debug, Clone, Copy)]
pub enum EntityView<'a> {
    Node(&'a Node),
    Arc(&'a Arc),
}

impl<'a> EntityView<'a> {
    pub fn as_entity(&self) -> &'a dyn Entity {
        match *self {
            EntityView::Node(n) => n,
            EntityView::Arc(a) => a,
        }
    }
}
