//! Serde data file structs for network descriptions.
//!
//! These structs define the on-disk format of a supply chain network:
//! facilities, transport links, orders and scheduled parameter changes.
//! They are deserialized from RON, JSON, or TOML files and then resolved
//! into a simulation context by the builder.

use scar_core::config::SimConfig;
use scar_core::entity::{FacilityRole, MetaValue, ParamChange, ProcessingParams};
use scar_core::graph::Objective;
use serde::Deserialize;
use std::collections::BTreeMap;

// ===========================================================================
// Top level
// ===========================================================================

/// A complete network description.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkData {
    #[serde(default)]
    pub simulation: SimConfig,
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub arcs: Vec<ArcData>,
    #[serde(default)]
    pub orders: Vec<OrderData>,
    #[serde(default)]
    pub changes: Vec<ChangeData>,
}

// ===========================================================================
// Entities
// ===========================================================================

/// Processing parameters as written in a data file. Only `avg_time` is
/// required.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ParamsData {
    #[serde(default)]
    pub min_time: f64,
    pub avg_time: f64,
    #[serde(default)]
    pub sd_time: f64,
    #[serde(default)]
    pub cashflow_per_unit: f64,
}

impl From<ParamsData> for ProcessingParams {
    fn from(p: ParamsData) -> Self {
        ProcessingParams::new(p.min_time, p.avg_time, p.sd_time, p.cashflow_per_unit)
    }
}

/// A metadata value. Integers are tried before floats so `3` stays an
/// integer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MetaData {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<MetaData> for MetaValue {
    fn from(v: MetaData) -> Self {
        match v {
            MetaData::Bool(b) => MetaValue::Bool(b),
            MetaData::Int(i) => MetaValue::Int(i),
            MetaData::Float(f) => MetaValue::Float(f),
            MetaData::Text(s) => MetaValue::Text(s),
        }
    }
}

/// What a node does in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRoleData {
    #[default]
    Generic,
    Supplier,
    Factory,
    Warehouse,
    FulfillmentCenter,
    Customer,
    /// A pass-through point with no facility behaviour.
    Waypoint,
}

impl NodeRoleData {
    /// The facility role, or `None` for a waypoint.
    pub fn facility_role(self) -> Option<FacilityRole> {
        match self {
            NodeRoleData::Generic => Some(FacilityRole::Generic),
            NodeRoleData::Supplier => Some(FacilityRole::Supplier),
            NodeRoleData::Factory => Some(FacilityRole::Factory),
            NodeRoleData::Warehouse => Some(FacilityRole::Warehouse),
            NodeRoleData::FulfillmentCenter => Some(FacilityRole::FulfillmentCenter),
            NodeRoleData::Customer => Some(FacilityRole::Customer),
            NodeRoleData::Waypoint => None,
        }
    }
}

/// A node definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeData {
    pub name: String,
    #[serde(default)]
    pub role: NodeRoleData,
    pub params: ParamsData,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetaData>,
}

/// An arc definition in a data file. Unnamed arcs are called
/// `"{from}->{to}"`.
#[derive(Debug, Clone, Deserialize)]
pub struct ArcData {
    #[serde(default)]
    pub name: Option<String>,
    pub from: String,
    pub to: String,
    pub params: ParamsData,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetaData>,
}

impl ArcData {
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}->{}", self.from, self.to))
    }
}

// ===========================================================================
// Orders
// ===========================================================================

/// Routing criterion as written in a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveData {
    Time,
    #[default]
    Cashflow,
}

impl From<ObjectiveData> for Objective {
    fn from(o: ObjectiveData) -> Self {
        match o {
            ObjectiveData::Time => Objective::Time,
            ObjectiveData::Cashflow => Objective::Cashflow,
        }
    }
}

fn default_units() -> u32 {
    1
}

/// An order definition. The order is routed under `objective` at load
/// time; with `start` set it is also scheduled to start after that delay.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderData {
    pub name: String,
    pub origin: String,
    pub destination: String,
    #[serde(default = "default_units")]
    pub units: u32,
    #[serde(default)]
    pub objective: ObjectiveData,
    #[serde(default)]
    pub start: Option<f64>,
}

// ===========================================================================
// Scheduled parameter changes
// ===========================================================================

/// A parameter change or reset of a named node or arc, `at` time units
/// after load.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeData {
    pub at: f64,
    pub target: String,
    #[serde(default)]
    pub set: ParamChange,
    /// Restore the target's defaults instead of applying `set`.
    #[serde(default)]
    pub reset: bool,
}

// ===========================================================================
// Tests
// ===========================================================================
