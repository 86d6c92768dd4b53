//! Builds a ready-to-run simulation context from a parsed network.
//!
//! Registration order follows the file: nodes, then arcs, then orders,
//! then scheduled changes. Every name is resolved before it is used, so a
//! bad reference is reported against the file instead of surfacing as an
//! id error.

use scar_core::entity::{Arc, EntityRef, Node, ProcessingParams};
use scar_core::id::{ArcId, NodeId, OrderId};
use scar_core::simulation::{SimError, SimulationContext};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::loader::{DataLoadError, check_duplicate, resolve_name};
use crate::schema::{MetaData, NetworkData};

/// A built context plus the name index of everything in it.
#[derive(Debug)]
pub struct LoadedNetwork {
    pub context: SimulationContext,
    pub nodes: BTreeMap<String, NodeId>,
    pub arcs: BTreeMap<String, ArcId>,
    pub orders: BTreeMap<String, OrderId>,
}

impl LoadedNetwork {
    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.nodes.get(name).copied()
    }

    pub fn arc(&self, name: &str) -> Option<ArcId> {
        self.arcs.get(name).copied()
    }

    pub fn order(&self, name: &str) -> Option<OrderId> {
        self.orders.get(name).copied()
    }

    /// Resolve a node or arc name.
    pub fn entity(&self, name: &str) -> Option<EntityRef> {
        self.node(name)
            .map(EntityRef::Node)
            .or_else(|| self.arc(name).map(EntityRef::Arc))
    }
}

fn sim_error(file: &Path, source: SimError) -> DataLoadError {
    DataLoadError::Sim {
        file: file.to_path_buf(),
        source,
    }
}

/// Register everything `data` describes in a fresh context. `file` labels
/// errors.
pub fn build_simulation(data: &NetworkData, file: &Path) -> Result<LoadedNetwork, DataLoadError> {
    let sim = |source: SimError| sim_error(file, source);
    let mut context = SimulationContext::with_config(data.simulation.clone()).map_err(sim)?;
    let mut nodes = BTreeMap::new();
    let mut arcs = BTreeMap::new();
    let mut orders = BTreeMap::new();

    for n in &data.nodes {
        check_duplicate(&nodes, &n.name, file)?;
        let params = ProcessingParams::from(n.params);
        let mut node = match n.role.facility_role() {
            Some(role) => Node::facility(role, params),
            None => Node::waypoint(params),
        };
        for (key, value) in &n.metadata {
            node = node.with_metadata(key.clone(), MetaData::clone(value));
        }
        let id = context.register_node(node).map_err(sim)?;
        debug!(name = %n.name, node = id.0, "loaded node");
        nodes.insert(n.name.clone(), id);
    }

    for a in &data.arcs {
        let name = a.resolved_name();
        check_duplicate(&arcs, &name, file)?;
        check_duplicate(&nodes, &name, file)?;
        let from = *resolve_name(&nodes, &a.from, file, "node")?;
        let to = *resolve_name(&nodes, &a.to, file, "node")?;
        let mut arc = Arc::new(from, to, a.params.into());
        for (key, value) in &a.metadata {
            arc = arc.with_metadata(key.clone(), MetaData::clone(value));
        }
        let id = context.register_arc(arc).map_err(sim)?;
        debug!(%name, arc = id.0, "loaded arc");
        arcs.insert(name, id);
    }

    for o in &data.orders {
        check_duplicate(&orders, &o.name, file)?;
        let origin = *resolve_name(&nodes, &o.origin, file, "node")?;
        let destination = *resolve_name(&nodes, &o.destination, file, "node")?;
        let id = context
            .plan_order(origin, destination, o.units, o.objective.into())
            .map_err(sim)?;
        if let Some(delay) = o.start {
            context.start_order(id, delay).map_err(sim)?;
        }
        debug!(name = %o.name, order = id.0, "loaded order");
        orders.insert(o.name.clone(), id);
    }

    for c in &data.changes {
        let target = match nodes.get(&c.target) {
            Some(&id) => EntityRef::Node(id),
            None => EntityRef::Arc(*resolve_name(&arcs, &c.target, file, "node or arc")?),
        };
        if c.reset {
            context.schedule_parameter_reset(c.at, target).map_err(sim)?;
        } else {
            context
                .schedule_parameter_change(c.at, target, c.set)
                .map_err(sim)?;
        }
    }

    info!(
        file = %file.display(),
        nodes = nodes.len(),
        arcs = arcs.len(),
        orders = orders.len(),
        changes = data.changes.len(),
        "network loaded"
    );
    Ok(LoadedNetwork {
        context,
        nodes,
        arcs,
        orders,
    })
}
