//! Snapshot persistence and per-subsystem state hashing.
//!
//! A snapshot is a `bitcode` blob with a versioned header. It captures the
//! clock, pending events, graph weights, registries and RNG state, so a
//! restored context continues exactly like the original. Facility hooks and
//! metadata enrichers hold arbitrary code and are not captured; attach them
//! again after [`SimulationContext::import_state`].

use crate::config::SimConfig;
use crate::entity::{Arc, Entity, EntityRef, Node, ProcessingParams};
use crate::graph::RoutingGraph;
use crate::id::{ArcId, NodeId};
use crate::order::Order;
use crate::queue::{EventQueue, QueueState};
use crate::rng::SimRng;
use crate::sim::StateHash;
use crate::simulation::{SimEvent, SimulationContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a simulation context snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x5CA2_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

/// Errors of the file-based snapshot helpers.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotFileError {
    #[error("snapshot file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header prepended to every serialized snapshot. Enables format detection
/// and version checking before the payload is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Simulation time at which the snapshot was taken.
    pub time: f64,
}

impl SnapshotHeader {
    /// Create a header for the current format version.
    pub fn new(time: f64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            time,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// The serializable portion of a context. Excludes hooks and enrichers.
#[derive(Debug, Serialize, Deserialize)]
struct ContextSnapshot {
    header: SnapshotHeader,
    config: SimConfig,
    queue: QueueState<SimEvent>,
    graph: RoutingGraph,
    nodes: BTreeMap<NodeId, Node>,
    arcs: BTreeMap<ArcId, Arc>,
    orders: Vec<Order>,
    rng: SimRng,
}

// ---------------------------------------------------------------------------
// SubsystemHashes
// ---------------------------------------------------------------------------

/// Per-subsystem state hashes. Allows pinpointing which part of two
/// simulation instances diverged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemHashes {
    pub queue: u64,
    pub graph: u64,
    pub entities: u64,
    pub orders: u64,
    pub rng: u64,
}

impl SimulationContext {
    /// Serialize the context to a binary blob.
    pub fn export_state(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = ContextSnapshot {
            header: SnapshotHeader::new(self.queue.now()),
            config: self.config.clone(),
            queue: self.queue.to_state(),
            graph: self.graph.clone(),
            nodes: self.nodes.clone(),
            arcs: self.arcs.clone(),
            orders: self.orders.clone(),
            rng: self.rng.clone(),
        };
        let data =
            bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))?;
        debug!(bytes = data.len(), time = snapshot.header.time, "exported snapshot");
        Ok(data)
    }

    /// Restore a context from a blob produced by [`export_state`](Self::export_state).
    ///
    /// Validates the header before using the payload. The restored context
    /// has no facility hooks or metadata enrichers.
    pub fn import_state(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: ContextSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        snapshot
            .config
            .validate()
            .map_err(|e| DeserializeError::Decode(e.to_string()))?;

        Ok(SimulationContext {
            config: snapshot.config,
            queue: EventQueue::from(snapshot.queue),
            graph: snapshot.graph,
            nodes: snapshot.nodes,
            arcs: snapshot.arcs,
            orders: snapshot.orders,
            rng: snapshot.rng,
            hooks: BTreeMap::new(),
            enrichers: BTreeMap::new(),
        })
    }

    /// Write [`export_state`](Self::export_state) output to a file.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<(), SnapshotFileError> {
        let data = self.export_state()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Read a snapshot file written by [`export_to_file`](Self::export_to_file).
    pub fn import_from_file(path: impl AsRef<Path>) -> Result<Self, SnapshotFileError> {
        let data = std::fs::read(path)?;
        Ok(Self::import_state(&data)?)
    }

    /// Hash of the whole simulation state.
    pub fn state_hash(&self) -> u64 {
        let parts = self.subsystem_hashes();
        let mut h = StateHash::new();
        for part in [parts.queue, parts.graph, parts.entities, parts.orders, parts.rng] {
            h.write_u64(part);
        }
        h.finish()
    }

    /// Compute per-subsystem state hashes.
    pub fn subsystem_hashes(&self) -> SubsystemHashes {
        SubsystemHashes {
            queue: self.hash_queue(),
            graph: self.hash_graph(),
            entities: self.hash_entities(),
            orders: self.hash_orders(),
            rng: self.rng.state(),
        }
    }

    // -- Subsystem hash helpers --

    fn hash_queue(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_f64(self.queue.now());
        for event in self.queue.pending() {
            h.write_f64(event.at);
            h.write_u64(event.id.0);
            match &event.action {
                SimEvent::StartOrder(order) => {
                    h.write_u32(0);
                    h.write_u32(order.0);
                }
                SimEvent::AdvanceOrder { order, status } => {
                    h.write_u32(1);
                    h.write_u32(order.0);
                    h.write_str(status.as_str());
                }
                SimEvent::ChangeParameters { entity, change } => {
                    h.write_u32(2);
                    hash_entity_ref(&mut h, *entity);
                    let fields = [
                        change.min_time,
                        change.avg_time,
                        change.sd_time,
                        change.cashflow_per_unit,
                    ];
                    for field in fields {
                        match field {
                            Some(v) => h.write_f64(v),
                            None => h.write_u32(u32::MAX),
                        }
                    }
                }
                SimEvent::ResetParameters(entity) => {
                    h.write_u32(3);
                    hash_entity_ref(&mut h, *entity);
                }
            }
        }
        h.finish()
    }

    fn hash_graph(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.graph.vertex_count() as u64);
        h.write_u64(self.graph.arc_count() as u64);
        for (from, to, time, cost) in self.graph.edges() {
            h.write_u32(from.0);
            h.write_u32(to.0);
            h.write_f64(time);
            h.write_f64(cost);
        }
        h.finish()
    }

    fn hash_entities(&self) -> u64 {
        let mut h = StateHash::new();
        for (id, node) in &self.nodes {
            h.write_u32(id.0);
            hash_params(&mut h, node.params());
            hash_params(&mut h, node.core().defaults());
        }
        for (id, arc) in &self.arcs {
            h.write_u32(id.0);
            h.write_u32(arc.origin().0);
            h.write_u32(arc.destination().0);
            hash_params(&mut h, arc.params());
            hash_params(&mut h, arc.core().defaults());
        }
        h.finish()
    }

    fn hash_orders(&self) -> u64 {
        let mut h = StateHash::new();
        for order in &self.orders {
            h.write_u32(order.units());
            hash_entity_ref(&mut h, order.cursor());
            h.write_u64(order.history().len() as u64);
            for record in order.history() {
                h.write_f64(record.time);
                h.write_str(record.status.as_str());
                h.write_f64(record.cashflow);
                h.write_f64(record.t_delta);
            }
        }
        h.finish()
    }
}

fn hash_params(h: &mut StateHash, p: &ProcessingParams) {
    h.write_f64(p.min_time);
    h.write_f64(p.avg_time);
    h.write_f64(p.sd_time);
    h.write_f64(p.cashflow_per_unit);
}

fn hash_entity_ref(h: &mut StateHash, entity: EntityRef) {
    match entity {
        EntityRef::Node(id) => {
            h.write_u32(0);
            h.write_u32(id.0);
        }
        EntityRef::Arc(id) => {
            h.write_u32(1);
            h.write_u32(id.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ParamChange;
    use crate::graph::Objective;
    use crate::test_utils::*;

    #[test]
    fn round_trip_preserves_state_hash() {
        let (mut ctx, net) = chain_network(3);
        let order = ctx
            .plan_order(net.nodes[0], net.nodes[2], 2, Objective::Cashflow)
            .unwrap();
        ctx.start_order(order, 0.0).unwrap();
        ctx.run(1.5).unwrap();

        let data = ctx.export_state().unwrap();
        let restored = SimulationContext::import_state(&data).unwrap();
        assert_eq!(restored.state_hash(), ctx.state_hash());
        assert_eq!(restored.current_time(), ctx.current_time());
        assert_eq!(restored.orders(), ctx.orders());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let garbage = vec![0u8; 10];
        match SimulationContext::import_state(&garbage) {
            Err(DeserializeError::Decode(_)) => {}
            Err(other) => panic!("expected Decode error, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn header_validation() {
        assert!(SnapshotHeader::new(0.0).validate().is_ok());

        let mut bad_magic = SnapshotHeader::new(0.0);
        bad_magic.magic = 0xDEAD_BEEF;
        assert!(matches!(
            bad_magic.validate(),
            Err(DeserializeError::InvalidMagic(0xDEAD_BEEF))
        ));

        let mut future = SnapshotHeader::new(0.0);
        future.version = FORMAT_VERSION + 1;
        assert!(matches!(
            future.validate(),
            Err(DeserializeError::FutureVersion(_))
        ));

        let mut old = SnapshotHeader::new(0.0);
        old.version = 0;
        assert!(matches!(
            old.validate(),
            Err(DeserializeError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn foreign_magic_is_rejected_on_import() {
        let ctx = SimulationContext::new(1);
        let mut snapshot: ContextSnapshot =
            bitcode::deserialize(&ctx.export_state().unwrap()).unwrap();
        snapshot.header.magic = 0x1234_5678;
        let data = bitcode::serialize(&snapshot).unwrap();
        assert!(matches!(
            SimulationContext::import_state(&data),
            Err(DeserializeError::InvalidMagic(0x1234_5678))
        ));
    }

    #[test]
    fn hashes_change_independently() {
        let (mut ctx, net) = chain_network(3);
        let before = ctx.subsystem_hashes();
        ctx.change_parameters(
            EntityRef::Arc(net.arcs[0]),
            &ParamChange::default().cashflow_per_unit(-99.0),
        )
        .unwrap();
        let after = ctx.subsystem_hashes();
        assert_ne!(before.graph, after.graph);
        assert_ne!(before.entities, after.entities);
        assert_eq!(before.queue, after.queue);
        assert_eq!(before.orders, after.orders);
        assert_eq!(before.rng, after.rng);
    }

    #[test]
    fn pending_change_survives_round_trip() {
        let (mut ctx, net) = chain_network(3);
        ctx.schedule_parameter_change(
            2.0,
            EntityRef::Node(net.nodes[1]),
            ParamChange::default().avg_time(4.0),
        )
        .unwrap();
        let mut restored = SimulationContext::import_state(&ctx.export_state().unwrap()).unwrap();
        assert_eq!(restored.pending_events(), 1);
        restored.run(2.0).unwrap();
        assert_eq!(
            restored.node(net.nodes[1]).unwrap().params().avg_time,
            4.0
        );
    }

    #[test]
    fn empty_context_round_trip() {
        let ctx = SimulationContext::new(11);
        let restored = SimulationContext::import_state(&ctx.export_state().unwrap()).unwrap();
        assert_eq!(restored.state_hash(), ctx.state_hash());
        assert_eq!(restored.config(), ctx.config());
    }
}
