//! Loading network files end to end: parse, resolve names, build, run.

use scar_core::config::ConfigError;
use scar_core::entity::{Entity, EntityRef, MetaValue};
use scar_core::graph::{GraphError, Objective};
use scar_core::order::OrderStatus;
use scar_core::simulation::SimError;
use scar_data::{DataLoadError, Format, load_network, parse_network};
use std::path::{Path, PathBuf};

fn network(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("networks").join(name)
}

// ===========================================================================
// Test 1: Bundled networks
// ===========================================================================

#[test]
fn basic_network_loads_and_completes() {
    let mut net = load_network(network("basic.ron")).unwrap();
    assert_eq!(net.nodes.len(), 4);
    assert_eq!(net.arcs.len(), 3);
    assert_eq!(net.orders.len(), 1);
    // The start plus two scheduled changes.
    assert_eq!(net.context.pending_events(), 3);

    let order = net.order("order_0").unwrap();
    net.context.run(100.0).unwrap();
    let o = net.context.order(order).unwrap();
    assert_eq!(o.status(), Some(OrderStatus::Completed));
    assert_eq!(o.history().len(), 7);
    // -50 -10 -15 -12 -20 -8 along the path, +200 at the customer.
    assert_eq!(o.total_cashflow(), 85.0);

    let first = &o.history()[0];
    assert_eq!(first.time, 1.0);
    assert_eq!(first.meta["loc"], MetaValue::Text("cn_ningbo".to_string()));
    assert_eq!(first.meta["time"], MetaValue::Int(1));
}

#[test]
fn basic_network_change_and_reset_apply() {
    let mut net = load_network(network("basic.ron")).unwrap();
    let road = EntityRef::Arc(net.arc("arc_road_01_02").unwrap());

    net.context.run(0.5).unwrap();
    assert_eq!(net.context.entity(road).unwrap().params().avg_time, 5.0);
    net.context.run(5.0).unwrap();
    assert_eq!(net.context.entity(road).unwrap().params().avg_time, 0.3);
}

#[test]
fn ocean_network_stops_mid_leg_and_resumes() {
    let mut net = load_network(network("ocean.toml")).unwrap();
    assert!(net.context.config().log_events);
    assert!(net.arc("supplier_0->factory_1").is_some());
    let order = net.order("order_0").unwrap();

    net.context.run(2.0).unwrap();
    let o = net.context.order(order).unwrap();
    assert!(o.history().last().unwrap().time <= 2.0);
    assert!(!o.is_completed());

    net.context.run(10.0).unwrap();
    assert!(net.context.order(order).unwrap().is_completed());
    let labels: Vec<&str> = net
        .context
        .event_log()
        .unwrap()
        .iter()
        .map(|e| e.label.as_str())
        .collect();
    assert_eq!(labels, ["start_order", "shipped", "arrived"]);
}

// ===========================================================================
// Test 2: Formats
// ===========================================================================

const RON_NET: &str = r#"(
    simulation: (seed: 7),
    nodes: [
        (name: "a", role: supplier, params: (avg_time: 1.0, cashflow_per_unit: -3.0)),
        (name: "w", role: waypoint, params: (avg_time: 0.0)),
        (name: "b", role: customer, params: (avg_time: 1.0, cashflow_per_unit: 9.0)),
    ],
    arcs: [
        (from: "a", to: "w", params: (avg_time: 2.0, cashflow_per_unit: -1.0)),
        (from: "w", to: "b", params: (avg_time: 2.0, cashflow_per_unit: -1.0)),
    ],
    orders: [(name: "o", origin: "a", destination: "b", units: 2, objective: time)],
)
"#;

const TOML_NET: &str = r#"
[simulation]
seed = 7

[[nodes]]
name = "a"
role = "supplier"
params = { avg_time = 1.0, cashflow_per_unit = -3.0 }

[[nodes]]
name = "w"
role = "waypoint"
params = { avg_time = 0.0 }

[[nodes]]
name = "b"
role = "customer"
params = { avg_time = 1.0, cashflow_per_unit = 9.0 }

[[arcs]]
from = "a"
to = "w"
params = { avg_time = 2.0, cashflow_per_unit = -1.0 }

[[arcs]]
from = "w"
to = "b"
params = { avg_time = 2.0, cashflow_per_unit = -1.0 }

[[orders]]
name = "o"
origin = "a"
destination = "b"
units = 2
objective = "time"
"#;

const JSON_NET: &str = r#"{
    "simulation": {"seed": 7},
    "nodes": [
        {"name": "a", "role": "supplier", "params": {"avg_time": 1.0, "cashflow_per_unit": -3.0}},
        {"name": "w", "role": "waypoint", "params": {"avg_time": 0.0}},
        {"name": "b", "role": "customer", "params": {"avg_time": 1.0, "cashflow_per_unit": 9.0}}
    ],
    "arcs": [
        {"from": "a", "to": "w", "params": {"avg_time": 2.0, "cashflow_per_unit": -1.0}},
        {"from": "w", "to": "b", "params": {"avg_time": 2.0, "cashflow_per_unit": -1.0}}
    ],
    "orders": [{"name": "o", "origin": "a", "destination": "b", "units": 2, "objective": "time"}]
}"#;

#[test]
fn every_format_builds_the_same_network() {
    let ron = parse_network(RON_NET, Format::Ron).unwrap();
    let toml = parse_network(TOML_NET, Format::Toml).unwrap();
    let json = parse_network(JSON_NET, Format::Json).unwrap();

    for other in [&toml, &json] {
        assert_eq!(other.context.graph(), ron.context.graph());
        assert_eq!(other.context.orders(), ron.context.orders());
        assert_eq!(other.nodes, ron.nodes);
        assert_eq!(other.arcs, ron.arcs);
        assert_eq!(other.context.config(), ron.context.config());
    }
    assert_eq!(ron.context.config().seed, 7);
    // Unstarted orders schedule nothing.
    assert_eq!(ron.context.pending_events(), 0);
}

#[test]
fn waypoints_carry_no_role() {
    let net = parse_network(RON_NET, Format::Ron).unwrap();
    let w = net.context.node(net.node("w").unwrap()).unwrap();
    assert!(!w.is_facility());
    assert_eq!(net.entity("a->w"), net.arc("a->w").map(EntityRef::Arc));
}

#[test]
fn loaded_orders_run_through_waypoints() {
    let mut net = parse_network(RON_NET, Format::Ron).unwrap();
    let order = net.order("o").unwrap();
    net.context.start_order(order, 0.0).unwrap();
    net.context.run(100.0).unwrap();

    let o = net.context.order(order).unwrap();
    assert!(o.is_completed());
    // (-3 - 1 + 0 - 1) * 2 along the path, +9 * 2 at the customer.
    assert_eq!(o.total_cashflow(), 8.0);
    let path = o.planned_path().to_vec();
    assert_eq!(
        net.context.path_weight(&path, Objective::Cashflow).unwrap(),
        -5.0
    );
}

#[test]
fn files_are_read_by_extension() {
    let dir = std::env::temp_dir().join(format!("scar_data_files_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let json = dir.join("net.json");
    std::fs::write(&json, JSON_NET).unwrap();
    assert_eq!(load_network(&json).unwrap().nodes.len(), 3);

    let yaml = dir.join("net.yaml");
    std::fs::write(&yaml, JSON_NET).unwrap();
    assert!(matches!(
        load_network(&yaml),
        Err(DataLoadError::UnsupportedFormat { .. })
    ));

    let mislabeled = dir.join("net.ron");
    std::fs::write(&mislabeled, "nodes = []").unwrap();
    match load_network(&mislabeled) {
        Err(DataLoadError::Parse { file, .. }) => assert_eq!(file, mislabeled),
        other => panic!("expected parse error, got {other:?}"),
    }

    let _ = std::fs::remove_dir_all(&dir);
}

// ===========================================================================
// Test 3: Resolution errors
// ===========================================================================

fn json_err(content: &str) -> DataLoadError {
    parse_network(content, Format::Json).unwrap_err()
}

#[test]
fn unknown_arc_endpoint() {
    let err = json_err(
        r#"{"nodes": [{"name": "a", "params": {"avg_time": 1.0}}],
            "arcs": [{"from": "a", "to": "z", "params": {"avg_time": 1.0}}]}"#,
    );
    assert!(matches!(
        err,
        DataLoadError::UnresolvedRef { ref name, expected_kind: "node", .. } if name == "z"
    ));
}

#[test]
fn duplicate_node_name() {
    let err = json_err(
        r#"{"nodes": [{"name": "a", "params": {"avg_time": 1.0}},
                      {"name": "a", "params": {"avg_time": 2.0}}]}"#,
    );
    assert!(matches!(err, DataLoadError::DuplicateName { ref name, .. } if name == "a"));
}

#[test]
fn arc_name_may_not_shadow_a_node() {
    let err = json_err(
        r#"{"nodes": [{"name": "a", "params": {"avg_time": 1.0}},
                      {"name": "b", "params": {"avg_time": 1.0}}],
            "arcs": [{"name": "b", "from": "a", "to": "b", "params": {"avg_time": 1.0}}]}"#,
    );
    assert!(matches!(err, DataLoadError::DuplicateName { ref name, .. } if name == "b"));
}

#[test]
fn unknown_change_target() {
    let err = json_err(
        r#"{"nodes": [{"name": "a", "params": {"avg_time": 1.0}}],
            "changes": [{"at": 1.0, "target": "ghost", "reset": true}]}"#,
    );
    assert!(matches!(
        err,
        DataLoadError::UnresolvedRef { ref name, expected_kind: "node or arc", .. } if name == "ghost"
    ));
}

#[test]
fn negative_times_are_rejected() {
    let err = json_err(r#"{"nodes": [{"name": "a", "params": {"avg_time": -1.0}}]}"#);
    assert!(matches!(
        err,
        DataLoadError::Sim {
            source: SimError::Entity(_),
            ..
        }
    ));
}

#[test]
fn unroutable_order() {
    let err = json_err(
        r#"{"nodes": [{"name": "a", "params": {"avg_time": 1.0}},
                      {"name": "b", "params": {"avg_time": 1.0}}],
            "orders": [{"name": "o", "origin": "a", "destination": "b"}]}"#,
    );
    assert!(matches!(
        err,
        DataLoadError::Sim {
            source: SimError::Graph(GraphError::NoPath { .. }),
            ..
        }
    ));
}

#[test]
fn parallel_arcs_are_rejected() {
    let err = json_err(
        r#"{"nodes": [{"name": "a", "params": {"avg_time": 1.0}},
                      {"name": "b", "params": {"avg_time": 1.0}}],
            "arcs": [{"name": "fast", "from": "a", "to": "b", "params": {"avg_time": 1.0}},
                     {"name": "slow", "from": "a", "to": "b", "params": {"avg_time": 9.0}}]}"#,
    );
    assert!(matches!(
        err,
        DataLoadError::Sim {
            source: SimError::Graph(GraphError::DuplicateArc { .. }),
            ..
        }
    ));
}

#[test]
fn negative_change_time_is_rejected() {
    let err = json_err(
        r#"{"nodes": [{"name": "a", "params": {"avg_time": 1.0}}],
            "changes": [{"at": -1.0, "target": "a", "set": {"avg_time": 2.0}}]}"#,
    );
    assert!(matches!(
        err,
        DataLoadError::Sim {
            source: SimError::Schedule(_),
            ..
        }
    ));
}

#[test]
fn oversized_time_precision_is_rejected() {
    let err = json_err(
        r#"{"simulation": {"time_precision": 400},
            "nodes": [{"name": "a", "params": {"avg_time": 1.0}}]}"#,
    );
    assert!(matches!(
        err,
        DataLoadError::Sim {
            source: SimError::Config(ConfigError::TimePrecision(400)),
            ..
        }
    ));
}
