//! Criterion benchmarks for the simulation core.
//!
//! Three benchmark groups:
//! - `lifecycle`: many concurrent orders through a long chain
//! - `routing`: shortest-path queries on a wide layered network
//! - `snapshot`: export and import of a mid-run context

use criterion::{Criterion, criterion_group, criterion_main};
use scar_core::entity::FacilityRole;
use scar_core::graph::Objective;
use scar_core::id::NodeId;
use scar_core::simulation::SimulationContext;
use scar_core::test_utils::*;

// ===========================================================================
// Scenario builders
// ===========================================================================

/// A 20-node chain with `orders` single-unit orders starting 0.1 apart.
fn busy_chain(orders: u32) -> SimulationContext {
    let (mut ctx, net) = long_chain(7, 20);
    for i in 0..orders {
        let order = ctx
            .plan_order(net.nodes[0], net.nodes[19], 1, Objective::Time)
            .unwrap();
        ctx.start_order(order, f64::from(i) * 0.1).unwrap();
    }
    ctx
}

/// `layers` layers of `width` warehouses, fully connected between adjacent
/// layers, plus a source and a sink.
fn layered_network(layers: usize, width: usize) -> (SimulationContext, NodeId, NodeId) {
    let mut ctx = SimulationContext::new(3);
    let source = ctx
        .register_node(facility(FacilityRole::Supplier, 1.0, -1.0))
        .unwrap();
    let mut previous = vec![source];
    for layer in 0..layers {
        let current: Vec<NodeId> = (0..width)
            .map(|i| {
                let cost = -1.0 - ((layer * width + i) % 7) as f64;
                ctx.register_node(facility(FacilityRole::Warehouse, 1.0, cost))
                    .unwrap()
            })
            .collect();
        for &from in &previous {
            for (i, &to) in current.iter().enumerate() {
                let avg = 0.5 + (i % 5) as f64;
                ctx.register_arc(transport(from, to, avg, -avg)).unwrap();
            }
        }
        previous = current;
    }
    let sink = ctx
        .register_node(facility(FacilityRole::Customer, 1.0, 100.0))
        .unwrap();
    for &from in &previous {
        ctx.register_arc(transport(from, sink, 1.0, -1.0)).unwrap();
    }
    (ctx, source, sink)
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");
    for orders in [10u32, 100, 1000] {
        group.bench_function(format!("chain_20_nodes_{orders}_orders"), |b| {
            b.iter_batched(
                || busy_chain(orders),
                |mut ctx| ctx.run(f64::MAX).unwrap(),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    let (ctx, source, sink) = layered_network(10, 20);
    group.bench_function("time_10x20", |b| {
        b.iter(|| ctx.shortest_path(source, sink, Objective::Time).unwrap());
    });
    group.bench_function("cashflow_10x20", |b| {
        b.iter(|| ctx.shortest_path(source, sink, Objective::Cashflow).unwrap());
    });
    group.bench_function("route_options_10x20", |b| {
        b.iter(|| ctx.route_options(source, sink).unwrap());
    });
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let mut ctx = busy_chain(500);
    ctx.run(20.0).unwrap();

    group.bench_function("export_500_orders", |b| {
        b.iter(|| ctx.export_state().unwrap());
    });
    let data = ctx.export_state().unwrap();
    group.bench_function("import_500_orders", |b| {
        b.iter(|| SimulationContext::import_state(&data).unwrap());
    });
    group.bench_function("state_hash_500_orders", |b| {
        b.iter(|| ctx.state_hash());
    });
    group.finish();
}

criterion_group!(benches, bench_lifecycle, bench_routing, bench_snapshot);
criterion_main!(benches);
