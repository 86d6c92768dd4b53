//! Scar Core -- a discrete-event simulation engine for supply chain
//! networks.
//!
//! Facilities (nodes) are joined by transport links (arcs). Orders travel a
//! planned path through them, spending stochastic processing time and
//! accruing cashflow at every stage, while a deterministic event queue
//! drives the clock.
//!
//! # Core Triad
//!
//! 1. **Event queue** -- [`queue::EventQueue`] orders events by
//!    `(fire_time, sequence)` and owns the clock.
//! 2. **Routing graph** -- [`graph::RoutingGraph`] keeps a time graph and a
//!    cashflow graph in sync with live entity parameters and answers
//!    shortest-path queries under either objective.
//! 3. **Order lifecycle** -- [`order::plan_transition`] moves an order
//!    `started -> shipped -> arrived -> ... -> completed`, recording an
//!    audit history.
//!
//! [`simulation::SimulationContext`] composes the three and is the only
//! owner of simulation state.
//!
//! # Example
//!
//! ```rust
//! use scar_core::entity::{Arc, FacilityRole, Node, ProcessingParams};
//! use scar_core::graph::Objective;
//! use scar_core::simulation::SimulationContext;
//!
//! let mut ctx = SimulationContext::new(42);
//! let supplier = ctx
//!     .register_node(Node::facility(
//!         FacilityRole::Supplier,
//!         ProcessingParams::new(1.0, 2.0, 0.5, -50.0),
//!     ))
//!     .unwrap();
//! let customer = ctx
//!     .register_node(Node::facility(
//!         FacilityRole::Customer,
//!         ProcessingParams::new(0.1, 0.3, 0.05, 200.0),
//!     ))
//!     .unwrap();
//! ctx.register_arc(Arc::new(
//!     supplier,
//!     customer,
//!     ProcessingParams::new(0.1, 0.2, 0.05, -10.0),
//! ))
//! .unwrap();
//!
//! let order = ctx.plan_order(supplier, customer, 1, Objective::Cashflow).unwrap();
//! ctx.start_order(order, 0.0).unwrap();
//! ctx.run(10.0).unwrap();
//! assert!(ctx.order(order).unwrap().is_completed());
//! ```
//!
//! # Key Types
//!
//! - [`entity::Node`] / [`entity::Arc`] -- processable network elements.
//! - [`entity::ProcessingParams`] -- time distribution and per-unit cashflow.
//! - [`order::Order`] -- units travelling a fixed planned path.
//! - [`hooks::FacilityHooks`] -- per-facility lifecycle callbacks.
//! - [`serialize`] -- versioned snapshots via bitcode.

pub mod config;
pub mod entity;
pub mod graph;
pub mod hooks;
pub mod id;
pub mod order;
pub mod queue;
pub mod replicate;
pub mod rng;
pub mod serialize;
pub mod sim;
pub mod simulation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
