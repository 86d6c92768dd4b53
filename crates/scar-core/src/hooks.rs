//! Per-facility lifecycle callbacks and history metadata enrichment.
//!
//! Hooks are attached to individual nodes at runtime and are not part of a
//! snapshot: after `SimulationContext::import_state` they must be attached
//! again, the same way event subscribers are re-registered after a restore.

use crate::entity::{Entity, FacilityRole, MetaValue, Metadata, Node};
use crate::order::Order;

/// The lifecycle moment a hook is invoked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    Placed,
    Shipped,
    Arrived,
    Completed,
}

/// What a hook can see and touch while it runs.
pub struct HookContext<'a> {
    facility: &'a Node,
    order: &'a mut Order,
    now: f64,
}

impl<'a> HookContext<'a> {
    pub fn new(facility: &'a Node, order: &'a mut Order, now: f64) -> Self {
        Self {
            facility,
            order,
            now,
        }
    }

    /// The facility the hook is attached to.
    pub fn facility(&self) -> &Node {
        self.facility
    }

    pub fn order(&self) -> &Order {
        self.order
    }

    /// Simulation time of the transition.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Add to the cashflow of the record being written for this transition.
    pub fn add_cashflow(&mut self, amount: f64) {
        self.order.add_cashflow(amount);
    }

    /// Attach a metadata entry to the record being written.
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.order.annotate(key.into(), value.into());
    }
}

/// Collaborator logic run at a facility when an order passes through it.
///
/// Every method defaults to a no-op. Hooks run synchronously inside the
/// transition, after the transition's own cashflow has been recorded.
pub trait FacilityHooks {
    fn order_placed(&mut self, _ctx: &mut HookContext<'_>) {}
    fn order_shipped(&mut self, _ctx: &mut HookContext<'_>) {}
    fn order_arrived(&mut self, _ctx: &mut HookContext<'_>) {}
    fn order_completed(&mut self, _ctx: &mut HookContext<'_>) {}
}

/// Call the hook method matching `point`.
pub fn invoke(hooks: &mut dyn FacilityHooks, point: HookPoint, ctx: &mut HookContext<'_>) {
    match point {
        HookPoint::Placed => hooks.order_placed(ctx),
        HookPoint::Shipped => hooks.order_shipped(ctx),
        HookPoint::Arrived => hooks.order_arrived(ctx),
        HookPoint::Completed => hooks.order_completed(ctx),
    }
}

/// Built-in behaviour of a facility role, run before any attached hooks.
pub fn apply_role(role: FacilityRole, point: HookPoint, ctx: &mut HookContext<'_>) {
    if let (FacilityRole::Customer, HookPoint::Completed) = (role, point) {
        // The order never ships onward from a customer, so its revenue is
        // realized here.
        let revenue = ctx.facility().cashflow(ctx.order().units());
        ctx.add_cashflow(revenue);
    }
}

// ---------------------------------------------------------------------------
// Metadata enrichment
// ---------------------------------------------------------------------------

/// Supplies extra fields for every history record of one order.
pub trait MetadataEnricher {
    fn enrich(&self, order: &Order, now: f64) -> Metadata;
}

/// Stamps each record with the whole-number part of the clock as `time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEnricher;

impl MetadataEnricher for DefaultEnricher {
    fn enrich(&self, _order: &Order, now: f64) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("time".to_string(), MetaValue::Int(now.floor() as i64));
        meta
    }
}

impl<F> MetadataEnricher for F
where
    F: Fn(&Order, f64) -> Metadata,
{
    fn enrich(&self, order: &Order, now: f64) -> Metadata {
        self(order, now)
    }
}
