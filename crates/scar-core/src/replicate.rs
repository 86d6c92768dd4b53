//! Independent replications of one scenario under different seeds.
//!
//! Each replication builds its own [`SimulationContext`] inside the worker
//! that runs it, so no simulation state is shared. With the `parallel`
//! feature the replications are spread over a rayon pool; results come back
//! in seed order either way.

use crate::order::StageRecord;
use crate::sim::RunSummary;
use crate::simulation::{SimError, SimulationContext};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

/// Outcome of one seeded run.
#[derive(Debug, Clone, PartialEq)]
pub struct Replication {
    pub seed: u64,
    pub summary: RunSummary,
    /// History of every order, indexed by order id.
    pub histories: Vec<Vec<StageRecord>>,
    pub state_hash: u64,
}

impl Replication {
    /// Net cashflow over all orders.
    pub fn total_cashflow(&self) -> f64 {
        self.histories
            .iter()
            .flat_map(|h| h.iter().map(|r| r.cashflow))
            .sum()
    }
}

fn replicate_one<F>(seed: u64, max_time: f64, build: &F) -> Result<Replication, SimError>
where
    F: Fn(u64) -> Result<SimulationContext, SimError>,
{
    let mut ctx = build(seed)?;
    let summary = ctx.run(max_time)?;
    debug!(seed, events = summary.events_executed, "replication finished");
    Ok(Replication {
        seed,
        summary,
        histories: ctx.orders().iter().map(|o| o.history().to_vec()).collect(),
        state_hash: ctx.state_hash(),
    })
}

/// Build a context per seed with `build`, run each to `max_time` and
/// collect the results. The first error is returned.
pub fn run_replications<F>(
    seeds: &[u64],
    max_time: f64,
    build: F,
) -> Result<Vec<Replication>, SimError>
where
    F: Fn(u64) -> Result<SimulationContext, SimError> + Sync,
{
    #[cfg(feature = "parallel")]
    let results = seeds
        .par_iter()
        .map(|&seed| replicate_one(seed, max_time, &build))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results = seeds
        .iter()
        .map(|&seed| replicate_one(seed, max_time, &build))
        .collect();

    results
}
