//! Scar Data -- network descriptions for the simulation core.
//!
//! A network file lists facilities, transport links, orders and scheduled
//! parameter changes by name, in RON, TOML or JSON. [`load_network`]
//! parses one, resolves every name and returns a ready
//! [`SimulationContext`](scar_core::simulation::SimulationContext) together
//! with its name index.

pub mod builder;
pub mod loader;
pub mod schema;

pub use builder::{LoadedNetwork, build_simulation};
pub use loader::{DataLoadError, Format, load_network, parse_network};
