// === Public Modules (The Canonical Paths) ===
pub mod aggregate;
pub mod artifacts;
pub mod bars;
pub mod config;
pub mod episode;
pub mod error;
pub mod evolution;
pub mod executor;
pub mod graph;
pub mod llm;
pub mod regime;

// === Private Implementation Details ===
#[macro_use]
mod macros;

// === Convenience ===
pub mod sorted_vec_map;

pub use crate::config::{EvolutionConfig, Phase3Config, RunConfig};
pub use crate::error::{EvoError, EvoResult};
pub use crate::evolution::Driver;
pub use crate::graph::StrategyGraph;
