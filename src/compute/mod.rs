//! Compute module - Trajectory engine, complexity measures and parameter sweeps.

mod complexity;
mod engine;
mod export;
mod lineage;
mod population;
mod rng;
mod sweep;

pub use complexity::*;
pub use engine::*;
pub use export::*;
pub use lineage::*;
pub use population::*;
pub use rng::{RandomSource, TraitRng};
pub use sweep::*;
