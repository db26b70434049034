//! Schema module - Configuration types for trajectories and parameter sweeps.

mod config;
mod sweep;

pub use config::*;
pub use sweep::*;
