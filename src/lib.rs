//! Trait Evolution - Stochastic simulation of cumulative trait evolution.
//!
//! A population of traits grows and shrinks through four events: invention of
//! a seed trait, combination of two lineage-disjoint traits, modification of a
//! trait, and loss of a trait. Every trait carries a utility. The crate covers
//! two variants of the model:
//!
//! - **Cultural evolution**: every new trait is kept and one trait is lost
//!   with probability `1 - (rho1 + rho2 + rho3)`, low utility first.
//! - **AI evolution**: new composite traits must pass a judgment gate, the
//!   utility increment depends on a reasoning quality, and accepted gains can
//!   be reinvested into that quality.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration types for single trajectories and parameter sweeps
//! - `compute`: Trait genealogy, the trajectory engine, complexity measures,
//!   parallel sweeps and export
//!
//! # Example
//!
//! ```rust,no_run
//! use trait_evolution::{
//!     compute::{Trajectory, save_table, SweepResult},
//!     schema::SimulationConfig,
//! };
//!
//! // Judgment-gated run with reinvested reasoning
//! let config = SimulationConfig::ai(0.2, 0.4, 0.4, 0.8, 0.6, true)
//!     .with_iterations(1000)
//!     .with_seed(42);
//!
//! let result = Trajectory::new(config.clone())?.run()?;
//! let last = result.last().expect("at least one iteration");
//! println!(
//!     "{} traits, mean utility {:.3}, final reason {:?}",
//!     last.trait_number, last.mean_utility, result.final_reason
//! );
//!
//! save_table("trajectory.csv", &SweepResult::single(&config, result))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{SweepRunner, Trajectory, TrajectoryResult, run_simulation};
pub use schema::{SimulationConfig, SweepConfig};
