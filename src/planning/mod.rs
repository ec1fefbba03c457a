//! Planning: future-scan synthesis, trajectory generation, scoring, and the
//! per-cycle arbiter.

pub mod generator;
pub mod planner;
pub mod propagation;
pub mod scorer;

pub use generator::{TrajectoryGenerator, TrajectoryPolicy};
pub use planner::{CycleStatus, PlanOutcome, Planner};
pub use propagation::{AgentState, ScanPropagator};
pub use scorer::TrajectoryScorer;
