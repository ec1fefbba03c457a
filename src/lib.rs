//! AntaraNav - Gap-based reactive local planner for differential-drive robots
//!
//! Navigates among moving obstacles by reasoning about *gaps*: angular
//! sectors of free space detected in an egocentric 360° range scan. Each
//! planning cycle consumes one scan and produces a short-horizon reference
//! trajectory in the odometry frame.
//!
//! # Architecture
//!
//! The crate is organized into 3 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   planning/                         │  ← Synthesis & arbitration
//! │   (scan propagation, trajectory generation,         │
//! │    scoring, planner cycle)                          │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     gap/                            │  ← Gap pipeline
//! │   (detection, estimation, association,              │
//! │    feasibility, manipulation)                       │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Planning cycle
//!
//! 1. Snapshot inputs (scan, transforms, ego samples, agents, waypoint)
//! 2. Detect raw gaps, simplify, associate with the previous cycle
//! 3. Update per-endpoint state estimators
//! 4. Feasibility-check each gap (crossing/closing prediction)
//! 5. Manipulate feasible gaps into navigable corridors
//! 6. Synthesize future scans from tracked agents
//! 7. Generate and score one candidate trajectory per gap
//! 8. Arbitrate against the currently tracked trajectory with hysteresis

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Gap pipeline (depends on core)
// ============================================================================
pub mod gap;

// ============================================================================
// Layer 3: Planning (depends on core, gap)
// ============================================================================
pub mod planning;

pub mod config;
pub mod context;
pub mod error;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

pub use self::config::PlannerConfig;
pub use self::context::PlannerContext;
pub use self::core::math;
pub use self::core::types::{
    Frame, LaserScan, Point2D, Pose2D, Trajectory, TransformSet, Twist2D,
};
pub use self::error::{PlannerError, Result};
pub use self::gap::estimator::EgoSample;
pub use self::gap::{Gap, GapCategory, GapKind, GapPoint};
pub use self::planning::planner::{CycleStatus, PlanOutcome, Planner};
pub use self::planning::propagation::AgentState;
