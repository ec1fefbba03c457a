//! Core data types for gap-based planning.
//!
//! - [`Point2D`]: 2D point/vector in meters
//! - [`Pose2D`]: Robot pose (x, y, theta) in meters and radians
//! - [`Twist2D`]: Planar velocity (vx, vy, omega)
//! - [`TransformSet`]: Frame transforms supplied by the caller
//! - [`LaserScan`]: 360° range scan in polar coordinates
//! - [`Trajectory`]: Timed pose sequence in a tagged frame

mod pose;
mod scan;
mod trajectory;

pub use pose::{Point2D, Pose2D, TransformSet, Twist2D};
pub use scan::LaserScan;
pub use trajectory::{Frame, Trajectory};
