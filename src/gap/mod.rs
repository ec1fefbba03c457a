//! Gap pipeline: detection, estimation, association, feasibility,
//! manipulation.
//!
//! A [`Gap`] is a directed angular sector of free space between two scan
//! endpoints. The interior is the counter-clockwise arc from the right
//! endpoint (lower index) to the left endpoint (higher index, modulo the ray
//! count). Each gap owns one state estimator per endpoint; association
//! transfers estimators to the next cycle's gaps.

pub mod associator;
pub mod detector;
pub mod estimator;
pub mod feasibility;
pub mod manipulator;

pub use associator::GapAssociator;
pub use detector::GapDetector;
pub use estimator::GapPointEstimator;
pub use feasibility::GapFeasibilityChecker;
pub use manipulator::{GapManipulator, GapPhase};

use crate::core::math::{index_span, left_to_right_angle};
use crate::core::types::{LaserScan, Point2D};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// One gap endpoint: a scan index paired with a range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapPoint {
    /// Ray index in the scan
    pub idx: usize,
    /// Range at that ray, meters
    pub range: f32,
}

impl GapPoint {
    /// Create a new endpoint.
    #[inline]
    pub fn new(idx: usize, range: f32) -> Self {
        Self { idx, range }
    }

    /// Bearing of this endpoint under the given scan geometry.
    #[inline]
    pub fn bearing(&self, scan: &LaserScan) -> f32 {
        scan.angle_at(self.idx)
    }

    /// Cartesian position in the robot frame.
    #[inline]
    pub fn cartesian(&self, scan: &LaserScan) -> Point2D {
        Point2D::from_polar(self.range, self.bearing(scan))
    }
}

/// How a raw gap was opened during detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapKind {
    /// Range discontinuity between two consecutive finite rays
    Radial,
    /// Sector swept between a finite→infinite and an infinite→finite edge
    Swept,
}

/// Predicted evolution of a gap over the planning horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapCategory {
    /// Endpoints separating; traversable for the whole horizon
    Expanding,
    /// Endpoint bearings stationary
    Static,
    /// Endpoints converging; may close before the robot passes
    Closing,
    /// Synthesized around the global goal; not backed by scan geometry
    Artificial,
}

/// A manipulated endpoint pair (left and right) for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapBounds {
    pub left: GapPoint,
    pub right: GapPoint,
}

impl GapBounds {
    /// Sector width as swept from left to right, in `[0, 2π)`.
    pub fn angular_width(&self, scan: &LaserScan) -> f32 {
        let l = self.left.bearing(scan);
        let r = self.right.bearing(scan);
        left_to_right_angle((l.cos(), l.sin()), (r.cos(), r.sin()))
    }

    /// Chord length between the two endpoints.
    pub fn chord(&self, scan: &LaserScan) -> f32 {
        self.left.cartesian(scan).distance(&self.right.cartesian(scan))
    }

    /// Right range below left range.
    #[inline]
    pub fn right_type(&self) -> bool {
        self.right.range < self.left.range
    }
}

/// A directed angular sector of free space between two scan endpoints.
///
/// Carries the detected (simplified) endpoints, the manipulated corridor
/// used at t = 0, the terminal corridor propagated to the gap's predicted
/// end of life, lifecycle flags, per-phase goals, and the two endpoint
/// estimators it owns.
#[derive(Debug)]
pub struct Gap {
    /// Right endpoint as detected (lower index)
    pub right: GapPoint,
    /// Left endpoint as detected (higher index modulo ray count)
    pub left: GapPoint,
    /// Detection event that opened this gap
    pub kind: GapKind,
    /// Sector subtends more than 3π/4 seen from the short endpoint
    pub axial: bool,
    /// Synthesized to cover the global goal in undetected free space
    pub artificial: bool,
    /// Minimum scan range when the gap was detected
    pub min_safe_dist: f32,
    /// Minimum range of the propagated scan at the terminal time
    pub term_min_safe_dist: f32,

    /// Corridor endpoints after manipulation at t = 0
    pub manip: GapBounds,
    /// Corridor endpoints propagated to t = lifespan
    pub term: GapBounds,

    /// Predicted evolution over the horizon
    pub category: GapCategory,
    /// Outcome of the latest feasibility check
    pub feasible: bool,
    /// Seconds until the gap is predicted to close (or the horizon)
    pub lifespan: f32,
    /// Endpoint bearings crossed during the feasibility simulation
    pub crossed: bool,
    /// Endpoints additionally converged below the safety separation
    pub closed: bool,
    /// Midpoint of the endpoints at the bearing-crossing instant
    pub crossing_point: Option<Point2D>,
    /// Safety-offset point recorded when the gap closes
    pub closing_point: Option<Point2D>,
    /// Peak axis velocities of the feasibility spline
    pub peak_spline_vel: Option<(f32, f32)>,

    /// Corridor origin pulled behind the robot by the safety radius
    pub extended_origin: Point2D,
    /// Terminal-phase corridor origin
    pub term_extended_origin: Point2D,
    /// Left curve anchor behind the robot
    pub left_curve_origin: Point2D,
    /// Right curve anchor behind the robot
    pub right_curve_origin: Point2D,

    /// Goal placed inside the initial corridor
    pub goal: Option<Point2D>,
    /// Goal placed inside the terminal corridor
    pub terminal_goal: Option<Point2D>,

    /// Estimator tracking the left endpoint; `None` after transfer
    pub left_estimator: Option<Box<GapPointEstimator>>,
    /// Estimator tracking the right endpoint; `None` after transfer
    pub right_estimator: Option<Box<GapPointEstimator>>,
}

impl Gap {
    /// Open a gap at its right endpoint. [`Gap::close_left`] completes it.
    pub fn open(right: GapPoint, kind: GapKind, min_safe_dist: f32) -> Self {
        let bounds = GapBounds {
            left: right,
            right,
        };
        Self {
            right,
            left: right,
            kind,
            axial: false,
            artificial: false,
            min_safe_dist,
            term_min_safe_dist: min_safe_dist,
            manip: bounds,
            term: bounds,
            category: GapCategory::Static,
            feasible: false,
            lifespan: 0.0,
            crossed: false,
            closed: false,
            crossing_point: None,
            closing_point: None,
            peak_spline_vel: None,
            extended_origin: Point2D::origin(),
            term_extended_origin: Point2D::origin(),
            left_curve_origin: Point2D::origin(),
            right_curve_origin: Point2D::origin(),
            goal: None,
            terminal_goal: None,
            left_estimator: None,
            right_estimator: None,
        }
    }

    /// Complete the gap with its left endpoint and classify its geometry.
    pub fn close_left(&mut self, left: GapPoint, scan: &LaserScan) {
        self.left = left;
        self.axial = compute_axial(&self.left, &self.right, scan);
        self.manip = GapBounds {
            left: self.left,
            right: self.right,
        };
        self.term = self.manip;
    }

    /// Extend the left endpoint (merging) and re-classify.
    pub fn extend_left(&mut self, left: GapPoint, scan: &LaserScan) {
        self.close_left(left, scan);
    }

    /// Number of scan indices swept from right to left, modulo the ray count.
    #[inline]
    pub fn index_width(&self, n: usize) -> usize {
        index_span(self.right.idx, self.left.idx, n)
    }

    /// Euclidean distance between the detected endpoints.
    pub fn euclidean_width(&self, scan: &LaserScan) -> f32 {
        self.left.cartesian(scan).distance(&self.right.cartesian(scan))
    }

    /// Right range below left range (detected endpoints).
    #[inline]
    pub fn right_type(&self) -> bool {
        self.right.range < self.left.range
    }

    /// Endpoint pair for the given manipulation phase.
    #[inline]
    pub fn bounds(&self, phase: GapPhase) -> &GapBounds {
        match phase {
            GapPhase::Initial => &self.manip,
            GapPhase::Terminal => &self.term,
        }
    }

    /// Mutable endpoint pair for the given manipulation phase.
    #[inline]
    pub fn bounds_mut(&mut self, phase: GapPhase) -> &mut GapBounds {
        match phase {
            GapPhase::Initial => &mut self.manip,
            GapPhase::Terminal => &mut self.term,
        }
    }

    /// Goal slot for the given phase.
    #[inline]
    pub fn set_goal(&mut self, phase: GapPhase, goal: Point2D) {
        match phase {
            GapPhase::Initial => self.goal = Some(goal),
            GapPhase::Terminal => self.terminal_goal = Some(goal),
        }
    }

    /// Move both estimators out, leaving this gap without filters.
    pub fn take_estimators(
        &mut self,
    ) -> (
        Option<Box<GapPointEstimator>>,
        Option<Box<GapPointEstimator>>,
    ) {
        (self.left_estimator.take(), self.right_estimator.take())
    }

    /// Model IDs of both estimators, if attached.
    pub fn model_ids(&self) -> Option<(u64, u64)> {
        match (&self.left_estimator, &self.right_estimator) {
            (Some(l), Some(r)) => Some((l.model_id(), r.model_id())),
            _ => None,
        }
    }
}

/// Sector subtends more than 3π/4 as seen from the short endpoint.
///
/// Law of cosines across the chord, then the angle opposite the long side;
/// endpoints nearly collinear with the robot yield angles close to π.
pub fn compute_axial(left: &GapPoint, right: &GapPoint, scan: &LaserScan) -> bool {
    let span = index_span(right.idx, left.idx, scan.len()) as f32;
    let sector_angle = span * scan.angle_increment;
    let (l, r) = (left.range, right.range);
    let short_side = l.min(r);
    let chord_sq = l * l + r * r - 2.0 * l * r * sector_angle.cos();
    if chord_sq <= f32::EPSILON {
        return false;
    }
    let chord = chord_sq.sqrt();
    let ratio = (short_side / chord * sector_angle.sin()).clamp(-1.0, 1.0);
    let far_angle = PI - ratio.asin() - sector_angle;
    far_angle > 0.75 * PI
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(n: usize, range: f32) -> LaserScan {
        LaserScan::new(vec![range; n], 5.0, 0)
    }

    #[test]
    fn test_axial_for_adjacent_ray_jump() {
        // adjacent rays with a large range jump: nearly collinear endpoints
        let s = scan(512, 5.0);
        let right = GapPoint::new(255, 1.0);
        let left = GapPoint::new(256, 4.0);
        assert!(compute_axial(&left, &right, &s));
    }

    #[test]
    fn test_radial_for_wide_symmetric_gap() {
        // 90° sector with equal ranges: viewed broadside, not axial
        let s = scan(512, 5.0);
        let right = GapPoint::new(192, 2.0);
        let left = GapPoint::new(320, 2.0);
        assert!(!compute_axial(&left, &right, &s));
    }

    #[test]
    fn test_index_width_wraps() {
        let s = scan(512, 5.0);
        let mut g = Gap::open(GapPoint::new(480, 3.0), GapKind::Swept, 1.0);
        g.close_left(GapPoint::new(31, 3.0), &s);
        assert_eq!(g.index_width(512), 63);
    }

    #[test]
    fn test_take_estimators_leaves_none() {
        let s = scan(512, 5.0);
        let mut g = Gap::open(GapPoint::new(10, 2.0), GapKind::Radial, 1.0);
        g.close_left(GapPoint::new(20, 2.5), &s);
        g.left_estimator = Some(Box::new(GapPointEstimator::with_position(
            1,
            Point2D::new(1.0, 1.0),
            0,
        )));
        g.right_estimator = Some(Box::new(GapPointEstimator::with_position(
            2,
            Point2D::new(1.0, -1.0),
            0,
        )));
        assert_eq!(g.model_ids(), Some((1, 2)));
        let (l, r) = g.take_estimators();
        assert!(l.is_some() && r.is_some());
        assert!(g.left_estimator.is_none() && g.right_estimator.is_none());
        assert_eq!(g.model_ids(), None);
    }
}
