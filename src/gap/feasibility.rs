//! Gap feasibility: can a moving gap be traversed before it closes?
//!
//! Endpoint estimators are frozen (ego motion removed) and propagated over
//! the planning horizon. The endpoint bearings classify the gap as
//! expanding, static, or closing; for closing gaps the simulation detects
//! the bearing-crossing instant and, when the endpoints also converge below
//! the safety separation, the closing instant. A cubic boundary-value
//! spline from the robot to the closing point decides whether the robot can
//! physically make the crossing in time.

use crate::config::PlannerConfig;
use crate::core::math::{left_to_right_angle, CubicSpline};
use crate::core::types::{LaserScan, Point2D, Twist2D};
use crate::error::{PlannerError, Result};
use crate::gap::{Gap, GapBounds, GapCategory, GapPoint};
use log::{debug, trace};
use std::f32::consts::PI;

/// Bearing rates below this are treated as stationary (rad/s).
const BEARING_RATE_EPS: f32 = 1e-3;

/// Classifies gaps and predicts their lifespan.
pub struct GapFeasibilityChecker<'a> {
    cfg: &'a PlannerConfig,
}

struct CrossingOutcome {
    crossed: bool,
    closed: bool,
    crossing_point: Option<Point2D>,
    closing_point: Option<Point2D>,
    close_time: Option<f32>,
    terminal_left: Point2D,
    terminal_right: Point2D,
}

impl<'a> GapFeasibilityChecker<'a> {
    pub fn new(cfg: &'a PlannerConfig) -> Self {
        Self { cfg }
    }

    /// Check one gap, filling in its category, lifespan, crossing/closing
    /// data and terminal endpoints. Returns whether the gap is feasible.
    ///
    /// `ego_vel` is the robot's current body velocity, used as the spline's
    /// initial condition.
    pub fn check(&self, gap: &mut Gap, scan: &LaserScan, ego_vel: Twist2D) -> Result<bool> {
        let maxt = self.cfg.traj.integrate_maxt;

        if gap.artificial {
            gap.category = GapCategory::Artificial;
            gap.lifespan = maxt;
            gap.term = GapBounds {
                left: gap.left,
                right: gap.right,
            };
            return Ok(true);
        }

        let (left_rate, right_rate) = {
            let left = gap
                .left_estimator
                .as_mut()
                .ok_or(PlannerError::Invariant("gap without left estimator".into()))?;
            left.isolate_gap_dynamics();
            let right = gap
                .right_estimator
                .as_mut()
                .ok_or(PlannerError::Invariant("gap without right estimator".into()))?;
            right.isolate_gap_dynamics();
            (left.frozen_polar().2, right.frozen_polar().2)
        };

        gap.category = if left_rate - right_rate > BEARING_RATE_EPS {
            GapCategory::Expanding
        } else if right_rate - left_rate > BEARING_RATE_EPS {
            GapCategory::Closing
        } else {
            GapCategory::Static
        };
        trace!(
            "bearing rates: left {:.4}, right {:.4} -> {:?}",
            left_rate,
            right_rate,
            gap.category
        );

        let outcome = self.simulate_crossing(gap);

        gap.crossed = outcome.crossed;
        gap.closed = outcome.closed;
        gap.crossing_point = outcome.crossing_point;
        gap.closing_point = outcome.closing_point;
        gap.term = GapBounds {
            left: point_to_polar(outcome.terminal_left, scan),
            right: point_to_polar(outcome.terminal_right, scan),
        };

        let crossing_time = outcome.close_time.unwrap_or(maxt);
        let spline_ok = self.spline_check(gap, ego_vel, crossing_time);

        match gap.category {
            GapCategory::Expanding | GapCategory::Static => {
                gap.lifespan = maxt;
                Ok(true)
            }
            GapCategory::Closing => {
                gap.lifespan = crossing_time;
                if !spline_ok {
                    debug!(
                        "closing gap infeasible: peak spline velocity {:?} exceeds {:.2}",
                        gap.peak_spline_vel, self.cfg.robot.vx_absmax
                    );
                }
                Ok(spline_ok)
            }
            GapCategory::Artificial => Ok(true),
        }
    }

    /// Propagate both frozen endpoints over the horizon, watching for the
    /// bearings to cross and for the Cartesian separation to collapse.
    fn simulate_crossing(&self, gap: &mut Gap) -> CrossingOutcome {
        let step = self.cfg.traj.integrate_stept;
        let maxt = self.cfg.traj.integrate_maxt;
        let closing_sep = 4.0 * self.cfg.inflated_radius();
        let closing_offset = 2.0 * self.cfg.inflated_radius();

        // Both estimators are present: `check` verified before calling.
        let left = gap.left_estimator.as_mut().expect("checked");
        let right = gap.right_estimator.as_mut().expect("checked");

        let mut prev_left = left.frozen_position();
        let mut prev_right = right.frozen_position();
        let initial_sweep = left_to_right_angle(
            unit_tuple(prev_left),
            unit_tuple(prev_right),
        );
        let mut prev_center =
            Point2D::from_polar(1.0, prev_left.bearing() - 0.5 * initial_sweep);

        let mut outcome = CrossingOutcome {
            crossed: false,
            closed: false,
            crossing_point: None,
            closing_point: None,
            close_time: None,
            terminal_left: prev_left,
            terminal_right: prev_right,
        };

        let steps = (maxt / step).round() as usize;
        for k in 1..=steps {
            let t = k as f32 * step;
            left.integrate_frozen(step);
            right.integrate_frozen(step);
            let l = left.frozen_position();
            let r = right.frozen_position();

            let sweep = left_to_right_angle(unit_tuple(l), unit_tuple(r));
            let center = Point2D::from_polar(1.0, l.bearing() - 0.5 * sweep);

            let bearings_passed_center = l.normalized().dot(&prev_center) > 0.0
                && r.normalized().dot(&prev_center) > 0.0;

            if sweep > PI && bearings_passed_center {
                let separation = prev_left.distance(&prev_right);
                if separation < closing_sep {
                    let nearer = if prev_left.norm() < prev_right.norm() {
                        prev_left
                    } else {
                        prev_right
                    };
                    let closing_point = nearer + nearer.normalized().scaled(closing_offset);
                    trace!("gap closes at t = {:.2}", t);
                    outcome.closed = true;
                    outcome.closing_point = Some(closing_point);
                    outcome.close_time = Some(t);
                    outcome.terminal_left = prev_left;
                    outcome.terminal_right = prev_right;
                    return outcome;
                }
                if !outcome.crossed {
                    trace!("gap crosses without closing at t = {:.2}", t);
                    outcome.crossed = true;
                    outcome.crossing_point =
                        Some((prev_left + prev_right).scaled(0.5));
                    outcome.terminal_left = prev_left;
                    outcome.terminal_right = prev_right;
                }
            }

            prev_center = center;
            prev_left = l;
            prev_right = r;
        }

        if !outcome.crossed && !outcome.closed {
            outcome.terminal_left = prev_left;
            outcome.terminal_right = prev_right;
        }
        outcome
    }

    /// Fit per-axis cubics from the robot's current state to the closing
    /// point and bound their mid-horizon velocity.
    fn spline_check(&self, gap: &mut Gap, ego_vel: Twist2D, crossing_time: f32) -> bool {
        let target = gap.closing_point.unwrap_or(Point2D::origin());
        let v0 = ego_vel.linear();
        let v_end = if target.norm() > f32::EPSILON {
            target.normalized().scaled(v0.norm())
        } else {
            Point2D::origin()
        };

        let spline_x = CubicSpline::fit(0.0, v0.x, target.x, v_end.x, crossing_time);
        let spline_y = CubicSpline::fit(0.0, v0.y, target.y, v_end.y, crossing_time);
        let peak_x = spline_x.velocity_at(crossing_time / 2.0);
        let peak_y = spline_y.velocity_at(crossing_time / 2.0);
        gap.peak_spline_vel = Some((peak_x, peak_y));

        peak_x.abs().max(peak_y.abs()) <= self.cfg.robot.vx_absmax
    }
}

fn unit_tuple(p: Point2D) -> (f32, f32) {
    let u = p.normalized();
    (u.x, u.y)
}

fn point_to_polar(p: Point2D, scan: &LaserScan) -> GapPoint {
    GapPoint::new(scan.index_of(p.bearing()), p.norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::{GapKind, GapPointEstimator};
    use approx::assert_relative_eq;

    fn scan() -> LaserScan {
        LaserScan::new(vec![5.0; 512], 6.0, 0)
    }

    fn gap_with_dynamics(
        scan: &LaserScan,
        left: (Point2D, Point2D),
        right: (Point2D, Point2D),
    ) -> Gap {
        let left_pt = point_to_polar(left.0, scan);
        let right_pt = point_to_polar(right.0, scan);
        let mut gap = Gap::open(right_pt, GapKind::Swept, scan.min_range());
        gap.close_left(left_pt, scan);

        let mut le = GapPointEstimator::with_position(0, left.0, 0);
        le.set_dynamics(left.0, left.1);
        let mut re = GapPointEstimator::with_position(1, right.0, 0);
        re.set_dynamics(right.0, right.1);
        gap.left_estimator = Some(Box::new(le));
        gap.right_estimator = Some(Box::new(re));
        gap
    }

    #[test]
    fn test_static_gap_feasible_full_horizon() {
        let cfg = PlannerConfig::default();
        let scan = scan();
        let mut gap = gap_with_dynamics(
            &scan,
            (Point2D::new(1.5, 1.0), Point2D::origin()),
            (Point2D::new(1.5, -1.0), Point2D::origin()),
        );
        let feasible = GapFeasibilityChecker::new(&cfg)
            .check(&mut gap, &scan, Twist2D::default())
            .unwrap();
        assert!(feasible);
        assert_eq!(gap.category, GapCategory::Static);
        assert_relative_eq!(gap.lifespan, cfg.traj.integrate_maxt);
        assert!(!gap.crossed && !gap.closed);
        // terminal endpoints stay where they started
        assert_relative_eq!(gap.term.left.range, 1.5f32.hypot(1.0), epsilon = 1e-3);
    }

    #[test]
    fn test_expanding_gap_classified() {
        let cfg = PlannerConfig::default();
        let scan = scan();
        let mut gap = gap_with_dynamics(
            &scan,
            (Point2D::new(1.5, 1.0), Point2D::new(0.0, 0.3)),
            (Point2D::new(1.5, -1.0), Point2D::new(0.0, -0.3)),
        );
        let feasible = GapFeasibilityChecker::new(&cfg)
            .check(&mut gap, &scan, Twist2D::default())
            .unwrap();
        assert!(feasible);
        assert_eq!(gap.category, GapCategory::Expanding);
        assert_relative_eq!(gap.lifespan, cfg.traj.integrate_maxt);
    }

    #[test]
    fn test_closing_gap_lifespan_and_closing_point() {
        let mut cfg = PlannerConfig::default();
        cfg.robot.vx_absmax = 2.0; // generous bound: focus on the geometry
        let scan = scan();
        let mut gap = gap_with_dynamics(
            &scan,
            (Point2D::new(1.5, 0.8), Point2D::new(0.0, -0.3)),
            (Point2D::new(1.5, -0.8), Point2D::new(0.0, 0.3)),
        );
        let feasible = GapFeasibilityChecker::new(&cfg)
            .check(&mut gap, &scan, Twist2D::new(0.3, 0.0, 0.0))
            .unwrap();
        assert_eq!(gap.category, GapCategory::Closing);
        assert!(gap.closed);
        assert!(feasible);
        // endpoints meet near t = 0.8/0.3 ≈ 2.67s
        assert!(gap.lifespan > 2.0 && gap.lifespan < 3.2, "lifespan {}", gap.lifespan);
        let cp = gap.closing_point.unwrap();
        // closing point sits between the agents, pushed outward
        assert!(cp.x > 1.5);
        assert!(cp.y.abs() < 0.3);
    }

    #[test]
    fn test_closing_gap_infeasible_when_spline_too_fast() {
        let mut cfg = PlannerConfig::default();
        cfg.robot.vx_absmax = 0.5;
        let scan = scan();
        let mut gap = gap_with_dynamics(
            &scan,
            (Point2D::new(1.5, 0.8), Point2D::new(0.0, -0.3)),
            (Point2D::new(1.5, -0.8), Point2D::new(0.0, 0.3)),
        );
        let feasible = GapFeasibilityChecker::new(&cfg)
            .check(&mut gap, &scan, Twist2D::new(0.3, 0.0, 0.0))
            .unwrap();
        assert_eq!(gap.category, GapCategory::Closing);
        assert!(!feasible);
        let (px, py) = gap.peak_spline_vel.unwrap();
        assert!(px.abs().max(py.abs()) > cfg.robot.vx_absmax);
    }

    #[test]
    fn test_artificial_gap_always_feasible() {
        let cfg = PlannerConfig::default();
        let scan = scan();
        let mut gap = Gap::open(GapPoint::new(235, 5.0), GapKind::Swept, 5.0);
        gap.close_left(GapPoint::new(277, 5.0), &scan);
        gap.artificial = true;
        // no estimators attached: artificial gaps skip the simulation
        let feasible = GapFeasibilityChecker::new(&cfg)
            .check(&mut gap, &scan, Twist2D::default())
            .unwrap();
        assert!(feasible);
        assert_eq!(gap.category, GapCategory::Artificial);
        assert_eq!(gap.term.left, gap.left);
    }

    #[test]
    fn test_missing_estimator_is_invariant_violation() {
        let cfg = PlannerConfig::default();
        let scan = scan();
        let mut gap = Gap::open(GapPoint::new(100, 2.0), GapKind::Radial, 1.0);
        gap.close_left(GapPoint::new(150, 2.0), &scan);
        assert!(GapFeasibilityChecker::new(&cfg)
            .check(&mut gap, &scan, Twist2D::default())
            .is_err());
    }
}
