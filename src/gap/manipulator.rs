//! Gap manipulation: shaping a detected gap into a navigable corridor.
//!
//! Five in-place transforms run in order on a feasible gap: oversized gaps
//! are narrowed toward the local goal, axial gaps are rotated inward until
//! they present a radial opening, the corridor origin is extended behind
//! the robot, both sides are inflated by the safety radius, and finally a
//! goal is placed inside the sector. The same transforms run a second time
//! on the terminal endpoints against the propagated scan at the gap's
//! predicted end of life.

use crate::config::PlannerConfig;
use crate::core::math::{
    index_span, index_within_arc, left_to_right_angle, left_to_right_angle_signed, wrap_index,
};
use crate::core::types::{LaserScan, Point2D};
use crate::gap::{compute_axial, Gap, GapBounds, GapCategory, GapPoint};
use log::trace;
use std::f32::consts::PI;

/// Which endpoint set a transform operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPhase {
    /// Corridor at t = 0, against the current scan
    Initial,
    /// Corridor at t = lifespan, against the propagated scan
    Terminal,
}

/// Applies the corridor transforms to feasible gaps.
pub struct GapManipulator<'a> {
    cfg: &'a PlannerConfig,
}

impl<'a> GapManipulator<'a> {
    pub fn new(cfg: &'a PlannerConfig) -> Self {
        Self { cfg }
    }

    /// Run the full transform pipeline on one gap: initial corridor against
    /// `scan`, terminal corridor against the propagated scan at the gap's
    /// lifespan, then goal placement for both phases.
    ///
    /// `local_goal` is the global-plan local waypoint in the robot frame.
    pub fn manipulate(
        &self,
        gap: &mut Gap,
        scan: &LaserScan,
        future_scans: &[LaserScan],
        local_goal: Point2D,
    ) {
        let term_scan = self.terminal_scan(gap.lifespan, scan, future_scans);
        gap.term_min_safe_dist = term_scan.min_range();

        self.reduce(gap, scan, local_goal, GapPhase::Initial);
        self.convert_axial(gap, scan, GapPhase::Initial);
        self.radial_extend(gap, scan, GapPhase::Initial);
        self.inflate(gap, scan, GapPhase::Initial);
        self.place_goal(gap, scan, local_goal, GapPhase::Initial);

        self.reduce(gap, term_scan, local_goal, GapPhase::Terminal);
        self.convert_axial(gap, term_scan, GapPhase::Terminal);
        self.radial_extend(gap, term_scan, GapPhase::Terminal);
        self.inflate(gap, term_scan, GapPhase::Terminal);
        self.place_terminal_goal(gap, term_scan, local_goal);
    }

    /// Propagated scan closest to the gap's end of life.
    fn terminal_scan<'s>(
        &self,
        lifespan: f32,
        scan: &'s LaserScan,
        future_scans: &'s [LaserScan],
    ) -> &'s LaserScan {
        if future_scans.is_empty() {
            return scan;
        }
        let idx = (lifespan / self.cfg.traj.integrate_stept).round() as usize;
        &future_scans[idx.min(future_scans.len() - 1)]
    }

    /// Narrow an oversized gap toward the local goal.
    ///
    /// Wide sectors give the trajectory synthesis a poorly conditioned
    /// corridor; anything wider than the reduction threshold is cut to the
    /// target span, biased left, right, or goal-centered depending on where
    /// the goal bearing falls.
    pub fn reduce(&self, gap: &mut Gap, scan: &LaserScan, local_goal: Point2D, phase: GapPhase) {
        let n = scan.len();
        let bounds = *gap.bounds(phase);
        let width = index_span(bounds.right.idx, bounds.left.idx, n) as f32 * scan.angle_increment;
        if width < self.cfg.manip.reduction_threshold {
            return;
        }

        let target_idx = (self.cfg.manip.reduction_target / scan.angle_increment) as i64;
        let right_biased_left = wrap_index(bounds.right.idx as i64 + target_idx, n);
        let left_biased_right = wrap_index(bounds.left.idx as i64 - target_idx, n);

        let goal_idx = scan.index_of(local_goal.bearing());
        let half = target_idx / 2;
        let near_left = index_within_arc(
            goal_idx,
            wrap_index(bounds.left.idx as i64 - half, n),
            wrap_index(bounds.left.idx as i64 + half, n),
            n,
        );
        let near_right = index_within_arc(
            goal_idx,
            wrap_index(bounds.right.idx as i64 - half, n),
            wrap_index(bounds.right.idx as i64 + half, n),
            n,
        );

        let (new_left, new_right) = if near_left {
            (bounds.left.idx, left_biased_right)
        } else if near_right {
            (right_biased_left, bounds.right.idx)
        } else {
            (
                wrap_index(goal_idx as i64 + half, n),
                wrap_index(goal_idx as i64 - half, n),
            )
        };

        // ranges follow the original span by linear interpolation
        let orig_span = index_span(bounds.right.idx, bounds.left.idx, n) as f32;
        let left_frac = index_span(bounds.right.idx, new_left, n) as f32 / orig_span;
        let right_frac = index_span(bounds.right.idx, new_right, n) as f32 / orig_span;
        let range_delta = bounds.left.range - bounds.right.range;

        let out = gap.bounds_mut(phase);
        out.left = GapPoint::new(new_left, left_frac * range_delta + bounds.right.range);
        out.right = GapPoint::new(new_right, right_frac * range_delta + bounds.right.range);
        trace!(
            "reduced gap to [{}, {}] ({:?})",
            out.right.idx,
            out.left.idx,
            phase
        );
    }

    /// Rotate an axial gap inward so it presents a radial opening.
    ///
    /// The far endpoint pivots around the near endpoint by a fixed angle,
    /// then the rays between the original and pivoted bearings are searched
    /// for the closest scan return to the near endpoint; the new far
    /// endpoint sits at that distance along the pivoted direction.
    pub fn convert_axial(&self, gap: &mut Gap, scan: &LaserScan, phase: GapPhase) {
        let n = scan.len();
        let bounds = *gap.bounds(phase);
        if !compute_axial(&bounds.left, &bounds.right, scan) {
            return;
        }

        let right_type = bounds.right_type();
        let swing = (self.cfg.manip.epsilon2 * self.cfg.manip.rot_ratio)
            .atan2(self.cfg.manip.epsilon1)
            + 1e-3;
        let rotation = if right_type { swing } else { -swing };

        let (near, far) = if right_type {
            (bounds.right, bounds.left)
        } else {
            (bounds.left, bounds.right)
        };
        let near_pt = near.cartesian(scan);
        let far_pt = far.cartesian(scan);

        let pivoted_dir = (far_pt - near_pt).rotated(rotation);
        let pivoted_idx = scan.index_of((near_pt + pivoted_dir).bearing());

        let (search_start, search_end) = if right_type {
            (bounds.left.idx, pivoted_idx)
        } else {
            (pivoted_idx, bounds.right.idx)
        };
        let search_len = index_span(search_start, search_end, n);
        if search_len == 0 {
            return;
        }

        // closest scan return to the near endpoint across the searched arc
        let mut best_dist = f32::INFINITY;
        for offset in 0..=search_len {
            let idx = wrap_index(search_start as i64 + offset as i64, n);
            let range = scan.range_at(idx);
            let ray_sep = crate::core::math::angle_diff(
                scan.angle_at(near.idx),
                scan.angle_at(idx),
            )
            .abs();
            let dist_sq = near.range * near.range + range * range
                - 2.0 * near.range * range * ray_sep.cos();
            if dist_sq < best_dist * best_dist {
                best_dist = dist_sq.max(0.0).sqrt();
            }
        }

        let new_far_pt = near_pt + pivoted_dir.normalized().scaled(best_dist);
        let new_far = GapPoint::new(scan.index_of(new_far_pt.bearing()), new_far_pt.norm());

        let out = gap.bounds_mut(phase);
        if right_type {
            out.left = new_far;
        } else {
            out.right = new_far;
        }
        trace!(
            "axial gap converted: far endpoint now ({}, {:.2}) ({:?})",
            new_far.idx,
            new_far.range,
            phase
        );
    }

    /// Anchor the corridor behind the robot.
    ///
    /// The corridor origin moves opposite the gap's central bearing by the
    /// inflated radius; the two curve anchors sit at ±π/2 from it.
    pub fn radial_extend(&self, gap: &mut Gap, scan: &LaserScan, phase: GapPhase) {
        let bounds = gap.bounds(phase);
        let left_u = bounds.left.cartesian(scan).normalized();
        let right_u = bounds.right.cartesian(scan).normalized();
        let sweep = left_to_right_angle((left_u.x, left_u.y), (right_u.x, right_u.y));
        let center_bearing = left_u.y.atan2(left_u.x) - 0.5 * sweep;
        let center = Point2D::from_polar(1.0, center_bearing);

        let origin = center.scaled(-self.cfg.inflated_radius());
        match phase {
            GapPhase::Initial => {
                gap.extended_origin = origin;
                gap.left_curve_origin = origin.rotated_cw();
                gap.right_curve_origin = origin.rotated_ccw();
            }
            GapPhase::Terminal => {
                gap.term_extended_origin = origin;
            }
        }
    }

    /// Inflate both sides by the safety radius.
    ///
    /// Endpoints rotate inward by the angle the inflated radius subtends at
    /// their range (skipped when that would cross them), then extend
    /// radially outward, clamped to stay inside the nearest scan return.
    pub fn inflate(&self, gap: &mut Gap, scan: &LaserScan, phase: GapPhase) {
        let n = scan.len();
        let infl = self.cfg.inflated_radius();
        let bounds = *gap.bounds(phase);

        let pt_l = bounds.left.cartesian(scan);
        let pt_r = bounds.right.cartesian(scan);
        let left_u = pt_l.normalized();
        let right_u = pt_r.normalized();
        let sweep = left_to_right_angle((left_u.x, left_u.y), (right_u.x, right_u.y));

        // angular inflation: push each endpoint toward the sector interior
        let new_left_pt = pt_l + left_u.rotated_cw().scaled(infl);
        let new_right_pt = pt_r + right_u.rotated_ccw().scaled(infl);
        let new_left_u = new_left_pt.normalized();
        let new_right_u = new_right_pt.normalized();
        let new_sweep = left_to_right_angle_signed(
            (new_left_u.x, new_left_u.y),
            (new_right_u.x, new_right_u.y),
        );

        let (left_idx, right_idx, left_range, right_range) = if new_sweep < 0.0 {
            // inflation would cross the endpoints; keep the sector
            (
                bounds.left.idx,
                bounds.right.idx,
                bounds.left.range,
                bounds.right.range,
            )
        } else {
            let left_idx = scan.index_of(new_left_pt.bearing());
            let right_idx = scan.index_of(new_right_pt.bearing());
            let to_left = left_to_right_angle_signed(
                (left_u.x, left_u.y),
                (new_left_u.x, new_left_u.y),
            );
            let to_right = left_to_right_angle_signed(
                (left_u.x, left_u.y),
                (new_right_u.x, new_right_u.y),
            );
            let delta = bounds.right.range - bounds.left.range;
            (
                left_idx,
                right_idx,
                delta * to_left / sweep + bounds.left.range,
                delta * to_right / sweep + bounds.left.range,
            )
        };

        // radial extension outward, held inside the scan by the safety radius
        let extend = 2.0 * infl;
        let left_clamped = (left_range + extend)
            .min(scan.range_at(left_idx) - infl)
            .max(infl);
        let right_clamped = (right_range + extend)
            .min(scan.range_at(right_idx) - infl)
            .max(infl);

        let (left_idx, right_idx) = if left_idx == right_idx {
            (wrap_index(left_idx as i64 + 1, n), right_idx)
        } else {
            (left_idx, right_idx)
        };

        let out = gap.bounds_mut(phase);
        out.left = GapPoint::new(left_idx, left_clamped);
        out.right = GapPoint::new(right_idx, right_clamped);
    }

    /// Place the goal inside the manipulated sector for one phase.
    pub fn place_goal(
        &self,
        gap: &mut Gap,
        scan: &LaserScan,
        local_goal: Point2D,
        phase: GapPhase,
    ) {
        let bounds = *gap.bounds(phase);
        let pt_l = bounds.left.cartesian(scan);
        let pt_r = bounds.right.cartesian(scan);
        let left_u = pt_l.normalized();
        let right_u = pt_r.normalized();
        let sweep = left_to_right_angle((left_u.x, left_u.y), (right_u.x, right_u.y));
        let theta_l = pt_l.bearing();
        let theta_r = pt_r.bearing();

        if gap.artificial {
            gap.set_goal(phase, local_goal);
            return;
        }

        // small frontal gap: aim for the midpoint
        let small = sweep < PI && pt_l.distance(&pt_r) < 4.0 * self.cfg.robot.r_inscribed;
        if small {
            let center_bearing = theta_l - 0.5 * sweep;
            let center_range = (pt_l.norm() + pt_r.norm()) / 2.0;
            gap.set_goal(phase, Point2D::from_polar(center_range, center_bearing));
            return;
        }

        let goal_bearing = local_goal.bearing();
        let goal_idx = scan.index_of(goal_bearing);
        let within =
            index_within_arc(goal_idx, bounds.right.idx, bounds.left.idx, scan.len());
        if within && self.goal_visible(&local_goal, &bounds, scan) {
            gap.set_goal(phase, local_goal);
            return;
        }

        // bias: confine the goal bearing to the sector and push off the walls
        let goal_u = Point2D::from_polar(1.0, goal_bearing);
        let left_to_goal = left_to_right_angle((left_u.x, left_u.y), (goal_u.x, goal_u.y));
        let right_to_goal = left_to_right_angle((right_u.x, right_u.y), (goal_u.x, goal_u.y));

        let confined_bearing = if theta_r < theta_l {
            theta_l.min(theta_r.max(goal_bearing))
        } else if left_to_goal > 0.0 && left_to_goal < sweep {
            goal_bearing
        } else if left_to_goal.min(2.0 * PI - left_to_goal)
            < right_to_goal.min(2.0 * PI - right_to_goal)
        {
            theta_l
        } else {
            theta_r
        };

        let confined_u = Point2D::from_polar(1.0, confined_bearing);
        let left_to_confined =
            left_to_right_angle_signed((left_u.x, left_u.y), (confined_u.x, confined_u.y));
        let confined_range = (bounds.right.range - bounds.left.range) * left_to_confined / sweep
            + bounds.left.range;
        let anchor = Point2D::from_polar(confined_range, confined_bearing);

        let infl = self.cfg.inflated_radius();
        let radial_offset = anchor.normalized().scaled(infl);
        let angular_offset = if confined_bearing == theta_r {
            right_u.rotated_ccw().scaled(infl)
        } else if confined_bearing == theta_l {
            left_u.rotated_cw().scaled(infl)
        } else if left_to_confined / sweep < 0.1 {
            left_u.rotated_cw().scaled(infl)
        } else if left_to_confined / sweep > 0.9 {
            right_u.rotated_ccw().scaled(infl)
        } else {
            Point2D::origin()
        };

        gap.set_goal(phase, anchor + radial_offset + angular_offset);
    }

    /// Terminal goal: closing gaps aim at their crossing or closing point,
    /// everything else places a goal in the terminal sector.
    pub fn place_terminal_goal(&self, gap: &mut Gap, term_scan: &LaserScan, local_goal: Point2D) {
        match gap.category {
            GapCategory::Closing if gap.closed => {
                gap.terminal_goal = gap.closing_point;
            }
            GapCategory::Closing if gap.crossed => {
                gap.terminal_goal = gap.crossing_point;
            }
            _ => self.place_goal(gap, term_scan, local_goal, GapPhase::Terminal),
        }
    }

    /// Whether the local goal is visible through the gap.
    fn goal_visible(&self, local_goal: &Point2D, bounds: &GapBounds, scan: &LaserScan) -> bool {
        let dist = local_goal.norm();
        if dist < 2.0 * self.cfg.robot.r_inscribed {
            return true;
        }
        if dist < scan.min_range() - self.cfg.inflated_radius() {
            return true;
        }

        // range of the gap edge interpolated at the goal bearing
        let pt_l = bounds.left.cartesian(scan);
        let pt_r = bounds.right.cartesian(scan);
        let left_u = pt_l.normalized();
        let right_u = pt_r.normalized();
        let goal_u = Point2D::from_polar(1.0, local_goal.bearing());
        let sweep = left_to_right_angle((left_u.x, left_u.y), (right_u.x, right_u.y));
        let to_goal = left_to_right_angle((left_u.x, left_u.y), (goal_u.x, goal_u.y));
        let edge_range =
            (bounds.right.range - bounds.left.range) * to_goal / sweep + bounds.left.range;
        dist < edge_range
    }
}
