//! Trajectory scoring against current and propagated scans.
//!
//! Each pose is charged an exponential obstacle cost based on its distance
//! to the closest scan point at the pose's timestamp; poses inside the
//! inflated robot radius score negative infinity. The distance of the final
//! pose to the local waypoint is folded into the first pose as a terminal
//! cost, and a trajectory that ends essentially on the waypoint without
//! obstacle penalties short-circuits to a constant reward.

use crate::config::PlannerConfig;
use crate::core::types::{LaserScan, Point2D, Pose2D, Trajectory};
use log::trace;

/// Score vector returned for an obviously good trajectory.
const EARLY_EXIT_SCORE: f32 = 100.0;

/// Terminal cost below which a non-penalized trajectory short-circuits.
const EARLY_EXIT_TERMINAL_COST: f32 = 0.25;

/// Scores candidate trajectories posewise.
pub struct TrajectoryScorer<'a> {
    cfg: &'a PlannerConfig,
}

impl<'a> TrajectoryScorer<'a> {
    pub fn new(cfg: &'a PlannerConfig) -> Self {
        Self { cfg }
    }

    /// Posewise scores for `traj` (robot frame).
    ///
    /// With `future_scans` present, each pose is scored against the
    /// propagated scan nearest its timestamp; otherwise every pose scores
    /// against `scan`. `local_goal` is the waypoint in the robot frame.
    pub fn score(
        &self,
        traj: &Trajectory,
        scan: &LaserScan,
        future_scans: Option<&[LaserScan]>,
        local_goal: Point2D,
    ) -> Vec<f32> {
        if traj.is_empty() {
            return Vec::new();
        }

        let mut costs: Vec<f32> = Vec::with_capacity(traj.len());
        for (pose, t) in traj.poses.iter().zip(traj.times.iter()) {
            let scan_at_t = match future_scans {
                Some(scans) if !scans.is_empty() => {
                    let k = (t / self.cfg.traj.integrate_stept).round() as usize;
                    &scans[k.min(scans.len() - 1)]
                }
                _ => scan,
            };
            costs.push(self.pose_cost(pose, scan_at_t));
        }

        let sum: f32 = costs.iter().sum();
        let terminal = self.terminal_cost(traj.last_pose().expect("non-empty"), local_goal);
        trace!("posewise sum {:.2}, terminal cost {:.2}", sum, terminal);

        if terminal < EARLY_EXIT_TERMINAL_COST && sum >= 0.0 {
            return vec![EARLY_EXIT_SCORE; traj.len()];
        }
        costs[0] -= terminal;
        costs
    }

    /// Sum of the first `num_feasi_check` posewise scores.
    pub fn subscore(&self, costs: &[f32]) -> f32 {
        if costs.is_empty() {
            return f32::NEG_INFINITY;
        }
        let count = self.cfg.planning.num_feasi_check.min(costs.len());
        costs[..count].iter().sum()
    }

    /// Obstacle cost of a single pose against one scan.
    fn pose_cost(&self, pose: &Pose2D, scan: &LaserScan) -> f32 {
        let p = pose.position();
        let mut min_dist = f32::INFINITY;
        for i in 0..scan.len() {
            let d = scan.point_at(i).distance(&p);
            if d < min_dist {
                min_dist = d;
            }
        }

        let inflated = self.cfg.inflated_radius();
        if min_dist < inflated {
            return f32::NEG_INFINITY;
        }
        if min_dist > self.cfg.traj.max_pose_to_scan_dist {
            return 0.0;
        }
        self.cfg.traj.q * (-self.cfg.traj.pen_exp_weight * (min_dist - inflated)).exp()
    }

    /// Distance of the final pose to the local waypoint, weighted.
    fn terminal_cost(&self, last: &Pose2D, local_goal: Point2D) -> f32 {
        self.cfg.traj.q_f * last.position().distance(&local_goal)
    }
}
