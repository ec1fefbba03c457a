//! Candidate trajectory synthesis.
//!
//! Two policies produce dense (pose, time) sequences in the robot frame by
//! fixed-step Euler integration: a constant-speed field toward a single
//! target, and a pursuit-guidance law that drives the line-of-sight rate to
//! zero against a drifting intercept point. Generated paths are then
//! downsampled, given headings, and stripped of their dangling final pose.

use crate::config::PlannerConfig;
use crate::core::types::{Frame, Point2D, Pose2D, Trajectory};
use log::trace;

/// Minimum spacing between consecutive poses after post-processing.
const POSE_SPACING: f32 = 0.1;

/// Velocity policy integrated into a candidate trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrajectoryPolicy {
    /// Constant-speed vector field toward a fixed target.
    GoToGoal {
        /// Target in the robot frame
        goal: Point2D,
    },
    /// Parallel navigation against an intercept point that moves with the
    /// gap.
    PursuitGuidance {
        /// Intercept point at t = 0, robot frame
        goal: Point2D,
        /// Intercept point velocity (mean of the endpoint velocities)
        goal_velocity: Point2D,
    },
}

impl TrajectoryPolicy {
    /// Commanded velocity at position `pos` and time `t`.
    fn velocity(&self, pos: Point2D, t: f32, speed: f32) -> Point2D {
        match self {
            TrajectoryPolicy::GoToGoal { goal } => {
                let to_goal = *goal - pos;
                if to_goal.norm() < 1e-3 {
                    Point2D::origin()
                } else {
                    to_goal.normalized().scaled(speed)
                }
            }
            TrajectoryPolicy::PursuitGuidance {
                goal,
                goal_velocity,
            } => {
                let target = *goal + goal_velocity.scaled(t);
                let los = target - pos;
                if los.norm() < 1e-3 {
                    return *goal_velocity;
                }
                let sight = los.normalized();
                // target velocity component across the line of sight must be
                // matched to hold the sight line fixed
                let across = *goal_velocity - sight.scaled(goal_velocity.dot(&sight));
                let closing_sq = (speed * speed - across.dot(&across)).max(0.0);
                across + sight.scaled(closing_sq.sqrt())
            }
        }
    }
}

/// Integrates policies into post-processed candidate trajectories.
pub struct TrajectoryGenerator<'a> {
    cfg: &'a PlannerConfig,
}

impl<'a> TrajectoryGenerator<'a> {
    pub fn new(cfg: &'a PlannerConfig) -> Self {
        Self { cfg }
    }

    /// Integrate `policy` from the robot origin for `t_max` seconds and
    /// post-process the result. The returned trajectory is in the robot
    /// frame.
    pub fn generate(&self, policy: &TrajectoryPolicy, t_max: f32) -> Trajectory {
        let step = self.cfg.traj.integrate_stept;
        let speed = self.cfg.robot.vx_absmax;
        let t_end = t_max.min(self.cfg.traj.integrate_maxt).max(0.0);

        let mut raw = Trajectory::empty(Frame::Robot);
        let mut pos = Point2D::origin();
        let mut t = 0.0;
        raw.push(Pose2D::new(pos.x, pos.y, 0.0), t);
        while t + step <= t_end + 1e-6 {
            let vel = policy.velocity(pos, t, speed);
            pos = pos + vel.scaled(step);
            t += step;
            raw.push(Pose2D::new(pos.x, pos.y, 0.0), t);
        }

        let processed = self.process(raw);
        trace!("generated {} poses over {:.1}s", processed.len(), t_end);
        processed
    }

    /// Downsample to the minimum pose spacing, point each pose at its
    /// successor, and drop the final pose whose heading would be undefined.
    fn process(&self, raw: Trajectory) -> Trajectory {
        let mut out = Trajectory::empty(Frame::Robot);
        out.push(Pose2D::identity(), 0.0);

        for i in 1..raw.len() {
            let candidate = raw.poses[i].position();
            let kept = out.poses.last().expect("seeded with origin").position();
            if candidate.distance(&kept) > POSE_SPACING {
                out.push(raw.poses[i], raw.times[i]);
            }
        }

        // orientations face the successor pose
        for i in 1..out.len() {
            let prev = out.poses[i - 1].position();
            let next = out.poses[i].position();
            let heading = (next - prev).bearing();
            out.poses[i - 1].theta = heading;
        }
        if !out.poses.is_empty() {
            out.poses.pop();
            out.times.pop();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cfg() -> PlannerConfig {
        PlannerConfig::default()
    }

    #[test]
    fn test_go_to_goal_reaches_target_line() {
        let cfg = cfg();
        let policy = TrajectoryPolicy::GoToGoal {
            goal: Point2D::new(2.0, 0.0),
        };
        let traj = TrajectoryGenerator::new(&cfg).generate(&policy, cfg.traj.integrate_maxt);
        assert!(!traj.is_empty());
        // every pose stays on the straight line to the goal
        for pose in &traj.poses {
            assert!(pose.y.abs() < 0.05, "pose off-line: {:?}", pose);
            assert!(pose.x <= 2.0 + 0.06);
        }
        // horizon at 0.5 m/s covers the 2 m to the goal
        let last = traj.last_pose().unwrap();
        assert!(last.x > 1.5, "trajectory too short: {:?}", last);
    }

    #[test]
    fn test_pose_spacing_and_headings() {
        let cfg = cfg();
        let policy = TrajectoryPolicy::GoToGoal {
            goal: Point2D::new(2.0, 2.0),
        };
        let traj = TrajectoryGenerator::new(&cfg).generate(&policy, cfg.traj.integrate_maxt);
        for i in 1..traj.len() {
            let d = traj.poses[i]
                .position()
                .distance(&traj.poses[i - 1].position());
            assert!(d > POSE_SPACING - 1e-4);
            // heading points at the successor
            let expected =
                (traj.poses[i].position() - traj.poses[i - 1].position()).bearing();
            assert_relative_eq!(traj.poses[i - 1].theta, expected, epsilon = 1e-4);
        }
        // times strictly increase from zero
        assert_relative_eq!(traj.times[0], 0.0);
        for i in 1..traj.len() {
            assert!(traj.times[i] > traj.times[i - 1]);
        }
    }

    #[test]
    fn test_pursuit_against_static_goal_matches_go_to_goal() {
        let cfg = cfg();
        let pursuit = TrajectoryPolicy::PursuitGuidance {
            goal: Point2D::new(2.0, 1.0),
            goal_velocity: Point2D::origin(),
        };
        let g2g = TrajectoryPolicy::GoToGoal {
            goal: Point2D::new(2.0, 1.0),
        };
        let gen = TrajectoryGenerator::new(&cfg);
        let a = gen.generate(&pursuit, 4.0);
        let b = gen.generate(&g2g, 4.0);
        // a stationary intercept point degenerates to the same straight run
        let n = a.len().min(b.len());
        for i in 0..n {
            assert!(a.poses[i].position().distance(&b.poses[i].position()) < 0.05);
        }
    }

    #[test]
    fn test_pursuit_leads_a_moving_goal() {
        let cfg = cfg();
        let policy = TrajectoryPolicy::PursuitGuidance {
            goal: Point2D::new(2.0, 0.0),
            goal_velocity: Point2D::new(0.0, 0.2),
        };
        let traj = TrajectoryGenerator::new(&cfg).generate(&policy, cfg.traj.integrate_maxt);
        // the path bends toward where the goal is going
        let last = traj.last_pose().unwrap();
        assert!(last.y > 0.1, "no lead on moving goal: {:?}", last);
    }

    #[test]
    fn test_zero_horizon_yields_empty_trajectory() {
        let cfg = cfg();
        let policy = TrajectoryPolicy::GoToGoal {
            goal: Point2D::new(2.0, 0.0),
        };
        let traj = TrajectoryGenerator::new(&cfg).generate(&policy, 0.0);
        // only the origin pose existed, and post-processing drops the tail
        assert!(traj.is_empty());
    }
}
