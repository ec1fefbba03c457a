//! The planning cycle: orchestration and trajectory arbitration.
//!
//! One call to [`Planner::plan_once`] consumes the latest inputs and
//! produces one reference trajectory in the odometry frame. Candidate
//! trajectories are generated per feasible gap, scored against propagated
//! scans, and the winner is adopted only when it beats the currently
//! tracked trajectory by a hysteresis margin.

use crate::config::PlannerConfig;
use crate::context::PlannerContext;
use crate::core::types::{
    Frame, LaserScan, Point2D, Trajectory, TransformSet, Twist2D,
};
use crate::error::{PlannerError, Result};
use crate::gap::estimator::EgoSample;
use crate::gap::{
    Gap, GapAssociator, GapDetector, GapFeasibilityChecker, GapManipulator,
};
use crate::planning::generator::{TrajectoryGenerator, TrajectoryPolicy};
use crate::planning::propagation::ScanPropagator;
use crate::planning::scorer::TrajectoryScorer;
use log::{debug, info, warn};
use std::sync::Arc;

/// How a planning cycle concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// A trajectory was selected (kept or switched)
    Ok,
    /// Missing or malformed input; the last trajectory is kept
    TransientSensor,
    /// Detection produced no gaps; fell back to go-to-goal
    NoGaps,
    /// No gap passed feasibility (or no candidate scored finitely)
    NoFeasible,
    /// Stall reset performed; planning resumes next cycle
    PlanningStall,
    /// Invariant violation; cycle aborted, state cleared
    Fatal,
}

/// Result of one planning cycle.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// Reference trajectory in the odometry frame; may be empty
    pub trajectory: Trajectory,
    /// How the cycle concluded
    pub status: CycleStatus,
}

/// Gap-based local planner.
pub struct Planner {
    cfg: PlannerConfig,
    ctx: Arc<PlannerContext>,
    /// Previous cycle's simplified gaps, for association
    previous_gaps: Vec<Gap>,
    /// Currently tracked trajectory, odometry frame
    current_traj: Trajectory,
    /// Model IDs of the tracked gap's endpoint estimators
    current_models: Option<(u64, u64)>,
    next_model_id: u64,
    trajectory_changes: u32,
    pending_reset: bool,
}

impl Planner {
    pub fn new(cfg: PlannerConfig) -> Result<Self> {
        cfg.validate()?;
        let ctx = Arc::new(PlannerContext::new(cfg.planning.halt_buffer_size));
        Ok(Self {
            cfg,
            ctx,
            previous_gaps: Vec::new(),
            current_traj: Trajectory::empty(Frame::Odom),
            current_models: None,
            next_model_id: 0,
            trajectory_changes: 0,
            pending_reset: false,
        })
    }

    /// Shared input slots for the caller's sensor callbacks.
    pub fn context(&self) -> Arc<PlannerContext> {
        Arc::clone(&self.ctx)
    }

    /// Trajectory the planner is currently tracking (odometry frame).
    pub fn current_trajectory(&self) -> &Trajectory {
        &self.current_traj
    }

    /// Times the arbiter has switched trajectories.
    pub fn trajectory_change_count(&self) -> u32 {
        self.trajectory_changes
    }

    /// Gap set committed at the end of the last cycle (for introspection
    /// and visualization).
    pub fn committed_gaps(&self) -> &[Gap] {
        &self.previous_gaps
    }

    /// Register a global plan given as poses in the map frame.
    ///
    /// Stores the plan's final pose as the global goal and advances the
    /// local waypoint to the farthest plan pose within the lookahead
    /// distance, keeping the previous waypoint while the new one is within
    /// tolerance.
    pub fn set_global_plan(&mut self, plan_map_frame: &[Point2D]) -> Result<()> {
        let Some(last) = plan_map_frame.last() else {
            return Ok(());
        };
        let tf = self
            .ctx
            .transforms_snapshot()
            .ok_or(PlannerError::MissingInput("transforms"))?;

        self.ctx.set_global_goal(tf.map_point_to_odom(last));

        let robot = tf.robot_in_odom.position();
        let mut waypoint = tf.map_point_to_odom(&plan_map_frame[0]);
        for p in plan_map_frame {
            let odom = tf.map_point_to_odom(p);
            if odom.distance(&robot) <= self.cfg.goal.waypoint_lookahead {
                waypoint = odom;
            }
        }
        let keep = self
            .ctx
            .local_waypoint()
            .is_some_and(|w| w.distance(&waypoint) <= self.cfg.goal.waypoint_tolerance);
        if !keep {
            self.ctx.set_local_waypoint(waypoint);
        }
        Ok(())
    }

    /// Whether the robot has arrived at the global goal.
    pub fn is_goal_reached(&self) -> bool {
        let (Some(tf), Some(goal)) = (
            self.ctx.transforms_snapshot(),
            self.ctx.global_goal(),
        ) else {
            return false;
        };
        tf.robot_in_odom.position().distance(&goal) < self.cfg.goal.goal_tolerance
    }

    /// Record a command velocity and check for a planning stall.
    ///
    /// Returns `false` when the buffer is full with a near-zero sum; a
    /// reset is then scheduled for the start of the next cycle.
    pub fn record_and_check_vel(&mut self, cmd: Twist2D) -> bool {
        let (full, sum) = self.ctx.record_velocity(&cmd);
        if full && sum < 1.0 {
            warn!("command velocities stalled (sum {:.3}); scheduling reset", sum);
            self.pending_reset = true;
            return false;
        }
        true
    }

    /// Clear the tracked trajectory, gap history, and velocity buffer.
    pub fn reset(&mut self) {
        info!("planner reset");
        self.previous_gaps.clear();
        self.current_traj = Trajectory::empty(Frame::Odom);
        self.current_models = None;
        self.ctx.clear_velocity_buffer();
        self.pending_reset = false;
    }

    /// Run one planning cycle.
    pub fn plan_once(&mut self) -> PlanOutcome {
        if self.pending_reset {
            self.reset();
            return PlanOutcome {
                trajectory: Trajectory::empty(Frame::Odom),
                status: CycleStatus::PlanningStall,
            };
        }

        // one consistent snapshot per cycle
        let Some(scan) = self.ctx.scan_snapshot() else {
            warn!("no scan available; skipping cycle");
            return self.keep_current(CycleStatus::TransientSensor);
        };
        let Some(tf) = self.ctx.transforms_snapshot() else {
            warn!("no transforms available; skipping cycle");
            return self.keep_current(CycleStatus::TransientSensor);
        };
        let Some(waypoint_odom) = self.ctx.local_waypoint() else {
            warn!("no local waypoint; skipping cycle");
            return self.keep_current(CycleStatus::TransientSensor);
        };

        let (samples, current_vel) = self.ctx.take_ego_samples();
        let agents = self.ctx.agents_snapshot();
        let local_goal = tf.odom_point_to_robot(&waypoint_odom);
        let global_goal_robot = self
            .ctx
            .global_goal()
            .map(|g| tf.odom_point_to_robot(&g));

        match self.run_cycle(
            &scan,
            &tf,
            &samples,
            current_vel,
            &agents,
            local_goal,
            global_goal_robot,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("cycle aborted: {}", e);
                self.previous_gaps.clear();
                self.current_traj = Trajectory::empty(Frame::Odom);
                self.current_models = None;
                PlanOutcome {
                    trajectory: Trajectory::empty(Frame::Odom),
                    status: CycleStatus::Fatal,
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_cycle(
        &mut self,
        scan: &LaserScan,
        tf: &TransformSet,
        samples: &[EgoSample],
        current_vel: Twist2D,
        agents: &[crate::planning::propagation::AgentState],
        local_goal: Point2D,
        global_goal_robot: Option<Point2D>,
    ) -> Result<PlanOutcome> {
        let detector = GapDetector::new(&self.cfg);

        // 1-2. detect and simplify
        let mut gaps = match detector.detect(scan, global_goal_robot) {
            Ok(raw) => detector.simplify(&raw, scan),
            Err(e) => {
                warn!("gap detection failed: {}", e);
                Vec::new()
            }
        };

        if gaps.is_empty() {
            let target = global_goal_robot.unwrap_or(local_goal);
            self.previous_gaps.clear();
            return Ok(self.fallback_go_to_goal(
                target,
                scan,
                tf,
                local_goal,
                CycleStatus::NoGaps,
            ));
        }

        // 3. associate with the previous cycle, update endpoint filters
        let associator = GapAssociator::new(&self.cfg);
        let mut previous = std::mem::take(&mut self.previous_gaps);
        associator.associate(
            &mut gaps,
            &mut previous,
            scan,
            &mut self.next_model_id,
            scan.stamp_us,
        );
        drop(previous);

        for gap in gaps.iter_mut() {
            if gap.artificial {
                continue;
            }
            let z_left = gap.left.cartesian(scan);
            let z_right = gap.right.cartesian(scan);
            gap.left_estimator
                .as_mut()
                .ok_or(PlannerError::Invariant("endpoint without estimator".into()))?
                .update(z_left, samples, scan.stamp_us);
            gap.right_estimator
                .as_mut()
                .ok_or(PlannerError::Invariant("endpoint without estimator".into()))?
                .update(z_right, samples, scan.stamp_us);
        }

        // 4. feasibility
        let checker = GapFeasibilityChecker::new(&self.cfg);
        let mut feasible_mask = vec![false; gaps.len()];
        let mut current_gap_feasible = false;
        for (i, gap) in gaps.iter_mut().enumerate() {
            let feasible = checker.check(gap, scan, current_vel)?;
            gap.feasible = feasible;
            feasible_mask[i] = feasible;
            if feasible && gap.model_ids() == self.current_models && self.current_models.is_some()
            {
                current_gap_feasible = true;
            }
        }
        debug!(
            "{} of {} gaps feasible",
            feasible_mask.iter().filter(|f| **f).count(),
            gaps.len()
        );

        if !feasible_mask.iter().any(|f| *f) {
            let target = global_goal_robot.unwrap_or(local_goal);
            self.previous_gaps = gaps;
            return Ok(self.fallback_go_to_goal(
                target,
                scan,
                tf,
                local_goal,
                CycleStatus::NoFeasible,
            ));
        }

        // 5-6. manipulate feasible gaps against current and future scans
        let propagator = ScanPropagator::new(&self.cfg);
        let future_scans = propagator.future_scans(scan, agents);
        let manipulator = GapManipulator::new(&self.cfg);

        // 7. one candidate per feasible gap
        let generator = TrajectoryGenerator::new(&self.cfg);
        let scorer = TrajectoryScorer::new(&self.cfg);
        let mut best: Option<(usize, f32, Trajectory)> = None;
        for (i, gap) in gaps.iter_mut().enumerate() {
            if !feasible_mask[i] {
                continue;
            }
            manipulator.manipulate(gap, scan, &future_scans, local_goal);
            let Some(goal) = gap.goal else {
                continue;
            };

            let policy = if gap.artificial {
                TrajectoryPolicy::GoToGoal { goal }
            } else {
                let left_vel = gap
                    .left_estimator
                    .as_ref()
                    .map(|e| e.gap_velocity())
                    .unwrap_or_default();
                let right_vel = gap
                    .right_estimator
                    .as_ref()
                    .map(|e| e.gap_velocity())
                    .unwrap_or_default();
                TrajectoryPolicy::PursuitGuidance {
                    goal,
                    goal_velocity: (left_vel + right_vel).scaled(0.5),
                }
            };

            let traj = generator.generate(&policy, gap.lifespan);
            let costs = scorer.score(&traj, scan, Some(&future_scans), local_goal);
            let sub = scorer.subscore(&costs);
            debug!("gap {} candidate: {} poses, subscore {:.2}", i, traj.len(), sub);
            if best.as_ref().map(|(_, s, _)| sub > *s).unwrap_or(true) {
                best = Some((i, sub, traj));
            }
        }

        // 8-9. arbitrate against the tracked trajectory
        let outcome = match best {
            Some((gap_idx, _, incoming)) if !incoming.is_empty() => {
                let ids = gaps[gap_idx].model_ids();
                self.compare_to_current(
                    incoming,
                    ids,
                    scan,
                    tf,
                    local_goal,
                    current_gap_feasible,
                )
            }
            _ => {
                let target = global_goal_robot.unwrap_or(local_goal);
                self.fallback_go_to_goal(target, scan, tf, local_goal, CycleStatus::NoFeasible)
            }
        };

        // 10. gap sets swap at cycle end
        self.previous_gaps = gaps;
        Ok(outcome)
    }

    /// Decide between the incoming candidate and the tracked trajectory.
    ///
    /// The tracked trajectory is brought into the robot frame, sliced at
    /// the pose closest to the robot, and its remainder re-scored against
    /// the new scan. The incoming candidate wins only if its subscore beats
    /// the current one by the hysteresis margin, or if the current
    /// trajectory is empty, too short, or tracks an infeasible gap.
    fn compare_to_current(
        &mut self,
        incoming_robot: Trajectory,
        incoming_ids: Option<(u64, u64)>,
        scan: &LaserScan,
        tf: &TransformSet,
        local_goal: Point2D,
        current_gap_feasible: bool,
    ) -> PlanOutcome {
        let scorer = TrajectoryScorer::new(&self.cfg);

        let incoming_costs = scorer.score(&incoming_robot, scan, None, local_goal);
        let incoming_sub = scorer.subscore(&incoming_costs);

        if self.current_traj.is_empty() {
            if incoming_sub == f32::NEG_INFINITY {
                warn!("incoming trajectory infeasible and nothing tracked");
                return self.clear_current(CycleStatus::NoFeasible);
            }
            return self.switch_to(incoming_robot, incoming_ids, tf);
        }

        let to_robot = tf.robot_in_odom.inverse();
        let current_robot = self.current_traj.transformed(&to_robot, Frame::Robot);
        let start = current_robot.closest_pose_index(&Point2D::origin());
        let remaining = current_robot.tail(start);

        if remaining.len() < 2 {
            debug!("tracked trajectory nearly exhausted; switching");
            return self.switch_to(incoming_robot, incoming_ids, tf);
        }
        if !current_gap_feasible && self.current_models.is_some() {
            debug!("tracked gap no longer feasible; switching");
            return self.switch_to(incoming_robot, incoming_ids, tf);
        }

        let current_costs = scorer.score(&remaining, scan, None, local_goal);
        let counts = self
            .cfg
            .planning
            .num_feasi_check
            .min(incoming_costs.len())
            .min(current_costs.len());
        let incoming_sub: f32 = incoming_costs[..counts].iter().sum();
        let current_sub: f32 = current_costs[..counts].iter().sum();

        if incoming_sub == f32::NEG_INFINITY && current_sub == f32::NEG_INFINITY {
            warn!("both incoming and tracked trajectories infeasible");
            return self.clear_current(CycleStatus::NoFeasible);
        }

        if incoming_sub > current_sub + counts as f32 {
            info!(
                "switching trajectory: {:.2} > {:.2} + {}",
                incoming_sub, current_sub, counts
            );
            return self.switch_to(incoming_robot, incoming_ids, tf);
        }

        debug!("keeping current trajectory ({:.2} vs {:.2})", current_sub, incoming_sub);
        PlanOutcome {
            trajectory: self.current_traj.clone(),
            status: CycleStatus::Ok,
        }
    }

    fn switch_to(
        &mut self,
        incoming_robot: Trajectory,
        ids: Option<(u64, u64)>,
        tf: &TransformSet,
    ) -> PlanOutcome {
        let odom = incoming_robot.transformed(&tf.robot_in_odom, Frame::Odom);
        self.current_traj = odom.clone();
        self.current_models = ids;
        self.trajectory_changes += 1;
        PlanOutcome {
            trajectory: odom,
            status: CycleStatus::Ok,
        }
    }

    fn clear_current(&mut self, status: CycleStatus) -> PlanOutcome {
        self.current_traj = Trajectory::empty(Frame::Odom);
        self.current_models = None;
        PlanOutcome {
            trajectory: Trajectory::empty(Frame::Odom),
            status,
        }
    }

    fn keep_current(&self, status: CycleStatus) -> PlanOutcome {
        PlanOutcome {
            trajectory: self.current_traj.clone(),
            status,
        }
    }

    /// Go-to-goal fallback used when no gap-based candidate exists.
    fn fallback_go_to_goal(
        &mut self,
        target: Point2D,
        scan: &LaserScan,
        tf: &TransformSet,
        local_goal: Point2D,
        status: CycleStatus,
    ) -> PlanOutcome {
        let generator = TrajectoryGenerator::new(&self.cfg);
        let scorer = TrajectoryScorer::new(&self.cfg);
        let policy = TrajectoryPolicy::GoToGoal { goal: target };
        let traj = generator.generate(&policy, self.cfg.traj.integrate_maxt);
        let costs = scorer.score(&traj, scan, None, local_goal);

        if scorer.subscore(&costs) == f32::NEG_INFINITY {
            warn!("go-to-goal fallback infeasible; clearing trajectory");
            return self.clear_current(status);
        }

        let odom = traj.transformed(&tf.robot_in_odom, Frame::Odom);
        self.current_traj = odom.clone();
        self.current_models = None;
        PlanOutcome {
            trajectory: odom,
            status,
        }
    }
}
