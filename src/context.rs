//! Shared input state between sensor callbacks and the planning cycle.
//!
//! Input callbacks (scan, odometry, acceleration, agent odometry, global
//! plan) run concurrently with the planner and deposit into individual
//! mutex-guarded slots with overwrite-latest semantics. The planning cycle
//! takes one consistent snapshot of every slot at its start and never
//! re-reads mid-cycle.

use crate::core::types::{LaserScan, Point2D, TransformSet, Twist2D};
use crate::gap::estimator::EgoSample;
use crate::planning::propagation::AgentState;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Robot motion inputs accumulated between planning cycles.
#[derive(Debug, Default)]
struct EgoInputs {
    /// Velocity/acceleration samples since the last estimator update
    samples: Vec<EgoSample>,
    /// Most recent body velocity
    current_vel: Twist2D,
}

/// Goal-related inputs in the odometry frame.
#[derive(Debug, Default)]
struct GoalInputs {
    /// Local waypoint along the global plan
    local_waypoint: Option<Point2D>,
    /// Final pose of the global plan
    global_goal: Option<Point2D>,
}

/// Mutex-guarded input slots shared with the caller's callbacks.
pub struct PlannerContext {
    scan: Mutex<Option<LaserScan>>,
    transforms: Mutex<Option<TransformSet>>,
    ego: Mutex<EgoInputs>,
    agents: Mutex<Vec<AgentState>>,
    goals: Mutex<GoalInputs>,
    /// Recent |vx| + |vy| + |ω| values for stall detection
    vel_buffer: Mutex<VecDeque<f32>>,
    vel_buffer_capacity: usize,
}

impl PlannerContext {
    pub fn new(vel_buffer_capacity: usize) -> Self {
        Self {
            scan: Mutex::new(None),
            transforms: Mutex::new(None),
            ego: Mutex::new(EgoInputs::default()),
            agents: Mutex::new(Vec::new()),
            goals: Mutex::new(GoalInputs::default()),
            vel_buffer: Mutex::new(VecDeque::with_capacity(vel_buffer_capacity)),
            vel_buffer_capacity,
        }
    }

    /// Deposit the latest scan (overwrites any unconsumed one).
    pub fn set_scan(&self, scan: LaserScan) {
        *self.scan.lock() = Some(scan);
    }

    /// Copy of the latest scan.
    pub fn scan_snapshot(&self) -> Option<LaserScan> {
        self.scan.lock().clone()
    }

    /// Deposit the latest frame transforms.
    pub fn set_transforms(&self, transforms: TransformSet) {
        *self.transforms.lock() = Some(transforms);
    }

    /// Copy of the latest transforms.
    pub fn transforms_snapshot(&self) -> Option<TransformSet> {
        *self.transforms.lock()
    }

    /// Record one robot velocity/acceleration sample.
    pub fn push_ego_sample(&self, sample: EgoSample) {
        let mut ego = self.ego.lock();
        ego.current_vel = sample.twist;
        ego.samples.push(sample);
    }

    /// Drain accumulated ego samples; returns them with the current
    /// velocity.
    pub fn take_ego_samples(&self) -> (Vec<EgoSample>, Twist2D) {
        let mut ego = self.ego.lock();
        let samples = std::mem::take(&mut ego.samples);
        (samples, ego.current_vel)
    }

    /// Replace the tracked agent set (robot frame).
    pub fn set_agents(&self, agents: Vec<AgentState>) {
        *self.agents.lock() = agents;
    }

    /// Copy of the tracked agent set.
    pub fn agents_snapshot(&self) -> Vec<AgentState> {
        self.agents.lock().clone()
    }

    /// Store the local waypoint (odometry frame).
    pub fn set_local_waypoint(&self, waypoint: Point2D) {
        self.goals.lock().local_waypoint = Some(waypoint);
    }

    /// Latest local waypoint (odometry frame).
    pub fn local_waypoint(&self) -> Option<Point2D> {
        self.goals.lock().local_waypoint
    }

    /// Store the global goal (odometry frame).
    pub fn set_global_goal(&self, goal: Point2D) {
        self.goals.lock().global_goal = Some(goal);
    }

    /// Latest global goal (odometry frame).
    pub fn global_goal(&self) -> Option<Point2D> {
        self.goals.lock().global_goal
    }

    /// Record one command velocity; returns whether the buffer is full and
    /// the sum of its entries.
    pub fn record_velocity(&self, cmd: &Twist2D) -> (bool, f32) {
        let mut buffer = self.vel_buffer.lock();
        if buffer.len() == self.vel_buffer_capacity {
            buffer.pop_front();
        }
        buffer.push_back(cmd.magnitude_sum());
        let full = buffer.len() == self.vel_buffer_capacity;
        let sum = buffer.iter().sum();
        (full, sum)
    }

    /// Empty the command-velocity buffer.
    pub fn clear_velocity_buffer(&self) {
        self.vel_buffer.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_slot_overwrites_latest() {
        let ctx = PlannerContext::new(4);
        ctx.set_scan(LaserScan::new(vec![1.0; 8], 5.0, 100));
        ctx.set_scan(LaserScan::new(vec![2.0; 8], 5.0, 200));
        let scan = ctx.scan_snapshot().unwrap();
        assert_eq!(scan.stamp_us, 200);
    }

    #[test]
    fn test_ego_samples_drained_once() {
        let ctx = PlannerContext::new(4);
        ctx.push_ego_sample(EgoSample {
            twist: Twist2D::new(0.1, 0.0, 0.0),
            accel: Point2D::origin(),
            stamp_us: 10,
        });
        ctx.push_ego_sample(EgoSample {
            twist: Twist2D::new(0.2, 0.0, 0.0),
            accel: Point2D::origin(),
            stamp_us: 20,
        });
        let (samples, vel) = ctx.take_ego_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(vel.vx, 0.2);
        let (samples, vel) = ctx.take_ego_samples();
        assert!(samples.is_empty());
        // current velocity persists across drains
        assert_eq!(vel.vx, 0.2);
    }

    #[test]
    fn test_velocity_buffer_windows() {
        let ctx = PlannerContext::new(3);
        let slow = Twist2D::new(0.05, 0.0, 0.0);
        let (full, _) = ctx.record_velocity(&slow);
        assert!(!full);
        ctx.record_velocity(&slow);
        let (full, sum) = ctx.record_velocity(&slow);
        assert!(full);
        assert!((sum - 0.15).abs() < 1e-6);
        // ring semantics: a fast entry displaces the oldest slow one
        let (full, sum) = ctx.record_velocity(&Twist2D::new(1.0, 0.0, 0.0));
        assert!(full);
        assert!((sum - 1.1).abs() < 1e-6);
        ctx.clear_velocity_buffer();
        let (full, _) = ctx.record_velocity(&slow);
        assert!(!full);
    }
}
