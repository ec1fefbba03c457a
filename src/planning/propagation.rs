//! Future-scan synthesis from tracked agents.
//!
//! Feasibility-aware scoring needs to know what the scan will look like
//! while the robot executes a candidate trajectory. Each future scan starts
//! from the current scan and masks in every known agent as a disk of the
//! robot's inscribed radius, slid forward along its velocity.

use crate::config::PlannerConfig;
use crate::core::types::{LaserScan, Point2D};
use log::trace;
use serde::{Deserialize, Serialize};

/// Position and velocity of one nearby agent, robot frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Position in the robot frame (meters)
    pub position: Point2D,
    /// Velocity in the robot frame (m/s)
    pub velocity: Point2D,
}

/// Synthesizes the scan sequence over the planning horizon.
pub struct ScanPropagator<'a> {
    cfg: &'a PlannerConfig,
}

impl<'a> ScanPropagator<'a> {
    pub fn new(cfg: &'a PlannerConfig) -> Self {
        Self { cfg }
    }

    /// Scans at `t = 0, Δt, 2Δt, …, integrate_maxt`.
    ///
    /// Index `k` holds the scan at `t = k·integrate_stept`. Agents beyond
    /// the scan range are pruned; the rest are applied nearest-first so each
    /// ray keeps the closest intersection.
    pub fn future_scans(&self, scan: &LaserScan, agents: &[AgentState]) -> Vec<LaserScan> {
        let steps = self.cfg.horizon_steps();
        let mut scans = Vec::with_capacity(steps + 1);
        scans.push(self.masked(scan, agents, 0.0));
        for k in 1..=steps {
            let t = k as f32 * self.cfg.traj.integrate_stept;
            scans.push(self.masked(scan, agents, t));
        }
        scans
    }

    /// The current scan with every agent advanced by `t` and stamped in.
    fn masked(&self, scan: &LaserScan, agents: &[AgentState], t: f32) -> LaserScan {
        let mut out = scan.clone();
        out.stamp_us = scan.stamp_us + (t * 1e6) as u64;
        for range in out.ranges.iter_mut() {
            *range = range.min(scan.range_max);
        }
        if agents.is_empty() {
            return out;
        }

        // advance, prune, sort nearest-first
        let mut advanced: Vec<Point2D> = agents
            .iter()
            .map(|a| a.position + a.velocity.scaled(t))
            .filter(|p| p.norm() < scan.range_max)
            .collect();
        advanced.sort_by(|a, b| {
            a.norm()
                .partial_cmp(&b.norm())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let radius = self.cfg.robot.r_inscribed;
        let mut masked_rays = 0usize;
        for i in 0..out.len() {
            let bearing = out.angle_at(i);
            let dir = Point2D::from_polar(1.0, bearing);
            for center in &advanced {
                if let Some(hit) = ray_disk_entry(&dir, center, radius) {
                    if hit < out.ranges[i] {
                        out.ranges[i] = hit;
                        masked_rays += 1;
                        break;
                    }
                }
            }
        }
        trace!("masked {} rays at t = {:.2}", masked_rays, t);
        out
    }
}

/// Distance along a unit ray from the origin to where it enters a disk, if
/// it does.
fn ray_disk_entry(dir: &Point2D, center: &Point2D, radius: f32) -> Option<f32> {
    let along = center.dot(dir);
    let discriminant = along * along - (center.dot(center) - radius * radius);
    if discriminant <= 0.0 {
        return None;
    }
    let entry = along - discriminant.sqrt();
    (entry > 0.0).then_some(entry)
}
