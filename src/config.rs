//! Configuration loading for AntaraNav

use crate::error::{PlannerError, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub traj: TrajectoryConfig,
    #[serde(default)]
    pub manip: ManipulationConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub goal: GoalConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
}

/// Robot geometry and speed limits
#[derive(Clone, Debug, Deserialize)]
pub struct RobotConfig {
    /// Inscribed radius of the robot footprint (meters)
    #[serde(default = "default_r_inscribed")]
    pub r_inscribed: f32,

    /// Maximum commanded linear speed (m/s); also the spline feasibility bound
    #[serde(default = "default_vx_absmax")]
    pub vx_absmax: f32,
}

/// Expected scan geometry
#[derive(Clone, Debug, Deserialize)]
pub struct ScanConfig {
    /// Expected number of rays per scan (default: 512)
    #[serde(default = "default_ray_count")]
    pub ray_count: usize,

    /// Sentinel range in meters beyond which rays carry no return
    #[serde(default = "default_range_max")]
    pub range_max: f32,
}

/// Forward simulation, safety inflation, and scoring weights
#[derive(Clone, Debug, Deserialize)]
pub struct TrajectoryConfig {
    /// Forward-simulation horizon (seconds)
    #[serde(default = "default_integrate_maxt")]
    pub integrate_maxt: f32,

    /// Forward-simulation step (seconds)
    #[serde(default = "default_integrate_stept")]
    pub integrate_stept: f32,

    /// Safety multiplier applied to the inscribed radius
    #[serde(default = "default_inf_ratio")]
    pub inf_ratio: f32,

    /// Per-pose obstacle cost weight (negative: costs penalize)
    #[serde(default = "default_q")]
    pub q: f32,

    /// Terminal goal-distance cost weight
    #[serde(default = "default_q_f")]
    pub q_f: f32,

    /// Exponential falloff rate of the per-pose obstacle cost
    #[serde(default = "default_pen_exp_weight")]
    pub pen_exp_weight: f32,

    /// Distance beyond which a pose incurs no obstacle cost (meters)
    #[serde(default = "default_max_pose_to_scan_dist")]
    pub max_pose_to_scan_dist: f32,
}

/// Gap manipulation geometry
#[derive(Clone, Debug, Deserialize)]
pub struct ManipulationConfig {
    /// Angular span above which a gap is narrowed (radians)
    #[serde(default = "default_reduction_threshold")]
    pub reduction_threshold: f32,

    /// Angular span a narrowed gap is reduced to (radians)
    #[serde(default = "default_reduction_target")]
    pub reduction_target: f32,

    /// Axial-conversion pivot geometry, adjacent leg
    #[serde(default = "default_epsilon1")]
    pub epsilon1: f32,

    /// Axial-conversion pivot geometry, opposite leg
    #[serde(default = "default_epsilon2")]
    pub epsilon2: f32,

    /// Amplification of the axial-conversion rotation
    #[serde(default = "default_rot_ratio")]
    pub rot_ratio: f32,

    /// Maximum index width of a merged gap
    #[serde(default = "default_max_idx_diff")]
    pub max_idx_diff: usize,
}

/// Endpoint estimator noise and association gating
#[derive(Clone, Debug, Deserialize)]
pub struct EstimationConfig {
    /// Process noise spectral density (m²/s³)
    #[serde(default = "default_process_noise")]
    pub process_noise: f32,

    /// Measurement noise standard deviation (meters)
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f32,

    /// Maximum endpoint travel between cycles for association (meters)
    #[serde(default = "default_association_gate")]
    pub association_gate: f32,
}

/// Goal and waypoint tolerances
#[derive(Clone, Debug, Deserialize)]
pub struct GoalConfig {
    /// Distance at which the global goal counts as reached (meters)
    #[serde(default = "default_goal_tolerance")]
    pub goal_tolerance: f32,

    /// Minimum motion of the local waypoint before it is replaced (meters)
    #[serde(default = "default_waypoint_tolerance")]
    pub waypoint_tolerance: f32,

    /// How far along the global plan the local waypoint is placed (meters)
    #[serde(default = "default_waypoint_lookahead")]
    pub waypoint_lookahead: f32,
}

/// Arbitration and stall detection
#[derive(Clone, Debug, Deserialize)]
pub struct PlanningConfig {
    /// Number of leading poses whose scores feed arbitration; also the
    /// hysteresis margin for trajectory switching
    #[serde(default = "default_num_feasi_check")]
    pub num_feasi_check: usize,

    /// Capacity of the command-velocity ring buffer for stall detection
    #[serde(default = "default_halt_buffer_size")]
    pub halt_buffer_size: usize,
}

// Default value functions
fn default_r_inscribed() -> f32 {
    0.2
}
fn default_vx_absmax() -> f32 {
    0.5
}
fn default_ray_count() -> usize {
    512
}
fn default_range_max() -> f32 {
    5.0
}
fn default_integrate_maxt() -> f32 {
    5.0
}
fn default_integrate_stept() -> f32 {
    0.1
}
fn default_inf_ratio() -> f32 {
    1.2
}
fn default_q() -> f32 {
    -1.0
}
fn default_q_f() -> f32 {
    1.0
}
fn default_pen_exp_weight() -> f32 {
    5.0
}
fn default_max_pose_to_scan_dist() -> f32 {
    0.6
}
fn default_reduction_threshold() -> f32 {
    std::f32::consts::PI
}
fn default_reduction_target() -> f32 {
    std::f32::consts::PI
}
fn default_epsilon1() -> f32 {
    0.18
}
fn default_epsilon2() -> f32 {
    0.18
}
fn default_rot_ratio() -> f32 {
    1.5
}
fn default_max_idx_diff() -> usize {
    256
}
fn default_process_noise() -> f32 {
    0.1
}
fn default_measurement_noise() -> f32 {
    0.05
}
fn default_association_gate() -> f32 {
    0.6
}
fn default_goal_tolerance() -> f32 {
    0.2
}
fn default_waypoint_tolerance() -> f32 {
    0.1
}
fn default_waypoint_lookahead() -> f32 {
    2.5
}
fn default_num_feasi_check() -> usize {
    10
}
fn default_halt_buffer_size() -> usize {
    10
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            r_inscribed: default_r_inscribed(),
            vx_absmax: default_vx_absmax(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ray_count: default_ray_count(),
            range_max: default_range_max(),
        }
    }
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            integrate_maxt: default_integrate_maxt(),
            integrate_stept: default_integrate_stept(),
            inf_ratio: default_inf_ratio(),
            q: default_q(),
            q_f: default_q_f(),
            pen_exp_weight: default_pen_exp_weight(),
            max_pose_to_scan_dist: default_max_pose_to_scan_dist(),
        }
    }
}

impl Default for ManipulationConfig {
    fn default() -> Self {
        Self {
            reduction_threshold: default_reduction_threshold(),
            reduction_target: default_reduction_target(),
            epsilon1: default_epsilon1(),
            epsilon2: default_epsilon2(),
            rot_ratio: default_rot_ratio(),
            max_idx_diff: default_max_idx_diff(),
        }
    }
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
            association_gate: default_association_gate(),
        }
    }
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            goal_tolerance: default_goal_tolerance(),
            waypoint_tolerance: default_waypoint_tolerance(),
            waypoint_lookahead: default_waypoint_lookahead(),
        }
    }
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            num_feasi_check: default_num_feasi_check(),
            halt_buffer_size: default_halt_buffer_size(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            robot: RobotConfig::default(),
            scan: ScanConfig::default(),
            traj: TrajectoryConfig::default(),
            manip: ManipulationConfig::default(),
            estimation: EstimationConfig::default(),
            goal: GoalConfig::default(),
            planning: PlanningConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlannerError::Config(format!("Failed to read config file: {}", e)))?;
        let config: PlannerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Inflated robot radius used for clearance checks.
    #[inline]
    pub fn inflated_radius(&self) -> f32 {
        self.robot.r_inscribed * self.traj.inf_ratio
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.robot.r_inscribed <= 0.0 {
            return Err(PlannerError::Config("r_inscribed must be positive".into()));
        }
        if self.traj.integrate_stept <= 0.0 || self.traj.integrate_maxt < self.traj.integrate_stept
        {
            return Err(PlannerError::Config(
                "integrate_stept must be positive and below integrate_maxt".into(),
            ));
        }
        if self.traj.inf_ratio < 1.0 {
            return Err(PlannerError::Config("inf_ratio must be at least 1.0".into()));
        }
        if self.scan.ray_count < 8 {
            return Err(PlannerError::Config("ray_count too small".into()));
        }
        Ok(())
    }

    /// Number of forward-simulation steps covering the horizon.
    #[inline]
    pub fn horizon_steps(&self) -> usize {
        (self.traj.integrate_maxt / self.traj.integrate_stept).round() as usize
    }
}
