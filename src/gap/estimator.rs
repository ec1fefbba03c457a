//! Per-endpoint state estimation.
//!
//! Each gap endpoint carries a constant-velocity Kalman filter over the
//! 4-state vector `(x, y, vx, vy)` expressed in the robot frame. Positions
//! are relative to the robot; velocities are relative to the robot's own
//! motion, so the filter compensates ego translation, rotation, and
//! acceleration during prediction and only the gap's own dynamics remain
//! after [`GapPointEstimator::isolate_gap_dynamics`].

use crate::config::EstimationConfig;
use crate::core::types::{Point2D, Twist2D};
use nalgebra::{Matrix2, Matrix4, Vector2, Vector4};

/// One robot velocity/acceleration sample taken between filter updates.
///
/// Odometry and accelerometer callbacks accumulate these; the planning
/// cycle drains the buffer and feeds every estimator the same sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EgoSample {
    /// Robot body velocity
    pub twist: Twist2D,
    /// Robot linear acceleration, body frame (m/s²)
    pub accel: Point2D,
    /// Sample timestamp in microseconds, monotonic
    pub stamp_us: u64,
}

/// Kalman filter tracking one gap endpoint.
#[derive(Debug, Clone)]
pub struct GapPointEstimator {
    model_id: u64,
    /// (x, y, vx_rel, vy_rel): position relative to the robot, velocity
    /// relative to the robot's motion
    state: Vector4<f32>,
    cov: Matrix4<f32>,
    process_noise: f32,
    measurement_noise: f32,
    /// Latest robot linear velocity, used to recover gap-only dynamics
    v_ego: Vector2<f32>,
    /// Detached copy advanced by [`integrate_frozen`](Self::integrate_frozen)
    frozen: Vector4<f32>,
    last_update_us: u64,
}

impl GapPointEstimator {
    /// Create a filter at a first position measurement.
    ///
    /// Position variance starts at the measurement noise; velocity variance
    /// starts large since nothing is known about the endpoint's motion yet.
    pub fn new(model_id: u64, z: Point2D, stamp_us: u64, cfg: &EstimationConfig) -> Self {
        let state = Vector4::new(z.x, z.y, 0.0, 0.0);
        let r = cfg.measurement_noise * cfg.measurement_noise;
        let mut cov = Matrix4::zeros();
        cov[(0, 0)] = r;
        cov[(1, 1)] = r;
        cov[(2, 2)] = 1.0;
        cov[(3, 3)] = 1.0;
        Self {
            model_id,
            state,
            cov,
            process_noise: cfg.process_noise,
            measurement_noise: cfg.measurement_noise,
            v_ego: Vector2::zeros(),
            frozen: state,
            last_update_us: stamp_us,
        }
    }

    /// Convenience constructor with default noise parameters.
    pub fn with_position(model_id: u64, z: Point2D, stamp_us: u64) -> Self {
        Self::new(model_id, z, stamp_us, &EstimationConfig::default())
    }

    /// Unique identifier of this filter, preserved across association.
    #[inline]
    pub fn model_id(&self) -> u64 {
        self.model_id
    }

    /// Estimated endpoint position in the robot frame.
    #[inline]
    pub fn position(&self) -> Point2D {
        Point2D::new(self.state[0], self.state[1])
    }

    /// Endpoint velocity with ego motion removed (the gap's own motion).
    #[inline]
    pub fn gap_velocity(&self) -> Point2D {
        Point2D::new(self.state[2] + self.v_ego[0], self.state[3] + self.v_ego[1])
    }

    /// Velocity relative to the robot's motion.
    #[inline]
    pub fn relative_velocity(&self) -> Point2D {
        Point2D::new(self.state[2], self.state[3])
    }

    /// Overwrite the dynamic part of the state.
    ///
    /// `gap_velocity` is the endpoint's own motion; the stored relative
    /// velocity is derived from the current ego velocity. Used to seed
    /// synthetic scenarios and to re-anchor a transferred filter.
    pub fn set_dynamics(&mut self, position: Point2D, gap_velocity: Point2D) {
        self.state[0] = position.x;
        self.state[1] = position.y;
        self.state[2] = gap_velocity.x - self.v_ego[0];
        self.state[3] = gap_velocity.y - self.v_ego[1];
        self.frozen = self.state;
    }

    /// Predict–correct update for one planning cycle.
    ///
    /// Ego motion between the previous update and the scan time is
    /// compensated by first-order integration of the intermediate samples,
    /// then the state is corrected toward the measured endpoint position
    /// `z` (robot frame at scan time).
    pub fn update(&mut self, z: Point2D, samples: &[EgoSample], scan_stamp_us: u64) {
        // out-of-order scans skip prediction and only correct
        let scan_stamp_us = scan_stamp_us.max(self.last_update_us);
        let mut t_prev = self.last_update_us;
        let mut last_twist = Twist2D::new(self.v_ego[0], self.v_ego[1], 0.0);

        for sample in samples {
            let t_sample = sample.stamp_us.clamp(t_prev, scan_stamp_us);
            let dt = (t_sample - t_prev) as f32 / 1e6;
            if dt > 0.0 {
                self.predict(dt, &sample.twist, &sample.accel);
            }
            self.v_ego = Vector2::new(sample.twist.vx, sample.twist.vy);
            last_twist = sample.twist;
            t_prev = t_sample;
        }

        // Remainder of the interval up to the scan timestamp.
        if scan_stamp_us > t_prev {
            let dt = (scan_stamp_us - t_prev) as f32 / 1e6;
            self.predict(dt, &last_twist, &Point2D::origin());
        }

        self.correct(z);
        self.frozen = self.state;
        self.last_update_us = scan_stamp_us;
    }

    /// One prediction step over `dt` seconds.
    ///
    /// The relative position advances with the relative velocity, the
    /// relative velocity absorbs the negated ego acceleration, and the whole
    /// state is rotated by `-ω·dt` to stay in the robot frame.
    fn predict(&mut self, dt: f32, twist: &Twist2D, accel: &Point2D) {
        let rot = Matrix2::new(
            (-twist.omega * dt).cos(),
            (twist.omega * dt).sin(),
            -(twist.omega * dt).sin(),
            (-twist.omega * dt).cos(),
        );

        // F = blkdiag(R, R) · [[I, I·dt], [0, I]]
        let mut f = Matrix4::zeros();
        f.fixed_view_mut::<2, 2>(0, 0).copy_from(&rot);
        f.fixed_view_mut::<2, 2>(0, 2).copy_from(&(rot * dt));
        f.fixed_view_mut::<2, 2>(2, 2).copy_from(&rot);

        let mut state = f * self.state;
        state[2] -= accel.x * dt;
        state[3] -= accel.y * dt;
        self.state = state;

        // White-acceleration process noise for a constant-velocity model
        let q = self.process_noise;
        let (q_pp, q_pv, q_vv) = (
            q * dt * dt * dt / 3.0,
            q * dt * dt / 2.0,
            q * dt,
        );
        let mut noise = Matrix4::zeros();
        for axis in 0..2 {
            noise[(axis, axis)] = q_pp;
            noise[(axis, axis + 2)] = q_pv;
            noise[(axis + 2, axis)] = q_pv;
            noise[(axis + 2, axis + 2)] = q_vv;
        }

        self.cov = f * self.cov * f.transpose() + noise;
    }

    /// Position-only measurement correction.
    fn correct(&mut self, z: Point2D) {
        let r = self.measurement_noise * self.measurement_noise;
        let s = self.cov.fixed_view::<2, 2>(0, 0) + Matrix2::new(r, 0.0, 0.0, r);
        let Some(s_inv) = s.try_inverse() else {
            return;
        };

        // K = P·Hᵀ·S⁻¹ with H = [I 0]
        let p_h_t = self.cov.fixed_view::<4, 2>(0, 0).into_owned();
        let gain = p_h_t * s_inv;

        let innovation = Vector2::new(z.x - self.state[0], z.y - self.state[1]);
        self.state += gain * innovation;

        let mut i_kh = Matrix4::identity();
        i_kh.fixed_view_mut::<4, 2>(0, 0).copy_from(&(-gain));
        i_kh[(0, 0)] += 1.0;
        i_kh[(1, 1)] += 1.0;
        self.cov = i_kh * self.cov;
    }

    /// Reset the frozen copy to describe gap motion with the robot held
    /// stationary: ego velocity is added back onto the relative velocity.
    pub fn isolate_gap_dynamics(&mut self) {
        self.frozen = self.state;
        self.frozen[2] += self.v_ego[0];
        self.frozen[3] += self.v_ego[1];
    }

    /// Advance the frozen copy by `dt` seconds; the primary state is
    /// untouched.
    pub fn integrate_frozen(&mut self, dt: f32) {
        self.frozen[0] += self.frozen[2] * dt;
        self.frozen[1] += self.frozen[3] * dt;
    }

    /// Position of the frozen copy.
    #[inline]
    pub fn frozen_position(&self) -> Point2D {
        Point2D::new(self.frozen[0], self.frozen[1])
    }

    /// Velocity of the frozen copy.
    #[inline]
    pub fn frozen_velocity(&self) -> Point2D {
        Point2D::new(self.frozen[2], self.frozen[3])
    }

    /// Frozen state in polar form: (range, bearing, bearing rate).
    pub fn frozen_polar(&self) -> (f32, f32, f32) {
        let (x, y) = (self.frozen[0], self.frozen[1]);
        let (vx, vy) = (self.frozen[2], self.frozen[3]);
        let range_sq = (x * x + y * y).max(1e-8);
        let range = range_sq.sqrt();
        let bearing = y.atan2(x);
        let bearing_rate = (x * vy - y * vx) / range_sq;
        (range, bearing, bearing_rate)
    }

    /// Latest ego velocity seen by the filter.
    #[inline]
    pub fn ego_velocity(&self) -> Point2D {
        Point2D::new(self.v_ego[0], self.v_ego[1])
    }
}
