//! Pose, point, and twist types for planar navigation.

use serde::{Deserialize, Serialize};

/// A 2D point (or free vector) in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    /// X coordinate in meters
    pub x: f32,
    /// Y coordinate in meters
    pub y: f32,
}

impl Point2D {
    /// Create a new point.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Point at the origin.
    #[inline]
    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Point from polar coordinates (range, bearing).
    #[inline]
    pub fn from_polar(range: f32, bearing: f32) -> Self {
        Self {
            x: range * bearing.cos(),
            y: range * bearing.sin(),
        }
    }

    /// Squared distance to another point (avoids sqrt).
    #[inline]
    pub fn distance_squared(&self, other: &Point2D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point2D) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Euclidean norm (distance from the origin).
    #[inline]
    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Bearing from the origin, in radians.
    #[inline]
    pub fn bearing(&self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Unit vector in this direction; zero vector stays zero.
    #[inline]
    pub fn normalized(&self) -> Point2D {
        let n = self.norm();
        if n <= f32::EPSILON {
            Point2D::origin()
        } else {
            Point2D::new(self.x / n, self.y / n)
        }
    }

    /// Dot product.
    #[inline]
    pub fn dot(&self, other: &Point2D) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Scale by a scalar.
    #[inline]
    pub fn scaled(&self, s: f32) -> Point2D {
        Point2D::new(self.x * s, self.y * s)
    }

    /// Rotate counter-clockwise by π/2.
    #[inline]
    pub fn rotated_ccw(&self) -> Point2D {
        Point2D::new(-self.y, self.x)
    }

    /// Rotate clockwise by π/2.
    #[inline]
    pub fn rotated_cw(&self) -> Point2D {
        Point2D::new(self.y, -self.x)
    }

    /// Rotate counter-clockwise by an arbitrary angle.
    #[inline]
    pub fn rotated(&self, angle: f32) -> Point2D {
        let (sin_a, cos_a) = angle.sin_cos();
        Point2D::new(
            self.x * cos_a - self.y * sin_a,
            self.x * sin_a + self.y * cos_a,
        )
    }
}

impl std::ops::Add for Point2D {
    type Output = Point2D;
    #[inline]
    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point2D {
    type Output = Point2D;
    #[inline]
    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Default for Point2D {
    fn default() -> Self {
        Self::origin()
    }
}

/// Robot pose in 2D space.
///
/// Position (x, y) in meters and heading (theta) in radians, normalized to
/// [-π, π].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    /// X position in meters
    pub x: f32,
    /// Y position in meters
    pub y: f32,
    /// Heading in radians, normalized to [-π, π]
    pub theta: f32,
}

impl Pose2D {
    /// Create a new pose with theta normalized to [-π, π].
    #[inline]
    pub fn new(x: f32, y: f32, theta: f32) -> Self {
        Self {
            x,
            y,
            theta: crate::core::math::normalize_angle(theta),
        }
    }

    /// Identity pose at origin with zero heading.
    #[inline]
    pub fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            theta: 0.0,
        }
    }

    /// Position as a [`Point2D`].
    #[inline]
    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Compose two poses: self ⊕ other.
    ///
    /// Applies `other` relative to `self`'s frame.
    #[inline]
    pub fn compose(&self, other: &Pose2D) -> Pose2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Pose2D::new(
            self.x + other.x * cos_t - other.y * sin_t,
            self.y + other.x * sin_t + other.y * cos_t,
            self.theta + other.theta,
        )
    }

    /// Inverse of this pose (the transform that undoes it).
    #[inline]
    pub fn inverse(&self) -> Pose2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Pose2D::new(
            -self.x * cos_t - self.y * sin_t,
            self.x * sin_t - self.y * cos_t,
            -self.theta,
        )
    }

    /// Transform a point from this pose's local frame to the parent frame.
    #[inline]
    pub fn transform_point(&self, point: &Point2D) -> Point2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Point2D::new(
            self.x + point.x * cos_t - point.y * sin_t,
            self.y + point.x * sin_t + point.y * cos_t,
        )
    }

    /// Transform a point from the parent frame into this pose's local frame.
    #[inline]
    pub fn inverse_transform_point(&self, point: &Point2D) -> Point2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        let dx = point.x - self.x;
        let dy = point.y - self.y;
        Point2D::new(dx * cos_t + dy * sin_t, -dx * sin_t + dy * cos_t)
    }
}

impl Default for Pose2D {
    fn default() -> Self {
        Self::identity()
    }
}

/// Planar velocity command or measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist2D {
    /// Linear velocity along x, m/s (body frame)
    pub vx: f32,
    /// Linear velocity along y, m/s (body frame)
    pub vy: f32,
    /// Angular velocity, rad/s
    pub omega: f32,
}

impl Twist2D {
    /// Create a new twist.
    #[inline]
    pub fn new(vx: f32, vy: f32, omega: f32) -> Self {
        Self { vx, vy, omega }
    }

    /// Linear part as a vector.
    #[inline]
    pub fn linear(&self) -> Point2D {
        Point2D::new(self.vx, self.vy)
    }

    /// Sum of absolute components, used by the stall monitor.
    #[inline]
    pub fn magnitude_sum(&self) -> f32 {
        self.vx.abs() + self.vy.abs() + self.omega.abs()
    }
}

/// Frame transforms supplied by the caller at the start of each cycle.
///
/// The planner only consumes transforms; lookup lives outside the core. The
/// sensor is assumed to sit at the robot base center, so the sensor frame
/// coincides with the robot frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformSet {
    /// Pose of the odometry frame origin expressed in the map frame
    pub odom_in_map: Pose2D,
    /// Pose of the robot expressed in the odometry frame
    pub robot_in_odom: Pose2D,
}

impl TransformSet {
    /// Identity transforms (map = odom = robot).
    pub fn identity() -> Self {
        Self {
            odom_in_map: Pose2D::identity(),
            robot_in_odom: Pose2D::identity(),
        }
    }

    /// Map-frame point into the odometry frame.
    #[inline]
    pub fn map_point_to_odom(&self, p: &Point2D) -> Point2D {
        self.odom_in_map.inverse_transform_point(p)
    }

    /// Map-frame point into the robot frame.
    #[inline]
    pub fn map_point_to_robot(&self, p: &Point2D) -> Point2D {
        let in_odom = self.map_point_to_odom(p);
        self.odom_point_to_robot(&in_odom)
    }

    /// Odometry-frame point into the robot frame.
    #[inline]
    pub fn odom_point_to_robot(&self, p: &Point2D) -> Point2D {
        self.robot_in_odom.inverse_transform_point(p)
    }

    /// Robot-frame point into the odometry frame.
    #[inline]
    pub fn robot_point_to_odom(&self, p: &Point2D) -> Point2D {
        self.robot_in_odom.transform_point(p)
    }
}
