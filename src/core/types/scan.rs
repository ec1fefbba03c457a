//! Egocentric 360° range scan.

use super::Point2D;
use crate::core::math::wrap_index;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// A full-circle range scan in polar coordinates.
///
/// Ranges are ordered counter-clockwise starting at `angle_min`. A ray at or
/// above `range_max` is a sentinel meaning "no return within range".
/// Timestamps are in microseconds, monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    /// Bearing of ray 0 in radians
    pub angle_min: f32,
    /// Angular resolution (radians between consecutive rays)
    pub angle_increment: f32,
    /// Sentinel range in meters; rays at or above it carry no return
    pub range_max: f32,
    /// Range measurements in meters
    pub ranges: Vec<f32>,
    /// Capture timestamp in microseconds, monotonic
    pub stamp_us: u64,
}

impl LaserScan {
    /// Create a full-circle scan over [-π, π) with uniform spacing.
    pub fn new(ranges: Vec<f32>, range_max: f32, stamp_us: u64) -> Self {
        let n = ranges.len().max(1);
        Self {
            angle_min: -PI,
            angle_increment: 2.0 * PI / n as f32,
            range_max,
            ranges,
            stamp_us,
        }
    }

    /// Number of rays.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if the scan has no rays.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Bearing of ray `index`.
    #[inline]
    pub fn angle_at(&self, index: usize) -> f32 {
        self.angle_min + index as f32 * self.angle_increment
    }

    /// Ray index nearest to `bearing`, wrapped into `[0, len)`.
    #[inline]
    pub fn index_of(&self, bearing: f32) -> usize {
        let raw = ((bearing - self.angle_min) / self.angle_increment).round() as i64;
        wrap_index(raw, self.len())
    }

    /// Range at `index` (no wrapping).
    #[inline]
    pub fn range_at(&self, index: usize) -> f32 {
        self.ranges[index]
    }

    /// Range at an index that may exceed the ray count, wrapped.
    #[inline]
    pub fn range_at_wrapped(&self, index: i64) -> f32 {
        self.ranges[wrap_index(index, self.len())]
    }

    /// Whether a range value is an actual return rather than the sentinel.
    #[inline]
    pub fn is_return(&self, range: f32) -> bool {
        range.is_finite() && range < self.range_max
    }

    /// Minimum range over the whole scan.
    pub fn min_range(&self) -> f32 {
        self.ranges.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Cartesian point of ray `index` at its measured range.
    #[inline]
    pub fn point_at(&self, index: usize) -> Point2D {
        Point2D::from_polar(self.ranges[index], self.angle_at(index))
    }

    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.ranges.is_empty() {
            return Err("scan has no rays");
        }
        if self.angle_increment <= 0.0 {
            return Err("angle_increment must be positive");
        }
        if self.range_max <= 0.0 {
            return Err("range_max must be positive");
        }
        if self.ranges.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err("ranges must be finite and non-negative");
        }
        Ok(())
    }
}
