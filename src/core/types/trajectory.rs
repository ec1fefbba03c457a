//! Timed pose sequences.

use super::{Point2D, Pose2D};
use serde::{Deserialize, Serialize};

/// Coordinate frame a trajectory is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Robot body frame at the scan timestamp
    Robot,
    /// Odometry frame
    Odom,
}

/// An ordered sequence of (pose, time) pairs.
///
/// Posewise times are seconds relative to the trajectory start, strictly
/// monotonic, beginning at 0. An empty trajectory means "nothing to track".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Poses along the trajectory
    pub poses: Vec<Pose2D>,
    /// Per-pose times in seconds from trajectory start
    pub times: Vec<f32>,
    /// Frame the poses are expressed in
    pub frame: Frame,
}

impl Trajectory {
    /// Create an empty trajectory in the given frame.
    pub fn empty(frame: Frame) -> Self {
        Self {
            poses: Vec::new(),
            times: Vec::new(),
            frame,
        }
    }

    /// Create from parallel pose/time vectors.
    pub fn new(poses: Vec<Pose2D>, times: Vec<f32>, frame: Frame) -> Self {
        debug_assert_eq!(poses.len(), times.len());
        Self {
            poses,
            times,
            frame,
        }
    }

    /// Number of poses.
    #[inline]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Check if there is nothing to track.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Append a pose at the given time.
    #[inline]
    pub fn push(&mut self, pose: Pose2D, time: f32) {
        self.poses.push(pose);
        self.times.push(time);
    }

    /// Final pose, if any.
    #[inline]
    pub fn last_pose(&self) -> Option<&Pose2D> {
        self.poses.last()
    }

    /// Express every pose in a different frame.
    ///
    /// `frame_pose` is the pose of the current frame's origin in the target
    /// frame.
    pub fn transformed(&self, frame_pose: &Pose2D, target: Frame) -> Trajectory {
        let poses = self.poses.iter().map(|p| frame_pose.compose(p)).collect();
        Trajectory {
            poses,
            times: self.times.clone(),
            frame: target,
        }
    }

    /// Index just past the pose closest to the query point, clamped to the
    /// last index.
    ///
    /// Used to slice off the already-traversed portion of a tracked
    /// trajectory before re-scoring the remainder.
    pub fn closest_pose_index(&self, query: &Point2D) -> usize {
        if self.poses.is_empty() {
            return 0;
        }
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for (i, pose) in self.poses.iter().enumerate() {
            let d = pose.position().distance_squared(query);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        (best + 1).min(self.poses.len() - 1)
    }

    /// Remaining portion of the trajectory from `start` onward.
    pub fn tail(&self, start: usize) -> Trajectory {
        let start = start.min(self.poses.len());
        Trajectory {
            poses: self.poses[start..].to_vec(),
            times: self.times[start..].to_vec(),
            frame: self.frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn line_traj() -> Trajectory {
        let mut t = Trajectory::empty(Frame::Robot);
        for i in 0..5 {
            t.push(Pose2D::new(i as f32 * 0.5, 0.0, 0.0), i as f32 * 0.1);
        }
        t
    }

    #[test]
    fn test_closest_pose_index() {
        let t = line_traj();
        // closest to (1.1, 0) is pose 2 at x=1.0; index just past it is 3
        assert_eq!(t.closest_pose_index(&Point2D::new(1.1, 0.0)), 3);
        // clamped at the end
        assert_eq!(t.closest_pose_index(&Point2D::new(10.0, 0.0)), 4);
    }

    #[test]
    fn test_tail() {
        let t = line_traj();
        let tail = t.tail(3);
        assert_eq!(tail.len(), 2);
        assert_relative_eq!(tail.poses[0].x, 1.5);
        let past_end = t.tail(9);
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_transformed() {
        let t = line_traj();
        let frame_pose = Pose2D::new(0.0, 1.0, FRAC_PI_2);
        let out = t.transformed(&frame_pose, Frame::Odom);
        assert_eq!(out.frame, Frame::Odom);
        // pose (0.5, 0, 0) in a frame rotated 90° and lifted 1m: (0, 1.5)
        assert_relative_eq!(out.poses[1].x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(out.poses[1].y, 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_empty_trajectory() {
        let t = Trajectory::empty(Frame::Odom);
        assert!(t.is_empty());
        assert_eq!(t.closest_pose_index(&Point2D::origin()), 0);
    }
}
