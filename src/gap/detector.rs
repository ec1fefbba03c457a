//! Gap detection: scan → raw gaps → simplified gaps.
//!
//! Raw detection walks the scan once and opens gaps at two kinds of event:
//! a *radial* discontinuity between consecutive finite returns wide enough
//! for the robot, and a *swept* sector delimited by finite↔infinite
//! transitions. The first and last raw gaps are bridged across the scan
//! boundary, and an artificial gap is synthesized around the global goal
//! when it sits in free space that no gap covers.
//!
//! Simplification merges adjacent raw gaps into the simplified set that the
//! rest of the pipeline consumes.

use crate::config::PlannerConfig;
use crate::core::math::{index_span, index_within_arc};
use crate::core::types::{LaserScan, Point2D};
use crate::error::{PlannerError, Result};
use crate::gap::{Gap, GapKind, GapPoint};
use log::{debug, trace, warn};

/// Detects and simplifies gaps in a range scan.
pub struct GapDetector<'a> {
    cfg: &'a PlannerConfig,
}

impl<'a> GapDetector<'a> {
    pub fn new(cfg: &'a PlannerConfig) -> Self {
        Self { cfg }
    }

    /// Detect raw gaps in `scan`.
    ///
    /// `global_goal` is the global goal expressed in the robot frame; when
    /// it lies in free space covered by no gap, an artificial gap is
    /// inserted around its bearing.
    pub fn detect(&self, scan: &LaserScan, global_goal: Option<Point2D>) -> Result<Vec<Gap>> {
        scan.validate()
            .map_err(|e| PlannerError::MalformedScan(e.to_string()))?;
        let n = scan.len();
        if n != self.cfg.scan.ray_count {
            warn!(
                "scan has {} rays, expected {}",
                n, self.cfg.scan.ray_count
            );
        }

        let min_dist = scan.min_range();
        let mut raw: Vec<Gap> = Vec::new();

        let mut swept_right = GapPoint::new(0, scan.range_at(0));
        let mut within_swept = !scan.is_return(scan.range_at(0));
        let mut prev = scan.range_at(0);

        for i in 1..n {
            let curr = scan.range_at(i);

            if self.radial_jump(prev, curr, scan) {
                let mut gap = Gap::open(GapPoint::new(i - 1, prev), GapKind::Radial, min_dist);
                gap.close_left(GapPoint::new(i, curr), scan);
                trace!(
                    "radial gap ({}, {:.2}) -> ({}, {:.2})",
                    gap.right.idx,
                    gap.right.range,
                    gap.left.idx,
                    gap.left.range
                );
                raw.push(gap);
            }

            if scan.is_return(prev) != scan.is_return(curr) {
                if within_swept {
                    // infinite → finite closes the sector
                    within_swept = false;
                    let mut gap = Gap::open(swept_right, GapKind::Swept, min_dist);
                    gap.close_left(GapPoint::new(i, curr), scan);
                    if self.swept_size_ok(&gap, scan) {
                        trace!(
                            "swept gap ({}, {:.2}) -> ({}, {:.2})",
                            gap.right.idx,
                            gap.right.range,
                            gap.left.idx,
                            gap.left.range
                        );
                        raw.push(gap);
                    }
                } else {
                    // finite → infinite opens a sector
                    swept_right = GapPoint::new(i - 1, prev);
                    within_swept = true;
                }
            }
            prev = curr;
        }

        // Scan ended inside an unclosed swept sector
        if within_swept {
            let mut gap = Gap::open(swept_right, GapKind::Swept, min_dist);
            gap.close_left(GapPoint::new(n - 1, scan.range_at(n - 1)), scan);
            if self.swept_size_ok(&gap, scan) {
                raw.push(gap);
            }
        }

        self.bridge_boundary(&mut raw, scan);

        if let Some(goal) = global_goal {
            self.add_goal_gap(goal, &mut raw, scan, min_dist);
        }

        debug!("detected {} raw gaps", raw.len());
        Ok(raw)
    }

    /// Consecutive finite returns separated by more than the robot can span.
    fn radial_jump(&self, prev: f32, curr: f32, scan: &LaserScan) -> bool {
        if !scan.is_return(prev) || !scan.is_return(curr) {
            return false;
        }
        let angle = scan.angle_increment;
        let separation =
            (prev * prev + curr * curr - 2.0 * prev * curr * angle.cos()).sqrt();
        separation > 3.0 * self.cfg.robot.r_inscribed
    }

    /// A swept gap survives if it is very wide or the robot fits its chord.
    fn swept_size_ok(&self, gap: &Gap, scan: &LaserScan) -> bool {
        let n = scan.len();
        let large = gap.index_width(n) > 3 * (n / 2) / 2;
        let robot_fits = gap.euclidean_width(scan) > 3.0 * self.cfg.robot.r_inscribed;
        large || robot_fits
    }

    /// Merge the first and last raw gaps into a single wrap-around gap when
    /// they touch the 0 / n-1 scan boundary.
    fn bridge_boundary(&self, raw: &mut Vec<Gap>, scan: &LaserScan) {
        let n = scan.len();
        let bridgeable = raw.len() > 1
            && raw.first().map(|g| g.right.idx) == Some(0)
            && raw.last().map(|g| g.left.idx) == Some(n - 1);
        if !bridgeable {
            return;
        }
        let first_left = raw[0].left;
        debug!("bridging first and last gaps across the scan boundary");
        raw.last_mut()
            .expect("bridge checked non-empty")
            .extend_left(first_left, scan);
        raw.remove(0);
    }

    /// Insert an artificial gap covering the global goal when the goal is
    /// visible free space that no detected gap spans.
    fn add_goal_gap(
        &self,
        goal: Point2D,
        raw: &mut Vec<Gap>,
        scan: &LaserScan,
        min_dist: f32,
    ) {
        let n = scan.len();
        let goal_idx = scan.index_of(goal.bearing());
        if goal.norm() >= scan.range_at(goal_idx) {
            return; // goal behind scan geometry
        }
        if raw
            .iter()
            .any(|g| index_within_arc(goal_idx, g.right.idx, g.left.idx, n))
        {
            return;
        }

        let span = n / 24;
        let right_idx = goal_idx.saturating_sub(span);
        let left_idx = (goal_idx + span).min(n - 1);
        debug!(
            "inserting artificial gap [{}, {}] around goal bearing",
            right_idx, left_idx
        );

        let mut gap = Gap::open(
            GapPoint::new(right_idx, scan.range_at(right_idx)),
            GapKind::Swept,
            min_dist,
        );
        gap.close_left(GapPoint::new(left_idx, scan.range_at(left_idx)), scan);
        gap.artificial = true;

        let position = raw
            .iter()
            .position(|g| g.right.idx > right_idx)
            .unwrap_or(raw.len());
        raw.insert(position, gap);
    }

    /// Merge raw gaps into the simplified set.
    pub fn simplify(&self, raw: &[Gap], scan: &LaserScan) -> Vec<Gap> {
        let r_inscr = self.cfg.robot.r_inscribed;
        let mut simplified: Vec<Gap> = Vec::new();
        let mut merging_started = false;

        for raw_gap in raw {
            if raw_gap.artificial {
                // goal cover stands alone; never merged into or out of
                simplified.push(clone_shape(raw_gap, scan));
                continue;
            }

            if !merging_started {
                if raw_gap.kind == GapKind::Radial && raw_gap.right_type() {
                    merging_started = true;
                }
                simplified.push(clone_shape(raw_gap, scan));
                continue;
            }

            match raw_gap.kind {
                GapKind::Radial if raw_gap.right_type() => {
                    simplified.push(clone_shape(raw_gap, scan));
                }
                GapKind::Radial => {
                    if let Some(j) = self.last_mergeable(raw_gap, &simplified, scan) {
                        trace!("merging raw gap into simplified gap {}", j);
                        simplified.truncate(j + 1);
                        simplified[j].extend_left(raw_gap.left, scan);
                    } else {
                        simplified.push(clone_shape(raw_gap, scan));
                    }
                }
                GapKind::Swept => {
                    let merge_into_tail = simplified.last().is_some_and(|tail| {
                        !tail.artificial
                            && (raw_gap.left.range - tail.right.range).abs() < 3.0 * r_inscr
                            && tail.kind == GapKind::Radial
                            && tail.right_type()
                    });
                    if merge_into_tail {
                        let tail = simplified.last_mut().expect("tail checked above");
                        tail.extend_left(raw_gap.left, scan);
                    } else {
                        simplified.push(clone_shape(raw_gap, scan));
                    }
                }
            }
        }

        debug!("simplified to {} gaps", simplified.len());
        simplified
    }

    /// Farthest-back simplified gap this raw gap can merge into.
    ///
    /// Mergeable means: the robot fits between both gaps and whatever scan
    /// geometry separates them, the candidate is right-type or swept, and
    /// the merged arc stays under the index-width cap.
    fn last_mergeable(
        &self,
        raw_gap: &Gap,
        simplified: &[Gap],
        scan: &LaserScan,
    ) -> Option<usize> {
        let n = scan.len();
        let r_inscr = self.cfg.robot.r_inscribed;
        let mut last = None;

        for j in (0..simplified.len()).rev() {
            let cand = &simplified[j];
            if cand.artificial {
                continue;
            }
            let start = cand.left.idx.min(raw_gap.right.idx);
            let end = cand.left.idx.max(raw_gap.right.idx);
            let min_intergap = scan.ranges[start..=end]
                .iter()
                .copied()
                .fold(f32::INFINITY, f32::min);
            let inflated = min_intergap - 2.0 * r_inscr;

            let dist_ok = raw_gap.left.range <= inflated && cand.right.range <= inflated;
            let type_ok = cand.right_type() || cand.kind == GapKind::Swept;
            let size_ok =
                index_span(cand.right.idx, raw_gap.left.idx, n) < self.cfg.manip.max_idx_diff;

            if dist_ok && type_ok && size_ok {
                last = Some(j);
            }
        }
        last
    }
}

/// Fresh gap carrying the same endpoints and flags, without estimators.
fn clone_shape(gap: &Gap, scan: &LaserScan) -> Gap {
    let mut fresh = Gap::open(gap.right, gap.kind, gap.min_safe_dist);
    fresh.close_left(gap.left, scan);
    fresh.artificial = gap.artificial;
    fresh
}
