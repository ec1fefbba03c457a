//! Gap association across planning cycles.
//!
//! Each simplified gap contributes two endpoint points. Endpoints of the
//! current cycle are matched to endpoints of the previous cycle by gated
//! nearest-neighbour assignment over squared Cartesian distance; a match
//! transfers the previous endpoint's estimator (and with it the model ID)
//! into the new gap, while unmatched endpoints receive fresh estimators
//! seeded from their measured position.

use crate::config::PlannerConfig;
use crate::core::types::{LaserScan, Point2D};
use crate::gap::{Gap, GapPointEstimator};
use log::{debug, trace};

/// Endpoint side within a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Associates simplified gaps between cycles and manages estimator
/// lifetimes.
pub struct GapAssociator<'a> {
    cfg: &'a PlannerConfig,
}

impl<'a> GapAssociator<'a> {
    pub fn new(cfg: &'a PlannerConfig) -> Self {
        Self { cfg }
    }

    /// Associate `current` gaps to `previous` gaps.
    ///
    /// Estimators matched within the gate move out of the previous set;
    /// whatever remains in `previous` is dropped with it. Every endpoint in
    /// `current` holds an estimator afterwards.
    pub fn associate(
        &self,
        current: &mut [Gap],
        previous: &mut [Gap],
        scan: &LaserScan,
        next_model_id: &mut u64,
        scan_stamp_us: u64,
    ) {
        let curr_points = endpoint_positions(current, scan);
        let prev_points = endpoint_positions(previous, scan);

        // All gated candidate pairs, best distances first.
        let gate_sq = self.cfg.estimation.association_gate.powi(2);
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (ci, (_, _, cp)) in curr_points.iter().enumerate() {
            for (pi, (_, _, pp)) in prev_points.iter().enumerate() {
                let d = cp.distance_squared(pp);
                if d <= gate_sq {
                    pairs.push((d, ci, pi));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut curr_taken = vec![false; curr_points.len()];
        let mut prev_taken = vec![false; prev_points.len()];
        let mut transferred = 0usize;

        for (dist_sq, ci, pi) in pairs {
            if curr_taken[ci] || prev_taken[pi] {
                continue;
            }
            let (cg, c_side, _) = curr_points[ci];
            let (pg, p_side, _) = prev_points[pi];
            let Some(estimator) = take_side(&mut previous[pg], p_side) else {
                continue;
            };
            trace!(
                "endpoint match: model {} travels {:.3} m",
                estimator.model_id(),
                dist_sq.sqrt()
            );
            put_side(&mut current[cg], c_side, estimator);
            curr_taken[ci] = true;
            prev_taken[pi] = true;
            transferred += 1;
        }

        // Fresh estimators for everything left unmatched.
        let mut created = 0usize;
        for (ci, (cg, c_side, cp)) in curr_points.iter().enumerate() {
            if curr_taken[ci] {
                continue;
            }
            let estimator = Box::new(GapPointEstimator::new(
                *next_model_id,
                *cp,
                scan_stamp_us,
                &self.cfg.estimation,
            ));
            *next_model_id += 1;
            put_side(&mut current[*cg], *c_side, estimator);
            created += 1;
        }

        debug!(
            "association: {} transferred, {} created, {} prior endpoints expired",
            transferred,
            created,
            prev_points.len().saturating_sub(transferred)
        );
    }
}

/// Flattened (gap index, side, position) list over both endpoints of every
/// gap.
fn endpoint_positions(gaps: &[Gap], scan: &LaserScan) -> Vec<(usize, Side, Point2D)> {
    let mut points = Vec::with_capacity(gaps.len() * 2);
    for (i, gap) in gaps.iter().enumerate() {
        points.push((i, Side::Left, gap.left.cartesian(scan)));
        points.push((i, Side::Right, gap.right.cartesian(scan)));
    }
    points
}

fn take_side(gap: &mut Gap, side: Side) -> Option<Box<GapPointEstimator>> {
    match side {
        Side::Left => gap.left_estimator.take(),
        Side::Right => gap.right_estimator.take(),
    }
}

fn put_side(gap: &mut Gap, side: Side, estimator: Box<GapPointEstimator>) {
    match side {
        Side::Left => gap.left_estimator = Some(estimator),
        Side::Right => gap.right_estimator = Some(estimator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::{GapKind, GapPoint};

    fn scan() -> LaserScan {
        LaserScan::new(vec![5.0; 512], 6.0, 0)
    }

    fn gap_at(right_idx: usize, left_idx: usize, range: f32, scan: &LaserScan) -> Gap {
        let mut g = Gap::open(GapPoint::new(right_idx, range), GapKind::Radial, 1.0);
        g.close_left(GapPoint::new(left_idx, range), scan);
        g
    }

    fn associate_fresh(gaps: &mut [Gap], scan: &LaserScan, next_id: &mut u64) {
        let cfg = PlannerConfig::default();
        GapAssociator::new(&cfg).associate(gaps, &mut [], scan, next_id, 0);
    }

    #[test]
    fn test_unmatched_endpoints_get_fresh_estimators() {
        let scan = scan();
        let mut gaps = vec![gap_at(100, 140, 2.0, &scan)];
        let mut next_id = 0;
        associate_fresh(&mut gaps, &scan, &mut next_id);
        assert_eq!(next_id, 2);
        assert!(gaps[0].model_ids().is_some());
    }

    #[test]
    fn test_matching_transfers_model_ids() {
        let cfg = PlannerConfig::default();
        let scan = scan();
        let mut next_id = 0;

        let mut prev = vec![gap_at(100, 140, 2.0, &scan)];
        associate_fresh(&mut prev, &scan, &mut next_id);
        let prev_ids = prev[0].model_ids().unwrap();

        // endpoints moved by one ray: well within the gate
        let mut curr = vec![gap_at(101, 141, 2.0, &scan)];
        GapAssociator::new(&cfg).associate(&mut curr, &mut prev, &scan, &mut next_id, 100_000);

        assert_eq!(curr[0].model_ids().unwrap(), prev_ids);
        assert_eq!(next_id, 2, "no fresh estimators expected");
        assert!(prev[0].left_estimator.is_none());
        assert!(prev[0].right_estimator.is_none());
    }

    #[test]
    fn test_association_is_idempotent_on_identical_sets() {
        let cfg = PlannerConfig::default();
        let scan = scan();
        let mut next_id = 0;

        let mut prev = vec![gap_at(100, 140, 2.0, &scan), gap_at(300, 360, 3.0, &scan)];
        associate_fresh(&mut prev, &scan, &mut next_id);
        let ids: Vec<_> = prev.iter().map(|g| g.model_ids().unwrap()).collect();

        let mut curr = vec![gap_at(100, 140, 2.0, &scan), gap_at(300, 360, 3.0, &scan)];
        GapAssociator::new(&cfg).associate(&mut curr, &mut prev, &scan, &mut next_id, 100_000);
        let ids_again: Vec<_> = curr.iter().map(|g| g.model_ids().unwrap()).collect();

        assert_eq!(ids, ids_again);
        assert_eq!(next_id, 4);
    }

    #[test]
    fn test_far_endpoints_are_not_matched() {
        let cfg = PlannerConfig::default();
        let scan = scan();
        let mut next_id = 0;

        let mut prev = vec![gap_at(100, 140, 2.0, &scan)];
        associate_fresh(&mut prev, &scan, &mut next_id);

        // a gap on the opposite side of the robot: outside any gate
        let mut curr = vec![gap_at(400, 440, 2.0, &scan)];
        GapAssociator::new(&cfg).associate(&mut curr, &mut prev, &scan, &mut next_id, 100_000);

        assert_eq!(next_id, 4, "both endpoints should be fresh");
        // prior estimators stayed with the expired gap
        assert!(prev[0].left_estimator.is_some());
    }

    #[test]
    fn test_distinct_model_ids_within_gap() {
        let scan = scan();
        let mut gaps = vec![gap_at(10, 60, 2.0, &scan), gap_at(200, 260, 2.0, &scan)];
        let mut next_id = 0;
        associate_fresh(&mut gaps, &scan, &mut next_id);
        let (l0, r0) = gaps[0].model_ids().unwrap();
        let (l1, r1) = gaps[1].model_ids().unwrap();
        let mut all = vec![l0, r0, l1, r1];
        all.dedup();
        assert_eq!(all.len(), 4);
    }
}
