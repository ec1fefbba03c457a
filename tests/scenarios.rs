//! End-to-end planning scenarios.
//!
//! Synthetic scan geometry drives full planning cycles through the public
//! API: open corridor, single pillar, a closing gap between two moving
//! agents, a wrap-around rear gap, and stall recovery.
//!
//! Run with: `cargo test --test scenarios`

use antara_nav::math::index_within_arc;
use antara_nav::{
    AgentState, CycleStatus, GapCategory, LaserScan, Planner, PlannerConfig, Point2D, Pose2D,
    TransformSet, Twist2D,
};
use approx::assert_relative_eq;
use std::f32::consts::PI;

const N: usize = 512;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scan of a uniform background with circular obstacles carved in.
fn disk_scan(
    disks: &[(Point2D, f32)],
    background: f32,
    range_max: f32,
    stamp_us: u64,
) -> LaserScan {
    let mut scan = LaserScan::new(vec![background; N], range_max, stamp_us);
    for i in 0..N {
        let bearing = scan.angle_at(i);
        let dir = Point2D::from_polar(1.0, bearing);
        for (center, radius) in disks {
            let along = center.dot(&dir);
            let discriminant = along * along - (center.dot(center) - radius * radius);
            if discriminant > 0.0 {
                let entry = along - discriminant.sqrt();
                if entry > 0.0 && entry < scan.ranges[i] {
                    scan.ranges[i] = entry;
                }
            }
        }
    }
    scan
}

fn planner_with_goal(cfg: PlannerConfig, goal: Point2D) -> Planner {
    let planner = Planner::new(cfg).unwrap();
    let ctx = planner.context();
    ctx.set_transforms(TransformSet::identity());
    ctx.set_local_waypoint(goal);
    ctx.set_global_goal(goal);
    planner
}

#[test]
fn open_corridor_goes_straight_to_goal() {
    init_logging();
    let mut planner = planner_with_goal(PlannerConfig::default(), Point2D::new(2.0, 0.0));
    planner
        .context()
        .set_scan(LaserScan::new(vec![5.0; N], 6.0, 0));

    let outcome = planner.plan_once();
    assert_eq!(outcome.status, CycleStatus::Ok);
    assert!(!outcome.trajectory.is_empty());

    // free space with a covered goal produces exactly one artificial gap
    let gaps = planner.committed_gaps();
    assert_eq!(gaps.len(), 1);
    assert!(gaps[0].artificial);
    assert_eq!(gaps[0].category, GapCategory::Artificial);

    // straight line from the origin to (2, 0)
    for pose in &outcome.trajectory.poses {
        assert!(pose.y.abs() <= 0.05, "pose off the line: {:?}", pose);
        assert!(pose.x >= -0.01 && pose.x <= 2.05);
    }
    let last = outcome.trajectory.last_pose().unwrap();
    assert!(last.x > 1.7, "trajectory stops short: {:?}", last);
}

#[test]
fn single_pillar_is_avoided_with_clearance() {
    init_logging();
    let cfg = PlannerConfig::default();
    let clearance = cfg.inflated_radius();
    let mut planner = planner_with_goal(cfg, Point2D::new(3.0, 0.0));

    // pillar at bearing ≈ 0: rays [250, 262] at 1.0 m
    let mut ranges = vec![5.0; N];
    for r in ranges.iter_mut().take(263).skip(250) {
        *r = 1.0;
    }
    let scan = LaserScan::new(ranges, 6.0, 0);
    planner.context().set_scan(scan.clone());

    let outcome = planner.plan_once();
    assert_eq!(outcome.status, CycleStatus::Ok);
    assert!(!outcome.trajectory.is_empty());

    // one simplified gap on each side of the pillar
    let gaps = planner.committed_gaps();
    assert_eq!(gaps.len(), 2);
    assert!(gaps.iter().all(|g| g.feasible));

    // the selected trajectory clears the pillar everywhere
    for pose in &outcome.trajectory.poses {
        for i in 250..=262 {
            let d = pose.position().distance(&scan.point_at(i));
            assert!(
                d >= clearance - 1e-3,
                "pose {:?} within {:.3} of the pillar",
                pose,
                d
            );
        }
    }
}

#[test]
fn pillar_gaps_satisfy_structural_invariants() {
    init_logging();
    let cfg = PlannerConfig::default();
    let infl = cfg.inflated_radius();
    let mut planner = planner_with_goal(cfg, Point2D::new(3.0, 0.0));

    let mut ranges = vec![5.0; N];
    for r in ranges.iter_mut().take(263).skip(250) {
        *r = 1.0;
    }
    let scan = LaserScan::new(ranges, 6.0, 0);
    planner.context().set_scan(scan.clone());
    planner.plan_once();

    let gaps = planner.committed_gaps();

    // arcs are non-empty and pairwise disjoint
    for g in gaps {
        assert!(g.index_width(N) > 0);
    }
    for (i, a) in gaps.iter().enumerate() {
        for (j, b) in gaps.iter().enumerate() {
            if i == j {
                continue;
            }
            assert!(!index_within_arc(a.right.idx, b.right.idx, b.left.idx, N));
            assert!(!index_within_arc(a.left.idx, b.right.idx, b.left.idx, N));
        }
    }

    // manipulated endpoints stay inside the scan and outside the robot
    for g in gaps.iter().filter(|g| g.feasible) {
        for pt in [g.manip.left, g.manip.right] {
            assert!(pt.range <= scan.range_at(pt.idx) + 1e-4);
            assert!(pt.range >= infl - 1e-4);
        }
    }

    // every estimator is unique to its endpoint
    let mut ids: Vec<u64> = Vec::new();
    for g in gaps {
        let (l, r) = g.model_ids().expect("estimators attached");
        ids.push(l);
        ids.push(r);
    }
    let before = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), before);
}

#[test]
fn closing_gap_between_converging_agents() {
    init_logging();
    let mut cfg = PlannerConfig::default();
    cfg.robot.vx_absmax = 2.0;
    let mut planner = planner_with_goal(cfg, Point2D::new(3.0, 0.0));
    let ctx = planner.context();

    let radius = 0.2;
    let vel = 0.3;
    let mut ids_mid_run = None;

    // agents at (1.5, ±1.0) approaching each other at 0.3 m/s
    for k in 0..=10u64 {
        let t = k as f32 * 0.1;
        let y = 1.0 - vel * t;
        let upper = Point2D::new(1.5, y);
        let lower = Point2D::new(1.5, -y);
        ctx.set_scan(disk_scan(
            &[(upper, radius), (lower, radius)],
            5.0,
            6.0,
            k * 100_000,
        ));
        ctx.set_agents(vec![
            AgentState {
                position: upper,
                velocity: Point2D::new(0.0, -vel),
            },
            AgentState {
                position: lower,
                velocity: Point2D::new(0.0, vel),
            },
        ]);
        planner.plan_once();

        if k == 6 {
            ids_mid_run = central_gap(&planner).and_then(|g| g.model_ids());
        }
    }

    let gap = central_gap(&planner).expect("central gap tracked");
    assert_eq!(gap.category, GapCategory::Closing);
    assert!(gap.closed, "converging endpoints should close the gap");
    // at the last cycle the endpoints sit near y = ±0.55 and close at
    // ~0.6 m/s; the safety separation brings the closing time under that
    assert!(
        gap.lifespan > 0.5 && gap.lifespan < 2.5,
        "unexpected lifespan {}",
        gap.lifespan
    );
    let cp = gap.closing_point.expect("closing point recorded");
    assert!(cp.x > 1.3 && cp.x < 2.5, "closing point {:?}", cp);
    assert!(cp.y.abs() < 0.5);
    // spline feasibility matches the recorded peak velocity
    let (px, py) = gap.peak_spline_vel.expect("spline evaluated");
    assert_eq!(gap.feasible, px.abs().max(py.abs()) <= 2.0);

    // endpoint estimators survived association across every cycle
    assert_eq!(gap.model_ids(), ids_mid_run);
}

#[test]
fn closing_gap_infeasible_for_slow_robot() {
    init_logging();
    // same geometry, but the robot cannot reach the crossing in time
    let mut planner = planner_with_goal(PlannerConfig::default(), Point2D::new(3.0, 0.0));
    let ctx = planner.context();

    let radius = 0.2;
    for k in 0..=10u64 {
        let y = 1.0 - 0.3 * k as f32 * 0.1;
        ctx.set_scan(disk_scan(
            &[
                (Point2D::new(1.5, y), radius),
                (Point2D::new(1.5, -y), radius),
            ],
            5.0,
            6.0,
            k * 100_000,
        ));
        planner.plan_once();
    }

    let gap = central_gap(&planner).expect("central gap tracked");
    assert_eq!(gap.category, GapCategory::Closing);
    let (px, py) = gap.peak_spline_vel.expect("spline evaluated");
    assert!(px.abs().max(py.abs()) > 0.5);
    assert!(!gap.feasible);
}

#[test]
fn wraparound_gap_hosts_rear_goal() {
    init_logging();
    let mut planner = planner_with_goal(PlannerConfig::default(), Point2D::new(-2.0, 0.0));

    // open only behind the robot: rays [480, 511] ∪ [0, 31]
    let mut ranges = vec![2.0; N];
    for r in ranges.iter_mut().take(N).skip(480) {
        *r = 6.0;
    }
    for r in ranges.iter_mut().take(32) {
        *r = 6.0;
    }
    planner.context().set_scan(LaserScan::new(ranges, 6.0, 0));

    let outcome = planner.plan_once();
    assert_eq!(outcome.status, CycleStatus::Ok);

    // exactly one bridged gap, no artificial insert
    let gaps = planner.committed_gaps();
    assert_eq!(gaps.len(), 1);
    let gap = &gaps[0];
    assert!(!gap.artificial);
    assert!((478..=481).contains(&gap.right.idx), "right {}", gap.right.idx);
    assert!((30..=33).contains(&gap.left.idx), "left {}", gap.left.idx);

    // the rear bearing lies inside the wrapped arc
    let scan = planner.context().scan_snapshot().unwrap();
    let rear_idx = scan.index_of(PI - 1e-3);
    assert!(index_within_arc(rear_idx, gap.right.idx, gap.left.idx, N));

    // the trajectory actually drives backwards toward the goal
    let last = outcome.trajectory.last_pose().unwrap();
    assert!(
        last.position().distance(&Point2D::new(-2.0, 0.0)) < 0.3,
        "trajectory ends at {:?}",
        last
    );
}

#[test]
fn planning_stall_resets_and_recovers() {
    init_logging();
    let cfg = PlannerConfig::default();
    let halt = cfg.planning.halt_buffer_size;
    let mut planner = planner_with_goal(cfg, Point2D::new(2.0, 0.0));
    planner
        .context()
        .set_scan(LaserScan::new(vec![5.0; N], 6.0, 0));

    let outcome = planner.plan_once();
    assert_eq!(outcome.status, CycleStatus::Ok);
    assert!(!planner.current_trajectory().is_empty());

    // a full buffer of zero command velocities trips the stall monitor
    let mut stalled = false;
    for _ in 0..halt {
        stalled |= !planner.record_and_check_vel(Twist2D::default());
    }
    assert!(stalled);

    let outcome = planner.plan_once();
    assert_eq!(outcome.status, CycleStatus::PlanningStall);
    assert!(outcome.trajectory.is_empty());
    assert!(planner.current_trajectory().is_empty());
    assert!(planner.committed_gaps().is_empty());

    // the cycle after the reset plans from scratch
    let outcome = planner.plan_once();
    assert_eq!(outcome.status, CycleStatus::Ok);
    assert!(!outcome.trajectory.is_empty());
}

#[test]
fn goal_reached_check_uses_transforms() {
    init_logging();
    let planner = planner_with_goal(PlannerConfig::default(), Point2D::new(0.1, 0.0));
    // identity transforms: robot at the origin, goal 0.1 m away
    assert!(planner.is_goal_reached());

    let far = planner_with_goal(PlannerConfig::default(), Point2D::new(3.0, 0.0));
    assert!(!far.is_goal_reached());
}

#[test]
fn trajectory_frames_follow_odometry() {
    init_logging();
    // robot displaced and rotated in the odometry frame: the published
    // trajectory must start at the robot, not at the odom origin
    let planner = Planner::new(PlannerConfig::default()).unwrap();
    let ctx = planner.context();
    let robot_in_odom = Pose2D::new(1.0, 2.0, PI / 2.0);
    ctx.set_transforms(TransformSet {
        odom_in_map: Pose2D::identity(),
        robot_in_odom,
    });
    // goal 2 m ahead of the robot (odom frame: (1, 4))
    ctx.set_local_waypoint(Point2D::new(1.0, 4.0));
    ctx.set_global_goal(Point2D::new(1.0, 4.0));
    ctx.set_scan(LaserScan::new(vec![5.0; N], 6.0, 0));

    let mut planner = planner;
    let outcome = planner.plan_once();
    assert_eq!(outcome.status, CycleStatus::Ok);

    let first = outcome.trajectory.poses.first().unwrap();
    assert_relative_eq!(first.x, 1.0, epsilon = 0.05);
    assert_relative_eq!(first.y, 2.0, epsilon = 0.05);
    let last = outcome.trajectory.last_pose().unwrap();
    assert!(
        last.position().distance(&Point2D::new(1.0, 4.0)) < 0.3,
        "trajectory ends at {:?} in odom frame",
        last
    );
}

/// The simplified gap spanning the forward bearing with both endpoints on
/// nearby geometry.
fn central_gap(planner: &Planner) -> Option<&antara_nav::Gap> {
    let front = N / 2;
    planner
        .committed_gaps()
        .iter()
        .find(|g| {
            index_within_arc(front, g.right.idx, g.left.idx, N)
                && g.right.range < 3.0
                && g.left.range < 3.0
        })
}
