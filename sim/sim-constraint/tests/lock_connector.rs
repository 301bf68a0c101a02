//! Rigid lock integration tests.
//!
//! These drive the lock through the same sequence a nonlinear solver does:
//! - Residual and reactions for a prescribed gap
//! - Newton solves with dense LU on small models
//! - Augmentation loop convergence and the augmentation cap
//! - Auto-penalty escalation
//! - Checkpoint save/restore
//! - Consistency of the tangent with the residual

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector, Point3, Vector3};
use sim_constraint::{
    AugmentationSettings, AugmentedStep, CheckpointReader, CheckpointWriter, ConnectorSet,
    LockConnector, RecordingSink, RigidConnector, SparseTangent,
};
use sim_types::{BodyId, EquationNumbers, RigidBody, RigidBodySet, SimError, TimeInfo};

/// Helper: two bodies on the x axis, both with six free equations.
fn free_pair() -> (RigidBodySet, BodyId, BodyId) {
    let mut bodies = RigidBodySet::new();
    let a = bodies.add(RigidBody::at(Point3::origin()).with_equations(EquationNumbers::free(0)));
    let b = bodies
        .add(RigidBody::at(Point3::new(1.0, 0.0, 0.0)).with_equations(EquationNumbers::free(6)));
    (bodies, a, b)
}

/// Helper: grounded body A and body B free to translate.
fn grounded_pair() -> (RigidBodySet, BodyId, BodyId) {
    let mut bodies = RigidBodySet::new();
    let a = bodies.add(RigidBody::at(Point3::origin()));
    let b = bodies.add(
        RigidBody::at(Point3::new(1.0, 0.0, 0.0))
            .with_equations(EquationNumbers::translation_only(0)),
    );
    (bodies, a, b)
}

/// Helper: full Newton solve of `K du = R + P` for the connectors alone.
fn newton_solve(
    connectors: &mut ConnectorSet,
    bodies: &mut RigidBodySet,
    load: &DVector<f64>,
    tp: &TimeInfo,
) -> Result<(), String> {
    let n = bodies.num_equations();
    for _ in 0..20 {
        bodies.clear_reactions();
        let mut r = load.clone();
        connectors.load_vector(&mut r, bodies, tp);
        if r.norm() < 1e-8 {
            return Ok(());
        }

        let mut k = DMatrix::<f64>::zeros(n, n);
        connectors.stiffness_matrix(&mut k, bodies, tp);
        let du = k.lu().solve(&r).ok_or("singular tangent")?;

        for body in bodies.iter_mut() {
            let eq = body.equations;
            let linear = Vector3::from_fn(|i, _| eq.get(i).map_or(0.0, |e| du[e]));
            let angular = Vector3::from_fn(|i, _| eq.get(i + 3).map_or(0.0, |e| du[e]));
            body.apply_increment(&linear, &angular);
        }
    }
    Err("newton did not converge".into())
}

// ============================================================================
// Residual for a prescribed gap
// ============================================================================

#[test]
fn test_prescribed_gap_residual_and_reactions() {
    let (mut bodies, a, b) = free_pair();
    let mut lock = LockConnector::new(a, b)
        .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
        .with_penalties(1e6, 1e6);
    lock.init(&bodies).unwrap();

    bodies.get_mut(b).unwrap().position = Point3::new(1.01, 0.0, 0.0);

    let (c, vth) = lock.constraint_violation(&bodies, 1.0).unwrap();
    assert_relative_eq!(c, Vector3::new(0.01, 0.0, 0.0), epsilon = 1e-12);
    assert_eq!(vth, Vector3::zeros());

    let mut r = DVector::<f64>::zeros(12);
    lock.load_vector(&mut r, &mut bodies, &TimeInfo::default());

    assert_relative_eq!(lock.force(), Vector3::new(1e4, 0.0, 0.0), epsilon = 1e-6);
    assert_relative_eq!(r[0], 1e4, epsilon = 1e-6);
    assert_relative_eq!(r[6], -1e4, epsilon = 1e-6);
    // anchors lie on the line of action: no moments
    for i in [1, 2, 3, 4, 5, 7, 8, 9, 10, 11] {
        assert!(r[i].abs() < 1e-6, "r[{i}] = {}", r[i]);
    }

    let body_a = bodies.get(a).unwrap();
    let body_b = bodies.get(b).unwrap();
    assert_relative_eq!(body_a.reaction_force, Vector3::new(-1e4, 0.0, 0.0), epsilon = 1e-6);
    assert_relative_eq!(body_b.reaction_force, Vector3::new(1e4, 0.0, 0.0), epsilon = 1e-6);
}

#[test]
fn test_reference_configuration_is_unstrained() {
    let (mut bodies, a, b) = free_pair();
    let settings = AugmentationSettings::default()
        .with_gap_tol(1e-9)
        .with_angle_tol(1e-9)
        .with_force_tol(1e-9);
    let mut lock = LockConnector::new(a, b)
        .with_joint_origin(Vector3::new(0.3, -0.2, 0.1))
        .with_axes(Vector3::new(1.0, 1.0, 0.0), Vector3::z())
        .with_penalties(1e5, 1e5)
        .with_settings(settings);
    lock.init(&bodies).unwrap();
    let once = lock.clone();
    lock.init(&bodies).unwrap();
    assert_eq!(lock, once);

    let mut r = DVector::<f64>::zeros(12);
    lock.load_vector(&mut r, &mut bodies, &TimeInfo::default());
    assert!(r.norm() < 1e-9);

    let mut sink = RecordingSink::new();
    assert!(lock.augment(0, &bodies, &TimeInfo::default(), &mut sink));
    assert_eq!(lock.multipliers(), (Vector3::zeros(), Vector3::zeros()));
}

#[test]
fn test_rigid_motion_keeps_constraint_satisfied() {
    let (mut bodies, a, b) = free_pair();
    let mut lock = LockConnector::new(a, b)
        .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
        .with_penalties(1e3, 1e3);
    lock.init(&bodies).unwrap();

    // rotate the whole assembly about the joint by 30° about z
    let q = nalgebra::UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 0.0, 0.5236));
    let joint = Vector3::new(0.5, 0.0, 0.0);
    for id in [a, b] {
        let body = bodies.get_mut(id).unwrap();
        let r0 = body.reference_position.coords;
        body.position = Point3::from(joint + q * (r0 - joint));
        body.rotation = q;
    }

    let (c, vth) = lock.constraint_violation(&bodies, 1.0).unwrap();
    assert!(c.norm() < 1e-12);
    assert!(vth.norm() < 1e-12);
}

// ============================================================================
// Augmentation loop
// ============================================================================

#[test]
fn test_augmentation_recovers_applied_load() {
    let (mut bodies, a, b) = grounded_pair();
    let settings = AugmentationSettings::default().with_gap_tol(1e-6);
    let mut connectors = ConnectorSet::new();
    let id = connectors.add(
        LockConnector::new(a, b)
            .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
            .with_penalties(1e3, 1e3)
            .with_settings(settings),
    );
    connectors.init(&bodies).unwrap();

    let load = DVector::from_vec(vec![100.0, 0.0, 0.0]);
    let tp = TimeInfo::default();
    let mut sink = RecordingSink::new();
    let summary = AugmentedStep::default()
        .run(&mut connectors, &mut bodies, &tp, &mut sink, |set, bodies| {
            newton_solve(set, bodies, &load, &tp)
        })
        .unwrap();

    // penalty-only solve leaves a gap of P/eps, one augmentation closes it
    assert_eq!(summary.newton_solves, 2);
    assert_eq!(summary.augmentations, 1);
    assert_relative_eq!(sink.reports[0].gap, 0.1, epsilon = 1e-9);
    assert!(sink.last().unwrap().status.is_converged());

    let lock = connectors.get(id).unwrap();
    assert_relative_eq!(lock.force(), Vector3::new(100.0, 0.0, 0.0), epsilon = 1e-6);
    assert_relative_eq!(
        *lock.base().force_multiplier(),
        Vector3::new(100.0, 0.0, 0.0),
        epsilon = 1e-6
    );
    assert_relative_eq!(bodies.get(b).unwrap().position.x, 1.0, epsilon = 1e-9);
}

#[test]
fn test_moment_augmentation_recovers_applied_load() {
    let mut bodies = RigidBodySet::new();
    let a = bodies.add(RigidBody::at(Point3::origin()));
    let b = bodies.add(
        RigidBody::at(Point3::new(1.0, 0.0, 0.0)).with_equations(EquationNumbers::free(0)),
    );
    let settings = AugmentationSettings::default()
        .with_gap_tol(1e-6)
        .with_angle_tol(1e-6);
    let mut connectors = ConnectorSet::new();
    let id = connectors.add(
        LockConnector::new(a, b)
            .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
            .with_penalties(1e3, 1e3)
            .with_settings(settings),
    );
    connectors.init(&bodies).unwrap();

    let p = Vector3::new(10.0, 20.0, -5.0);
    let q = Vector3::new(3.0, -2.0, 7.0);
    let load = DVector::from_iterator(6, p.iter().chain(q.iter()).copied());
    let tp = TimeInfo::default();
    let mut sink = RecordingSink::new();
    let summary = AugmentedStep::default()
        .run(&mut connectors, &mut bodies, &tp, &mut sink, |set, bodies| {
            newton_solve(set, bodies, &load, &tp)
        })
        .unwrap();

    // the penalty-only solve leaves a rotation of order |M|/ups
    assert!(sink.reports[0].angle > 1e-3, "angle {}", sink.reports[0].angle);
    assert!(!sink.reports[0].status.is_converged());
    assert!((1..=3).contains(&summary.augmentations));

    let last = sink.last().unwrap();
    assert!(last.status.is_converged());
    assert!(last.angle < 1e-6, "angle {}", last.angle);
    assert!(last.gap < 1e-6, "gap {}", last.gap);

    // equilibrium of B: F = P and M = Q - zb×F
    let lock = connectors.get(id).unwrap();
    let f = lock.force();
    let zb = bodies.get(b).unwrap().rotation * Vector3::new(-0.5, 0.0, 0.0);
    assert_relative_eq!(f, p, epsilon = 1e-6);
    assert_relative_eq!(lock.moment(), q - zb.cross(&f), epsilon = 1e-6);
    assert_relative_eq!(
        *lock.base().moment_multiplier(),
        lock.moment(),
        epsilon = 1e-3
    );
}

#[test]
fn test_augmentation_cap_accepts_unconverged_state() {
    let (mut bodies, a, b) = grounded_pair();
    let settings = AugmentationSettings::default()
        .with_gap_tol(1e-6)
        .with_augmentations(0, 3);
    let mut connectors = ConnectorSet::new();
    let id = connectors.add(
        LockConnector::new(a, b)
            .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
            .with_penalties(10.0, 10.0)
            .with_settings(settings),
    );
    connectors.init(&bodies).unwrap();
    bodies.get_mut(b).unwrap().position.x = 1.01;

    // the "solve" never moves the bodies, so the gap never closes
    let mut sink = RecordingSink::new();
    let summary = AugmentedStep::default()
        .run::<(), _>(&mut connectors, &mut bodies, &TimeInfo::default(), &mut sink, |_, _| Ok(()))
        .unwrap();

    assert_eq!(summary.augmentations, 3);
    assert_eq!(summary.newton_solves, 4);
    assert_eq!(sink.reports.len(), 4);
    assert!(sink.reports[..3].iter().all(|r| !r.status.is_converged()));

    // three committed updates of eps·c, none at the cap
    let lock = connectors.get(id).unwrap();
    assert_relative_eq!(lock.base().force_multiplier().x, 0.3, epsilon = 1e-12);
}

#[test]
fn test_min_augmentations_forces_extra_solves() {
    let (mut bodies, a, b) = grounded_pair();
    let mut connectors = ConnectorSet::new();
    connectors.add(
        LockConnector::new(a, b)
            .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
            .with_settings(AugmentationSettings::default().with_augmentations(2, 10)),
    );
    connectors.init(&bodies).unwrap();

    let summary = AugmentedStep::default()
        .run::<(), _>(
            &mut connectors,
            &mut bodies,
            &TimeInfo::default(),
            &mut RecordingSink::new(),
            |_, _| Ok(()),
        )
        .unwrap();
    assert_eq!(summary.augmentations, 2);
}

#[test]
fn test_auto_penalty_escalates_through_connector() {
    let (mut bodies, a, b) = grounded_pair();
    let settings = AugmentationSettings::default()
        .with_gap_tol(1e-2)
        .with_auto_penalty(true);
    let mut connectors = ConnectorSet::new();
    let id = connectors.add(
        LockConnector::new(a, b)
            .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
            .with_penalties(50.0, 7.0)
            .with_settings(settings),
    );
    connectors.init(&bodies).unwrap();
    bodies.get_mut(b).unwrap().position.x = 1.02;

    let mut sink = RecordingSink::new();
    assert!(!connectors.augment(0, &bodies, &TimeInfo::default(), &mut sink));

    // gap/tol = 2 is below the floor of 100
    let lock = connectors.get(id).unwrap();
    assert_relative_eq!(lock.base().force_penalty, 5000.0, epsilon = 1e-9);
    assert_relative_eq!(lock.base().moment_penalty, 7.0);
    assert_eq!(sink.reports[0].force_penalty, Some(lock.base().force_penalty));
    // the multiplier update used the penalty from before escalation
    assert_relative_eq!(lock.base().force_multiplier().x, 1.0, epsilon = 1e-12);
}

// ============================================================================
// Checkpoints
// ============================================================================

#[test]
fn test_checkpoint_restores_fresh_instance() {
    let (mut bodies, a, b) = free_pair();
    let build = || {
        LockConnector::new(a, b)
            .with_joint_origin(Vector3::new(0.5, 0.1, 0.0))
            .with_axes(Vector3::y(), Vector3::z())
            .with_settings(
                AugmentationSettings::default()
                    .with_gap_tol(1e-8)
                    .with_angle_tol(1e-8)
                    .with_auto_penalty(true),
            )
    };
    let mut lock = build();
    lock.init(&bodies).unwrap();
    {
        let body_b = bodies.get_mut(b).unwrap();
        body_b.position = Point3::new(1.05, 0.02, 0.0);
        body_b.rotation =
            nalgebra::UnitQuaternion::from_scaled_axis(Vector3::new(0.01, 0.0, 0.02));
    }
    let tp = TimeInfo::default();
    lock.augment(0, &bodies, &tp, &mut RecordingSink::new());
    lock.update(&bodies, &tp);

    let mut writer = CheckpointWriter::new(Vec::new());
    lock.serialize(&mut writer).unwrap();
    let bytes = writer.into_inner();
    // base: eps, ups; lock: qa0, qb0, L, U and three triads
    assert_eq!(bytes.len(), (2 + 12 + 27) * 8);

    let mut restored = build();
    restored
        .serialize(&mut CheckpointReader::new(bytes.as_slice()))
        .unwrap();
    // the cached force is not stored
    assert_eq!(restored.force(), Vector3::zeros());
    restored.update(&bodies, &tp);
    assert_eq!(restored, lock);

    let mut truncated = build();
    let err = truncated
        .serialize(&mut CheckpointReader::new(&bytes[..bytes.len() - 4]))
        .unwrap_err();
    assert!(matches!(err, SimError::Checkpoint { .. }));
}

#[test]
fn test_connector_set_checkpoint_order() {
    let (bodies, a, b) = free_pair();
    let mut set = ConnectorSet::new();
    set.add(LockConnector::new(a, b).with_penalties(1.0, 2.0));
    set.add(LockConnector::new(a, b).with_penalties(3.0, 4.0));
    set.init(&bodies).unwrap();

    let mut writer = CheckpointWriter::new(Vec::new());
    set.serialize(&mut writer).unwrap();
    let bytes = writer.into_inner();

    let first = f64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let second = f64::from_le_bytes(bytes[41 * 8..42 * 8].try_into().unwrap());
    assert_eq!(first, 1.0);
    assert_eq!(second, 3.0);
}

// ============================================================================
// Tangent
// ============================================================================

fn residual(lock: &mut LockConnector, bodies: &RigidBodySet, tp: &TimeInfo) -> DVector<f64> {
    let mut bodies = bodies.clone();
    let mut r = DVector::<f64>::zeros(12);
    lock.load_vector(&mut r, &mut bodies, tp);
    r
}

fn perturbed(bodies: &RigidBodySet, ids: [BodyId; 2], dof: usize, h: f64) -> RigidBodySet {
    let mut bodies = bodies.clone();
    let body = bodies.get_mut(ids[dof / 6]).unwrap();
    let mut linear = Vector3::zeros();
    let mut angular = Vector3::zeros();
    let local = dof % 6;
    if local < 3 {
        linear[local] = h;
    } else {
        angular[local - 3] = h;
    }
    body.apply_increment(&linear, &angular);
    bodies
}

#[test]
fn test_tangent_matches_finite_differences() {
    let (bodies, a, b) = free_pair();
    let mut lock = LockConnector::new(a, b)
        .with_joint_origin(Vector3::new(0.3, 0.4, -0.2))
        .with_axes(Vector3::new(1.0, 0.0, 1.0), Vector3::y())
        .with_penalties(1e3, 5e2);
    lock.init(&bodies).unwrap();

    for tp in [
        TimeInfo::default(),
        TimeInfo::generalized_alpha(0.0, 0.1, 0.5),
    ] {
        let mut k = DMatrix::<f64>::zeros(12, 12);
        lock.stiffness_matrix(&mut k, &bodies, &tp);

        let h = 1e-6;
        let mut k_fd = DMatrix::<f64>::zeros(12, 12);
        for j in 0..12 {
            let rp = residual(&mut lock, &perturbed(&bodies, [a, b], j, h), &tp);
            let rm = residual(&mut lock, &perturbed(&bodies, [a, b], j, -h), &tp);
            k_fd.set_column(j, &(-(rp - rm) / (2.0 * h)));
        }

        assert_relative_eq!(k, k_fd, epsilon = 1e-3);
    }
}

#[test]
fn test_sparse_assembly_matches_dense() {
    let mut bodies = RigidBodySet::new();
    let a = bodies.add(RigidBody::at(Point3::origin()));
    let b = bodies
        .add(RigidBody::at(Point3::new(1.0, 0.0, 0.0)).with_equations(EquationNumbers::free(0)));
    let c = bodies
        .add(RigidBody::at(Point3::new(2.0, 1.0, 0.0)).with_equations(EquationNumbers::free(6)));

    let mut set = ConnectorSet::new();
    set.add(
        LockConnector::new(a, b)
            .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
            .with_penalties(10.0, 20.0),
    );
    set.add(
        LockConnector::new(b, c)
            .with_joint_origin(Vector3::new(1.5, 0.5, 0.0))
            .with_penalties(30.0, 40.0),
    );
    set.init(&bodies).unwrap();
    bodies.get_mut(c).unwrap().position.y = 1.1;

    let tp = TimeInfo::default();
    let n = bodies.num_equations();
    let mut dense = DMatrix::<f64>::zeros(n, n);
    let mut sparse = SparseTangent::new(n);
    set.stiffness_matrix(&mut dense, &bodies, &tp);
    set.stiffness_matrix(&mut sparse, &bodies, &tp);

    let csr = sparse.to_csr();
    assert_eq!(csr.nrows(), 12);
    assert_relative_eq!(sparse.to_dense(), dense, epsilon = 1e-12);
    // body B's diagonal block receives both connectors
    assert_relative_eq!(dense[(0, 0)], 40.0, epsilon = 1e-12);
}
