use approx::assert_relative_eq;
use impulse2d::*;
use std::sync::Arc;

const DT: f32 = 1.0 / 60.0;

fn anchor(world: &mut PhysicsWorld, position: Vec2) -> BodyId {
    world
        .create_body(&BodyDef::static_body().with_position(position))
        .unwrap()
}

fn bob(world: &mut PhysicsWorld, position: Vec2) -> BodyId {
    let body = world
        .create_body(&BodyDef::dynamic().with_position(position))
        .unwrap();
    world.add_shape(body, ShapeDef::disk(0.25)).unwrap();
    body
}

fn run(world: &mut PhysicsWorld, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 8, 3);
    }
}

#[test]
fn revolute_pendulum_keeps_its_length() {
    let mut world = PhysicsWorld::default();
    let pivot = Vec2::new(0.0, 10.0);
    let ground = anchor(&mut world, pivot);
    let body = bob(&mut world, Vec2::new(2.0, 10.0));
    world
        .create_joint(&JointDef::Revolute(
            RevoluteJointDef::new(ground, body).with_anchors(Vec2::ZERO, Vec2::new(-2.0, 0.0)),
        ))
        .unwrap();

    for _ in 0..120 {
        world.step(DT, 8, 3);
        let p = world.body(body).unwrap().position();
        assert_relative_eq!(p.distance(pivot), 2.0, epsilon = 0.02);
    }
    assert!(world.body(body).unwrap().position().y < 9.5);
}

#[test]
fn revolute_limit_stops_the_swing() {
    let mut world = PhysicsWorld::default();
    let ground = anchor(&mut world, Vec2::new(0.0, 10.0));
    let body = bob(&mut world, Vec2::new(2.0, 10.0));
    world
        .create_joint(&JointDef::Revolute(
            RevoluteJointDef::new(ground, body)
                .with_anchors(Vec2::ZERO, Vec2::new(-2.0, 0.0))
                .with_limit(-0.5, 0.5),
        ))
        .unwrap();

    for _ in 0..180 {
        world.step(DT, 8, 3);
        assert!(world.body(body).unwrap().angle() > -0.55);
    }
}

#[test]
fn revolute_motor_drives_a_wheel() {
    let mut world = PhysicsWorld::default();
    let ground = anchor(&mut world, Vec2::new(0.0, 2.0));
    let wheel = bob(&mut world, Vec2::new(0.0, 2.0));
    let joint = world
        .create_joint(&JointDef::Revolute(
            RevoluteJointDef::new(ground, wheel).with_motor(2.0, 100.0),
        ))
        .unwrap();

    run(&mut world, 30);
    assert_relative_eq!(
        world.body(wheel).unwrap().angular_velocity(),
        2.0,
        epsilon = 1e-3
    );

    world.set_joint_motor(joint, true, -1.0, 100.0).unwrap();
    run(&mut world, 10);
    assert_relative_eq!(
        world.body(wheel).unwrap().angular_velocity(),
        -1.0,
        epsilon = 1e-3
    );
    assert!(world.set_joint_limit(joint, true, 1.0, -1.0).is_err());
}

#[test]
fn distance_joint_couples_free_bodies() {
    let mut world = PhysicsWorld::new(WorldConf {
        gravity: Vec2::ZERO,
        ..Default::default()
    });
    let a = world.create_body(&BodyDef::dynamic()).unwrap();
    let b = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(2.0, 0.0)))
        .unwrap();
    world
        .create_joint(&JointDef::Distance(DistanceJointDef::new(a, b, 2.0)))
        .unwrap();
    world.set_velocity(b, Vec2::new(4.0, 0.0), 0.0).unwrap();

    run(&mut world, 60);
    let pa = world.body(a).unwrap().position();
    let pb = world.body(b).unwrap().position();
    assert_relative_eq!(pa.distance(pb), 2.0, epsilon = 0.02);

    let va = world.body(a).unwrap().linear_velocity();
    let vb = world.body(b).unwrap().linear_velocity();
    assert_relative_eq!((va + vb).x, 4.0, epsilon = 1e-3);
}

#[test]
fn rope_only_limits_the_maximum_length() {
    let mut world = PhysicsWorld::default();
    let pivot = Vec2::new(0.0, 10.0);
    let ground = anchor(&mut world, pivot);
    let body = bob(&mut world, Vec2::new(0.0, 9.0));
    world
        .create_joint(&JointDef::Rope(RopeJointDef::new(ground, body, 2.0)))
        .unwrap();

    run(&mut world, 120);
    let p = world.body(body).unwrap().position();
    assert!(p.distance(pivot) < 2.05);
    assert!(p.distance(pivot) > 1.9);
}

#[test]
fn weld_keeps_the_relative_pose() {
    let mut world = PhysicsWorld::default();
    let a = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 5.0)))
        .unwrap();
    world.add_shape(a, ShapeDef::box_shape(0.5, 0.5)).unwrap();
    let b = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(1.0, 5.0)))
        .unwrap();
    world.add_shape(b, ShapeDef::box_shape(0.5, 0.5)).unwrap();
    world
        .create_joint(&JointDef::Weld(
            WeldJointDef::new(a, b).with_anchors(Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0)),
        ))
        .unwrap();
    world.apply_torque(a, 20.0, true).unwrap();

    run(&mut world, 60);
    let body_a = world.body(a).unwrap();
    let body_b = world.body(b).unwrap();
    let local = body_a.local_point(body_b.position());
    assert_relative_eq!(local.x, 1.0, epsilon = 0.02);
    assert_relative_eq!(local.y, 0.0, epsilon = 0.02);
    assert_relative_eq!(body_b.angle() - body_a.angle(), 0.0, epsilon = 0.02);
}

#[test]
fn target_joint_follows_its_target() {
    let mut world = PhysicsWorld::new(WorldConf {
        gravity: Vec2::ZERO,
        ..Default::default()
    });
    let ground = anchor(&mut world, Vec2::ZERO);
    let body = world.create_body(&BodyDef::dynamic()).unwrap();
    let joint = world
        .create_joint(&JointDef::Target(TargetJointDef::new(
            ground,
            body,
            Vec2::ZERO,
            1000.0,
        )))
        .unwrap();

    world.set_joint_target(joint, Vec2::new(3.0, 0.0)).unwrap();
    run(&mut world, 240);
    let p = world.body(body).unwrap().position();
    assert_relative_eq!(p.x, 3.0, epsilon = 0.05);

    world.set_joint_target(joint, Vec2::new(-3.0, 1.0)).unwrap();
    run(&mut world, 240);
    let p = world.body(body).unwrap().position();
    assert_relative_eq!(p.x, -3.0, epsilon = 0.05);
    assert_relative_eq!(p.y, 1.0, epsilon = 0.05);
}

#[test]
fn friction_joint_brings_a_body_to_rest() {
    let mut world = PhysicsWorld::new(WorldConf {
        gravity: Vec2::ZERO,
        ..Default::default()
    });
    let ground = anchor(&mut world, Vec2::ZERO);
    let body = world
        .create_body(&BodyDef::dynamic().with_velocity(Vec2::new(5.0, 0.0), 0.0))
        .unwrap();
    world
        .create_joint(&JointDef::Friction(FrictionJointDef::new(
            ground, body, 10.0, 1.0,
        )))
        .unwrap();

    run(&mut world, 15);
    let v = world.body(body).unwrap().linear_velocity().x;
    assert!(v > 1.0 && v < 4.0, "v = {v}");
    run(&mut world, 60);
    assert_relative_eq!(
        world.body(body).unwrap().linear_velocity().x,
        0.0,
        epsilon = 1e-3
    );
}

#[test]
fn hanging_pendulum_reports_its_weight() {
    let mut world = PhysicsWorld::default();
    let ground = anchor(&mut world, Vec2::new(0.0, 10.0));
    let body = bob(&mut world, Vec2::new(0.0, 8.0));
    let joint = world
        .create_joint(&JointDef::Revolute(
            RevoluteJointDef::new(ground, body).with_anchors(Vec2::ZERO, Vec2::new(0.0, 2.0)),
        ))
        .unwrap();

    run(&mut world, 60);
    let weight = world.body(body).unwrap().mass() * 10.0;
    let force = world.joint(joint).unwrap().reaction_force(1.0 / DT);
    assert_relative_eq!(force.length(), weight, epsilon = 0.05 * weight);
}

#[test]
fn joined_bodies_skip_contacts_unless_asked() {
    let mut world = PhysicsWorld::new(WorldConf {
        gravity: Vec2::ZERO,
        ..Default::default()
    });
    let a = bob(&mut world, Vec2::ZERO);
    let b = bob(&mut world, Vec2::new(0.3, 0.0));
    let joint = world
        .create_joint(&JointDef::Distance(DistanceJointDef::new(a, b, 0.3)))
        .unwrap();
    world.step(DT, 8, 3);
    assert_eq!(world.contact_count(), 0);

    world.destroy_joint(joint).unwrap();
    let mut def = DistanceJointDef::new(a, b, 0.3);
    def.collide_connected = true;
    world.create_joint(&JointDef::Distance(def)).unwrap();
    world.step(DT, 8, 3);
    assert_eq!(world.contact_count(), 1);
}

#[test]
fn destroying_a_body_reports_its_joints() {
    let mut world = PhysicsWorld::default();
    let log = Arc::new(DestructionLog::new());
    world.set_destruction_listener(log.clone());

    let ground = anchor(&mut world, Vec2::new(0.0, 10.0));
    let body = bob(&mut world, Vec2::new(0.0, 8.0));
    let joint = world
        .create_joint(&JointDef::Rope(RopeJointDef::new(ground, body, 2.0)))
        .unwrap();
    run(&mut world, 5);

    world.destroy_body(ground).unwrap();
    assert_eq!(log.joints(), vec![joint]);
    assert_eq!(world.joint_count(), 0);
    assert!(world.body(body).unwrap().joints().is_empty());
    assert!(world.joint(joint).is_err());

    // Explicit destruction does not notify.
    let other = anchor(&mut world, Vec2::ZERO);
    let j2 = world
        .create_joint(&JointDef::Rope(RopeJointDef::new(other, body, 2.0)))
        .unwrap();
    world.destroy_joint(j2).unwrap();
    assert_eq!(log.joints().len(), 1);
}
