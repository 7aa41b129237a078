use approx::assert_relative_eq;
use impulse2d::*;
use std::sync::{Arc, Mutex};

const DT: f32 = 1.0 / 60.0;

fn add_ground(world: &mut PhysicsWorld) -> BodyId {
    let ground = world.create_body(&BodyDef::static_body()).unwrap();
    world
        .add_shape(ground, ShapeDef::box_shape(20.0, 0.5))
        .unwrap();
    ground
}

#[test]
fn shapeless_body_follows_symplectic_euler() {
    let mut world = PhysicsWorld::default();
    let body = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0)))
        .unwrap();

    let expected = [(-0.1, 0.999), (-0.2, 0.997), (-0.3, 0.994)];
    for (velocity, position) in expected {
        world.step(0.01, 8, 3);
        let b = world.body(body).unwrap();
        assert_relative_eq!(b.linear_velocity().y, velocity, epsilon = 1e-5);
        assert_relative_eq!(b.position().y, position, epsilon = 1e-5);
        assert_eq!(b.position().x, 0.0);
    }
}

#[test]
fn resting_body_sleeps_once_and_wakes_on_impulse() {
    let mut world = PhysicsWorld::default();
    add_ground(&mut world);
    let ball = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0)))
        .unwrap();
    world.add_shape(ball, ShapeDef::disk(0.5)).unwrap();

    let mut slept = 0;
    for _ in 0..240 {
        slept += world.step(DT, 8, 3).reg.bodies_slept;
    }
    assert_eq!(slept, 1);
    assert!(!world.body(ball).unwrap().is_awake());
    assert_relative_eq!(world.body(ball).unwrap().position().y, 1.0, epsilon = 0.02);

    let idle = world.step(DT, 8, 3);
    assert_eq!(idle.reg.islands_found, 0);

    world
        .apply_linear_impulse(ball, Vec2::new(0.0, 2.0), Vec2::new(0.0, 1.0), true)
        .unwrap();
    assert!(world.body(ball).unwrap().is_awake());
    let stats = world.step(DT, 8, 3);
    assert_eq!(stats.reg.islands_found, 1);
    assert!(world.body(ball).unwrap().linear_velocity().y > 0.0);
}

#[test]
fn waking_one_body_wakes_its_stack() {
    let mut world = PhysicsWorld::default();
    add_ground(&mut world);
    let lower = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0)))
        .unwrap();
    world.add_shape(lower, ShapeDef::box_shape(0.5, 0.5)).unwrap();
    let upper = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 2.0)))
        .unwrap();
    world.add_shape(upper, ShapeDef::box_shape(0.5, 0.5)).unwrap();

    for _ in 0..600 {
        world.step(DT, 8, 3);
    }
    assert!(!world.body(lower).unwrap().is_awake());
    assert!(!world.body(upper).unwrap().is_awake());

    world.set_awake(upper, true).unwrap();
    world.step(DT, 8, 3);
    assert!(world.body(lower).unwrap().is_awake());
    assert!(world.body(upper).unwrap().is_awake());
}

#[test]
fn body_setters_respect_body_type() {
    let mut world = PhysicsWorld::new(WorldConf {
        gravity: Vec2::ZERO,
        ..Default::default()
    });
    let ground = add_ground(&mut world);
    world.set_velocity(ground, Vec2::X, 1.0).unwrap();
    assert_eq!(world.body(ground).unwrap().linear_velocity(), Vec2::ZERO);

    let body = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 10.0)))
        .unwrap();
    world.add_shape(body, ShapeDef::box_shape(1.0, 1.0)).unwrap();
    assert_relative_eq!(world.body(body).unwrap().mass(), 4.0, epsilon = 1e-5);

    world.set_type(body, BodyType::Static).unwrap();
    let b = world.body(body).unwrap();
    assert_eq!(b.mass(), 0.0);
    assert!(!b.is_awake());

    world.set_type(body, BodyType::Dynamic).unwrap();
    world
        .apply_force_to_center(body, Vec2::new(4.0, 0.0), true)
        .unwrap();
    world.step(1.0, 8, 3);
    assert_relative_eq!(
        world.body(body).unwrap().linear_velocity().x,
        1.0,
        epsilon = 1e-5
    );
    // Forces are cleared after each step.
    assert_eq!(world.body(body).unwrap().force(), Vec2::ZERO);
}

#[test]
fn detaching_a_shape_updates_mass_and_contacts() {
    let mut world = PhysicsWorld::default();
    add_ground(&mut world);
    let body = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0)))
        .unwrap();
    let shape = world
        .add_shape(body, ShapeDef::box_shape(0.5, 0.5).with_density(2.0))
        .unwrap();
    assert_relative_eq!(world.body(body).unwrap().mass(), 2.0, epsilon = 1e-5);

    world.step(DT, 8, 3);
    assert_eq!(world.contact_count(), 1);

    world.detach_shape(body, shape).unwrap();
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.body(body).unwrap().mass(), 1.0);
    assert!(world.shape(shape).unwrap().bodies().is_empty());

    // Shapes may be shared between bodies.
    let twin = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(3.0, 1.0)))
        .unwrap();
    world.attach_shape(body, shape).unwrap();
    world.attach_shape(twin, shape).unwrap();
    assert_eq!(world.shape(shape).unwrap().bodies(), &[body, twin]);

    world.destroy_shape(shape).unwrap();
    assert!(world.body(body).unwrap().shapes().is_empty());
    assert!(world.body(twin).unwrap().shapes().is_empty());
}

struct Mutator {
    attempt: Mutex<Option<PhysicsResult<BodyId>>>,
}

impl ContactListener for Mutator {
    fn begin_contact(&self, world: &mut PhysicsWorld, contact: ContactId) {
        assert!(world.is_locked());
        // Non-topology changes stay available.
        world.set_contact_friction(contact, 0.0).unwrap();
        *self.attempt.lock().unwrap() = Some(world.create_body(&BodyDef::dynamic()));
    }
}

#[test]
fn topology_changes_inside_listeners_are_rejected() {
    let mut world = PhysicsWorld::default();
    add_ground(&mut world);
    let ball = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 0.95)))
        .unwrap();
    world.add_shape(ball, ShapeDef::disk(0.5)).unwrap();

    let listener = Arc::new(Mutator {
        attempt: Mutex::new(None),
    });
    world.set_contact_listener(listener.clone());
    world.step(DT, 8, 3);

    let attempt = listener.attempt.lock().unwrap().take();
    assert_eq!(attempt, Some(Err(PhysicsError::WorldLocked)));
    assert_eq!(world.phase(), WorldPhase::Idle);
    assert_eq!(world.body_count(), 2);
    let (_, contact) = world.contacts().next().unwrap();
    assert_eq!(contact.friction(), 0.0);

    // Unlocked again once the step returned.
    assert!(world.create_body(&BodyDef::dynamic()).is_ok());
}

#[test]
fn capacity_errors_leave_the_world_usable() {
    let mut world = PhysicsWorld::new(WorldConf {
        max_bodies: 2,
        ..Default::default()
    });
    let a = world.create_body(&BodyDef::dynamic()).unwrap();
    world.create_body(&BodyDef::dynamic()).unwrap();

    assert_eq!(
        world.create_body(&BodyDef::dynamic()),
        Err(PhysicsError::CapacityExceeded {
            kind: "body",
            limit: 2
        })
    );
    world.step(DT, 8, 3);
    world.destroy_body(a).unwrap();
    assert!(world.create_body(&BodyDef::dynamic()).is_ok());
}

#[test]
fn invalid_arguments_are_reported() {
    let mut world = PhysicsWorld::default();
    let body = world.create_body(&BodyDef::dynamic()).unwrap();

    let degenerate = ShapeDef::polygon(vec![Vec2::ZERO, Vec2::X]);
    assert!(matches!(
        world.create_shape(degenerate),
        Err(PhysicsError::InvalidArgument(_))
    ));
    assert!(matches!(
        world.create_body(&BodyDef::dynamic().with_position(Vec2::new(f32::NAN, 0.0))),
        Err(PhysicsError::InvalidArgument(_))
    ));
    assert!(matches!(
        world.create_joint(&JointDef::Distance(DistanceJointDef::new(body, body, 1.0))),
        Err(PhysicsError::InvalidArgument(_))
    ));
    assert_eq!(world.body_count(), 1);
    assert_eq!(world.joint_count(), 0);
}

#[test]
fn kinematic_platform_keeps_riders_in_separate_islands() {
    let mut world = PhysicsWorld::default();
    let platform = world
        .create_body(&BodyDef::kinematic().with_velocity(Vec2::new(1.0, 0.0), 0.0))
        .unwrap();
    world
        .add_shape(platform, ShapeDef::box_shape(5.0, 0.5))
        .unwrap();
    let mut riders = Vec::new();
    for x in [-3.0, 3.0] {
        let rider = world
            .create_body(&BodyDef::dynamic().with_position(Vec2::new(x, 1.0)))
            .unwrap();
        world.add_shape(rider, ShapeDef::box_shape(0.5, 0.5)).unwrap();
        riders.push(rider);
    }

    let mut stats = world.step(DT, 8, 3);
    for _ in 0..2 {
        stats = world.step(DT, 8, 3);
    }
    let touching = world.contacts().filter(|(_, c)| c.is_touching()).count();
    assert_eq!(touching, 2);
    assert_eq!(stats.reg.islands_found, 2);

    // Shared by both islands, the platform still moves once per step.
    let x = world.body(platform).unwrap().position().x;
    assert_relative_eq!(x, 3.0 * DT, epsilon = 1e-5);
    for rider in riders {
        assert!(world.body(rider).unwrap().is_awake());
    }
}

#[test]
fn lone_kinematic_body_still_moves() {
    let mut world = PhysicsWorld::default();
    let mover = world
        .create_body(&BodyDef::kinematic().with_velocity(Vec2::new(0.0, 2.0), 0.5))
        .unwrap();
    let stats = world.step(DT, 8, 3);
    assert_eq!(stats.reg.islands_found, 1);
    let body = world.body(mover).unwrap();
    assert_relative_eq!(body.position().y, 2.0 * DT, epsilon = 1e-6);
    assert_relative_eq!(body.angle(), 0.5 * DT, epsilon = 1e-6);
}

fn pile(parallel: bool) -> (PhysicsWorld, Vec<BodyId>) {
    let mut world = PhysicsWorld::default();
    world.set_parallel_enabled(parallel);
    add_ground(&mut world);
    let mut bodies = Vec::new();
    for i in 0..24 {
        let x = (i % 6) as f32 * 0.9 - 2.5;
        let y = 1.5 + (i / 6) as f32 * 1.1;
        let body = world
            .create_body(&BodyDef::dynamic().with_position(Vec2::new(x, y)).with_angle(0.1 * i as f32))
            .unwrap();
        let def = if i % 2 == 0 {
            ShapeDef::disk(0.4)
        } else {
            ShapeDef::box_shape(0.4, 0.3)
        };
        world.add_shape(body, def).unwrap();
        bodies.push(body);
    }
    (world, bodies)
}

#[test]
fn parallel_and_serial_paths_agree_bit_for_bit() {
    let (mut serial, bodies) = pile(false);
    let (mut parallel, _) = pile(true);

    for _ in 0..200 {
        let a = serial.step(DT, 8, 3);
        let b = parallel.step(DT, 8, 3);
        assert_eq!(a.pre, b.pre);
    }
    for id in bodies {
        let a = serial.body(id).unwrap();
        let b = parallel.body(id).unwrap();
        assert_eq!(a.position(), b.position());
        assert_eq!(a.angle(), b.angle());
        assert_eq!(a.velocity(), b.velocity());
    }
}

#[test]
fn engine_runs_fixed_steps() {
    let mut engine = PhysicsEngine::new(WorldConf::default(), 0.01).unwrap();
    let body = engine
        .world_mut()
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0)))
        .unwrap();

    assert_eq!(engine.advance(0.035), 3);
    let b = engine.world().body(body).unwrap();
    assert_relative_eq!(b.position().y, 0.994, epsilon = 1e-5);
}
