use impulse2d::*;

const DT: f32 = 1.0 / 60.0;

fn corridor(speed: f32, bullet: bool) -> (PhysicsWorld, BodyId) {
    let mut world = PhysicsWorld::new(WorldConf {
        gravity: Vec2::ZERO,
        ..Default::default()
    });
    for x in [-1.0, 1.0] {
        let wall = world
            .create_body(&BodyDef::static_body().with_position(Vec2::new(x, 0.0)))
            .unwrap();
        world
            .add_shape(wall, ShapeDef::box_shape(0.05, 5.0))
            .unwrap();
    }
    let ball = world
        .create_body(
            &BodyDef::dynamic()
                .with_velocity(Vec2::new(speed, 0.0), 0.0)
                .bullet(bullet),
        )
        .unwrap();
    world
        .add_shape(
            ball,
            ShapeDef::disk(0.05).with_restitution(1.0).with_friction(0.0),
        )
        .unwrap();
    (world, ball)
}

#[test]
fn bullet_never_leaves_the_corridor() {
    let (mut world, ball) = corridor(50.0, true);
    // Inner wall faces sit at |x| = 0.95.
    let limit = 0.95 + world.step_conf().linear_slop;
    let mut bounces = 0;
    let mut last_sign = 1.0f32;

    for step in 0..10_000 {
        world.step(DT, 8, 3);
        let body = world.body(ball).unwrap();
        let x = body.position().x;
        assert!(x.abs() <= limit, "ball entered a wall at step {step}: x = {x}");

        let sign = body.linear_velocity().x.signum();
        if sign != last_sign {
            bounces += 1;
            last_sign = sign;
        }
    }
    assert!(bounces > 100, "only {bounces} bounces");
}

#[test]
fn discrete_stepping_lets_a_fast_body_tunnel() {
    let (mut world, ball) = corridor(200.0, false);
    let mut conf = *world.step_conf();
    conf.continuous_physics = false;
    world.set_step_conf(conf).unwrap();

    world.step(DT, 8, 3);
    assert!(world.body(ball).unwrap().position().x > 1.0);
}

#[test]
fn toi_statistics_report_sub_steps() {
    let (mut world, _) = corridor(120.0, true);
    let mut sub_steps = 0;
    for _ in 0..10 {
        let stats = world.step(DT, 8, 3);
        sub_steps += stats.toi.sub_steps;
        assert!(stats.toi.max_root_iterations <= world.step_conf().max_toi_root_iterations);
    }
    assert!(sub_steps > 0);
}

#[test]
fn capped_contacts_are_counted_once_per_step() {
    let (mut world, _) = corridor(120.0, true);
    let mut conf = *world.step_conf();
    conf.max_sub_steps = 0;
    world.set_step_conf(conf).unwrap();

    let mut capped = 0;
    for _ in 0..30 {
        let stats = world.step(DT, 8, 3);
        assert!(stats.toi.contacts_at_max_sub_steps <= world.contact_count() as u32);
        assert!(stats.toi.contacts_at_max_sub_steps <= stats.toi.contacts_updated_toi);
        capped += stats.toi.contacts_at_max_sub_steps;
    }
    assert!(capped > 0);
}
