use approx::assert_relative_eq;
use impulse2d::*;

fn scene() -> (PhysicsWorld, BodyId, BodyId) {
    let mut world = PhysicsWorld::default();
    let ground = world.create_body(&BodyDef::static_body()).unwrap();
    world.add_shape(ground, ShapeDef::box_shape(10.0, 0.5)).unwrap();
    let ball = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 4.0)))
        .unwrap();
    world.add_shape(ball, ShapeDef::disk(1.0)).unwrap();
    (world, ground, ball)
}

#[test]
fn closest_hit_is_found_by_clipping() {
    let (world, _, ball) = scene();
    let mut closest = None;
    world.ray_cast(Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0), |hit| {
        closest = Some(hit);
        RayCastAction::Clip
    });

    let hit = closest.unwrap();
    assert_eq!(hit.body, ball);
    assert_relative_eq!(hit.point.y, 5.0, epsilon = 1e-4);
    assert_relative_eq!(hit.normal.y, 1.0, epsilon = 1e-4);
    assert_relative_eq!(hit.fraction, 0.25, epsilon = 1e-5);
}

#[test]
fn continue_reports_every_shape_on_the_ray() {
    let (world, ground, ball) = scene();
    let mut bodies = Vec::new();
    world.ray_cast(Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0), |hit| {
        bodies.push(hit.body);
        RayCastAction::Continue
    });
    bodies.sort();
    let mut expected = vec![ground, ball];
    expected.sort();
    assert_eq!(bodies, expected);
}

#[test]
fn ignore_and_terminate_steer_the_search() {
    let (world, ground, ball) = scene();

    let mut seen = Vec::new();
    world.ray_cast(Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0), |hit| {
        seen.push(hit.body);
        if hit.body == ball {
            RayCastAction::Ignore
        } else {
            RayCastAction::Clip
        }
    });
    assert!(seen.contains(&ground));

    let mut calls = 0;
    world.ray_cast(Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0), |_| {
        calls += 1;
        RayCastAction::Terminate
    });
    assert_eq!(calls, 1);
}

#[test]
fn rays_that_miss_report_nothing() {
    let (world, _, _) = scene();
    let mut calls = 0;
    world.ray_cast(Vec2::new(-20.0, 10.0), Vec2::new(20.0, 10.0), |_| {
        calls += 1;
        RayCastAction::Continue
    });
    assert_eq!(calls, 0);

    // Inside the fat box but past the disk.
    world.ray_cast(Vec2::new(1.05, 2.9), Vec2::new(1.05, 5.1), |_| {
        calls += 1;
        RayCastAction::Continue
    });
    assert_eq!(calls, 0);
}

#[test]
fn aabb_query_uses_fattened_bounds() {
    let (world, ground, ball) = scene();

    let mut hits = Vec::new();
    world.query_aabb(&Aabb::new(Vec2::new(-0.5, 3.5), Vec2::new(0.5, 4.5)), |hit| {
        hits.push(hit.body);
        true
    });
    assert_eq!(hits, vec![ball]);

    let mut count = 0;
    world.query_aabb(&Aabb::new(Vec2::new(-20.0, -20.0), Vec2::new(20.0, 20.0)), |_| {
        count += 1;
        false
    });
    assert_eq!(count, 1);

    let mut hits = Vec::new();
    world.query_aabb(&Aabb::new(Vec2::new(9.0, 0.0), Vec2::new(9.5, 0.55)), |hit| {
        hits.push((hit.body, hit.child));
        true
    });
    assert_eq!(hits, vec![(ground, 0)]);
}

#[test]
fn chain_children_are_reported_individually() {
    let mut world = PhysicsWorld::default();
    let terrain = world.create_body(&BodyDef::static_body()).unwrap();
    world
        .add_shape(
            terrain,
            ShapeDef::chain(
                vec![
                    Vec2::new(-3.0, 0.0),
                    Vec2::new(-1.0, 0.0),
                    Vec2::new(1.0, 1.0),
                    Vec2::new(3.0, 1.0),
                ],
                false,
            ),
        )
        .unwrap();

    let mut hit = None;
    world.ray_cast(Vec2::new(2.0, 5.0), Vec2::new(2.0, -5.0), |h| {
        hit = Some(h);
        RayCastAction::Clip
    });
    let hit = hit.unwrap();
    assert_eq!(hit.child, 2);
    assert_relative_eq!(hit.point.y, 1.0, epsilon = 1e-4);
}
