use impulse2d::*;

fn main() {
    let mut world = PhysicsWorld::default();

    let ground = world.create_body(&BodyDef::static_body()).expect("ground");
    world
        .add_shape(ground, ShapeDef::box_shape(10.0, 0.5))
        .expect("ground shape");
    for i in 0..3 {
        let body = world
            .create_body(&BodyDef::dynamic().with_position(Vec2::new(i as f32 * 2.0 - 2.0, 3.0)))
            .expect("disk");
        world.add_shape(body, ShapeDef::disk(0.5)).expect("disk shape");
    }

    let from = Vec2::new(-8.0, 3.0);
    let to = Vec2::new(8.0, 3.0);

    let mut all = Vec::new();
    world.ray_cast(from, to, |hit| {
        all.push(hit);
        RayCastAction::Continue
    });
    println!("Ray hits: {}", all.len());

    let mut closest = None;
    world.ray_cast(from, to, |hit| {
        closest = Some(hit);
        RayCastAction::Clip
    });
    if let Some(hit) = closest {
        println!(
            "Closest hit on {:?} at {:?}, normal {:?}",
            hit.body, hit.point, hit.normal
        );
    }

    let mut overlapping = 0;
    world.query_aabb(&Aabb::new(Vec2::new(-1.0, 2.0), Vec2::new(1.0, 4.0)), |_| {
        overlapping += 1;
        true
    });
    println!("Proxies overlapping the query box: {overlapping}");
}
