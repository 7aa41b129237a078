use impulse2d::*;

fn main() {
    let mut world = PhysicsWorld::default();

    let ground = world.create_body(&BodyDef::static_body()).expect("ground");
    world
        .add_shape(ground, ShapeDef::box_shape(20.0, 0.5))
        .expect("ground shape");

    let mut boxes = Vec::new();
    for i in 0..10 {
        let body = world
            .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0 + i as f32)))
            .expect("box");
        world
            .add_shape(body, ShapeDef::box_shape(0.5, 0.5).with_friction(0.6))
            .expect("box shape");
        boxes.push(body);
    }

    let mut slept = 0;
    for step in 0..600 {
        let stats = world.step(1.0 / 60.0, 8, 3);
        slept += stats.reg.bodies_slept;
        if step % 120 == 0 {
            println!(
                "step {step}: islands {} contacts {} min separation {:.4}",
                stats.reg.islands_solved,
                world.contact_count(),
                stats.reg.min_separation
            );
        }
    }

    let top = world.body(boxes[boxes.len() - 1]).expect("top box");
    println!(
        "Top box at {:?} after 10 s, {slept} bodies went to sleep",
        top.position()
    );
}
