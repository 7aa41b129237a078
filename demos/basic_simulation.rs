use impulse2d::*;
use std::sync::Arc;

fn main() {
    let mut engine = PhysicsEngine::new(WorldConf::default(), 1.0 / 60.0).expect("valid time step");
    engine.set_parallel_enabled(true);

    let world = engine.world_mut();
    let events = Arc::new(ContactEventLog::new());
    world.set_contact_listener(events.clone());

    let ground = world.create_body(&BodyDef::static_body()).expect("ground");
    world
        .add_shape(ground, ShapeDef::box_shape(10.0, 0.5))
        .expect("ground shape");

    let ball = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 4.0)))
        .expect("ball");
    world
        .add_shape(ball, ShapeDef::disk(0.5).with_restitution(0.5))
        .expect("ball shape");

    for frame in 0..180 {
        engine.advance(1.0 / 60.0);
        for event in events.drain() {
            println!("frame {frame}: {event:?}");
        }
    }

    let body = engine.world().body(ball).expect("ball exists");
    println!(
        "Ball after 3 s: position {:?}, awake {}",
        body.position(),
        body.is_awake()
    );
}
