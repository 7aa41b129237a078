use impulse2d::*;
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn test_physics_world_is_sync_and_send() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<PhysicsWorld>();
    assert_sync_send::<PhysicsEngine>();
    assert_sync_send::<ContactEventLog>();
}

#[test]
fn test_shared_physics_world_across_threads() {
    let mut world = PhysicsWorld::default();
    let body = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 10.0)))
        .unwrap();
    world.add_shape(body, ShapeDef::disk(0.5)).unwrap();
    let world = Arc::new(Mutex::new(world));

    let mut handles = vec![];
    for _ in 0..4 {
        let world_clone = Arc::clone(&world);
        let handle = thread::spawn(move || {
            let mut world = world_clone.lock().unwrap();
            world.step(1.0 / 60.0, 8, 3);
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let world = world.lock().unwrap();
    let y = world.body(body).unwrap().position().y;
    assert!(y < 10.0, "body should have fallen, y = {y}");
}

#[test]
fn test_worlds_step_independently_on_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let mut world = PhysicsWorld::default();
                let body = world
                    .create_body(&BodyDef::dynamic().with_position(Vec2::new(i as f32, 1.0)))
                    .unwrap();
                for _ in 0..3 {
                    world.step(0.01, 8, 3);
                }
                world.body(body).unwrap().position()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let p = handle.join().unwrap();
        assert_eq!(p.x, i as f32);
        assert!((p.y - 0.994).abs() < 1e-5);
    }
}
