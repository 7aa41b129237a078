use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use impulse2d::{
    collision::{distance, DistanceProxy, DynamicTree, SimplexCache},
    *,
};
use std::hint::black_box;

const DT: f32 = 1.0 / 60.0;

fn prepare_world(body_count: usize) -> PhysicsWorld {
    let mut world = PhysicsWorld::default();
    let ground = world.create_body(&BodyDef::static_body()).unwrap();
    world
        .add_shape(ground, ShapeDef::box_shape(100.0, 0.5))
        .unwrap();

    let columns = 32;
    for i in 0..body_count {
        let x = (i % columns) as f32 * 1.1 - columns as f32 * 0.55;
        let y = 1.0 + (i / columns) as f32 * 1.05;
        let body = world
            .create_body(&BodyDef::dynamic().with_position(Vec2::new(x, y)))
            .unwrap();
        let def = if i % 3 == 0 {
            ShapeDef::disk(0.5)
        } else {
            ShapeDef::box_shape(0.5, 0.5)
        };
        world.add_shape(body, def).unwrap();
    }
    // Let the pile settle into resting contacts before measuring.
    for _ in 0..30 {
        world.step(DT, 8, 3);
    }
    world
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    group.sample_size(20);
    for &count in &[128usize, 512, 2048] {
        for (label, parallel) in [("sequential", false), ("parallel", true)] {
            group.bench_with_input(BenchmarkId::new(label, count), &count, |b, &count| {
                let mut world = prepare_world(count);
                world.set_parallel_enabled(parallel);
                b.iter(|| black_box(world.step(black_box(DT), 8, 3)))
            });
        }
    }
    group.finish();
}

fn bench_distance(c: &mut Criterion) {
    let square = DistanceProxy::polygon(
        vec![
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ],
        0.01,
    );
    let disk = DistanceProxy::point(Vec2::ZERO, 0.5);
    let xf_a = Transform::new(Vec2::ZERO, 0.3);
    let xf_b = Transform::new(Vec2::new(1.7, 0.4), 0.0);

    c.bench_function("gjk_cold_cache", |b| {
        b.iter(|| {
            let mut cache = SimplexCache::default();
            black_box(distance(&square, &xf_a, &disk, &xf_b, &mut cache, 20))
        })
    });

    let mut warm = SimplexCache::default();
    distance(&square, &xf_a, &disk, &xf_b, &mut warm, 20);
    c.bench_function("gjk_warm_cache", |b| {
        b.iter(|| {
            let mut cache = warm;
            black_box(distance(&square, &xf_a, &disk, &xf_b, &mut cache, 20))
        })
    });
}

fn bench_tree_query(c: &mut Criterion) {
    let mut tree = DynamicTree::new(0.1);
    for i in 0..4096u32 {
        let x = (i % 64) as f32 * 1.5;
        let y = (i / 64) as f32 * 1.5;
        let aabb = Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0));
        tree.create_proxy(&aabb, i);
    }
    let window = Aabb::new(Vec2::new(20.0, 20.0), Vec2::new(30.0, 30.0));

    c.bench_function("tree_query_4096", |b| {
        b.iter(|| {
            let mut hits = 0u32;
            tree.query(black_box(&window), |_| {
                hits += 1;
                true
            });
            black_box(hits)
        })
    });
}

criterion_group!(benches, bench_world_step, bench_distance, bench_tree_query);
criterion_main!(benches);
