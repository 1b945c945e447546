use criterion::{criterion_group, criterion_main, Criterion};
use glam::Vec3;
use simcore::{
    propagate, EntityId, HierarchyBuilder, LocalTransform, Transform, TransformPropagation, World,
};
use std::hint::black_box;

fn spawn(world: &mut World) -> EntityId {
    let e = world.create().unwrap();
    world.add(e, Transform::new(LocalTransform::identity())).unwrap();
    e
}

fn wide_tree(children: usize) -> (World, EntityId) {
    let mut world = World::new();
    let root = spawn(&mut world);
    for _ in 0..children {
        let child = spawn(&mut world);
        HierarchyBuilder::attach(&mut world, root, child).unwrap();
    }
    propagate::<TransformPropagation>(&mut world);
    (world, root)
}

fn deep_tree(depth: usize) -> (World, EntityId) {
    let mut world = World::new();
    let root = spawn(&mut world);
    let mut parent = root;
    for _ in 0..depth {
        let child = spawn(&mut world);
        HierarchyBuilder::attach(&mut world, parent, child).unwrap();
        parent = child;
    }
    propagate::<TransformPropagation>(&mut world);
    (world, root)
}

fn bench_hierarchy_creation(c: &mut Criterion) {
    c.bench_function("hierarchy_1_root_100_children", |b| {
        b.iter(|| black_box(wide_tree(100)))
    });
}

fn bench_propagate_clean(c: &mut Criterion) {
    let (mut world, _) = wide_tree(1000);
    c.bench_function("propagate_clean_1000", |b| {
        b.iter(|| black_box(propagate::<TransformPropagation>(&mut world)))
    });
}

fn bench_propagate_root_moved(c: &mut Criterion) {
    let (mut world, root) = wide_tree(1000);
    let mut x = 0.0f32;
    c.bench_function("propagate_root_moved_1000", |b| {
        b.iter(|| {
            x += 1.0;
            if let Some(t) = world.get_mut::<Transform>(root) {
                t.set_local(LocalTransform::with_position(Vec3::new(x, 0.0, 0.0)));
            }
            black_box(propagate::<TransformPropagation>(&mut world))
        })
    });
}

fn bench_propagate_deep(c: &mut Criterion) {
    let (mut world, root) = deep_tree(200);
    c.bench_function("propagate_deep_200_levels", |b| {
        b.iter(|| {
            if let Some(t) = world.get_mut::<Transform>(root) {
                t.mark_changed();
            }
            black_box(propagate::<TransformPropagation>(&mut world))
        })
    });
}

criterion_group!(
    benches,
    bench_hierarchy_creation,
    bench_propagate_clean,
    bench_propagate_root_moved,
    bench_propagate_deep
);
criterion_main!(benches);
