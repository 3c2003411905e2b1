use criterion::{Criterion, criterion_group, criterion_main};
use faer::rand::{Rng, SeedableRng, rngs::SmallRng};
use std::{hint::black_box, sync::Arc};
use warp_edit::{
    ControllerConfig, Point, Space, TransformController, TransformModel,
    models::MeshModel,
    share,
    spatial::{KdTree, SpatialMap, Tween},
};

fn coords(npoints: usize) -> Vec<Point> {
    let mut rng = SmallRng::seed_from_u64(1991);
    let mut pts = Vec::with_capacity(npoints);
    for _ in 0..npoints {
        pts.push([rng.random::<f64>() * 100.0, rng.random::<f64>() * 100.0]);
    }
    pts
}

fn jittered(pts: &[Point]) -> Vec<Point> {
    let mut rng = SmallRng::seed_from_u64(2024);
    pts.iter()
        .map(|p| [p[0] + rng.random::<f64>(), p[1] + rng.random::<f64>()])
        .collect()
}

fn mesh(npoints: usize) -> MeshModel {
    let src = coords(npoints);
    let tgt = jittered(&src);
    MeshModel::try_from_pairs(&src, &tgt).unwrap()
}

fn kdtree_build(c: &mut Criterion) {
    let pts = coords(1000);
    c.bench_function("kdtree_build", |b| b.iter(|| black_box(KdTree::build(&pts))));
}

fn kdtree_within(c: &mut Criterion) {
    let pts = coords(1000);
    let tree = KdTree::build(&pts);
    let queries = coords(100);
    c.bench_function("kdtree_within", |b| {
        b.iter(|| {
            for q in queries.iter() {
                black_box(tree.within(*q, 5.0));
            }
        })
    });
}

fn spatial_map_query(c: &mut Criterion) {
    let model = share(mesh(500));
    let controller =
        Arc::new(TransformController::new(model, ControllerConfig::default()).unwrap());
    let map = SpatialMap::new(controller, Tween::blend(0.5).unwrap());
    let queries = coords(100);
    c.bench_function("spatial_map_query", |b| {
        b.iter(|| black_box(map.find_nearest_within(&queries, 5.0)))
    });
}

fn spatial_map_after_edit(c: &mut Criterion) {
    let model = share(mesh(500));
    let controller =
        Arc::new(TransformController::new(model, ControllerConfig::default()).unwrap());
    let map = SpatialMap::new(controller.clone(), Tween::Source);
    let mut sign = 1.0;
    c.bench_function("spatial_map_after_edit", |b| {
        b.iter(|| {
            sign = -sign;
            controller
                .move_points(0usize, [sign, 0.0], Space::Source)
                .unwrap();
            black_box(map.find_nearest_within(&[[50.0, 50.0]], 5.0))
        })
    });
}

fn mesh_transform(c: &mut Criterion) {
    let model = mesh(200);
    let pts = coords(1000);
    // build the triangulation outside the timed loop
    model.transform(&pts[..1]);
    c.bench_function("mesh_transform", |b| {
        b.iter(|| black_box(model.transform(&pts)))
    });
}

criterion_group!(
    benches,
    kdtree_build,
    kdtree_within,
    spatial_map_query,
    spatial_map_after_edit,
    mesh_transform,
);
criterion_main!(benches);
