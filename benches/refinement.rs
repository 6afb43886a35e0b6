//! Benchmarks a full refinement run on a square with interior detail.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mesh2d::prelude::*;

fn detailed_square() -> Cdt {
    let mut cdt = Cdt::new();
    let corners = [
        cdt.insert(Point2::new(0.0, 0.0)),
        cdt.insert(Point2::new(1.0, 0.0)),
        cdt.insert(Point2::new(1.0, 1.0)),
        cdt.insert(Point2::new(0.0, 1.0)),
    ];
    let sa = cdt.insert(Point2::new(0.2, 0.5));
    let sb = cdt.insert(Point2::new(0.8, 0.5));
    cdt.insert(Point2::new(0.05, 0.07));
    for k in 0..4 {
        cdt.insert_constraint(corners[k], corners[(k + 1) % 4]).unwrap();
    }
    cdt.insert_constraint(sa, sb).unwrap();
    cdt
}

fn bench_refine(c: &mut Criterion) {
    c.bench_function("refine_detailed_square_20deg", |b| {
        b.iter(|| {
            let mut mesher = Mesher::new(
                black_box(detailed_square()),
                MinAngleCriteria::from_degrees(20.0),
            );
            mesher.refine();
            black_box(mesher.into_triangulation().number_of_vertices())
        });
    });
}

criterion_group!(benches, bench_refine);
criterion_main!(benches);
