/// Benchmarks for tilt estimation and correction.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use imars3d::models::{TiltMethod, TiltOptions};
use imars3d::tilt;
use ndarray::Array2;

fn profile(width: usize, x: f64) -> f64 {
    let w = width as f64;
    [(0.3, 3.0, 1.0), (0.45, 5.0, 0.6), (0.7, 4.0, 0.8)]
        .iter()
        .map(|&(centre, sigma, amplitude)| {
            let d = x - centre * w;
            amplitude * (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .sum()
}

/// 0 and 180 degree projections of an axis tilted by `tilt` degrees.
fn mirror_pair(height: usize, width: usize, tilt: f64) -> (Array2<f32>, Array2<f32>) {
    let tan = tilt.to_radians().tan();
    let centre = |y: usize| (width as f64 - 1.0) / 2.0 + (y as f64 - height as f64 / 2.0) * tan;
    let image0 = Array2::from_shape_fn((height, width), |(_, x)| profile(width, x as f64) as f32);
    let image180 = Array2::from_shape_fn((height, width), |(y, x)| {
        profile(width, 2.0 * centre(y) - x as f64) as f32
    });
    (image0, image180)
}

fn criterion_benchmark(c: &mut Criterion) {
    for size in [256, 512] {
        let (image0, image180) = mirror_pair(size, size, 1.5);
        for method in [
            TiltMethod::DirectMinimization,
            TiltMethod::PhaseCorrelation,
            TiltMethod::UseCenters,
        ] {
            let options = TiltOptions {
                method,
                ..Default::default()
            };
            let name = format!("estimate({}, {}x{})", method, size, size);
            c.bench_function(&name, |b| {
                b.iter(|| {
                    tilt::estimate(black_box(image0.view()), image180.view(), &options).unwrap();
                })
            });
        }
        let name = format!("apply_tilt({}x{})", size, size);
        c.bench_function(&name, |b| {
            b.iter(|| tilt::apply_tilt(black_box(image0.view()), 1.5))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
