//! Shared fixtures for unit tests.

use std::path::Path;

use ndarray::Array2;

use crate::image::Image;
use crate::models::SampleFormat;
use crate::series::{ImageSeries, PathTemplate};

/// Create an ImageSeries with the given template relative to `dir`.
pub(crate) fn series(dir: &Path, name: &str, template: &str, ids: &[f64]) -> ImageSeries {
    let template = PathTemplate::parse(&dir.join(template).to_string_lossy()).unwrap();
    ImageSeries::new(name, template, ids.to_vec()).unwrap()
}

/// Write a 16 bit image for every identifier of `series`.
pub(crate) fn fill_series(series: &ImageSeries, f: impl Fn(f64) -> Array2<f32>) {
    for &id in series.identifiers() {
        Image::new(id, f(id), SampleFormat::Uint16)
            .save(series)
            .unwrap();
    }
}

/// A smooth, integer valued radiograph-like image in the range 800 to 3200.
pub(crate) fn radiograph(height: usize, width: usize) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(y, x)| {
        let (y, x) = (y as f32, x as f32);
        (2000.0 + 500.0 * (x / 9.0).sin() + 500.0 * (y / 7.0).cos() + 200.0 * ((x + y) / 5.0).sin())
            .round()
    })
}

/// Row profile with a few asymmetric peaks on a zero background.
pub(crate) fn profile(width: usize, x: f64) -> f64 {
    let w = width as f64;
    [(0.3, 3.0, 1.0), (0.45, 5.0, 0.6), (0.7, 4.0, 0.8)]
        .iter()
        .map(|&(centre, sigma, amplitude)| {
            let d = x - centre * w;
            amplitude * (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .sum()
}

/// Return a 0 degree projection and the matching 180 degree projection of a sample whose
/// rotation axis is tilted by `tilt` degrees and shifted by `offset` pixels from the centre.
pub(crate) fn mirror_pair(
    height: usize,
    width: usize,
    tilt: f64,
    offset: f64,
) -> (Array2<f32>, Array2<f32>) {
    let tan = tilt.to_radians().tan();
    let centre = |y: usize| {
        (width as f64 - 1.0) / 2.0 + offset + (y as f64 - (height as f64 - 1.0) / 2.0) * tan
    };
    let modulation = |y: usize| 1.0 + 0.3 * (y as f64 / 7.0).sin();
    let image0 = Array2::from_shape_fn((height, width), |(y, x)| {
        (modulation(y) * profile(width, x as f64)) as f32
    });
    let image180 = Array2::from_shape_fn((height, width), |(y, x)| {
        (modulation(y) * profile(width, 2.0 * centre(y) - x as f64)) as f32
    });
    (image0, image180)
}
