//! Rotation axis tilt estimation and correction.
//!
//! The 180 degree projection of a parallel beam scan is the mirror image of the 0 degree
//! projection about the rotation axis. After flipping it horizontally, row `y` of the flipped
//! image equals row `y` of the 0 degree image shifted by `s(y) = 2 x_c(y) - (W - 1)`, where
//! `x_c(y)` is the axis column in that row. A tilted axis makes `s` linear in `y` with slope
//! `2 tan(tilt)`.
//!
//! A positive tilt means that the axis column increases with the row index.

mod centers;
mod direct;
mod phase;
mod rotate;

use ndarray::{s, ArrayView1, ArrayView2};
use tracing::{info, warn};
use validator::Validate;

use crate::dispatch::Dispatcher;
use crate::error::Imars3dError;
use crate::image::Image;
use crate::models::{TiltMethod, TiltOptions};
use crate::operation::Correction;
use crate::operations::median::median_of;
use crate::series::ImageSeries;

pub use rotate::apply_tilt;

/// Largest distance in degrees between a requested and an available projection angle.
pub const ANGLE_TOLERANCE: f64 = 1.0;

/// Estimate the tilt in degrees from a 0 degree and a 180 degree projection.
pub fn estimate(
    image0: ArrayView2<f32>,
    image180: ArrayView2<f32>,
    options: &TiltOptions,
) -> Result<f64, Imars3dError> {
    options.validate()?;
    if image0.dim() != image180.dim() {
        return Err(Imars3dError::ShapeMismatch {
            expected: image0.shape().to_vec(),
            found: image180.shape().to_vec(),
        });
    }
    let (height, width) = image0.dim();
    if height < 2 || width < 4 {
        return Err(Imars3dError::InvalidInput {
            operation: "tilt estimation",
            reason: format!("a {height}x{width} image is too small"),
        });
    }
    let flipped = image180.slice(s![.., ..;-1]);
    let tilt = match options.method {
        TiltMethod::DirectMinimization => direct::estimate(image0, flipped, options),
        TiltMethod::PhaseCorrelation => phase::estimate(image0, flipped, options),
        TiltMethod::UseCenters => centers::estimate(image0, flipped, options),
    }?;
    info!(method = %options.method, tilt, "estimated tilt");
    Ok(tilt)
}

/// Estimate the tilt of a projection series from its projections nearest 0 and 180 degrees.
///
/// The estimate runs on the worker pool of `dispatcher`. If it is inconclusive and a fallback
/// is configured, the fallback is returned.
pub fn estimate_series(
    series: &ImageSeries,
    options: &TiltOptions,
    dispatcher: &Dispatcher,
) -> Result<f64, Imars3dError> {
    let projection = |angle: f64| {
        series
            .nearest(angle)
            .filter(|id| (id - angle).abs() <= ANGLE_TOLERANCE)
            .ok_or_else(|| Imars3dError::InvalidInput {
                operation: "tilt estimation",
                reason: format!("{} has no projection at {angle} degrees", series.name()),
            })
    };
    let (id0, id180) = (projection(0.0)?, projection(180.0)?);
    let image0 = series.get_data(id0)?;
    let image180 = series.get_data(id180)?;
    match dispatcher.install(|| estimate(image0.data.view(), image180.data.view(), options)) {
        Err(Imars3dError::Inconclusive { reason }) if options.fallback.is_some() => {
            let fallback = options.fallback.unwrap_or_default();
            warn!(%reason, fallback, "tilt estimate inconclusive, using fallback");
            Ok(fallback)
        }
        result => result,
    }
}

/// Rotates every image to make the rotation axis vertical.
#[derive(Clone, Debug)]
pub struct TiltCorrection {
    tilt: f64,
}

impl TiltCorrection {
    /// Return a new TiltCorrection for a tilt in degrees.
    pub fn new(tilt: f64) -> Self {
        TiltCorrection { tilt }
    }
}

impl Correction for TiltCorrection {
    fn name(&self) -> &'static str {
        "tilt correction"
    }

    fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
        Ok(image.with_data(apply_tilt(image.data.view(), self.tilt)))
    }
}

/// Largest shift searched, defaulting to a quarter of the width.
fn max_shift(options: &TiltOptions, width: usize) -> usize {
    options.max_shift.unwrap_or(width / 4).clamp(1, width - 1)
}

/// Evenly spaced row indices, at most `count` of them.
fn sampled_rows(height: usize, count: usize) -> Vec<usize> {
    if count >= height {
        return (0..height).collect();
    }
    (0..count).map(|i| i * (height - 1) / (count - 1)).collect()
}

/// Linear interpolation of `row` at `x`, or `None` outside the row.
fn sample(row: ArrayView1<f32>, x: f64) -> Option<f64> {
    let last = row.len() - 1;
    if !(0.0..=last as f64).contains(&x) {
        return None;
    }
    let i = (x.floor() as usize).min(last.saturating_sub(1));
    let t = x - i as f64;
    let right = if last == 0 { row[i] } else { row[i + 1] };
    Some((1.0 - t) * row[i] as f64 + t * right as f64)
}

/// Sub-sample offset of the vertex of the parabola through three equally spaced samples.
fn parabola_vertex(left: f64, centre: f64, right: f64) -> f64 {
    let denominator = left - 2.0 * centre + right;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
}

/// Least squares line through `points`, returned as `(intercept, slope)`.
fn fit_line(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    if points.len() < 2 {
        return None;
    }
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some((mean_y - slope * mean_x, slope))
}

/// Theil-Sen line estimate, refined by least squares on the points close to it.
fn robust_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut slopes = vec![];
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            if (b.0 - a.0).abs() > f64::EPSILON {
                slopes.push((b.1 - a.1) / (b.0 - a.0));
            }
        }
    }
    if slopes.is_empty() {
        return None;
    }
    let slope = median_of(&mut slopes);
    let mut intercepts: Vec<f64> = points.iter().map(|p| p.1 - slope * p.0).collect();
    let intercept = median_of(&mut intercepts);
    let residual = |p: &(f64, f64)| (p.1 - intercept - slope * p.0).abs();
    let mut residuals: Vec<f64> = points.iter().map(residual).collect();
    let limit = (3.0 * 1.4826 * median_of(&mut residuals)).max(0.5);
    let inliers: Vec<(f64, f64)> = points
        .iter()
        .copied()
        .filter(|p| residual(p) <= limit)
        .collect();
    fit_line(&inliers).or(Some((intercept, slope)))
}

/// Tilt in degrees for a shift that changes by `slope` pixels per row.
fn tilt_from_slope(slope: f64) -> f64 {
    (slope / 2.0).atan().to_degrees()
}

/// Tilt from per-row shift estimates, failing as inconclusive if too few rows were usable.
fn tilt_from_shifts(points: &[(f64, f64)], method: TiltMethod) -> Result<f64, Imars3dError> {
    let (_, slope) = robust_fit(points).ok_or_else(|| Imars3dError::Inconclusive {
        reason: format!(
            "{method}: only {} rows produced a distinguishable correlation peak",
            points.len()
        ),
    })?;
    Ok(tilt_from_slope(slope))
}
