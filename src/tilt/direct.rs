//! Direct minimization over candidate shears.

use ndarray::ArrayView2;
use rayon::prelude::*;

use super::{max_shift, sample, sampled_rows, tilt_from_slope};
use crate::error::Imars3dError;
use crate::models::TiltOptions;

/// Mean squared difference between the 0 degree image shifted by `s(y) = shift + slope (y - yc)`
/// and the flipped 180 degree image, over the sampled rows.
///
/// Returns `None` if the shifted rows barely overlap.
fn cost(
    image0: ArrayView2<f32>,
    flipped: ArrayView2<f32>,
    rows: &[usize],
    shift: f64,
    slope: f64,
) -> Option<f64> {
    let (height, width) = image0.dim();
    let centre = (height as f64 - 1.0) / 2.0;
    let mut sum = 0.0;
    let mut count = 0_usize;
    for &y in rows {
        let s = shift + slope * (y as f64 - centre);
        let row0 = image0.row(y);
        let row180 = flipped.row(y);
        for x in 0..width {
            if let Some(value) = sample(row0, x as f64 + s) {
                let difference = value - row180[x] as f64;
                sum += difference * difference;
                count += 1;
            }
        }
    }
    (count >= rows.len() * width / 4).then(|| sum / count as f64)
}

/// Find the candidate with the lowest cost.
fn best<I>(candidates: I) -> Option<((f64, f64), f64)>
where
    I: ParallelIterator<Item = ((f64, f64), Option<f64>)>,
{
    candidates
        .filter_map(|(candidate, cost)| cost.map(|cost| (candidate, cost)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

pub(super) fn estimate(
    image0: ArrayView2<f32>,
    flipped: ArrayView2<f32>,
    options: &TiltOptions,
) -> Result<f64, Imars3dError> {
    let (height, width) = image0.dim();
    let rows = sampled_rows(height, options.rows);
    let max_shift = max_shift(options, width) as i64;

    // Coarse integer shift without shear.
    let coarse: Vec<((f64, f64), Option<f64>)> = (-max_shift..=max_shift)
        .into_par_iter()
        .map(|shift| {
            let shift = shift as f64;
            ((shift, 0.0), cost(image0, flipped, &rows, shift, 0.0))
        })
        .collect();
    let costs: Vec<f64> = coarse.iter().filter_map(|c| c.1).collect();
    let lowest = costs.iter().copied().fold(f64::INFINITY, f64::min);
    let highest = costs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if costs.is_empty() || highest - lowest <= 1e-12 * highest.abs().max(1.0) {
        return Err(Imars3dError::Inconclusive {
            reason: "direct minimization: the cost does not depend on the shift".to_string(),
        });
    }
    let ((coarse_shift, _), _) = best(coarse.into_par_iter()).ok_or_else(|| {
        Imars3dError::Inconclusive {
            reason: "direct minimization: no candidate overlaps".to_string(),
        }
    })?;

    // Fine shift and shear. A shear of `step` pixels over the image height is one slope step.
    let step = options.shear_step;
    let slope_step = step / (height as f64 - 1.0);
    let max_slope = 2.0 * options.max_tilt.to_radians().tan();
    let slopes = (max_slope / slope_step).ceil() as i64;
    let shifts = (2.0 / step).ceil() as i64;
    let candidates: Vec<(i64, i64)> = (-slopes..=slopes)
        .flat_map(|k| (-shifts..=shifts).map(move |j| (k, j)))
        .collect();
    let ((_, slope), _) = best(candidates.into_par_iter().map(|(k, j)| {
        let shift = coarse_shift + j as f64 * step;
        let slope = k as f64 * slope_step;
        ((shift, slope), cost(image0, flipped, &rows, shift, slope))
    }))
    .ok_or_else(|| Imars3dError::Inconclusive {
        reason: "direct minimization: no candidate overlaps".to_string(),
    })?;

    if slopes > 0 && (slope.abs() / slope_step).round() as i64 >= slopes {
        return Err(Imars3dError::Inconclusive {
            reason: format!(
                "direct minimization: minimum at the edge of the {} degree search range",
                options.max_tilt
            ),
        });
    }
    Ok(tilt_from_slope(slope))
}
