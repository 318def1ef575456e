//! Per-row rotation centres from spatial cross-correlation.

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

use super::{max_shift, parabola_vertex, sampled_rows, tilt_from_shifts};
use crate::error::Imars3dError;
use crate::models::{TiltMethod, TiltOptions};

/// Smallest correlation coefficient accepted as a match.
const MIN_CORRELATION: f64 = 0.5;

/// Pearson correlation of `a[x + lag]` with `b[x]` over the overlapping columns.
fn correlation(a: ArrayView1<f32>, b: ArrayView1<f32>, lag: isize) -> Option<f64> {
    let width = a.len() as isize;
    let start = 0.max(-lag);
    let end = width.min(width - lag);
    if end - start < 2 {
        return None;
    }
    let n = (end - start) as f64;
    let pairs = || (start..end).map(|x| (a[(x + lag) as usize] as f64, b[x as usize] as f64));
    let (mean_a, mean_b) = pairs().fold((0.0, 0.0), |(sa, sb), (va, vb)| (sa + va, sb + vb));
    let (mean_a, mean_b) = (mean_a / n, mean_b / n);
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (va, vb) in pairs() {
        let (da, db) = (va - mean_a, vb - mean_b);
        sab += da * db;
        saa += da * da;
        sbb += db * db;
    }
    if saa <= f64::EPSILON || sbb <= f64::EPSILON {
        return None;
    }
    Some(sab / (saa * sbb).sqrt())
}

/// Sub-pixel shift that best aligns `a` with `b`, if the match is convincing.
fn row_shift(a: ArrayView1<f32>, b: ArrayView1<f32>, max_shift: usize) -> Option<f64> {
    let max_shift = max_shift as isize;
    let scores: Vec<(isize, f64)> = (-max_shift..=max_shift)
        .filter_map(|lag| correlation(a, b, lag).map(|score| (lag, score)))
        .collect();
    let (index, &(lag, score)) = scores
        .iter()
        .enumerate()
        .max_by(|x, y| x.1 .1.total_cmp(&y.1 .1))?;
    if score < MIN_CORRELATION {
        return None;
    }
    let offset = match (index.checked_sub(1).map(|i| scores[i]), scores.get(index + 1)) {
        (Some((l, left)), Some(&(r, right))) if l == lag - 1 && r == lag + 1 => {
            parabola_vertex(left, score, right)
        }
        _ => 0.0,
    };
    Some(lag as f64 + offset)
}

/// Convert a shift between the 0 degree row and the flipped 180 degree row to an axis column.
fn centre_of_rotation(shift: f64, width: usize) -> f64 {
    (shift + width as f64 - 1.0) / 2.0
}

pub(super) fn estimate(
    image0: ArrayView2<f32>,
    flipped: ArrayView2<f32>,
    options: &TiltOptions,
) -> Result<f64, Imars3dError> {
    let (height, width) = image0.dim();
    let max_shift = max_shift(options, width);
    // Centres move by tan(tilt) per row, shifts by twice that.
    let centres: Vec<(f64, f64)> = sampled_rows(height, options.rows)
        .into_par_iter()
        .filter_map(|y| {
            row_shift(image0.row(y), flipped.row(y), max_shift)
                .map(|shift| (y as f64, centre_of_rotation(shift, width)))
        })
        .collect();
    let points: Vec<(f64, f64)> = centres
        .iter()
        .map(|&(y, centre)| (y, 2.0 * centre - (width as f64 - 1.0)))
        .collect();
    tilt_from_shifts(&points, TiltMethod::UseCenters)
}
