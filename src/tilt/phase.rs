//! Phase correlation of per-row edge signatures.

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use super::{max_shift, parabola_vertex, sampled_rows, tilt_from_shifts};
use crate::error::Imars3dError;
use crate::models::{TiltMethod, TiltOptions};

/// Absolute horizontal differences of a row, zero padded to `size`.
fn signature(row: ArrayView1<f32>, size: usize) -> Vec<Complex<f64>> {
    let mut buffer = vec![Complex::new(0.0, 0.0); size];
    for (x, pair) in row.windows(2).into_iter().enumerate() {
        buffer[x] = Complex::new((pair[1] - pair[0]).abs() as f64, 0.0);
    }
    buffer
}

/// Pick the local maximum closest to zero lag among those above `fraction` of the largest value.
///
/// `values[i]` is the correlation at lag `i - max_shift`.
fn pick_peak(values: &[f64], max_shift: usize, fraction: f64) -> Option<f64> {
    let highest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lowest = values.iter().copied().fold(f64::INFINITY, f64::min);
    if highest <= 0.0 || highest - lowest <= 1e-9 * highest {
        return None;
    }
    let threshold = lowest + fraction * (highest - lowest);
    let lag = |i: usize| i as f64 - max_shift as f64;
    (1..values.len() - 1)
        .filter(|&i| {
            values[i] >= threshold && values[i] >= values[i - 1] && values[i] >= values[i + 1]
        })
        .min_by(|&a, &b| lag(a).abs().total_cmp(&lag(b).abs()))
        .map(|i| lag(i) + parabola_vertex(values[i - 1], values[i], values[i + 1]))
}

pub(super) fn estimate(
    image0: ArrayView2<f32>,
    flipped: ArrayView2<f32>,
    options: &TiltOptions,
) -> Result<f64, Imars3dError> {
    let (height, width) = image0.dim();
    let max_shift = max_shift(options, width);
    let size = (2 * width).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let points: Vec<(f64, f64)> = sampled_rows(height, options.rows)
        .into_par_iter()
        .filter_map(|y| {
            let mut a = signature(image0.row(y), size);
            let mut b = signature(flipped.row(y), size);
            let energy = |v: &[Complex<f64>]| v.iter().map(|c| c.re * c.re).sum::<f64>();
            if energy(&a) <= f64::EPSILON || energy(&b) <= f64::EPSILON {
                return None;
            }
            forward.process(&mut a);
            forward.process(&mut b);
            let mut cross: Vec<Complex<f64>> =
                a.iter().zip(&b).map(|(a, b)| a * b.conj()).collect();
            let largest = cross.iter().map(|c| c.norm()).fold(0.0, f64::max);
            for c in cross.iter_mut() {
                let norm = c.norm();
                *c /= norm + 1e-3 * largest;
            }
            inverse.process(&mut cross);
            let values: Vec<f64> = (0..=2 * max_shift)
                .map(|i| {
                    let lag = i as isize - max_shift as isize;
                    cross[lag.rem_euclid(size as isize) as usize].re / size as f64
                })
                .collect();
            pick_peak(&values, max_shift, options.peak_fraction).map(|shift| (y as f64, shift))
        })
        .collect();
    tilt_from_shifts(&points, TiltMethod::PhaseCorrelation)
}
