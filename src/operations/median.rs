//! Median helpers shared by the correction operators.

use std::cmp::Ordering;

use ndarray::{Array2, ArrayView2, Zip};
use num_traits::Float;

/// Orders numbers ascending with NaN last.
fn nan_last<T: Float>(a: &T, b: &T) -> Ordering {
    a.partial_cmp(b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Median of `values`, reordering them in place. NaN sorts last.
///
/// For an even number of values the mean of the two middle values is returned.
/// Returns NaN for an empty slice.
pub fn median_of<T: Float>(values: &mut [T]) -> T {
    let n = values.len();
    if n == 0 {
        return T::nan();
    }
    let (lower, middle, _) = values.select_nth_unstable_by(n / 2, nan_last);
    let middle = *middle;
    if n % 2 == 1 {
        middle
    } else {
        let below = lower.iter().copied().max_by(nan_last).unwrap_or(middle);
        (below + middle) / (T::one() + T::one())
    }
}

/// Bounds of the window of `half_width` around `index`, clamped to `0..len`.
fn window(index: usize, half_width: usize, len: usize) -> std::ops::Range<usize> {
    index.saturating_sub(half_width)..(index + half_width + 1).min(len)
}

/// Median of the square window of `half_width` around `(row, col)`, clamped to the image.
///
/// The window includes the centre pixel. `scratch` is reused between calls.
pub fn window_median(
    data: ArrayView2<f32>,
    row: usize,
    col: usize,
    half_width: usize,
    scratch: &mut Vec<f32>,
) -> f32 {
    let (height, width) = data.dim();
    scratch.clear();
    for r in window(row, half_width, height) {
        for c in window(col, half_width, width) {
            scratch.push(data[[r, c]]);
        }
    }
    median_of(scratch)
}

/// Like [window_median] but ignoring pixels where `exclude` is set.
///
/// Returns `None` if every pixel of the window is excluded.
pub fn window_median_excluding(
    data: ArrayView2<f32>,
    exclude: ArrayView2<bool>,
    row: usize,
    col: usize,
    half_width: usize,
    scratch: &mut Vec<f32>,
) -> Option<f32> {
    let (height, width) = data.dim();
    scratch.clear();
    for r in window(row, half_width, height) {
        for c in window(col, half_width, width) {
            if !exclude[[r, c]] {
                scratch.push(data[[r, c]]);
            }
        }
    }
    (!scratch.is_empty()).then(|| median_of(scratch))
}

/// Median filter with a square window clamped at the image edges.
pub fn median_filter(data: ArrayView2<f32>, half_width: usize) -> Array2<f32> {
    if half_width == 0 {
        return data.to_owned();
    }
    let mut scratch = Vec::with_capacity((2 * half_width + 1).pow(2));
    let mut output = Array2::zeros(data.dim());
    Zip::indexed(&mut output).for_each(|(row, col), value| {
        *value = window_median(data, row, col, half_width, &mut scratch);
    });
    output
}

/// Per-pixel median of a set of equally shaped images.
///
/// Returns `None` if `images` is empty or the shapes differ.
pub fn median_image(images: &[Array2<f32>]) -> Option<Array2<f32>> {
    let first = images.first()?;
    if images.iter().any(|image| image.dim() != first.dim()) {
        return None;
    }
    let mut scratch = Vec::with_capacity(images.len());
    Some(Array2::from_shape_fn(first.dim(), |index| {
        scratch.clear();
        scratch.extend(images.iter().map(|image| image[index]));
        median_of(&mut scratch)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    #[test]
    fn median_odd_even() {
        assert_eq!(2.0, median_of(&mut [3.0, 1.0, 2.0]));
        assert_eq!(2.5, median_of(&mut [4.0, 1.0, 3.0, 2.0]));
        assert!(median_of::<f32>(&mut []).is_nan());
        assert_eq!(2.0_f64, median_of(&mut [f64::NAN, 1.0, 2.0]));
    }

    #[test]
    fn window_is_clamped() {
        let data = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let mut scratch = vec![];
        // Corner window holds 1, 2, 4, 5.
        assert_eq!(3.0, window_median(data.view(), 0, 0, 1, &mut scratch));
        assert_eq!(5.0, window_median(data.view(), 1, 1, 1, &mut scratch));
    }

    #[test]
    fn excluding() {
        let data = array![[0.0, 2.0], [4.0, 0.0]];
        let exclude = data.mapv(|v| v == 0.0);
        let mut scratch = vec![];
        assert_eq!(
            Some(3.0),
            window_median_excluding(data.view(), exclude.view(), 0, 0, 1, &mut scratch)
        );
        let all = Array2::from_elem((2, 2), true);
        assert_eq!(
            None,
            window_median_excluding(data.view(), all.view(), 0, 0, 1, &mut scratch)
        );
    }

    #[test]
    fn filter_removes_spike() {
        let mut data = Array2::from_elem((5, 5), 1.0_f32);
        data[[2, 2]] = 100.0;
        let filtered = median_filter(data.view(), 1);
        assert_eq!(Array2::from_elem((5, 5), 1.0_f32), filtered);
        assert_eq!(data, median_filter(data.view(), 0));
    }

    #[test]
    fn per_pixel_median() {
        let images = vec![array![[1.0, 5.0]], array![[2.0, 6.0]], array![[9.0, 4.0]]];
        assert_eq!(Some(array![[2.0, 5.0]]), median_image(&images));
        assert_eq!(None, median_image(&[]));
        assert_eq!(None, median_image(&[array![[1.0]], array![[1.0, 2.0]]]));
    }
}
