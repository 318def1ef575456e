//! Cropping and crop boundary detection.

use ndarray::{s, Array2, ArrayView2};
use ndarray_stats::QuantileExt;
use rayon::prelude::*;
use tracing::info;
use validator::Validate;

use crate::dispatch::Dispatcher;
use crate::error::Imars3dError;
use crate::image::Image;
use crate::models::{BoundaryOptions, CropWindow};
use crate::operation::Correction;
use crate::series::ImageSeries;

/// Crop `data` to the inclusive `window`.
pub fn crop(data: ArrayView2<f32>, window: &CropWindow) -> Result<Array2<f32>, Imars3dError> {
    window.validate()?;
    let (height, width) = data.dim();
    if window.right >= width || window.bottom >= height {
        return Err(Imars3dError::OutOfBounds {
            what: "crop window",
            region: [window.left, window.right, window.top, window.bottom],
            height,
            width,
        });
    }
    Ok(data
        .slice(s![window.top..=window.bottom, window.left..=window.right])
        .to_owned())
}

/// Crops every image to a fixed window.
#[derive(Clone, Debug)]
pub struct Crop {
    window: CropWindow,
}

impl Crop {
    /// Return a new Crop.
    pub fn new(window: CropWindow) -> Result<Self, Imars3dError> {
        window.validate()?;
        Ok(Crop { window })
    }
}

impl Correction for Crop {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn preserves_shape(&self) -> bool {
        false
    }

    fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
        Ok(image.with_data(crop(image.data.view(), &self.window)?))
    }
}

/// Bounding box of the signal in a single image.
///
/// A pixel is signal if it exceeds `signal_fraction` times the image maximum. The window spans
/// from the first to the last signal column over all rows, and from the first to the last row
/// holding any signal. Returns `None` if the image holds no signal or has no defined maximum
/// because of NaN.
pub fn signal_window(data: ArrayView2<f32>, options: &BoundaryOptions) -> Option<CropWindow> {
    let max = match data.max() {
        Ok(&max) if max > 0.0 => max,
        _ => return None,
    };
    let threshold = options.signal_fraction * max;
    let mut window: Option<CropWindow> = None;
    for (row, values) in data.outer_iter().enumerate() {
        let first = values.iter().position(|&v| v > threshold);
        let last = values.iter().rposition(|&v| v > threshold);
        if let (Some(first), Some(last)) = (first, last) {
            window = Some(match window {
                None => CropWindow::new(first, last, row, row),
                Some(w) => CropWindow::new(w.left.min(first), w.right.max(last), w.top, row),
            });
        }
    }
    window
}

/// Detect a crop window that keeps the signal of every image of `series`.
///
/// The result is the intersection of the per-image windows. Fails as inconclusive if any
/// image holds no signal or the windows do not overlap.
pub fn detect_crop_window(
    series: &ImageSeries,
    options: &BoundaryOptions,
    dispatcher: &Dispatcher,
) -> Result<CropWindow, Imars3dError> {
    options.validate()?;
    if series.is_empty() {
        return Err(Imars3dError::EmptyInput {
            operation: "crop boundary detection",
        });
    }
    let windows: Vec<(f64, Option<CropWindow>)> = dispatcher.install(|| {
        series
            .identifiers()
            .par_iter()
            .map(|&id| -> Result<_, Imars3dError> {
                let image = series.get_data(id)?;
                Ok((id, signal_window(image.data.view(), options)))
            })
            .collect::<Result<_, Imars3dError>>()
    })?;
    let mut result: Option<CropWindow> = None;
    for (id, window) in windows {
        let window = window.ok_or_else(|| Imars3dError::Inconclusive {
            reason: format!("{} {} holds no signal", series.name(), id),
        })?;
        result = match result {
            None => Some(window),
            Some(current) => Some(current.intersect(&window).ok_or_else(|| {
                Imars3dError::Inconclusive {
                    reason: format!("signal regions of {} do not overlap", series.name()),
                }
            })?),
        };
    }
    let window = result.ok_or(Imars3dError::EmptyInput {
        operation: "crop boundary detection",
    })?;
    info!(series = series.name(), ?window, "detected crop window");
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleFormat;
    use crate::test_utils;

    use ndarray::array;

    #[test]
    fn crop_inclusive() {
        let data = Array2::from_shape_fn((4, 5), |(r, c)| (r * 10 + c) as f32);
        let cropped = crop(data.view(), &CropWindow::new(1, 3, 2, 3)).unwrap();
        assert_eq!(array![[21.0, 22.0, 23.0], [31.0, 32.0, 33.0]], cropped);
    }

    #[test]
    fn crop_out_of_bounds() {
        let data = Array2::<f32>::zeros((4, 5));
        let err = crop(data.view(), &CropWindow::new(1, 5, 0, 3)).unwrap_err();
        assert_eq!(
            "crop window [1, 5, 0, 3] is outside the 4x5 image",
            err.to_string()
        );
    }

    #[test]
    fn crop_inverted_window() {
        let data = Array2::<f32>::zeros((4, 5));
        assert!(matches!(
            crop(data.view(), &CropWindow::new(3, 1, 0, 3)),
            Err(Imars3dError::Validation(_))
        ));
    }

    #[test]
    fn crop_changes_shape() {
        let image = Image::new(0.0, Array2::zeros((4, 5)), SampleFormat::Uint16);
        let crop = Crop::new(CropWindow::new(0, 1, 0, 0)).unwrap();
        assert!(!crop.preserves_shape());
        assert_eq!((1, 2), crop.filter_one(&image).unwrap().shape());
    }

    fn signal(
        height: usize,
        width: usize,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> Array2<f32> {
        let mut data = Array2::from_elem((height, width), 10.0_f32);
        data.slice_mut(s![rows, cols]).fill(1000.0);
        data
    }

    #[test]
    fn window_of_single_image() {
        let data = signal(64, 64, 0..64, 5..64);
        assert_eq!(
            Some(CropWindow::new(5, 63, 0, 63)),
            signal_window(data.view(), &BoundaryOptions::default())
        );
        let flat = Array2::<f32>::zeros((8, 8));
        assert_eq!(None, signal_window(flat.view(), &BoundaryOptions::default()));
    }

    #[test]
    fn detect_intersection() {
        let dir = tempfile::tempdir().unwrap();
        let series = test_utils::series(dir.path(), "ct", "ct_{}.tiff", &[0.0, 1.0]);
        test_utils::fill_series(&series, |id| {
            if id == 0.0 {
                signal(32, 32, 2..30, 4..20)
            } else {
                signal(32, 32, 5..32, 8..25)
            }
        });
        let dispatcher = Dispatcher::new(2).unwrap();
        let window = detect_crop_window(&series, &BoundaryOptions::default(), &dispatcher).unwrap();
        assert_eq!(CropWindow::new(8, 19, 5, 29), window);
    }

    #[test]
    fn detect_disjoint_is_inconclusive() {
        let dir = tempfile::tempdir().unwrap();
        let series = test_utils::series(dir.path(), "ct", "ct_{}.tiff", &[0.0, 1.0]);
        test_utils::fill_series(&series, |id| {
            if id == 0.0 {
                signal(16, 16, 0..16, 0..4)
            } else {
                signal(16, 16, 0..16, 10..16)
            }
        });
        let dispatcher = Dispatcher::new(1).unwrap();
        assert!(matches!(
            detect_crop_window(&series, &BoundaryOptions::default(), &dispatcher),
            Err(Imars3dError::Inconclusive { .. })
        ));
    }
}
