//! Dark field and open beam normalization.

use ndarray::{Array2, Zip};
use tracing::debug;
use validator::Validate;

use super::median::median_image;
use crate::error::Imars3dError;
use crate::image::Image;
use crate::models::{NormalizeOptions, SampleFormat};
use crate::operation::Correction;
use crate::series::ImageSeries;

/// Computes `(image - dark) / (open_beam - dark)`, optionally followed by `-ln`.
///
/// The dark field and open beam references are per-pixel medians of their calibration series.
/// Denominators and logarithm arguments are floored at `epsilon`. Output images are
/// [SampleFormat::Float32].
#[derive(Clone, Debug)]
pub struct Normalize {
    dark: Array2<f32>,
    open_beam: Array2<f32>,
    options: NormalizeOptions,
}

/// Load every frame of a calibration series and reduce them to a per-pixel median.
fn reference(series: &ImageSeries) -> Result<Array2<f32>, Imars3dError> {
    if series.is_empty() {
        return Err(Imars3dError::EmptyInput {
            operation: "normalization",
        });
    }
    let frames = series
        .identifiers()
        .iter()
        .map(|&identifier| match series.get_data(identifier) {
            Ok(image) => Ok(image.data),
            Err(Imars3dError::NotFound { .. }) => Err(Imars3dError::MissingCalibration {
                name: series.name().to_string(),
                identifier,
            }),
            Err(err) => Err(err),
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(series = series.name(), frames = frames.len(), "loaded calibration frames");
    median_image(&frames).ok_or_else(|| Imars3dError::ShapeMismatch {
        expected: frames[0].shape().to_vec(),
        found: frames
            .iter()
            .map(|frame| frame.shape())
            .find(|&shape| shape != frames[0].shape())
            .unwrap_or_default()
            .to_vec(),
    })
}

impl Normalize {
    /// Return a new Normalize from reference images.
    pub fn new(
        dark: Array2<f32>,
        open_beam: Array2<f32>,
        options: NormalizeOptions,
    ) -> Result<Self, Imars3dError> {
        options.validate()?;
        if dark.dim() != open_beam.dim() {
            return Err(Imars3dError::ShapeMismatch {
                expected: open_beam.shape().to_vec(),
                found: dark.shape().to_vec(),
            });
        }
        Ok(Normalize {
            dark,
            open_beam,
            options,
        })
    }

    /// Return a new Normalize from dark field and open beam series.
    ///
    /// Every calibration frame must exist.
    pub fn from_series(
        dark: &ImageSeries,
        open_beam: &ImageSeries,
        options: NormalizeOptions,
    ) -> Result<Self, Imars3dError> {
        Self::new(reference(dark)?, reference(open_beam)?, options)
    }
}

impl Correction for Normalize {
    fn name(&self) -> &'static str {
        "normalization"
    }

    fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
        if image.shape() != self.dark.dim() {
            return Err(Imars3dError::ShapeMismatch {
                expected: self.dark.shape().to_vec(),
                found: image.data.shape().to_vec(),
            });
        }
        let epsilon = self.options.epsilon;
        let minus_log = self.options.minus_log;
        let mut output = Array2::zeros(image.shape());
        Zip::from(&mut output)
            .and(&image.data)
            .and(&self.dark)
            .and(&self.open_beam)
            .for_each(|out, &value, &dark, &open_beam| {
                let ratio = (value - dark) / (open_beam - dark).max(epsilon);
                *out = if minus_log {
                    -ratio.max(epsilon).ln()
                } else {
                    ratio
                };
            });
        let mut output = image.with_data(output);
        output.format = SampleFormat::Float32;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    use ndarray::array;

    #[test]
    fn transmission() {
        let normalize = Normalize::new(
            array![[10.0, 10.0]],
            array![[110.0, 10.0]],
            NormalizeOptions::default(),
        )
        .unwrap();
        let image = Image::new(0.0, array![[60.0, 20.0]], SampleFormat::Uint16);
        let output = normalize.filter_one(&image).unwrap();
        assert_eq!(0.5, output.data[[0, 0]]);
        // Zero denominator is floored at epsilon.
        assert_eq!(10.0 / 1e-6, output.data[[0, 1]]);
        assert_eq!(SampleFormat::Float32, output.format);
    }

    #[test]
    fn minus_log() {
        let options = NormalizeOptions {
            minus_log: true,
            ..Default::default()
        };
        let normalize = Normalize::new(array![[0.0, 0.0]], array![[100.0, 100.0]], options).unwrap();
        let image = Image::new(0.0, array![[100.0, -5.0]], SampleFormat::Uint16);
        let output = normalize.filter_one(&image).unwrap();
        assert_eq!(0.0, output.data[[0, 0]]);
        assert_eq!(-(1e-6_f32).ln(), output.data[[0, 1]]);
    }

    #[test]
    fn shape_mismatch() {
        let normalize = Normalize::new(
            Array2::zeros((2, 2)),
            Array2::ones((2, 2)),
            NormalizeOptions::default(),
        )
        .unwrap();
        let image = Image::new(0.0, Array2::zeros((2, 3)), SampleFormat::Uint16);
        assert!(matches!(
            normalize.filter_one(&image),
            Err(Imars3dError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn references_from_series() {
        let dir = tempfile::tempdir().unwrap();
        let dark = test_utils::series(dir.path(), "dc", "dc_{}.tiff", &[0.0, 1.0, 2.0]);
        test_utils::fill_series(&dark, |id| array![[10.0 + id as f32]]);
        let ob = test_utils::series(dir.path(), "ob", "ob_{}.tiff", &[0.0, 1.0]);
        test_utils::fill_series(&ob, |id| array![[100.0 + 2.0 * id as f32]]);
        let normalize = Normalize::from_series(&dark, &ob, NormalizeOptions::default()).unwrap();
        assert_eq!(array![[11.0]], normalize.dark);
        assert_eq!(array![[101.0]], normalize.open_beam);
    }

    #[test]
    fn missing_calibration_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dark = test_utils::series(dir.path(), "dc", "dc_{}.tiff", &[0.0, 1.0]);
        test_utils::fill_series(&dark, |_| array![[10.0]]);
        std::fs::remove_file(dark.path(1.0)).unwrap();
        let ob = test_utils::series(dir.path(), "ob", "ob_{}.tiff", &[0.0]);
        test_utils::fill_series(&ob, |_| array![[100.0]]);
        let err = Normalize::from_series(&dark, &ob, NormalizeOptions::default()).unwrap_err();
        assert_eq!("calibration series dc is missing identifier 1", err.to_string());
    }
}
