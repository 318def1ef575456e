//! Beam intensity fluctuation correction.

use ndarray::s;
use validator::Validate;

use super::median::median_of;
use crate::error::Imars3dError;
use crate::image::Image;
use crate::models::{IntensityOptions, SampleFormat};
use crate::operation::Correction;

const NAME: &str = "intensity fluctuation correction";

/// Scales each image so that the air regions at its left and right edges have unit median.
///
/// Output images are [SampleFormat::Float32] since the values are ratios.
#[derive(Clone, Debug)]
pub struct IntensityFluctuation {
    options: IntensityOptions,
}

impl IntensityFluctuation {
    /// Return a new IntensityFluctuation.
    pub fn new(options: IntensityOptions) -> Result<Self, Imars3dError> {
        options.validate()?;
        Ok(IntensityFluctuation { options })
    }
}

impl Correction for IntensityFluctuation {
    fn name(&self) -> &'static str {
        NAME
    }

    fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
        let (_, width) = image.shape();
        let air_width = self.options.air_width;
        if 2 * air_width >= width {
            return Err(Imars3dError::InvalidInput {
                operation: NAME,
                reason: format!(
                    "air strips of {air_width} pixels cover the whole {width} pixel wide image"
                ),
            });
        }
        let mut air: Vec<f32> = image
            .data
            .slice(s![.., ..air_width])
            .iter()
            .chain(image.data.slice(s![.., width - air_width..]).iter())
            .copied()
            .collect();
        let median = median_of(&mut air);
        if !(median > 0.0) {
            return Err(Imars3dError::InvalidInput {
                operation: NAME,
                reason: format!("air region median {median} is not positive"),
            });
        }
        let mut output = image.with_data(&image.data / median);
        output.format = SampleFormat::Float32;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{array, Array2};

    #[test]
    fn air_scaled_to_one() {
        let data = array![[200.0, 50.0, 200.0], [200.0, 100.0, 200.0]];
        let image = Image::new(0.0, data, SampleFormat::Uint16);
        let correction = IntensityFluctuation::new(IntensityOptions { air_width: 1 }).unwrap();
        let output = correction.filter_one(&image).unwrap();
        assert_eq!(array![[1.0, 0.25, 1.0], [1.0, 0.5, 1.0]], output.data);
        assert_eq!(SampleFormat::Float32, output.format);
    }

    #[test]
    fn strips_too_wide() {
        let image = Image::new(0.0, Array2::ones((2, 4)), SampleFormat::Uint16);
        let correction = IntensityFluctuation::new(IntensityOptions { air_width: 2 }).unwrap();
        assert!(matches!(
            correction.filter_one(&image),
            Err(Imars3dError::InvalidInput { .. })
        ));
    }

    #[test]
    fn dark_air() {
        let image = Image::new(0.0, Array2::zeros((2, 5)), SampleFormat::Uint16);
        let correction = IntensityFluctuation::new(IntensityOptions { air_width: 1 }).unwrap();
        let err = correction.filter_one(&image).unwrap_err();
        assert_eq!(
            "intensity fluctuation correction: air region median 0 is not positive",
            err.to_string()
        );
    }
}
