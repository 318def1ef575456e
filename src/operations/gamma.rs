//! Gamma (outlier) filter.
//!
//! Gamma rays hitting the detector produce isolated saturated pixels. Flagged pixels are
//! replaced by the median of their neighbourhood in the original image.

use ndarray::{Array2, Zip};
use validator::Validate;

use super::median::window_median;
use crate::error::Imars3dError;
use crate::image::Image;
use crate::models::GammaOptions;
use crate::operation::Correction;

const NAME: &str = "gamma filter";

/// Replaces outlier pixels with their neighbourhood median.
#[derive(Clone, Debug)]
pub struct GammaFilter {
    options: GammaOptions,
    mask: Option<Array2<bool>>,
}

impl GammaFilter {
    /// Return a new GammaFilter that flags pixels at or above the threshold.
    pub fn new(options: GammaOptions) -> Result<Self, Imars3dError> {
        options.validate()?;
        Ok(GammaFilter {
            options,
            mask: None,
        })
    }

    /// Flag exactly the pixels set in `mask` instead of using a threshold.
    pub fn with_mask(mut self, mask: Array2<bool>) -> Result<Self, Imars3dError> {
        if self.options.threshold.is_some() {
            return Err(Imars3dError::UnsupportedOption {
                operation: NAME,
                reason: "a mask and a threshold cannot be combined".to_string(),
            });
        }
        self.mask = Some(mask);
        Ok(self)
    }

    fn threshold(&self, image: &Image) -> Result<f32, Imars3dError> {
        match self.options.threshold {
            Some(threshold) => Ok(threshold),
            None if image.format.is_float() => Err(Imars3dError::UnsupportedOption {
                operation: NAME,
                reason: format!(
                    "{} images have no saturation value, a threshold is required",
                    image.format
                ),
            }),
            None => Ok(image.format.max_value() as f32),
        }
    }

    /// Pixels that the filter replaces.
    pub fn flagged(&self, image: &Image) -> Result<Array2<bool>, Imars3dError> {
        let candidates = match &self.mask {
            Some(mask) => {
                if mask.dim() != image.shape() {
                    return Err(Imars3dError::ShapeMismatch {
                        expected: image.data.shape().to_vec(),
                        found: mask.shape().to_vec(),
                    });
                }
                mask.clone()
            }
            None => {
                let threshold = self.threshold(image)?;
                image.data.mapv(|value| value >= threshold)
            }
        };
        if !self.options.selective {
            return Ok(candidates);
        }
        let data = image.data.view();
        let mut scratch = vec![];
        let mut flagged = candidates;
        Zip::indexed(&mut flagged).for_each(|(row, col), flag| {
            if *flag {
                let median = window_median(data, row, col, self.options.half_width, &mut scratch);
                *flag = data[[row, col]] - median > self.options.diff_tolerance;
            }
        });
        Ok(flagged)
    }
}

impl Correction for GammaFilter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
        let flagged = self.flagged(image)?;
        let original = image.data.view();
        let mut scratch = vec![];
        let mut output = image.data.clone();
        Zip::indexed(&mut output)
            .and(&flagged)
            .for_each(|(row, col), value, &flag| {
                if flag {
                    *value =
                        window_median(original, row, col, self.options.half_width, &mut scratch);
                }
            });
        Ok(image.with_data(output))
    }
}
