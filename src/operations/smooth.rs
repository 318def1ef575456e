//! Median smoothing.

use validator::Validate;

use super::median::median_filter;
use crate::error::Imars3dError;
use crate::image::Image;
use crate::models::SmoothOptions;
use crate::operation::Correction;

/// Median smoothing with a square window.
#[derive(Clone, Debug)]
pub struct MedianSmooth {
    options: SmoothOptions,
}

impl MedianSmooth {
    /// Return a new MedianSmooth.
    pub fn new(options: SmoothOptions) -> Result<Self, Imars3dError> {
        options.validate()?;
        Ok(MedianSmooth { options })
    }
}

impl Correction for MedianSmooth {
    fn name(&self) -> &'static str {
        "median smoothing"
    }

    fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
        Ok(image.with_data(median_filter(image.data.view(), self.options.half_width)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleFormat;

    use ndarray::array;

    #[test]
    fn smooth_spike() {
        let image = Image::new(
            0.0,
            array![[1.0, 1.0, 1.0], [1.0, 9.0, 1.0], [1.0, 1.0, 1.0]],
            SampleFormat::Uint16,
        );
        let smooth = MedianSmooth::new(SmoothOptions::default()).unwrap();
        assert_eq!(ndarray::Array2::<f32>::ones((3, 3)), smooth.filter_one(&image).unwrap().data);
    }

    #[test]
    fn too_wide() {
        assert!(MedianSmooth::new(SmoothOptions { half_width: 33 }).is_err());
    }
}
