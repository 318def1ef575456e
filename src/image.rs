//! In-memory image type.

use std::path::PathBuf;

use ndarray::Array2;

use crate::error::Imars3dError;
use crate::models::SampleFormat;
use crate::series::ImageSeries;

/// A single 2D image loaded from an [ImageSeries].
///
/// Samples are held as `f32` regardless of the on-disk format. The format the image was read
/// from is remembered so that it can be written back in the same representation.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    /// Identifier of the image within its series, e.g. a rotation angle
    pub identifier: f64,
    /// File the image was read from, if any
    pub path: Option<PathBuf>,
    /// Sample format the image was read from
    pub format: SampleFormat,
    /// Pixel data, indexed `[row, column]`
    pub data: Array2<f32>,
}

impl Image {
    /// Return a new Image that is not backed by a file.
    pub fn new(identifier: f64, data: Array2<f32>, format: SampleFormat) -> Self {
        Image {
            identifier,
            path: None,
            format,
            data,
        }
    }

    /// Return a new image with the same identifier and format but different pixel data.
    pub fn with_data(&self, data: Array2<f32>) -> Self {
        Image {
            identifier: self.identifier,
            path: None,
            format: self.format,
            data,
        }
    }

    /// Image shape as `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Persist the image into `series` under its identifier.
    pub fn save(&self, series: &ImageSeries) -> Result<PathBuf, Imars3dError> {
        series.put_image(self.identifier, self)
    }
}
