//! Dead pixel correction and detector chip composition.

use ndarray::{s, Array2, Zip};
use validator::Validate;

use super::median::window_median_excluding;
use crate::error::Imars3dError;
use crate::image::Image;
use crate::models::DeadPixelOptions;
use crate::operation::Correction;

/// Replaces pixels at or below the dead value with the median of their live neighbours.
#[derive(Clone, Debug)]
pub struct DeadPixelCorrection {
    options: DeadPixelOptions,
}

impl DeadPixelCorrection {
    /// Return a new DeadPixelCorrection.
    pub fn new(options: DeadPixelOptions) -> Result<Self, Imars3dError> {
        options.validate()?;
        Ok(DeadPixelCorrection { options })
    }
}

impl Correction for DeadPixelCorrection {
    fn name(&self) -> &'static str {
        "dead pixel correction"
    }

    fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
        let dead = image.data.mapv(|value| value <= self.options.dead_value);
        let original = image.data.view();
        let mut scratch = vec![];
        let mut output = image.data.clone();
        Zip::indexed(&mut output)
            .and(&dead)
            .for_each(|(row, col), value, &is_dead| {
                if is_dead {
                    // Pixels with no live neighbour are left as they are.
                    if let Some(median) = window_median_excluding(
                        original,
                        dead.view(),
                        row,
                        col,
                        self.options.half_width,
                        &mut scratch,
                    ) {
                        *value = median;
                    }
                }
            });
        Ok(image.with_data(output))
    }
}

/// A detector chip read out separately from the others.
#[derive(Clone, Debug, PartialEq)]
pub struct Chip {
    /// Row of the top left corner in the composed image
    pub row: usize,
    /// Column of the top left corner in the composed image
    pub col: usize,
    /// Chip pixels
    pub data: Array2<f32>,
}

/// Compose chips into a `height` x `width` image.
///
/// Pixels not covered by any chip are zero, which marks them as dead for
/// [DeadPixelCorrection] with the default options. Later chips overwrite earlier ones where
/// they overlap.
pub fn compose_chips(height: usize, width: usize, chips: &[Chip]) -> Result<Array2<f32>, Imars3dError> {
    let mut output = Array2::zeros((height, width));
    for chip in chips {
        let (rows, cols) = chip.data.dim();
        if chip.row + rows > height || chip.col + cols > width {
            return Err(Imars3dError::OutOfBounds {
                what: "chip",
                region: [chip.row, chip.col, rows, cols],
                height,
                width,
            });
        }
        output
            .slice_mut(s![chip.row..chip.row + rows, chip.col..chip.col + cols])
            .assign(&chip.data);
    }
    Ok(output)
}
