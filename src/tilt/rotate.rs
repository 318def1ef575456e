//! Rotation of images about their centre.

use ndarray::{Array2, ArrayView2};

/// Bilinear sample of `image` at `(y, x)`, zero outside the image.
fn bilinear(image: ArrayView2<f32>, y: f64, x: f64) -> f32 {
    let (height, width) = image.dim();
    if !(0.0..=(height - 1) as f64).contains(&y) || !(0.0..=(width - 1) as f64).contains(&x) {
        return 0.0;
    }
    let (y0, x0) = (y.floor() as usize, x.floor() as usize);
    let (y1, x1) = ((y0 + 1).min(height - 1), (x0 + 1).min(width - 1));
    let (ty, tx) = ((y - y0 as f64) as f32, (x - x0 as f64) as f32);
    let top = image[[y0, x0]] * (1.0 - tx) + image[[y0, x1]] * tx;
    let bottom = image[[y1, x0]] * (1.0 - tx) + image[[y1, x1]] * tx;
    top * (1.0 - ty) + bottom * ty
}

/// Rotate `image` about its centre so that an axis tilted by `tilt` degrees becomes vertical.
///
/// Output pixels that map outside the input are zero.
pub fn apply_tilt(image: ArrayView2<f32>, tilt: f64) -> Array2<f32> {
    let (height, width) = image.dim();
    if tilt == 0.0 || height == 0 || width == 0 {
        return image.to_owned();
    }
    let (sin, cos) = tilt.to_radians().sin_cos();
    let (cy, cx) = ((height as f64 - 1.0) / 2.0, (width as f64 - 1.0) / 2.0);
    Array2::from_shape_fn((height, width), |(y, x)| {
        let (dy, dx) = (y as f64 - cy, x as f64 - cx);
        bilinear(image, cy - sin * dx + cos * dy, cx + cos * dx + sin * dy)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tilt_is_identity() {
        let image = Array2::from_shape_fn((4, 5), |(y, x)| (y * 5 + x) as f32);
        assert_eq!(image, apply_tilt(image.view(), 0.0));
    }

    #[test]
    fn corners_are_zero_filled() {
        let image = Array2::from_elem((21, 21), 1.0_f32);
        let output = apply_tilt(image.view(), 10.0);
        assert_eq!(0.0, output[[0, 0]]);
        assert_eq!(1.0, output[[10, 10]]);
    }

    #[test]
    fn tilted_line_becomes_vertical() {
        let (height, width) = (101, 101);
        let tilt = 3.0_f64;
        let tan = tilt.to_radians().tan();
        // Bright line through the centre whose column increases with the row.
        let image = Array2::from_shape_fn((height, width), |(y, x)| {
            let column = 50.0 + (y as f64 - 50.0) * tan;
            (-((x as f64 - column) / 1.5).powi(2)).exp() as f32
        });
        let output = apply_tilt(image.view(), tilt);
        for y in [20, 50, 80] {
            let row = output.row(y);
            let brightest = (0..width)
                .max_by(|&a, &b| row[a].total_cmp(&row[b]))
                .unwrap();
            assert_eq!(50, brightest, "row {y}");
        }
    }
}
