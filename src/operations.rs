//! Correction operators.
//!
//! Each operator implements [Correction](crate::operation::Correction) and is applied to a
//! whole series with [filter](crate::operation::filter).

pub mod crop;
pub mod dead_pixel;
pub mod gamma;
pub mod intensity;
pub mod median;
pub mod normalize;
pub mod smooth;

pub use crop::{crop, detect_crop_window, signal_window, Crop};
pub use dead_pixel::{compose_chips, Chip, DeadPixelCorrection};
pub use gamma::GammaFilter;
pub use intensity::IntensityFluctuation;
pub use normalize::Normalize;
pub use smooth::MedianSmooth;
