//! Data types and per-stage option schemas
//!
//! Every stage that accepts keyword options deserialises them into one of the structs in this
//! module. Unknown keys are rejected and the `validator` rules are checked before any work
//! starts.

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use validator::{Validate, ValidationError};

/// Supported on-disk sample formats
#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SampleFormat {
    /// [u8]
    Uint8,
    /// [u16], the native format of most neutron imaging detectors
    #[default]
    Uint16,
    /// [u32]
    Uint32,
    /// [f32]
    Float32,
    /// [f64]
    Float64,
}

impl SampleFormat {
    /// Returns the size of the associated type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Uint8 => std::mem::size_of::<u8>(),
            Self::Uint16 => std::mem::size_of::<u16>(),
            Self::Uint32 => std::mem::size_of::<u32>(),
            Self::Float32 => std::mem::size_of::<f32>(),
            Self::Float64 => std::mem::size_of::<f64>(),
        }
    }

    /// Returns the largest representable value, i.e. the saturation level of the detector.
    pub fn max_value(self) -> f64 {
        match self {
            Self::Uint8 => u8::MAX as f64,
            Self::Uint16 => u16::MAX as f64,
            Self::Uint32 => u32::MAX as f64,
            Self::Float32 => f32::MAX as f64,
            Self::Float64 => f64::MAX,
        }
    }

    /// Whether this is a floating point format.
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

/// Identifier set of an image series
///
/// Either an explicit list or a half-open `start..stop` range with a step.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Identifiers {
    /// Explicit identifiers
    List(Vec<f64>),
    /// `start <= id < stop` in increments of `step`
    Range { start: f64, stop: f64, step: f64 },
}

/// Largest number of identifiers a range may expand to.
pub const MAX_IDENTIFIERS: usize = 1 << 20;

impl Identifiers {
    /// Number of identifiers, or `None` for non-finite values or a range longer than
    /// [MAX_IDENTIFIERS].
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::List(ids) => ids.iter().all(|id| id.is_finite()).then_some(ids.len()),
            Self::Range { start, stop, step } => {
                if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
                    return None;
                }
                if *step <= 0.0 || stop <= start {
                    return Some(0);
                }
                // Guard against 0.1-style rounding producing an extra element at `stop`.
                let count = ((stop - start) / step - 1e-9).ceil();
                (count <= MAX_IDENTIFIERS as f64).then_some(count as usize)
            }
        }
    }

    /// Expand into a list of identifiers. A range that fails [Identifiers::count] is empty.
    pub fn expand(&self) -> Vec<f64> {
        match self {
            Self::List(ids) => ids.clone(),
            Self::Range { start, step, .. } => (0..self.count().unwrap_or(0))
                .map(|i| start + i as f64 * step)
                .collect(),
        }
    }
}

/// Options for opening an image series
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_series_options"))]
pub struct SeriesOptions {
    /// Series name, defaults to the stage name
    pub name: Option<String>,
    /// Identifiers; when absent they are discovered from existing files
    pub identifiers: Option<Identifiers>,
    /// Replacement for the decimal mark inside rendered identifiers
    pub decimal_mark: Option<String>,
    /// Sample format used when writing
    pub format: Option<SampleFormat>,
}

/// Validate that identifiers are finite and a range is not too long
fn validate_series_options(options: &SeriesOptions) -> Result<(), ValidationError> {
    match &options.identifiers {
        Some(identifiers) if identifiers.count().is_none() => {
            let mut error = ValidationError::new(
                "identifiers must be finite and a range may hold at most 1048576 of them",
            );
            error.add_param("max".into(), &MAX_IDENTIFIERS);
            Err(error)
        }
        _ => Ok(()),
    }
}

fn default_half_width() -> usize {
    1
}

fn default_diff_tolerance() -> f32 {
    20.0
}

/// Gamma (outlier) filter options
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GammaOptions {
    /// Pixels at or above this value are outliers. Defaults to the saturation value of the
    /// image's sample format.
    pub threshold: Option<f32>,
    /// Half width of the square median window
    #[serde(default = "default_half_width")]
    #[validate(range(min = 1, max = 32, message = "half_width must be between 1 and 32"))]
    pub half_width: usize,
    /// Only replace outliers that also stand out from their neighbourhood
    #[serde(default)]
    pub selective: bool,
    /// Minimum excess over the neighbourhood median for the selective variant
    #[serde(default = "default_diff_tolerance")]
    #[validate(range(min = 0.0, message = "diff_tolerance must not be negative"))]
    pub diff_tolerance: f32,
}

impl Default for GammaOptions {
    fn default() -> Self {
        Self {
            threshold: None,
            half_width: default_half_width(),
            selective: false,
            diff_tolerance: default_diff_tolerance(),
        }
    }
}

/// Dead pixel correction options
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeadPixelOptions {
    /// Pixels at or below this value are dead
    #[serde(default)]
    pub dead_value: f32,
    /// Half width of the square median window
    #[serde(default = "default_half_width")]
    #[validate(range(min = 1, max = 32, message = "half_width must be between 1 and 32"))]
    pub half_width: usize,
}

impl Default for DeadPixelOptions {
    fn default() -> Self {
        Self {
            dead_value: 0.0,
            half_width: default_half_width(),
        }
    }
}

/// Inclusive crop window
// NOTE: In serde, structs can be deserialised from sequences or maps. This allows both the
// [left, right, top, bottom] form and the one with named fields.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_window"))]
pub struct CropWindow {
    /// First column kept
    pub left: usize,
    /// Last column kept
    pub right: usize,
    /// First row kept
    pub top: usize,
    /// Last row kept
    pub bottom: usize,
}

impl CropWindow {
    /// Return a new CropWindow object.
    pub fn new(left: usize, right: usize, top: usize, bottom: usize) -> Self {
        CropWindow {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Shape `(rows, columns)` of the cropped output.
    pub fn shape(&self) -> (usize, usize) {
        (self.bottom - self.top + 1, self.right - self.left + 1)
    }

    /// Intersection of two windows, or `None` if they do not overlap.
    pub fn intersect(&self, other: &CropWindow) -> Option<CropWindow> {
        let window = CropWindow {
            left: self.left.max(other.left),
            right: self.right.min(other.right),
            top: self.top.max(other.top),
            bottom: self.bottom.min(other.bottom),
        };
        (window.left <= window.right && window.top <= window.bottom).then_some(window)
    }
}

/// Validate a crop window
fn validate_window(window: &CropWindow) -> Result<(), ValidationError> {
    if window.left > window.right || window.top > window.bottom {
        let mut error = ValidationError::new("Crop window must satisfy left <= right and top <= bottom");
        error.add_param("left".into(), &window.left);
        error.add_param("right".into(), &window.right);
        error.add_param("top".into(), &window.top);
        error.add_param("bottom".into(), &window.bottom);
        return Err(error);
    }
    Ok(())
}

fn default_signal_fraction() -> f32 {
    0.1
}

/// Crop boundary detection options
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_boundary_options"))]
pub struct BoundaryOptions {
    /// Pixels above this fraction of the image maximum count as signal
    #[serde(default = "default_signal_fraction")]
    pub signal_fraction: f32,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            signal_fraction: default_signal_fraction(),
        }
    }
}

/// Validate that the signal fraction lies in the open interval (0, 1)
fn validate_boundary_options(options: &BoundaryOptions) -> Result<(), ValidationError> {
    let fraction = options.signal_fraction;
    if !(fraction > 0.0 && fraction < 1.0) {
        let mut error = ValidationError::new("fraction must be between 0 and 1 (exclusive)");
        error.add_param("fraction".into(), &fraction);
        return Err(error);
    }
    Ok(())
}

fn default_air_width() -> usize {
    10
}

/// Intensity fluctuation correction options
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct IntensityOptions {
    /// Width in pixels of the air strips at the left and right edges
    #[serde(default = "default_air_width")]
    #[validate(range(min = 1, message = "air_width must be greater than 0"))]
    pub air_width: usize,
}

impl Default for IntensityOptions {
    fn default() -> Self {
        Self {
            air_width: default_air_width(),
        }
    }
}

fn default_epsilon() -> f32 {
    1e-6
}

/// Dark field / open beam normalization options
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NormalizeOptions {
    /// Apply `-ln(x)` after normalization
    #[serde(default)]
    pub minus_log: bool,
    /// Floor for denominators and logarithm arguments
    #[serde(default = "default_epsilon")]
    #[validate(range(min = 0.0, message = "epsilon must not be negative"))]
    pub epsilon: f32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            minus_log: false,
            epsilon: default_epsilon(),
        }
    }
}

/// Median smoothing options. A half width of 0 disables smoothing.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SmoothOptions {
    /// Half width of the square median window
    #[serde(default = "default_half_width")]
    #[validate(range(max = 32, message = "half_width must be at most 32"))]
    pub half_width: usize,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            half_width: default_half_width(),
        }
    }
}

/// Tilt estimation strategy
#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TiltMethod {
    /// Search candidate shear shifts for the minimum squared difference
    DirectMinimization,
    /// Per-row phase correlation of edge signatures
    #[default]
    PhaseCorrelation,
    /// Per-row rotation centre estimates and a linear fit
    UseCenters,
}

fn default_max_tilt() -> f64 {
    5.0
}

fn default_shear_step() -> f64 {
    0.25
}

fn default_peak_fraction() -> f64 {
    0.5
}

fn default_rows() -> usize {
    64
}

/// Tilt estimation options
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TiltOptions {
    /// Estimation strategy
    #[serde(default)]
    pub method: TiltMethod,
    /// Largest tilt in degrees searched by direct minimization
    #[serde(default = "default_max_tilt")]
    #[validate(range(min = 0.0, max = 45.0, message = "max_tilt must be between 0 and 45"))]
    pub max_tilt: f64,
    /// Shear increment in pixels between direct minimization candidates
    #[serde(default = "default_shear_step")]
    #[validate(range(min = 0.01, message = "shear_step must be at least 0.01"))]
    pub shear_step: f64,
    /// Largest horizontal shift considered; defaults to a quarter of the image width
    pub max_shift: Option<usize>,
    /// Phase correlation peaks below this fraction of the window maximum are ignored
    #[serde(default = "default_peak_fraction")]
    #[validate(range(min = 0.0, max = 1.0, message = "peak_fraction must be between 0 and 1"))]
    pub peak_fraction: f64,
    /// Number of detector rows sampled
    #[serde(default = "default_rows")]
    #[validate(range(min = 2, message = "rows must be at least 2"))]
    pub rows: usize,
    /// Tilt returned instead of failing on an inconclusive estimate
    pub fallback: Option<f64>,
}

impl Default for TiltOptions {
    fn default() -> Self {
        Self {
            method: TiltMethod::default(),
            max_tilt: default_max_tilt(),
            shear_step: default_shear_step(),
            max_shift: None,
            peak_fraction: default_peak_fraction(),
            rows: default_rows(),
            fallback: None,
        }
    }
}

fn default_algorithm() -> String {
    "gridrec".to_string()
}

fn default_filter() -> String {
    "shepp".to_string()
}

/// Reconstruction options handed to the external reconstruction routine
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReconOptions {
    /// Algorithm name
    #[serde(default = "default_algorithm")]
    #[validate(length(min = 1, message = "algorithm must not be empty"))]
    pub algorithm: String,
    /// Filter name
    #[serde(default = "default_filter")]
    #[validate(length(min = 1, message = "filter must not be empty"))]
    pub filter: String,
    /// Rotation centre in pixels
    pub center: Option<f64>,
}

impl Default for ReconOptions {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            filter: default_filter(),
            center: None,
        }
    }
}

/// Stages that take no options deserialise into this.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NoOptions {}
