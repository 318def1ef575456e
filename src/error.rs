//! Error handling.

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use ndarray::ShapeError;
use strum_macros::Display;
use thiserror::Error;
use tracing::{event, Level};

/// Broad classification of an [Imars3dError].
///
/// The kind decides how the binary reports the failure and which exit code it uses.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorKind {
    /// Bad task graph, unknown function, invalid options, wrong file extension.
    Configuration,
    /// Missing or corrupt input, wrong dimensionality.
    Input,
    /// An estimator could not produce a trustworthy result.
    Inconclusive,
    /// One or more parallel work units failed.
    Worker,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Process exit code used by the binary for this kind of error.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Internal => 1,
            Self::Configuration => 2,
            Self::Input => 3,
            Self::Inconclusive => 4,
            Self::Worker => 5,
        }
    }
}

/// A single failed unit of work reported by the dispatcher.
#[derive(Debug)]
pub struct UnitFailure {
    /// Partition the unit belonged to.
    pub partition: Range<usize>,
    /// Index of the failed unit.
    pub unit: usize,
    /// Human readable unit label, e.g. the identifier of the image.
    pub label: String,
    /// The underlying error.
    pub error: Imars3dError,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition {}..{} unit {} ({}): {}",
            self.partition.start, self.partition.end, self.unit, self.label, self.error
        )
    }
}

/// Format a list of unit failures for the aggregate error message.
fn format_failures(failures: &[UnitFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// imars3d error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant maps onto one [ErrorKind].
#[derive(Debug, Error)]
pub enum Imars3dError {
    /// A stage references a function that is not in the registry
    #[error("stage {stage}: unknown function {function}")]
    UnknownFunction { stage: String, function: String },

    /// A stage references a context name that does not exist at that point
    #[error("stage {stage}: unresolved reference ${name}")]
    UnresolvedReference { stage: String, name: String },

    /// A reference resolves to a value of the wrong kind
    #[error("stage {stage}: argument {name} has kind {found}, expected {expected}")]
    TypeMismatch {
        stage: String,
        name: String,
        expected: String,
        found: String,
    },

    /// Wrong number of positional arguments or outputs
    #[error("stage {stage}: {function} takes {expected} {what}, got {found}")]
    Arity {
        stage: String,
        function: String,
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A stage output would silently replace an existing name
    #[error("stage {stage}: output {name} already exists (set overwrite to replace it)")]
    OutputCollision { stage: String, name: String },

    /// Stage options failed to deserialise
    #[error("invalid options for {context}")]
    InvalidOptions {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Options failed validation rules
    #[error("options are not valid")]
    Validation(#[from] validator::ValidationErrors),

    /// An option combination the operator cannot honour
    #[error("unsupported option for {operation}: {reason}")]
    UnsupportedOption {
        operation: &'static str,
        reason: String,
    },

    /// The file extension does not match the expected document or image type
    #[error("{} has an unsupported extension, expected {expected}", .path.display())]
    ExtensionMismatch { path: PathBuf, expected: String },

    /// A path template is malformed or not bijective
    #[error("invalid path template {template}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A required file does not exist
    #[error("{} not found", .path.display())]
    NotFound { path: PathBuf },

    /// A file exists but cannot be decoded
    #[error("{} is malformed: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    /// Error reading or writing a file
    #[error("I/O error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the TIFF codec
    #[error("TIFF codec error")]
    Tiff(#[from] tiff::TiffError),

    /// Error from the FITS codec
    #[error("FITS codec error")]
    Fits(#[from] fitsio::errors::Error),

    /// Two arrays that must agree in shape do not
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// An array has the wrong number of dimensions
    #[error("expected a {expected}-dimensional array, found {found} dimensions")]
    Dimensionality { expected: usize, found: usize },

    /// Error creating an ndarray from a shape
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// A crop window or chip placement lies outside the image
    #[error("{what} {region:?} is outside the {height}x{width} image")]
    OutOfBounds {
        what: &'static str,
        region: [usize; 4],
        height: usize,
        width: usize,
    },

    /// Attempt to operate on an empty series or image
    #[error("cannot perform {operation} on an empty input")]
    EmptyInput { operation: &'static str },

    /// An identifier is not part of the series
    #[error("series {series} has no identifier {identifier}")]
    UnknownIdentifier { series: String, identifier: f64 },

    /// Input data that an operator cannot process
    #[error("{operation}: {reason}")]
    InvalidInput {
        operation: &'static str,
        reason: String,
    },

    /// A calibration frame required by a stage is missing
    #[error("calibration series {name} is missing identifier {identifier}")]
    MissingCalibration { name: String, identifier: f64 },

    /// An estimator found no trustworthy answer
    #[error("inconclusive result: {reason}")]
    Inconclusive { reason: String },

    /// One or more work units failed
    #[error("{} of {total} units failed: {}", .failures.len(), format_failures(.failures))]
    Workers {
        total: usize,
        failures: Vec<UnitFailure>,
    },

    /// Not enough memory budget to stage an input stack
    #[error("insufficient memory to stage input ({requested} > {total})")]
    InsufficientMemory { requested: usize, total: usize },

    /// Error building the worker pool
    #[error("failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Error (de)serialising JSON
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// Error deserialising YAML
    #[error("YAML error")]
    Yaml(#[from] serde_yaml::Error),

    /// Error parsing a human readable byte size
    #[error("invalid byte size")]
    ByteSize(#[from] byte_unit::ParseError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// The external reconstruction routine failed
    #[error("reconstruction failed: {reason}")]
    Reconstruction { reason: String },
}

impl Imars3dError {
    /// Returns the [ErrorKind] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownFunction { .. }
            | Self::UnresolvedReference { .. }
            | Self::TypeMismatch { .. }
            | Self::Arity { .. }
            | Self::OutputCollision { .. }
            | Self::InvalidOptions { .. }
            | Self::Validation(_)
            | Self::UnsupportedOption { .. }
            | Self::ExtensionMismatch { .. }
            | Self::InvalidTemplate { .. }
            | Self::Yaml(_)
            | Self::ByteSize(_) => ErrorKind::Configuration,

            Self::NotFound { .. }
            | Self::Malformed { .. }
            | Self::Io { .. }
            | Self::Tiff(_)
            | Self::Fits(_)
            | Self::ShapeMismatch { .. }
            | Self::Dimensionality { .. }
            | Self::ShapeInvalid(_)
            | Self::OutOfBounds { .. }
            | Self::EmptyInput { .. }
            | Self::MissingCalibration { .. }
            | Self::UnknownIdentifier { .. }
            | Self::InvalidInput { .. }
            | Self::InsufficientMemory { .. } => ErrorKind::Input,

            Self::Inconclusive { .. } => ErrorKind::Inconclusive,

            Self::Workers { .. } => ErrorKind::Worker,

            Self::ThreadPool(_)
            | Self::Json(_)
            | Self::TryFromInt(_)
            | Self::Reconstruction { .. } => ErrorKind::Internal,
        }
    }

    /// Wrap an I/O error with the path it occurred on.
    ///
    /// A missing file becomes [Imars3dError::NotFound] so that callers can tell it apart from a
    /// file that exists but cannot be read.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Log the error and its chain of causes.
    pub fn log(&self) {
        event!(Level::ERROR, kind = %self.kind(), "{}", self);
        let mut current = std::error::Error::source(self);
        while let Some(source) = current {
            event!(Level::ERROR, "Caused by: {}", source);
            current = source.source();
        }
    }
}
