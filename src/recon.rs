//! Interface to an external tomographic reconstruction routine.
//!
//! The reconstruction algorithm itself is not part of this crate. A [Reconstructor] receives a
//! validated [ReconRequest] holding a stack of sinograms indexed `[slice, angle, column]` and
//! returns a volume indexed `[slice, row, column]`.

use ndarray::{Array3, ArrayView3, ArrayViewD, Ix3};
use tracing::{info, instrument};
use validator::Validate;

use crate::dispatch::{Dispatcher, StagedStack};
use crate::error::Imars3dError;
use crate::models::{ReconOptions, SampleFormat};
use crate::resource_manager::ResourceManager;
use crate::series::ImageSeries;

/// A validated reconstruction request.
#[derive(Debug)]
pub struct ReconRequest<'a> {
    sinograms: ArrayView3<'a, f32>,
    angles: Vec<f64>,
    options: ReconOptions,
}

impl<'a> ReconRequest<'a> {
    /// Return a new ReconRequest.
    ///
    /// # Arguments
    ///
    /// * `sinograms`: Stack indexed `[slice, angle, column]`
    /// * `angles`: Projection angles in radians, one per angle of the stack
    /// * `options`: Algorithm, filter and optional rotation centre
    pub fn new(
        sinograms: ArrayViewD<'a, f32>,
        angles: Vec<f64>,
        options: ReconOptions,
    ) -> Result<Self, Imars3dError> {
        options.validate()?;
        let ndim = sinograms.ndim();
        let sinograms = sinograms
            .into_dimensionality::<Ix3>()
            .map_err(|_| Imars3dError::Dimensionality {
                expected: 3,
                found: ndim,
            })?;
        if sinograms.is_empty() {
            return Err(Imars3dError::EmptyInput {
                operation: "reconstruction",
            });
        }
        let (_, projections, _) = sinograms.dim();
        if angles.len() != projections {
            return Err(Imars3dError::ShapeMismatch {
                expected: vec![projections],
                found: vec![angles.len()],
            });
        }
        Ok(ReconRequest {
            sinograms,
            angles,
            options,
        })
    }

    pub fn sinograms(&self) -> ArrayView3<'a, f32> {
        self.sinograms
    }

    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    pub fn center(&self) -> Option<f64> {
        self.options.center
    }

    pub fn algorithm(&self) -> &str {
        &self.options.algorithm
    }

    pub fn filter(&self) -> &str {
        &self.options.filter
    }
}

/// Trait for reconstruction back ends.
pub trait Reconstructor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Reconstruct one slice per sinogram.
    fn reconstruct(&self, request: &ReconRequest) -> Result<Array3<f32>, Imars3dError>;
}

/// Reconstruct every sinogram of `sinograms` and write one slice per row to `output`.
///
/// `angles` are the projection angles in degrees. If every slice of `output` exists nothing is
/// done. Slices are written as [SampleFormat::Float32] unless `output` sets a format.
#[instrument(skip_all, fields(reconstructor = reconstructor.name(), sinograms = sinograms.name()))]
pub fn reconstruct_series(
    reconstructor: &dyn Reconstructor,
    sinograms: &ImageSeries,
    angles: &[f64],
    options: &ReconOptions,
    output: &ImageSeries,
    dispatcher: &Dispatcher,
    resources: &ResourceManager,
) -> Result<usize, Imars3dError> {
    if output.missing().is_empty() {
        info!(slices = output.len(), "all slices exist");
        return Ok(0);
    }
    if output.len() != sinograms.len() {
        return Err(Imars3dError::ShapeMismatch {
            expected: vec![sinograms.len()],
            found: vec![output.len()],
        });
    }
    let stack = StagedStack::load(sinograms, dispatcher, resources)?;
    let radians = angles.iter().map(|angle| angle.to_radians()).collect();
    let request = ReconRequest::new(stack.view().into_dyn(), radians, options.clone())?;
    let volume = reconstructor.reconstruct(&request)?;
    if volume.dim().0 != output.len() {
        return Err(Imars3dError::Reconstruction {
            reason: format!(
                "{} returned {} slices for {} sinograms",
                reconstructor.name(),
                volume.dim().0,
                output.len()
            ),
        });
    }
    for (slice, &identifier) in volume.outer_iter().zip(output.identifiers()) {
        output.put_data(identifier, slice, SampleFormat::Float32)?;
    }
    info!(slices = output.len(), "reconstructed");
    Ok(output.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::PathTemplate;
    use crate::test_utils;

    use ndarray::{Array2, ArrayD, Axis, IxDyn};

    /// Returns the per-column mean over angles as a single row per slice.
    struct MeanOverAngles;

    impl Reconstructor for MeanOverAngles {
        fn name(&self) -> &str {
            "mean"
        }

        fn reconstruct(&self, request: &ReconRequest) -> Result<Array3<f32>, Imars3dError> {
            let mean = request
                .sinograms()
                .mean_axis(Axis(1))
                .ok_or(Imars3dError::EmptyInput {
                    operation: "reconstruction",
                })?;
            Ok(mean.insert_axis(Axis(1)))
        }
    }

    #[test]
    fn request_requires_three_dimensions() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[2, 3]));
        assert!(matches!(
            ReconRequest::new(data.view(), vec![0.0; 2], ReconOptions::default()),
            Err(Imars3dError::Dimensionality {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn request_requires_one_angle_per_projection() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4]));
        assert!(matches!(
            ReconRequest::new(data.view(), vec![0.0; 2], ReconOptions::default()),
            Err(Imars3dError::ShapeMismatch { .. })
        ));
        let request = ReconRequest::new(data.view(), vec![0.0; 3], ReconOptions::default()).unwrap();
        assert_eq!("gridrec", request.algorithm());
        assert_eq!(None, request.center());
    }

    #[test]
    fn request_rejects_empty_stack() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[0, 3, 4]));
        assert!(matches!(
            ReconRequest::new(data.view(), vec![0.0; 3], ReconOptions::default()),
            Err(Imars3dError::EmptyInput { .. })
        ));
    }

    #[test]
    fn reconstruct_series_writes_slices() {
        let dir = tempfile::tempdir().unwrap();
        let sinograms = test_utils::series(dir.path(), "sino", "sino_{}.tiff", &[0.0, 1.0]);
        test_utils::fill_series(&sinograms, |row| {
            Array2::from_shape_fn((2, 3), |(angle, col)| (row * 10.0) as f32 + angle as f32 + col as f32)
        });
        let template =
            PathTemplate::parse(&dir.path().join("recon/slice_{}.tiff").to_string_lossy()).unwrap();
        let output = ImageSeries::rows("recon", template, 2).unwrap();
        let dispatcher = Dispatcher::new(1).unwrap();
        let resources = ResourceManager::new(None, 0, None);
        let written = reconstruct_series(
            &MeanOverAngles,
            &sinograms,
            &[0.0, 180.0],
            &ReconOptions::default(),
            &output,
            &dispatcher,
            &resources,
        )
        .unwrap();
        assert_eq!(2, written);
        let slice = output.get_data(1.0).unwrap();
        assert_eq!(SampleFormat::Float32, slice.format);
        assert_eq!(ndarray::array![[10.5, 11.5, 12.5]], slice.data);

        // A second run finds every slice on disk.
        let written = reconstruct_series(
            &MeanOverAngles,
            &sinograms,
            &[0.0, 180.0],
            &ReconOptions::default(),
            &output,
            &dispatcher,
            &resources,
        )
        .unwrap();
        assert_eq!(0, written);
    }
}
