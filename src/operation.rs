use tracing::info;

use crate::dispatch::{DispatchReport, Dispatcher, UnitOutcome};
use crate::error::Imars3dError;
use crate::image::Image;
use crate::series::ImageSeries;

/// Trait for per-image correction operators.
///
/// This forms the contract between the series driver and operators. An operator sees one image
/// at a time and must not depend on other images of the series.
pub trait Correction: Sync {
    /// Name used in logs, metrics and failure reports.
    fn name(&self) -> &'static str;

    /// Whether the output has the same shape as the input. Only cropping changes the shape.
    fn preserves_shape(&self) -> bool {
        true
    }

    /// Correct a single image.
    ///
    /// Returns a new [Image]; the input is never modified.
    ///
    /// # Arguments
    ///
    /// * `image`: Image to correct
    fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError>;
}

/// Apply `correction` to every image of `input`, writing results to `output`.
///
/// Images whose output already exists are skipped, so an interrupted run can be resumed.
/// `output` must cover every identifier of `input`.
pub fn filter<C: Correction + ?Sized>(
    correction: &C,
    input: &ImageSeries,
    output: &ImageSeries,
    dispatcher: &Dispatcher,
) -> Result<DispatchReport, Imars3dError> {
    if input.is_empty() {
        return Err(Imars3dError::EmptyInput {
            operation: correction.name(),
        });
    }
    if let Some(&identifier) = input.identifiers().iter().find(|&&id| !output.contains(id)) {
        return Err(Imars3dError::UnknownIdentifier {
            series: output.name().to_string(),
            identifier,
        });
    }
    let identifiers = input.identifiers();
    let report = dispatcher.run(
        correction.name(),
        0..identifiers.len(),
        |index| format!("{} {}", input.name(), identifiers[index]),
        |index| {
            let identifier = identifiers[index];
            if output.exists(identifier) {
                return Ok(UnitOutcome::Skipped);
            }
            let image = input.get_data(identifier)?;
            let corrected = correction.filter_one(&image)?;
            if correction.preserves_shape() && corrected.shape() != image.shape() {
                return Err(Imars3dError::ShapeMismatch {
                    expected: image.data.shape().to_vec(),
                    found: corrected.data.shape().to_vec(),
                });
            }
            output.put_image(identifier, &corrected)?;
            Ok(UnitOutcome::Computed)
        },
    )?;
    info!(
        operation = correction.name(),
        input = input.name(),
        output = output.name(),
        computed = report.computed,
        skipped = report.skipped,
        "correction applied"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    use ndarray::{array, Array2};

    struct AddOne;

    impl Correction for AddOne {
        fn name(&self) -> &'static str {
            "add one"
        }

        fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
            Ok(image.with_data(&image.data + 1.0))
        }
    }

    struct Shrink;

    impl Correction for Shrink {
        fn name(&self) -> &'static str {
            "shrink"
        }

        fn filter_one(&self, image: &Image) -> Result<Image, Imars3dError> {
            Ok(image.with_data(Array2::zeros((1, 1))))
        }
    }

    #[test]
    fn filter_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let input = test_utils::series(dir.path(), "ct", "ct_{}.tiff", &[0.0, 1.0, 2.0]);
        test_utils::fill_series(&input, |id| array![[id as f32, 10.0]]);
        let output = test_utils::series(dir.path(), "out", "out/out_{}.tiff", &[0.0, 1.0, 2.0]);
        let dispatcher = Dispatcher::new(2).unwrap();

        let report = filter(&AddOne, &input, &output, &dispatcher).unwrap();
        assert_eq!(
            DispatchReport {
                computed: 3,
                skipped: 0
            },
            report
        );
        assert_eq!(array![[3.0_f32, 11.0]], output.get_data(2.0).unwrap().data);

        // Rerunning recomputes only the missing image.
        std::fs::remove_file(output.path(1.0)).unwrap();
        let report = filter(&AddOne, &input, &output, &dispatcher).unwrap();
        assert_eq!(
            DispatchReport {
                computed: 1,
                skipped: 2
            },
            report
        );
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = test_utils::series(dir.path(), "ct", "ct_{}.tiff", &[0.0, 1.0]);
        test_utils::fill_series(&input, |_| array![[1.0]]);
        std::fs::remove_file(input.path(1.0)).unwrap();
        let output = test_utils::series(dir.path(), "out", "out_{}.tiff", &[0.0, 1.0]);
        let dispatcher = Dispatcher::new(1).unwrap();
        match filter(&AddOne, &input, &output, &dispatcher).unwrap_err() {
            Imars3dError::Workers { total, failures } => {
                assert_eq!(2, total);
                assert_eq!(1, failures.len());
                assert_eq!("ct 1", failures[0].label);
            }
            err => panic!("unexpected error {}", err),
        }
        // The other image was still written.
        assert!(output.exists(0.0));
    }

    #[test]
    fn shape_change_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = test_utils::series(dir.path(), "ct", "ct_{}.tiff", &[0.0]);
        test_utils::fill_series(&input, |_| array![[1.0, 2.0]]);
        let output = test_utils::series(dir.path(), "out", "out_{}.tiff", &[0.0]);
        let dispatcher = Dispatcher::new(1).unwrap();
        assert!(filter(&Shrink, &input, &output, &dispatcher).is_err());
        assert!(!output.exists(0.0));
    }

    #[test]
    fn output_must_cover_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = test_utils::series(dir.path(), "ct", "ct_{}.tiff", &[0.0, 1.0]);
        let output = test_utils::series(dir.path(), "out", "out_{}.tiff", &[0.0]);
        let dispatcher = Dispatcher::new(1).unwrap();
        assert!(matches!(
            filter(&AddOne, &input, &output, &dispatcher),
            Err(Imars3dError::UnknownIdentifier { .. })
        ));
    }
}
