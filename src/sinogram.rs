//! Sinogram construction.
//!
//! A stack of N projections of H x W pixels is rearranged into H sinograms of N x W pixels,
//! one per detector row. Sinogram `r` holds row `r` of every projection in identifier order.

use tracing::{info, instrument};
use validator::Validate;

use crate::dispatch::{DispatchReport, Dispatcher, StagedStack, UnitOutcome};
use crate::error::Imars3dError;
use crate::metrics::{self, Outcome};
use crate::models::SmoothOptions;
use crate::operations::median::median_filter;
use crate::resource_manager::ResourceManager;
use crate::series::{ImageSeries, PathTemplate};

const STAGE: &str = "sinogram";

/// Return the series of sinograms for `projections`, one per detector row, at `template`.
///
/// The first projection is read to find the number of rows.
pub fn sinogram_series(
    name: &str,
    projections: &ImageSeries,
    template: PathTemplate,
) -> Result<ImageSeries, Imars3dError> {
    let first = projections
        .identifiers()
        .first()
        .ok_or(Imars3dError::EmptyInput { operation: STAGE })?;
    let (height, _) = projections.get_data(*first)?.shape();
    Ok(ImageSeries::rows(name, template, height)?.with_format(projections.format()))
}

/// Build the sinograms of `output` from `projections`, median smoothing each one.
///
/// Identifiers of `output` are detector rows. Sinograms that already exist are skipped; if all
/// of them exist the projections are not loaded at all.
#[instrument(skip_all, fields(projections = projections.name(), sinograms = output.name()))]
pub fn build_sinograms(
    projections: &ImageSeries,
    output: &ImageSeries,
    options: &SmoothOptions,
    dispatcher: &Dispatcher,
    resources: &ResourceManager,
) -> Result<DispatchReport, Imars3dError> {
    options.validate()?;
    if projections.is_empty() {
        return Err(Imars3dError::EmptyInput { operation: STAGE });
    }
    if output.missing().is_empty() {
        metrics::record_units(STAGE, Outcome::Skipped, output.len());
        info!(skipped = output.len(), "all sinograms exist");
        return Ok(DispatchReport {
            computed: 0,
            skipped: output.len(),
        });
    }

    let stack = StagedStack::load(projections, dispatcher, resources)?;
    let view = stack.view();
    let (_, height, _) = view.dim();
    let rows = output.identifiers();
    if let Some(&row) = rows
        .iter()
        .find(|&&row| row.fract() != 0.0 || row < 0.0 || row >= height as f64)
    {
        return Err(Imars3dError::InvalidInput {
            operation: STAGE,
            reason: format!("row {row} is outside the {height} projection rows"),
        });
    }
    let report = dispatcher.run(
        STAGE,
        0..rows.len(),
        |index| format!("{} row {}", output.name(), rows[index]),
        |index| {
            let row = rows[index];
            if output.exists(row) {
                return Ok(UnitOutcome::Skipped);
            }
            let sinogram = view.index_axis(ndarray::Axis(1), row as usize);
            let smoothed = median_filter(sinogram, options.half_width);
            output.put_data(row, smoothed.view(), stack.format())?;
            Ok(UnitOutcome::Computed)
        },
    )?;
    info!(
        computed = report.computed,
        skipped = report.skipped,
        "sinograms built"
    );
    Ok(report)
}
