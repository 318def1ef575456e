//! Built in workflow functions.

use std::sync::Arc;

use tracing::info;

use super::context::Value;
use super::registry::{Handler, Invocation, Registry};
use crate::config;
use crate::error::Imars3dError;
use crate::models::{
    BoundaryOptions, DeadPixelOptions, GammaOptions, IntensityOptions, NormalizeOptions,
    ReconOptions, SampleFormat, SeriesOptions, SmoothOptions, TiltOptions,
};
use crate::operation::{filter, Correction};
use crate::operations::{
    detect_crop_window, Crop, DeadPixelCorrection, GammaFilter, IntensityFluctuation,
    MedianSmooth, Normalize,
};
use crate::recon::{reconstruct_series, Reconstructor};
use crate::series::{ImageSeries, PathTemplate};
use crate::sinogram::{build_sinograms, sinogram_series};
use crate::tilt::{self, TiltCorrection};

use super::context::ValueKind::{Any, Number, Series, Text, Window};

/// Register the built in functions.
pub(super) fn register_defaults(registry: &mut Registry) {
    registry.register(
        "series.open",
        Handler::new(vec![Text], vec![Series], open_series).with_options::<SeriesOptions>(),
    );
    registry.register(
        "correction.gamma",
        Handler::new(vec![Series, Text], vec![Series], |call| {
            correct(call, &GammaFilter::new(call.options()?)?)
        })
        .with_options::<GammaOptions>(),
    );
    registry.register(
        "correction.dead_pixel",
        Handler::new(vec![Series, Text], vec![Series], |call| {
            correct(call, &DeadPixelCorrection::new(call.options()?)?)
        })
        .with_options::<DeadPixelOptions>(),
    );
    registry.register(
        "correction.normalize",
        Handler::new(vec![Series, Series, Series, Text], vec![Series], |call| {
            let normalize = Normalize::from_series(call.series(1)?, call.series(2)?, call.options()?)?;
            let output = derive(call, 3)?.with_format(Some(SampleFormat::Float32));
            run_filter(call, &normalize, output)
        })
        .with_options::<NormalizeOptions>(),
    );
    registry.register(
        "correction.intensity_fluctuation",
        Handler::new(vec![Series, Text], vec![Series], |call| {
            let correction = IntensityFluctuation::new(call.options()?)?;
            let output = derive(call, 1)?.with_format(Some(SampleFormat::Float32));
            run_filter(call, &correction, output)
        })
        .with_options::<IntensityOptions>(),
    );
    registry.register(
        "crop.detect",
        Handler::new(vec![Series], vec![Window], |call| {
            let options: BoundaryOptions = call.options()?;
            let window =
                detect_crop_window(call.series(0)?, &options, &call.services.dispatcher)?;
            Ok(vec![Value::Window(window)])
        })
        .with_options::<BoundaryOptions>(),
    );
    registry.register(
        "correction.crop",
        Handler::new(vec![Series, Window, Text], vec![Series], |call| {
            let crop = Crop::new(call.window(1)?)?;
            run_filter(call, &crop, derive(call, 2)?)
        }),
    );
    registry.register(
        "correction.smooth",
        Handler::new(vec![Series, Text], vec![Series], |call| {
            correct(call, &MedianSmooth::new(call.options()?)?)
        })
        .with_options::<SmoothOptions>(),
    );
    registry.register(
        "tilt.estimate",
        Handler::new(vec![Series], vec![Number], |call| {
            let options: TiltOptions = call.options()?;
            let tilt =
                tilt::estimate_series(call.series(0)?, &options, &call.services.dispatcher)?;
            Ok(vec![Value::Number(tilt)])
        })
        .with_options::<TiltOptions>(),
    );
    registry.register(
        "tilt.apply",
        Handler::new(vec![Series, Number, Text], vec![Series], |call| {
            let correction = TiltCorrection::new(call.number(1)?);
            run_filter(call, &correction, derive(call, 2)?)
        }),
    );
    registry.register(
        "sinogram.build",
        Handler::new(vec![Series, Text], vec![Series], |call| {
            let options: SmoothOptions = call.options()?;
            let projections = call.series(0)?;
            let template = PathTemplate::parse(call.text(1)?)?;
            let output = sinogram_series(call.stage, projections, template)?;
            let services = call.services;
            build_sinograms(
                projections,
                &output,
                &options,
                &services.dispatcher,
                &services.resources,
            )?;
            Ok(vec![Value::Series(output)])
        })
        .with_options::<SmoothOptions>(),
    );
    registry.register(
        "config.save",
        Handler::new(vec![Any, Text], vec![], |call| {
            let path = config::expand_path(call.text(1)?);
            config::save_document(&path, &call.value(0)?.to_json())?;
            Ok(vec![])
        }),
    );
}

/// `recon.reconstruct(sinograms, projections, template)`.
///
/// Projection identifiers are taken as angles in degrees.
pub(super) fn reconstruct(reconstructor: Arc<dyn Reconstructor>) -> Handler {
    Handler::new(vec![Series, Series, Text], vec![Series], move |call| {
        let options: ReconOptions = call.options()?;
        let sinograms = call.series(0)?;
        let projections = call.series(1)?;
        let template = PathTemplate::parse(call.text(2)?)?;
        let output = ImageSeries::new(call.stage, template, sinograms.identifiers().to_vec())?
            .with_format(Some(SampleFormat::Float32));
        let services = call.services;
        reconstruct_series(
            reconstructor.as_ref(),
            sinograms,
            projections.identifiers(),
            &options,
            &output,
            &services.dispatcher,
            &services.resources,
        )?;
        Ok(vec![Value::Series(output)])
    })
    .with_options::<ReconOptions>()
}

/// `series.open(template)`.
fn open_series(call: &Invocation) -> Result<Vec<Value>, Imars3dError> {
    let options: SeriesOptions = call.options()?;
    let name = options.name.as_deref().unwrap_or(call.stage);
    let template = PathTemplate::parse(call.text(0)?)?.with_decimal_mark(options.decimal_mark)?;
    let series = match &options.identifiers {
        Some(identifiers) => ImageSeries::new(name, template, identifiers.expand())?,
        None => ImageSeries::discover(name, template)?,
    }
    .with_format(options.format);
    info!(
        series = series.name(),
        images = series.len(),
        missing = series.missing().len(),
        "opened series"
    );
    Ok(vec![Value::Series(series)])
}

/// Output series for argument 0 at the template given by argument `template`.
fn derive(call: &Invocation, template: usize) -> Result<ImageSeries, Imars3dError> {
    call.series(0)?.derive(call.stage, call.text(template)?)
}

fn correct(call: &Invocation, correction: &dyn Correction) -> Result<Vec<Value>, Imars3dError> {
    run_filter(call, correction, derive(call, 1)?)
}

fn run_filter(
    call: &Invocation,
    correction: &dyn Correction,
    output: ImageSeries,
) -> Result<Vec<Value>, Imars3dError> {
    filter(correction, call.series(0)?, &output, &call.services.dispatcher)?;
    Ok(vec![Value::Series(output)])
}
