//! Parallel dispatch of independent work units.
//!
//! A range of units is split into contiguous partitions, one per worker. Workers run on a
//! dedicated rayon thread pool. A failing unit does not stop the other units; all failures are
//! collected and returned together once every partition has finished.

use std::ops::Range;
use std::sync::Arc;

use ndarray::parallel::prelude::*;
use ndarray::{Array3, ArrayView3, Axis};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::error::{Imars3dError, UnitFailure};
use crate::metrics::{self, Outcome};
use crate::models::SampleFormat;
use crate::resource_manager::{MemoryPermit, ResourceManager};
use crate::series::ImageSeries;

/// Split `range` into at most `workers` contiguous, non-empty partitions.
///
/// The partitions tile the range exactly; sizes differ by at most one.
pub fn partition(range: Range<usize>, workers: usize) -> Vec<Range<usize>> {
    let len = range.len();
    if len == 0 {
        return vec![];
    }
    let count = workers.clamp(1, len);
    let (base, remainder) = (len / count, len % count);
    let mut start = range.start;
    (0..count)
        .map(|i| {
            let size = base + usize::from(i < remainder);
            let partition = start..start + size;
            start += size;
            partition
        })
        .collect()
}

/// Outcome of a single successful work unit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Output was produced
    Computed,
    /// Output already existed
    Skipped,
}

/// Summary of a successful dispatch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Units that produced output
    pub computed: usize,
    /// Units whose output already existed
    pub skipped: usize,
}

impl DispatchReport {
    fn add(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Computed => self.computed += 1,
            UnitOutcome::Skipped => self.skipped += 1,
        }
    }

    fn merge(mut self, other: DispatchReport) -> Self {
        self.computed += other.computed;
        self.skipped += other.skipped;
        self
    }
}

/// Runs work units on a pool of worker threads.
pub struct Dispatcher {
    workers: usize,
    pool: rayon::ThreadPool,
}

impl Dispatcher {
    /// Return a new Dispatcher with `workers` worker threads.
    pub fn new(workers: usize) -> Result<Self, Imars3dError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("imars3d-worker-{i}"))
            .build()?;
        Ok(Dispatcher { workers, pool })
    }

    /// Return a new Dispatcher sized by `resources`.
    pub fn from_resources(resources: &ResourceManager) -> Result<Self, Imars3dError> {
        Self::new(resources.workers())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f` on the worker pool.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    /// Run `unit` for every index in `range`.
    ///
    /// # Arguments
    ///
    /// * `stage`: Name used in logs and metrics
    /// * `range`: Unit indices
    /// * `label`: Describes a unit in failure reports
    /// * `unit`: Processes one unit
    #[instrument(skip(self, label, unit), fields(workers = self.workers))]
    pub fn run<L, F>(
        &self,
        stage: &str,
        range: Range<usize>,
        label: L,
        unit: F,
    ) -> Result<DispatchReport, Imars3dError>
    where
        L: Fn(usize) -> String + Sync,
        F: Fn(usize) -> Result<UnitOutcome, Imars3dError> + Sync,
    {
        let total = range.len();
        let partitions = partition(range, self.workers);
        let results: Vec<(DispatchReport, Vec<UnitFailure>)> = self.pool.install(|| {
            partitions
                .par_iter()
                .map(|partition| {
                    debug!(
                        stage,
                        start = partition.start,
                        end = partition.end,
                        "partition started"
                    );
                    let mut report = DispatchReport::default();
                    let mut failures = vec![];
                    for index in partition.clone() {
                        match unit(index) {
                            Ok(outcome) => report.add(outcome),
                            Err(error) => failures.push(UnitFailure {
                                partition: partition.clone(),
                                unit: index,
                                label: label(index),
                                error,
                            }),
                        }
                    }
                    (report, failures)
                })
                .collect()
        });

        let mut report = DispatchReport::default();
        let mut failures = vec![];
        for (partial, partial_failures) in results {
            report = report.merge(partial);
            failures.extend(partial_failures);
        }
        metrics::record_units(stage, Outcome::Computed, report.computed);
        metrics::record_units(stage, Outcome::Skipped, report.skipped);
        metrics::record_units(stage, Outcome::Failed, failures.len());
        debug!(
            stage,
            computed = report.computed,
            skipped = report.skipped,
            failed = failures.len(),
            "dispatch finished"
        );
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Imars3dError::Workers { total, failures })
        }
    }
}

/// An image series loaded once into a read-only stack shared by all workers.
///
/// The stack is indexed `[image, row, column]`. Its memory is reserved from the
/// [ResourceManager] for as long as any clone is alive.
#[derive(Clone, Debug)]
pub struct StagedStack {
    data: Arc<Array3<f32>>,
    format: SampleFormat,
    _permit: Arc<MemoryPermit>,
}

impl StagedStack {
    /// Load every image of `series` using the dispatcher's workers.
    ///
    /// Fails if any image is missing or the images differ in shape.
    #[instrument(skip_all, fields(series = series.name(), images = series.len()))]
    pub fn load(
        series: &ImageSeries,
        dispatcher: &Dispatcher,
        resources: &ResourceManager,
    ) -> Result<Self, Imars3dError> {
        let identifiers = series.identifiers();
        let first = identifiers.first().ok_or(Imars3dError::EmptyInput {
            operation: "staging",
        })?;
        let first = series.get_data(*first)?;
        let (height, width) = first.shape();
        let bytes = identifiers.len() * height * width * std::mem::size_of::<f32>();
        let permit = resources.memory(bytes)?;
        let mut data = Array3::<f32>::zeros((identifiers.len(), height, width));
        dispatcher.install(|| {
            data.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .try_for_each(|(index, mut slot)| {
                    let image = series.get_data(identifiers[index])?;
                    if image.shape() != (height, width) {
                        return Err(Imars3dError::ShapeMismatch {
                            expected: vec![height, width],
                            found: image.data.shape().to_vec(),
                        });
                    }
                    slot.assign(&image.data);
                    Ok(())
                })
        })?;
        debug!(bytes, "staged input stack");
        Ok(StagedStack {
            data: Arc::new(data),
            format: first.format,
            _permit: Arc::new(permit),
        })
    }

    /// Read-only view of the stack.
    pub fn view(&self) -> ArrayView3<f32> {
        self.data.view()
    }

    /// Sample format of the first image.
    pub fn format(&self) -> SampleFormat {
        self.format
    }
}
