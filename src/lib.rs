//! This crate provides an autoreduction pipeline for neutron imaging computed tomography (CT).
//!
//! Raw radiographs are loaded as image series, corrected (outliers, dead pixels, cropping,
//! intensity fluctuation, normalization, smoothing), aligned by estimating and removing the
//! tilt of the rotation axis, and reshaped into sinograms for reconstruction. Every stage reads
//! and writes images on disk and skips outputs that already exist, so an interrupted run can
//! simply be started again.
//!
//! Reductions are described by a declarative task graph executed by the
//! [workflow engine](workflow::Engine). The tomographic reconstruction algorithm itself is
//! external and plugs in through the [Reconstructor](recon::Reconstructor) trait.
//!
//! The pipeline is built on top of a number of open source components.
//!
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used in numerical
//!   computation.
//! * [Rayon](rayon) runs work units in parallel on a dedicated thread pool.
//! * [tiff] decodes and encodes TIFF images.
//! * [rustfft] computes the Fourier transforms used for phase correlation.
//! * [Serde](serde) performs (de)serialisation of task graphs and configuration documents.

pub mod app;
pub mod cli;
pub mod codec;
pub mod compression;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod image;
pub mod metrics;
pub mod models;
pub mod operation;
pub mod operations;
pub mod recon;
pub mod resource_manager;
pub mod series;
pub mod sinogram;
#[cfg(test)]
pub mod test_utils;
pub mod tilt;
pub mod tracing;
pub mod workflow;
