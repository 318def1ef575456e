//! Image series: an ordered set of identifiers mapped to image files by a path template.

pub mod template;

use std::path::PathBuf;

use ndarray::ArrayView2;

use crate::codec;
use crate::error::Imars3dError;
use crate::image::Image;
use crate::models::SampleFormat;

pub use template::PathTemplate;

/// An ordered collection of 2D images keyed by numeric identifier.
///
/// The series does not hold pixel data. Images are read on demand with
/// [get_data](ImageSeries::get_data) and written with [put_image](ImageSeries::put_image), so
/// that processing can resume after an interruption by checking [exists](ImageSeries::exists).
#[derive(Clone, Debug, PartialEq)]
pub struct ImageSeries {
    name: String,
    identifiers: Vec<f64>,
    template: PathTemplate,
    format: Option<SampleFormat>,
}

impl ImageSeries {
    /// Return a new ImageSeries.
    ///
    /// Identifiers are sorted. Fails if an identifier is not finite, appears twice, or if two
    /// identifiers render to the same path.
    pub fn new(
        name: &str,
        template: PathTemplate,
        mut identifiers: Vec<f64>,
    ) -> Result<Self, Imars3dError> {
        if let Some(bad) = identifiers.iter().find(|id| !id.is_finite()) {
            return Err(Imars3dError::InvalidTemplate {
                template: template.as_str().to_string(),
                reason: format!("identifier {bad} is not finite"),
            });
        }
        identifiers.sort_by(f64::total_cmp);
        for pair in identifiers.windows(2) {
            let (a, b) = (template.path(pair[0]), template.path(pair[1]));
            if a == b {
                return Err(Imars3dError::InvalidTemplate {
                    template: template.as_str().to_string(),
                    reason: format!(
                        "identifiers {} and {} both map to {}",
                        pair[0],
                        pair[1],
                        a.display()
                    ),
                });
            }
        }
        Ok(ImageSeries {
            name: name.to_string(),
            identifiers,
            template,
            format: None,
        })
    }

    /// Return a new ImageSeries whose identifiers are the files that already match the template.
    pub fn discover(name: &str, template: PathTemplate) -> Result<Self, Imars3dError> {
        let (directory, _, _) = template.split_directory()?;
        let entries =
            std::fs::read_dir(&directory).map_err(|err| Imars3dError::io(&directory, err))?;
        let mut identifiers = vec![];
        for entry in entries {
            let entry = entry.map_err(|err| Imars3dError::io(&directory, err))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(identifier) = entry
                .file_name()
                .to_str()
                .and_then(|file_name| template.parse_identifier(file_name))
            {
                identifiers.push(identifier);
            }
        }
        tracing::debug!(series = name, count = identifiers.len(), "discovered images");
        Self::new(name, template, identifiers)
    }

    /// Return a new series of detector rows `0..rows`, e.g. for sinograms.
    pub fn rows(name: &str, template: PathTemplate, rows: usize) -> Result<Self, Imars3dError> {
        Self::new(name, template, (0..rows).map(|row| row as f64).collect())
    }

    /// Return a series with the same identifiers at a different location.
    ///
    /// The decimal mark and sample format are inherited.
    pub fn derive(&self, name: &str, template: &str) -> Result<Self, Imars3dError> {
        let template = PathTemplate::parse(template)?
            .with_decimal_mark(self.template.decimal_mark().map(str::to_string))?;
        Ok(Self::new(name, template, self.identifiers.clone())?.with_format(self.format))
    }

    /// Write images in `format` instead of the format they were read from.
    pub fn with_format(mut self, format: Option<SampleFormat>) -> Self {
        self.format = format;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifiers(&self) -> &[f64] {
        &self.identifiers
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn format(&self) -> Option<SampleFormat> {
        self.format
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Whether `identifier` belongs to this series.
    pub fn contains(&self, identifier: f64) -> bool {
        self.identifiers
            .binary_search_by(|id| id.total_cmp(&identifier))
            .is_ok()
    }

    /// The identifier closest to `target`.
    pub fn nearest(&self, target: f64) -> Option<f64> {
        self.identifiers
            .iter()
            .copied()
            .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
    }

    /// Path of the image with the given identifier.
    pub fn path(&self, identifier: f64) -> PathBuf {
        self.template.path(identifier)
    }

    /// Whether the image with the given identifier exists on disk.
    pub fn exists(&self, identifier: f64) -> bool {
        self.path(identifier).is_file()
    }

    /// Identifiers whose image does not exist on disk.
    pub fn missing(&self) -> Vec<f64> {
        self.identifiers
            .iter()
            .copied()
            .filter(|&id| !self.exists(id))
            .collect()
    }

    fn check_identifier(&self, identifier: f64) -> Result<(), Imars3dError> {
        if !self.contains(identifier) {
            return Err(Imars3dError::UnknownIdentifier {
                series: self.name.clone(),
                identifier,
            });
        }
        Ok(())
    }

    /// Read the image with the given identifier.
    pub fn get_data(&self, identifier: f64) -> Result<Image, Imars3dError> {
        self.check_identifier(identifier)?;
        let path = self.path(identifier);
        let (data, format) = codec::read(&path)?;
        Ok(Image {
            identifier,
            path: Some(path),
            format,
            data,
        })
    }

    /// Write `image` under `identifier`, creating parent directories as needed.
    ///
    /// The image is written to a temporary file that is renamed into place, so a file that
    /// [exists](ImageSeries::exists) is always complete.
    pub fn put_image(&self, identifier: f64, image: &Image) -> Result<PathBuf, Imars3dError> {
        self.put_data(identifier, image.data.view(), image.format)
    }

    /// Write raw pixel data under `identifier`.
    pub fn put_data(
        &self,
        identifier: f64,
        data: ArrayView2<f32>,
        format: SampleFormat,
    ) -> Result<PathBuf, Imars3dError> {
        self.check_identifier(identifier)?;
        let path = self.path(identifier);
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| Imars3dError::io(parent, err))?;
        }
        let format = self.format.unwrap_or(format);
        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        codec::write(&path, &partial, data, format)?;
        std::fs::rename(&partial, &path).map_err(|err| Imars3dError::io(&path, err))?;
        Ok(path)
    }

    /// Iterate over the images in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Image, Imars3dError>> + '_ {
        self.identifiers.iter().map(|&id| self.get_data(id))
    }
}
