//! Image file codecs.
//!
//! The codec is chosen from the file extension: `.tif`/`.tiff` for TIFF, `.fits`/`.fit`/`.fts`
//! for FITS, optionally followed by `.gz` for gzip-wrapped files.
//! All codecs decode into `f32` samples and remember the stored [SampleFormat].
//! Writing float data into an integer format rounds to the nearest integer and clamps to the
//! representable range; NaN is stored as zero.

pub mod fits;
pub mod tif;

use std::path::Path;

use ndarray::{Array2, ArrayView2};
use num_traits::{NumCast, PrimInt};

use crate::compression;
use crate::error::Imars3dError;
use crate::models::SampleFormat;

/// Container format of an image file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Tiff,
    Fits,
}

/// Determine the container format and whether the file is gzip-wrapped.
pub fn format_of(path: &Path) -> Result<(ImageFormat, bool), Imars3dError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let (name, gzip) = match name.strip_suffix(".gz") {
        Some(name) => (name.to_string(), true),
        None => (name, false),
    };
    let format = match name.rsplit_once('.').map(|(_, extension)| extension) {
        Some("tif") | Some("tiff") => ImageFormat::Tiff,
        Some("fits") | Some("fit") | Some("fts") => ImageFormat::Fits,
        _ => {
            return Err(Imars3dError::ExtensionMismatch {
                path: path.to_path_buf(),
                expected: "tif, tiff, fits, fit or fts (optionally .gz)".to_string(),
            })
        }
    };
    Ok((format, gzip))
}

/// Read an image from `path`.
pub fn read(path: &Path) -> Result<(Array2<f32>, SampleFormat), Imars3dError> {
    let (format, gzip) = format_of(path)?;
    let malformed = |reason: String| Imars3dError::Malformed {
        path: path.to_path_buf(),
        reason,
    };
    match format {
        ImageFormat::Tiff => {
            let mut bytes = std::fs::read(path).map_err(|err| Imars3dError::io(path, err))?;
            if gzip {
                bytes = compression::decompress(&bytes)
                    .map_err(|err| malformed(format!("gzip: {err}")))?;
            }
            tif::decode(&bytes).map_err(malformed)
        }
        ImageFormat::Fits => {
            let metadata = std::fs::metadata(path).map_err(|err| Imars3dError::io(path, err))?;
            fits::read(path, metadata.len(), gzip).map_err(malformed)
        }
    }
}

/// Encode `data` in the format implied by `path` and write it to `destination`.
///
/// `destination` may differ from `path` so that callers can write to a temporary file first.
pub fn write(
    path: &Path,
    destination: &Path,
    data: ArrayView2<f32>,
    format: SampleFormat,
) -> Result<(), Imars3dError> {
    let (container, gzip) = format_of(path)?;
    match container {
        ImageFormat::Tiff => {
            let mut bytes = tif::encode(data, format)?;
            if gzip {
                bytes = compression::compress(&bytes)
                    .map_err(|err| Imars3dError::io(destination, err))?;
            }
            std::fs::write(destination, bytes).map_err(|err| Imars3dError::io(destination, err))
        }
        ImageFormat::Fits => fits::write(destination, data, format, gzip),
    }
}

/// Convert a sample to an integer type, rounding and clamping to its range.
pub(crate) fn quantize<T: PrimInt>(value: f32) -> T {
    let min = T::min_value().to_f64().unwrap_or(0.0);
    let max = T::max_value().to_f64().unwrap_or(0.0);
    let value = if value.is_nan() {
        0.0
    } else {
        (value as f64).round().clamp(min, max)
    };
    <T as NumCast>::from(value).unwrap_or_else(T::zero)
}

/// Convert samples to an integer type in row-major order.
pub(crate) fn quantize_all<T: PrimInt>(data: ArrayView2<f32>) -> Vec<T> {
    data.iter().map(|&value| quantize::<T>(value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    #[test]
    fn formats() {
        assert_eq!(
            (ImageFormat::Tiff, false),
            format_of(Path::new("/a/ct_0.TIFF")).unwrap()
        );
        assert_eq!(
            (ImageFormat::Fits, true),
            format_of(Path::new("ct_0.fits.gz")).unwrap()
        );
        assert_eq!(
            (ImageFormat::Fits, false),
            format_of(Path::new("ct_0.5.fit")).unwrap()
        );
        assert!(format_of(Path::new("ct_0.png")).is_err());
        assert!(format_of(Path::new("ct_0")).is_err());
    }

    #[test]
    fn quantize_rounds_and_clamps() {
        assert_eq!(2_u16, quantize::<u16>(1.5));
        assert_eq!(1_u16, quantize::<u16>(1.49));
        assert_eq!(0_u16, quantize::<u16>(-3.0));
        assert_eq!(65535_u16, quantize::<u16>(1e9));
        assert_eq!(0_u8, quantize::<u8>(f32::NAN));
        assert_eq!(u32::MAX, quantize::<u32>(f32::INFINITY));
    }

    #[test]
    fn write_read_all_containers() {
        let dir = tempfile::tempdir().unwrap();
        let data = array![[0.0_f32, 1.0, 2.0], [65535.0, 7.0, 300.0]];
        for name in ["a.tiff", "a.fits", "a.fits.gz", "a.tif.gz"] {
            let path = dir.path().join(name);
            write(&path, &path, data.view(), SampleFormat::Uint16).unwrap();
            let (read, format) = read(&path).unwrap();
            assert_eq!(data, read, "{}", name);
            assert_eq!(SampleFormat::Uint16, format, "{}", name);
        }
    }

    #[test]
    fn lossy_integer_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tiff");
        let data = array![[0.4_f32, 1.6], [-5.0, 300.0]];
        write(&path, &path, data.view(), SampleFormat::Uint8).unwrap();
        let (read, format) = read(&path).unwrap();
        assert_eq!(array![[0.0_f32, 2.0], [0.0, 255.0]], read);
        assert_eq!(SampleFormat::Uint8, format);
    }

    #[test]
    fn corrupt_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.tiff", "a.fits", "a.fits.gz"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"not an image").unwrap();
            match read(&path).unwrap_err() {
                Imars3dError::Malformed { path: p, .. } => assert_eq!(path, p),
                err => panic!("unexpected error {}", err),
            }
        }
    }
}
