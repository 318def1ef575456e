//! FITS primary HDU images through `fitsio`.
//!
//! Unsigned integer samples are stored by CFITSIO as signed integers with a `BZERO` offset and
//! scaled back on read.

use std::path::{Path, PathBuf};

use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::{Array2, ArrayView2};

use crate::compression;
use crate::error::Imars3dError;
use crate::models::SampleFormat;

/// Upper bound on the gzip compression ratio, used to reject impossible image sizes.
const MAX_GZIP_RATIO: u64 = 1032;

fn image_type(format: SampleFormat) -> ImageType {
    match format {
        SampleFormat::Uint8 => ImageType::UnsignedByte,
        SampleFormat::Uint16 => ImageType::UnsignedShort,
        SampleFormat::Uint32 => ImageType::UnsignedLong,
        SampleFormat::Float32 => ImageType::Float,
        SampleFormat::Float64 => ImageType::Double,
    }
}

fn create(path: &Path, data: ArrayView2<f32>, format: SampleFormat) -> Result<(), Imars3dError> {
    let (height, width) = data.dim();
    let description = ImageDescription {
        data_type: image_type(format),
        dimensions: &[height, width],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;
    match format {
        SampleFormat::Uint8 => {
            hdu.write_image(&mut fptr, &super::quantize_all::<u8>(data))?;
        }
        SampleFormat::Uint16 => {
            hdu.write_image(&mut fptr, &super::quantize_all::<u16>(data))?;
        }
        SampleFormat::Uint32 => {
            hdu.write_image(&mut fptr, &super::quantize_all::<u32>(data))?;
        }
        SampleFormat::Float32 => {
            let samples: Vec<f32> = data.iter().copied().collect();
            hdu.write_image(&mut fptr, &samples)?;
        }
        SampleFormat::Float64 => {
            let samples: Vec<f64> = data.iter().map(|&v| v as f64).collect();
            hdu.write_image(&mut fptr, &samples)?;
        }
    }
    Ok(())
}

/// Write `data` as the primary HDU of a FITS file at `destination`.
///
/// With `gzip` the file is written uncompressed next to `destination` first and then
/// compressed into place.
pub fn write(
    destination: &Path,
    data: ArrayView2<f32>,
    format: SampleFormat,
    gzip: bool,
) -> Result<(), Imars3dError> {
    if !gzip {
        return create(destination, data, format);
    }
    let mut plain = destination.as_os_str().to_owned();
    plain.push(".fits");
    let plain = PathBuf::from(plain);
    create(&plain, data, format)?;
    let bytes = std::fs::read(&plain).map_err(|err| Imars3dError::io(&plain, err))?;
    std::fs::remove_file(&plain).map_err(|err| Imars3dError::io(&plain, err))?;
    let bytes = compression::compress(&bytes).map_err(|err| Imars3dError::io(destination, err))?;
    std::fs::write(destination, bytes).map_err(|err| Imars3dError::io(destination, err))
}

/// Read the primary HDU of the FITS file at `path`, which may be gzip compressed.
///
/// `file_size` is the size of the file on disk and bounds the image size the header may claim.
pub fn read(
    path: &Path,
    file_size: u64,
    gzip: bool,
) -> Result<(Array2<f32>, SampleFormat), String> {
    let mut fptr = FitsFile::open(path).map_err(|err| err.to_string())?;
    let hdu = fptr.primary_hdu().map_err(|err| err.to_string())?;
    let mut key = |name: &str| hdu.read_key::<i64>(&mut fptr, name);
    let naxis = key("NAXIS").map_err(|_| "missing NAXIS card".to_string())?;
    if naxis != 2 {
        return Err(format!("expected 2 axes, found {naxis}"));
    }
    let bitpix = key("BITPIX").map_err(|_| "missing BITPIX card".to_string())?;
    let dimension = |value: Result<i64, _>, name: &str| {
        value
            .ok()
            .and_then(|value| usize::try_from(value).ok())
            .ok_or_else(|| format!("missing or invalid {name}"))
    };
    let width = dimension(key("NAXIS1"), "NAXIS1")?;
    let height = dimension(key("NAXIS2"), "NAXIS2")?;
    let sample_size = match bitpix {
        8 | 16 | 32 | -32 | -64 => bitpix.unsigned_abs(),
        _ => return Err(format!("unsupported BITPIX {bitpix}")),
    } / 8;
    let limit = if gzip {
        file_size.saturating_mul(MAX_GZIP_RATIO)
    } else {
        file_size
    };
    let size = (width as u64)
        .checked_mul(height as u64)
        .and_then(|count| count.checked_mul(sample_size));
    match size {
        Some(size) if size <= limit => {}
        _ => return Err(format!("a {width}x{height} image does not fit in the file")),
    }

    let bzero = hdu.read_key::<f64>(&mut fptr, "BZERO").unwrap_or(0.0);
    let bscale = hdu.read_key::<f64>(&mut fptr, "BSCALE").unwrap_or(1.0);
    let unsigned = bscale == 1.0;
    let format = match bitpix {
        8 if bzero == 0.0 && unsigned => SampleFormat::Uint8,
        16 if bzero == 32768.0 && unsigned => SampleFormat::Uint16,
        32 if bzero == 2147483648.0 && unsigned => SampleFormat::Uint32,
        -64 => SampleFormat::Float64,
        _ => SampleFormat::Float32,
    };
    let samples: Vec<f32> = hdu
        .read_image(&mut fptr)
        .map_err(|err| err.to_string())?;
    Array2::from_shape_vec((height, width), samples)
        .map(|array| (array, format))
        .map_err(|err| err.to_string())
}
